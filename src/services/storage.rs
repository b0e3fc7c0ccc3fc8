//! Object-storage client for enhanced-citation retention.
//!
//! The endpoint is a pre-authorized internal gateway; paths are scoped
//! `<owner>/<document_id>/<file>` by the caller.

use std::time::Duration;

use super::ObjectStorageApi;
use crate::error::IngestError;

pub struct HttpObjectStorageClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpObjectStorageClient {
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ObjectStorageApi for HttpObjectStorageClient {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String, IngestError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let response = self.client.put(&url).body(bytes.to_vec()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::ExternalService(format!(
                "object put {status}: {body}"
            )));
        }
        Ok(path.to_string())
    }

    async fn delete(&self, path: &str) -> Result<(), IngestError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let response = self.client.delete(&url).send().await?;
        let status = response.status();
        // A missing object is already deleted.
        if !status.is_success() && status.as_u16() != 404 {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::ExternalService(format!(
                "object delete {status}: {body}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn put_and_delete_roundtrip() {
        let server = MockServer::start_async().await;
        let put_mock = server
            .mock_async(|when, then| {
                when.method(PUT).path("/u1/doc-1/a.pdf");
                then.status(201);
            })
            .await;
        let delete_mock = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/u1/doc-1/a.pdf");
                then.status(204);
            })
            .await;

        let client = HttpObjectStorageClient::new(&server.base_url()).unwrap();
        let stored = client.put("u1/doc-1/a.pdf", b"%PDF").await.unwrap();
        assert_eq!(stored, "u1/doc-1/a.pdf");
        client.delete("u1/doc-1/a.pdf").await.unwrap();

        put_mock.assert_async().await;
        delete_mock.assert_async().await;
    }

    #[tokio::test]
    async fn delete_missing_object_is_ok() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/u1/doc-9/gone.pdf");
                then.status(404);
            })
            .await;

        let client = HttpObjectStorageClient::new(&server.base_url()).unwrap();
        client.delete("u1/doc-9/gone.pdf").await.unwrap();
    }
}
