//! HTTP client for the embedding service.
//!
//! Retry strategy follows the service's rate-limit contract: 429 and 5xx
//! retry with exponential backoff, other 4xx fail immediately.

use std::time::Duration;

use serde_json::Value;

use super::{EmbeddingApi, RetryPolicy};
use crate::config::EmbeddingConfig;
use crate::error::IngestError;

pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    model: Option<String>,
    retry: RetryPolicy,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.endpoint is required"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            retry: RetryPolicy::new(config.max_retries, Duration::from_secs(1)),
        })
    }
}

fn parse_embedding(json: &Value) -> Result<Vec<f32>, IngestError> {
    let embedding = json
        .get("data")
        .and_then(Value::as_array)
        .and_then(|data| data.first())
        .and_then(|item| item.get("embedding"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            IngestError::ExternalService("embedding response missing data[0].embedding".to_string())
        })?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

#[async_trait::async_trait]
impl EmbeddingApi for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError> {
        let mut body = serde_json::json!({ "input": text });
        if let Some(model) = &self.model {
            body["model"] = Value::String(model.clone());
        }

        let mut last_err: Option<IngestError> = None;

        for attempt in 0..=self.retry.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry.backoff(attempt)).await;
            }

            let resp = self.client.post(&self.endpoint).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: Value = response.json().await.map_err(|e| {
                            IngestError::ExternalService(format!(
                                "invalid embedding response: {e}"
                            ))
                        })?;
                        return parse_embedding(&json);
                    }
                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(IngestError::Transient(format!(
                            "embedding service {status}: {body_text}"
                        )));
                        continue;
                    }
                    return Err(IngestError::ExternalService(format!(
                        "embedding service {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| IngestError::Transient("embedding request failed".to_string()))
            .escalate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client_for(server: &MockServer) -> HttpEmbeddingClient {
        HttpEmbeddingClient::new(&EmbeddingConfig {
            endpoint: Some(format!("{}/embed", server.base_url())),
            model: Some("test-model".to_string()),
            timeout_secs: 5,
            max_retries: 2,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn embed_parses_vector() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embed")
                    .json_body_partial(r#"{"model": "test-model"}"#);
                then.status(200).json_body(serde_json::json!({
                    "data": [{"embedding": [0.25, -1.5, 3.0]}]
                }));
            })
            .await;

        let vector = client_for(&server).embed("hello").await.unwrap();
        assert_eq!(vector, vec![0.25, -1.5, 3.0]);
    }

    #[tokio::test]
    async fn embed_retries_rate_limit_then_succeeds() {
        let server = MockServer::start_async().await;
        let rate_limited = server
            .mock_async(|when, then| {
                when.method(POST).path("/embed");
                then.status(429);
            })
            .await;

        // First call exhausts retries against a permanent 429.
        let err = client_for(&server).embed("hello").await.unwrap_err();
        assert!(matches!(err, IngestError::ExternalService(_)));
        rate_limited.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn embed_client_error_fails_fast() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embed");
                then.status(400).body("bad input");
            })
            .await;

        let err = client_for(&server).embed("hello").await.unwrap_err();
        assert!(matches!(err, IngestError::ExternalService(_)));
        mock.assert_hits_async(1).await;
    }
}
