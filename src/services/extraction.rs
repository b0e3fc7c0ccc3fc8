//! HTTP client for the content-extraction service.
//!
//! Submit returns a job id; poll returns a status snapshot plus any pages
//! extracted so far. The service intermittently answers 401/404/429/504
//! while a job is propagating through its backend, so those statuses map
//! to [`IngestError::Transient`] and the caller keeps polling.

use std::time::Duration;

use serde_json::Value;

use super::{ExtractedPage, ExtractionApi, ExtractionJob, JobStatus, RetryPolicy};
use crate::config::ExtractionConfig;
use crate::error::IngestError;

pub struct HttpExtractionClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpExtractionClient {
    pub fn new(config: &ExtractionConfig) -> anyhow::Result<Self> {
        let base_url = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("extraction.endpoint is required"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::new(config.max_attempts, Duration::from_secs(config.poll_interval_secs)),
        })
    }
}

/// Statuses the service emits while a job is still settling.
fn is_transient_status(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 401 | 404 | 429 | 504)
}

fn parse_job(json: &Value, retry_after: Option<Duration>) -> Result<ExtractionJob, IngestError> {
    let status = match json.get("status").and_then(Value::as_str) {
        Some("succeeded") => JobStatus::Succeeded,
        Some("failed") => JobStatus::Failed,
        Some("canceled") => JobStatus::Canceled,
        Some(_) => JobStatus::Running,
        None => {
            return Err(IngestError::ExternalService(
                "extraction response missing status".to_string(),
            ))
        }
    };

    let mut pages = Vec::new();
    if let Some(items) = json.get("pages").and_then(Value::as_array) {
        for item in items {
            let page_number = item
                .get("page_number")
                .and_then(Value::as_i64)
                .unwrap_or((pages.len() + 1) as i64);
            let content = item
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            pages.push(ExtractedPage {
                page_number,
                content,
            });
        }
    }
    pages.sort_by_key(|p| p.page_number);

    Ok(ExtractionJob {
        status,
        pages,
        retry_after,
    })
}

fn retry_after_header(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait::async_trait]
impl ExtractionApi for HttpExtractionClient {
    async fn submit(&self, file_name: &str, bytes: &[u8]) -> Result<String, IngestError> {
        let url = format!("{}/analyze", self.base_url);
        let mut last_err: Option<IngestError> = None;

        for attempt in 0..=self.retry.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry.backoff(attempt)).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("content-type", "application/octet-stream")
                .header("x-file-name", file_name)
                .body(bytes.to_vec())
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: Value = response.json().await.map_err(|e| {
                            IngestError::ExternalService(format!(
                                "invalid extraction submit response: {e}"
                            ))
                        })?;
                        return json
                            .get("job_id")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .ok_or_else(|| {
                                IngestError::ExternalService(
                                    "extraction submit response missing job_id".to_string(),
                                )
                            });
                    }
                    let body = response.text().await.unwrap_or_default();
                    if is_transient_status(status) {
                        last_err = Some(IngestError::Transient(format!(
                            "extraction submit {status}: {body}"
                        )));
                        continue;
                    }
                    return Err(IngestError::ExternalService(format!(
                        "extraction submit {status}: {body}"
                    )));
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| IngestError::Transient("extraction submit failed".to_string()))
            .escalate())
    }

    async fn poll(&self, job_id: &str) -> Result<ExtractionJob, IngestError> {
        let url = format!("{}/analyze/{}", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let retry_after = retry_after_header(&response);

        if status.is_success() {
            let json: Value = response.json().await.map_err(|e| {
                IngestError::ExternalService(format!("invalid extraction poll response: {e}"))
            })?;
            return parse_job(&json, retry_after);
        }

        let body = response.text().await.unwrap_or_default();
        if is_transient_status(status) {
            Err(IngestError::Transient(format!(
                "extraction poll {status}: {body}"
            )))
        } else {
            Err(IngestError::ExternalService(format!(
                "extraction poll {status}: {body}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client_for(server: &MockServer) -> HttpExtractionClient {
        HttpExtractionClient::new(&ExtractionConfig {
            endpoint: Some(server.base_url()),
            request_timeout_secs: 5,
            max_attempts: 1,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn submit_returns_job_id() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/analyze");
                then.status(200).json_body(serde_json::json!({"job_id": "job-1"}));
            })
            .await;

        let job_id = client_for(&server).submit("a.pdf", b"%PDF").await.unwrap();
        assert_eq!(job_id, "job-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn poll_parses_pages_in_order() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/analyze/job-1");
                then.status(200).json_body(serde_json::json!({
                    "status": "succeeded",
                    "pages": [
                        {"page_number": 2, "content": "second"},
                        {"page_number": 1, "content": "first"}
                    ]
                }));
            })
            .await;

        let job = client_for(&server).poll("job-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.pages.len(), 2);
        assert_eq!(job.pages[0].content, "first");
        assert_eq!(job.pages[1].content, "second");
    }

    #[tokio::test]
    async fn poll_treats_propagation_404_as_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/analyze/job-x");
                then.status(404);
            })
            .await;

        let err = client_for(&server).poll("job-x").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn poll_honors_retry_after_hint() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/analyze/job-1");
                then.status(200)
                    .header("retry-after", "7")
                    .json_body(serde_json::json!({"status": "running"}));
            })
            .await;

        let job = client_for(&server).poll("job-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.retry_after, Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn submit_bad_request_is_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/analyze");
                then.status(400).body("unsupported");
            })
            .await;

        let err = client_for(&server).submit("a.pdf", b"%PDF").await.unwrap_err();
        assert!(matches!(err, IngestError::ExternalService(_)));
        mock.assert_hits_async(1).await;
    }
}
