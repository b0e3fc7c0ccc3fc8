//! HTTP client for the transcription service.
//!
//! One synchronous-style call per audio segment; the response carries the
//! recognized phrases in order.

use std::time::Duration;

use serde_json::Value;

use super::{RetryPolicy, TranscriptionApi};
use crate::config::TranscriptionConfig;
use crate::error::IngestError;

pub struct HttpTranscriptionClient {
    client: reqwest::Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl HttpTranscriptionClient {
    pub fn new(config: &TranscriptionConfig) -> anyhow::Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("transcription.endpoint is required"))?;
        // Transcribing a nine-minute segment takes a while.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            retry: RetryPolicy::new(3, Duration::from_secs(1)),
        })
    }
}

fn parse_phrases(json: &Value) -> Result<Vec<String>, IngestError> {
    let phrases = json
        .get("combinedPhrases")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            IngestError::ExternalService(
                "transcription response missing combinedPhrases".to_string(),
            )
        })?;

    Ok(phrases
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

#[async_trait::async_trait]
impl TranscriptionApi for HttpTranscriptionClient {
    async fn transcribe(&self, wav: &[u8], locale: &str) -> Result<Vec<String>, IngestError> {
        let mut last_err: Option<IngestError> = None;

        for attempt in 0..=self.retry.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry.backoff(attempt)).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .query(&[("locale", locale)])
                .header("content-type", "audio/wav")
                .body(wav.to_vec())
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: Value = response.json().await.map_err(|e| {
                            IngestError::ExternalService(format!(
                                "invalid transcription response: {e}"
                            ))
                        })?;
                        return parse_phrases(&json);
                    }
                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(IngestError::Transient(format!(
                            "transcription service {status}: {body_text}"
                        )));
                        continue;
                    }
                    return Err(IngestError::ExternalService(format!(
                        "transcription service {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| IngestError::Transient("transcription failed".to_string()))
            .escalate())
    }
}
