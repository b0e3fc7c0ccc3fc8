//! HTTP client for the video-indexing service.
//!
//! Upload returns a video id; poll returns processing state plus, once
//! available, transcript and OCR insight lines with timestamps.

use std::time::Duration;

use serde_json::Value;

use super::{JobStatus, TimedLine, VideoIndexApi, VideoInsights};
use crate::config::VideoIndexConfig;
use crate::error::IngestError;

pub struct HttpVideoIndexClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVideoIndexClient {
    pub fn new(config: &VideoIndexConfig) -> anyhow::Result<Self> {
        let base_url = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("video_index.endpoint is required"))?;
        // Uploads can be large; the poll interval bounds the rest.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn parse_state(state: Option<&str>) -> JobStatus {
    match state {
        Some("Processed") => JobStatus::Succeeded,
        Some("Failed") => JobStatus::Failed,
        Some("Canceled") => JobStatus::Canceled,
        _ => JobStatus::Running,
    }
}

/// Timestamps arrive as `"H:MM:SS.fff"` strings.
fn parse_timestamp(raw: &str) -> Option<f64> {
    let mut parts = raw.split(':').rev();
    let seconds: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next().and_then(|m| m.parse().ok()).unwrap_or(0.0);
    let hours: f64 = parts.next().and_then(|h| h.parse().ok()).unwrap_or(0.0);
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn parse_lines(items: Option<&Value>) -> Vec<TimedLine> {
    let mut lines: Vec<TimedLine> = items
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|item| {
                    let text = item.get("text").and_then(Value::as_str)?.to_string();
                    let start = item
                        .get("instances")
                        .and_then(Value::as_array)
                        .and_then(|instances| instances.first())
                        .and_then(|i| i.get("start"))
                        .and_then(Value::as_str)
                        .and_then(parse_timestamp)?;
                    if text.trim().is_empty() {
                        return None;
                    }
                    Some(TimedLine {
                        start_secs: start,
                        text,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    lines.sort_by(|a, b| a.start_secs.total_cmp(&b.start_secs));
    lines
}

#[async_trait::async_trait]
impl VideoIndexApi for HttpVideoIndexClient {
    async fn submit(&self, file_name: &str, bytes: &[u8]) -> Result<String, IngestError> {
        let url = format!("{}/videos", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/octet-stream")
            .header("x-file-name", file_name)
            .body(bytes.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::ExternalService(format!(
                "video upload {status}: {body}"
            )));
        }

        let json: Value = response.json().await.map_err(|e| {
            IngestError::ExternalService(format!("invalid video upload response: {e}"))
        })?;
        json.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                IngestError::ExternalService("video upload response missing id".to_string())
            })
    }

    async fn poll(&self, video_id: &str) -> Result<VideoInsights, IngestError> {
        let url = format!("{}/videos/{}/index", self.base_url, video_id);
        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if matches!(status.as_u16(), 401 | 404 | 429 | 504) {
                return Err(IngestError::Transient(format!(
                    "video poll {status}: {body}"
                )));
            }
            return Err(IngestError::ExternalService(format!(
                "video poll {status}: {body}"
            )));
        }

        let json: Value = response.json().await.map_err(|e| {
            IngestError::ExternalService(format!("invalid video poll response: {e}"))
        })?;

        let state = parse_state(json.get("state").and_then(Value::as_str));
        let progress = json
            .get("processingProgress")
            .and_then(Value::as_str)
            .and_then(|p| p.trim_end_matches('%').parse::<i64>().ok())
            .unwrap_or(0);

        let insights = json.get("insights");
        Ok(VideoInsights {
            state,
            progress,
            transcript: parse_lines(insights.and_then(|i| i.get("transcript"))),
            ocr: parse_lines(insights.and_then(|i| i.get("ocr"))),
        })
    }
}
