//! External service seams.
//!
//! Every collaborator the pipelines call sits behind a trait here, so
//! production wires HTTP clients and tests wire scripted fakes. The
//! [`ServiceContext`] bundle is built once at startup and handed to the
//! orchestrator; nothing reaches for a global registry.

pub mod embedding;
pub mod extraction;
pub mod storage;
pub mod transcription;
pub mod video;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::IngestError;

/// Bounded retry with exponential backoff for transient failures, and a
/// fixed interval for long-poll loops.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Interval-only policy for poll loops bounded by a wall-clock
    /// ceiling rather than an attempt count.
    pub fn every(interval: Duration) -> Self {
        Self {
            max_attempts: 0,
            interval,
        }
    }

    /// Backoff before retry `attempt` (1-based): 1s, 2s, 4s, ... capped at 32s.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
    }

    /// Delay before the next poll. A server-provided hint overrides the
    /// configured interval.
    pub fn poll_delay(&self, hint: Option<Duration>) -> Duration {
        hint.unwrap_or(self.interval)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_secs(30),
        }
    }
}

/// Terminal and non-terminal states reported by long-running jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// One page or slide of extraction output.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub page_number: i64,
    pub content: String,
}

/// Snapshot of a content-extraction job.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub status: JobStatus,
    pub pages: Vec<ExtractedPage>,
    /// Server-provided polling hint, when present.
    pub retry_after: Option<Duration>,
}

/// A transcript or OCR line anchored at a timestamp.
#[derive(Debug, Clone)]
pub struct TimedLine {
    pub start_secs: f64,
    pub text: String,
}

/// Snapshot of a video-indexing job.
#[derive(Debug, Clone)]
pub struct VideoInsights {
    pub state: JobStatus,
    pub progress: i64,
    pub transcript: Vec<TimedLine>,
    pub ocr: Vec<TimedLine>,
}

/// Bibliographic fields inferred from document content. A safety check
/// inside the implementation may veto the document by returning `None`
/// from [`MetadataInferenceApi::infer`].
#[derive(Debug, Clone, Default)]
pub struct InferredMetadata {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub organization: Option<String>,
    pub publication_date: Option<String>,
    pub keywords: Vec<String>,
    pub abstract_text: Option<String>,
    pub classification: Option<String>,
}

#[async_trait]
pub trait ExtractionApi: Send + Sync {
    /// Submit a file for extraction; returns the job id.
    async fn submit(&self, file_name: &str, bytes: &[u8]) -> Result<String, IngestError>;
    async fn poll(&self, job_id: &str) -> Result<ExtractionJob, IngestError>;
}

#[async_trait]
pub trait EmbeddingApi: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError>;
}

#[async_trait]
pub trait TranscriptionApi: Send + Sync {
    /// Transcribe one WAV segment; returns the recognized phrases in order.
    async fn transcribe(&self, wav: &[u8], locale: &str) -> Result<Vec<String>, IngestError>;
}

#[async_trait]
pub trait VideoIndexApi: Send + Sync {
    async fn submit(&self, file_name: &str, bytes: &[u8]) -> Result<String, IngestError>;
    async fn poll(&self, video_id: &str) -> Result<VideoInsights, IngestError>;
}

#[async_trait]
pub trait ObjectStorageApi: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String, IngestError>;
    async fn delete(&self, path: &str) -> Result<(), IngestError>;
}

#[async_trait]
pub trait MetadataInferenceApi: Send + Sync {
    /// Infer bibliographic metadata from a content sample. `None` means
    /// the content-safety check vetoed the document.
    async fn infer(&self, sample_text: &str) -> Result<Option<InferredMetadata>, IngestError>;
}

/// All external collaborators, injected into the orchestrator at
/// construction.
#[derive(Clone)]
pub struct ServiceContext {
    pub extraction: Arc<dyn ExtractionApi>,
    pub embeddings: Arc<dyn EmbeddingApi>,
    pub transcription: Arc<dyn TranscriptionApi>,
    pub video: Arc<dyn VideoIndexApi>,
    /// Only set when enhanced-citation retention is enabled.
    pub citations: Option<Arc<dyn ObjectStorageApi>>,
    /// Only set when metadata extraction is enabled.
    pub metadata_inference: Option<Arc<dyn MetadataInferenceApi>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(4), Duration::from_secs(8));
        assert_eq!(policy.backoff(10), Duration::from_secs(32));
        assert_eq!(policy.backoff(100), Duration::from_secs(32));
    }

    #[test]
    fn poll_delay_prefers_server_hint() {
        let policy = RetryPolicy::every(Duration::from_secs(30));
        assert_eq!(policy.poll_delay(None), Duration::from_secs(30));
        assert_eq!(
            policy.poll_delay(Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
    }
}
