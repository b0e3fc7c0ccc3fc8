//! Error taxonomy for the ingestion pipeline.
//!
//! Pipelines distinguish caller mistakes (`Validation`), hard external
//! failures (`ExternalService`), retryable glitches (`Transient`), and
//! invariant violations (`Consistency`). Store and CLI code stays on
//! `anyhow`, which folds into `Internal` at the boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The caller submitted something we refuse up front. Reported
    /// synchronously, before any background work starts.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An external service failed in a way retrying will not fix.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// A retryable failure (timeouts, 429s, propagation lag).
    #[error("transient service error: {0}")]
    Transient(String),

    /// Stored state contradicts an invariant.
    #[error("consistency error: {0}")]
    Consistency(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IngestError {
    pub fn is_transient(&self) -> bool {
        matches!(self, IngestError::Transient(_))
    }

    /// Convert an exhausted transient failure into a hard one. Other
    /// variants pass through unchanged.
    pub fn escalate(self) -> Self {
        match self {
            IngestError::Transient(msg) => {
                IngestError::ExternalService(format!("retries exhausted: {msg}"))
            }
            other => other,
        }
    }
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::Internal(err.into())
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(err: reqwest::Error) -> Self {
        // Connection-level failures are worth a retry at the call site.
        IngestError::Transient(err.to_string())
    }
}

/// Truncate a message destined for the document status column. Status text
/// is shown in listings, so runaway error chains are cut at a fixed width.
pub fn truncate_status(msg: &str, max_chars: usize) -> String {
    if msg.chars().count() <= max_chars {
        return msg.to_string();
    }
    msg.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalate_only_touches_transient() {
        let err = IngestError::Transient("timeout".into()).escalate();
        assert!(matches!(err, IngestError::ExternalService(_)));
        assert!(err.to_string().contains("retries exhausted"));

        let err = IngestError::Validation("bad ext".into()).escalate();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[test]
    fn transient_predicate() {
        assert!(IngestError::Transient("x".into()).is_transient());
        assert!(!IngestError::ExternalService("x".into()).is_transient());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_status("short", 256), "short");
        let long = "é".repeat(300);
        assert_eq!(truncate_status(&long, 256).chars().count(), 256);
    }
}
