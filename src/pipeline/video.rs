//! Video pipeline: index, then fuse transcript and OCR into time windows.
//!
//! Windowing advances strictly by transcript availability: each window
//! opens at the next unconsumed transcript line's timestamp and closes
//! thirty seconds later, absorbing every transcript and OCR line up to
//! the close. A video with no transcript produces zero chunks even when
//! OCR text exists.

use std::time::{Duration, Instant};

use super::Orchestrator;
use crate::error::IngestError;
use crate::models::DocumentRecord;
use crate::services::{JobStatus, RetryPolicy, TimedLine, VideoInsights};

/// Window width in seconds.
const WINDOW_SECS: f64 = 30.0;

/// One fused window: transcript text plus the OCR text that fell inside
/// the same span, kept as separate streams.
#[derive(Debug, PartialEq)]
pub(crate) struct VideoWindow {
    pub transcript_text: String,
    pub ocr_text: Option<String>,
}

impl Orchestrator {
    pub(crate) async fn run_video(
        &self,
        doc: &mut DocumentRecord,
        bytes: &[u8],
    ) -> Result<(), IngestError> {
        self.update_status(doc, "Sending to video indexing service", 0)
            .await?;
        let video_id = self.services.video.submit(&doc.file_name, bytes).await?;
        let insights = self.poll_video(doc, &video_id).await?;

        let windows = fuse_windows(&insights.transcript, &insights.ocr);
        doc.number_of_pages = windows.len() as i64;
        self.metadata.upsert(doc).await?;

        for (i, window) in windows.into_iter().enumerate() {
            self.save_chunk(
                doc,
                (i + 1) as i64,
                &window.transcript_text,
                window.ocr_text,
                None,
                "chunk",
            )
            .await?;
        }
        Ok(())
    }

    async fn poll_video(
        &self,
        doc: &DocumentRecord,
        video_id: &str,
    ) -> Result<VideoInsights, IngestError> {
        let policy =
            RetryPolicy::every(Duration::from_secs(self.config.video_index.poll_interval_secs));
        let deadline =
            Instant::now() + Duration::from_secs(self.config.video_index.poll_ceiling_secs);

        loop {
            match self.services.video.poll(video_id).await {
                Ok(insights) => match insights.state {
                    JobStatus::Succeeded => return Ok(insights),
                    JobStatus::Failed | JobStatus::Canceled => {
                        return Err(IngestError::ExternalService(format!(
                            "video indexing failed for {}",
                            doc.file_name
                        )))
                    }
                    JobStatus::Running => {
                        tracing::debug!(video_id, progress = insights.progress, "video indexing in progress");
                    }
                },
                Err(err) if err.is_transient() => {
                    tracing::debug!(video_id, error = %err, "transient video poll failure");
                }
                Err(err) => return Err(err),
            }

            let wait = policy.poll_delay(None);
            if Instant::now() + wait >= deadline {
                return Err(IngestError::ExternalService(format!(
                    "video indexing timed out for {}",
                    doc.file_name
                )));
            }
            tokio::time::sleep(wait).await;
        }
    }
}

/// Fuse transcript and OCR lines into fixed windows. Both inputs must be
/// sorted by timestamp.
pub(crate) fn fuse_windows(transcript: &[TimedLine], ocr: &[TimedLine]) -> Vec<VideoWindow> {
    let mut windows = Vec::new();
    let mut t_idx = 0;
    let mut o_idx = 0;

    while t_idx < transcript.len() {
        let window_end = transcript[t_idx].start_secs + WINDOW_SECS;

        let mut transcript_lines = Vec::new();
        while t_idx < transcript.len() && transcript[t_idx].start_secs <= window_end {
            transcript_lines.push(transcript[t_idx].text.as_str());
            t_idx += 1;
        }

        let mut ocr_lines = Vec::new();
        while o_idx < ocr.len() && ocr[o_idx].start_secs <= window_end {
            ocr_lines.push(ocr[o_idx].text.as_str());
            o_idx += 1;
        }

        windows.push(VideoWindow {
            transcript_text: transcript_lines.join(" "),
            ocr_text: if ocr_lines.is_empty() {
                None
            } else {
                Some(ocr_lines.join(" "))
            },
        });
    }

    windows
}
