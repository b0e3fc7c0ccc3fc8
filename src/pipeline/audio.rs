//! Audio pipeline: segment, transcribe, re-chunk.
//!
//! The transcription service caps segment duration, so the input is
//! re-encoded into mono 16 kHz WAV sub-segments with ffmpeg before
//! transcription. Any segment failure is a hard pipeline failure; no
//! partial transcript is persisted.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use super::Orchestrator;
use crate::error::IngestError;
use crate::models::DocumentRecord;
use crate::splitters::text;

impl Orchestrator {
    pub(crate) async fn run_audio(
        &self,
        doc: &mut DocumentRecord,
        temp_file: &Path,
    ) -> Result<(), IngestError> {
        let work_dir = std::env::temp_dir().join(format!("docpipe-audio-{}", doc.id));
        tokio::fs::create_dir_all(&work_dir).await?;

        let result = self.transcribe_segments(doc, temp_file, &work_dir).await;

        if let Err(err) = tokio::fs::remove_dir_all(&work_dir).await {
            tracing::warn!(path = %work_dir.display(), error = %err, "failed to remove audio work dir");
        }

        let transcript = result?;
        let segments = text::split_words(&transcript, self.config.chunking.words_per_chunk);
        self.save_segments(doc, &segments, "chunk").await
    }

    async fn transcribe_segments(
        &self,
        doc: &mut DocumentRecord,
        temp_file: &Path,
        work_dir: &Path,
    ) -> Result<String, IngestError> {
        self.update_status(doc, "Sending to transcription service", 0)
            .await?;

        let wav_parts = segment_to_wav(
            temp_file,
            work_dir,
            self.config.transcription.max_segment_secs,
        )
        .await?;

        let mut phrases: Vec<String> = Vec::new();
        for part in &wav_parts {
            let wav = tokio::fs::read(part).await?;
            let mut segment_phrases = self
                .services
                .transcription
                .transcribe(&wav, &self.config.transcription.locale)
                .await?;
            phrases.append(&mut segment_phrases);
        }

        Ok(phrases.join(" "))
    }
}

/// Re-encode into numbered mono 16 kHz WAV segments of bounded duration.
async fn segment_to_wav(
    input: &Path,
    work_dir: &Path,
    max_segment_secs: u64,
) -> Result<Vec<PathBuf>, IngestError> {
    let pattern = work_dir.join("segment-%03d.wav");
    let output = Command::new("ffmpeg")
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(input)
        .arg("-ac")
        .arg("1")
        .arg("-ar")
        .arg("16000")
        .arg("-f")
        .arg("segment")
        .arg("-segment_time")
        .arg(max_segment_secs.to_string())
        .arg(&pattern)
        .output()
        .await
        .map_err(|e| IngestError::ExternalService(format!("failed to run ffmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(IngestError::ExternalService(format!(
            "ffmpeg segmentation failed: {}",
            stderr.trim()
        )));
    }

    let mut parts = Vec::new();
    let mut entries = tokio::fs::read_dir(work_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("wav") {
            parts.push(path);
        }
    }
    parts.sort();

    if parts.is_empty() {
        return Err(IngestError::ExternalService(
            "ffmpeg produced no audio segments".to_string(),
        ));
    }
    Ok(parts)
}
