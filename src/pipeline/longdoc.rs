//! Long-document pipeline: PDF, Word, presentations, and images.
//!
//! Local metadata probes run first and never abort ingestion. Oversized
//! PDFs are pre-split into page-bounded sub-files before submission to
//! the extraction service; extraction output is reassembled into chunks
//! by kind (pages for PDF and slides, word windows for Word, a single
//! unit for images).

use std::time::{Duration, Instant};

use super::Orchestrator;
use crate::error::IngestError;
use crate::extract;
use crate::models::{DocumentRecord, LongDocKind};
use crate::services::{ExtractedPage, JobStatus, RetryPolicy};
use crate::splitters::text;

impl Orchestrator {
    pub(crate) async fn run_longdoc(
        &self,
        doc: &mut DocumentRecord,
        kind: LongDocKind,
        bytes: Vec<u8>,
    ) -> Result<(), IngestError> {
        self.apply_local_metadata(doc, kind, &bytes).await?;

        let parts = self.pre_split(doc, kind, bytes)?;
        doc.num_file_chunks = parts.len() as i64;

        let mut pages: Vec<ExtractedPage> = Vec::new();
        for (index, part) in parts.iter().enumerate() {
            doc.current_file_chunk = (index + 1) as i64;
            self.retain_for_citations(doc, index, part).await;

            self.update_status(doc, "Sending to extraction service", 0)
                .await?;
            let job_id = self.services.extraction.submit(&doc.file_name, part).await?;
            let part_pages = self.poll_extraction(doc, &job_id).await?;
            pages.extend(part_pages);
        }

        match kind {
            LongDocKind::Pdf | LongDocKind::Presentation => {
                let segments: Vec<String> = pages
                    .iter()
                    .filter(|p| !p.content.trim().is_empty())
                    .map(|p| p.content.clone())
                    .collect();
                self.save_segments(doc, &segments, "page").await?;
            }
            LongDocKind::Word => {
                // Re-flow into word windows, ignoring service page breaks.
                let full_text = pages
                    .iter()
                    .map(|p| p.content.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                let segments =
                    text::split_words(&full_text, self.config.chunking.words_per_chunk);
                self.save_segments(doc, &segments, "chunk").await?;
            }
            LongDocKind::Image => {
                // One conceptual unit; empty extracted text is still a chunk.
                let full_text = pages
                    .iter()
                    .map(|p| p.content.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
                    .trim()
                    .to_string();
                doc.number_of_pages = 1;
                self.metadata.upsert(doc).await?;
                self.save_chunk(doc, 1, &full_text, None, None, "chunk")
                    .await?;
            }
        }

        Ok(())
    }

    /// Best-effort local probe; failures leave the record untouched.
    async fn apply_local_metadata(
        &self,
        doc: &mut DocumentRecord,
        kind: LongDocKind,
        bytes: &[u8],
    ) -> Result<(), IngestError> {
        let meta = match kind {
            LongDocKind::Pdf => extract::pdf_metadata(bytes),
            LongDocKind::Word | LongDocKind::Presentation => extract::ooxml_metadata(bytes),
            LongDocKind::Image => None,
        };
        let Some(meta) = meta else {
            return Ok(());
        };

        if doc.title.is_none() {
            doc.title = meta.title;
        }
        if doc.authors.is_empty() {
            if let Some(author) = meta.author {
                doc.authors = vec![author];
            }
        }
        if doc.abstract_text.is_none() {
            doc.abstract_text = meta.subject;
        }
        if doc.keywords.is_empty() {
            if let Some(keywords) = meta.keywords {
                doc.keywords = keywords
                    .split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect();
            }
        }
        if let Some(pages) = meta.page_count {
            doc.number_of_pages = pages as i64;
        }
        self.metadata.upsert(doc).await?;
        Ok(())
    }

    /// Pre-split a paginated source that exceeds the extraction service's
    /// ceilings; the original is discarded in favor of the sub-files.
    fn pre_split(
        &self,
        doc: &DocumentRecord,
        kind: LongDocKind,
        bytes: Vec<u8>,
    ) -> Result<Vec<Vec<u8>>, IngestError> {
        if kind != LongDocKind::Pdf {
            return Ok(vec![bytes]);
        }

        let extraction = &self.config.extraction;
        let over_pages = doc.number_of_pages > extraction.page_limit as i64;
        let over_size = bytes.len() as u64 > extraction.size_limit_mb * 1024 * 1024;
        if !over_pages && !over_size {
            return Ok(vec![bytes]);
        }

        let pages_per_part = (extraction.page_limit / 4).max(1);
        tracing::info!(
            document_id = %doc.id,
            pages = doc.number_of_pages,
            pages_per_part,
            "pre-splitting oversized document"
        );
        extract::split_pdf(&bytes, pages_per_part)
    }

    async fn retain_for_citations(&self, doc: &DocumentRecord, part_index: usize, bytes: &[u8]) {
        let Some(storage) = &self.services.citations else {
            return;
        };
        let path = if doc.num_file_chunks > 1 {
            format!(
                "{}/{}/part-{}/{}",
                doc.scope.owner_id(),
                doc.id,
                part_index + 1,
                doc.file_name
            )
        } else {
            format!("{}/{}/{}", doc.scope.owner_id(), doc.id, doc.file_name)
        };
        if let Err(err) = storage.put(&path, bytes).await {
            tracing::warn!(document_id = %doc.id, error = %err, "citation retention failed");
        }
    }

    /// Poll until the job is terminal. Sleeps the configured interval (or
    /// the server's retry hint) between polls; transient responses keep
    /// polling. A hard wall-clock ceiling bounds the whole wait.
    async fn poll_extraction(
        &self,
        doc: &DocumentRecord,
        job_id: &str,
    ) -> Result<Vec<ExtractedPage>, IngestError> {
        let policy =
            RetryPolicy::every(Duration::from_secs(self.config.extraction.poll_interval_secs));
        let deadline = Instant::now() + Duration::from_secs(self.config.extraction.poll_ceiling_secs);

        loop {
            let wait = match self.services.extraction.poll(job_id).await {
                Ok(job) => match job.status {
                    JobStatus::Succeeded => return Ok(job.pages),
                    JobStatus::Failed => {
                        return Err(IngestError::ExternalService(format!(
                            "extraction failed for {}",
                            doc.file_name
                        )))
                    }
                    JobStatus::Canceled => {
                        return Err(IngestError::ExternalService(format!(
                            "extraction canceled for {}",
                            doc.file_name
                        )))
                    }
                    JobStatus::Running => policy.poll_delay(job.retry_after),
                },
                Err(err) if err.is_transient() => {
                    tracing::debug!(job_id, error = %err, "transient extraction poll failure");
                    policy.poll_delay(None)
                }
                Err(err) => return Err(err),
            };

            if Instant::now() + wait >= deadline {
                return Err(IngestError::ExternalService(format!(
                    "extraction timed out for {}",
                    doc.file_name
                )));
            }
            tokio::time::sleep(wait).await;
        }
    }
}
