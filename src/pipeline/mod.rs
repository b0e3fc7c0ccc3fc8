//! Ingestion orchestration.
//!
//! The [`Orchestrator`] validates an upload, creates the next version of
//! its metadata record, dispatches to the format pipeline, and drives
//! chunk persistence and progress updates. All stages within one document
//! are strictly sequential; chunk N+1 is never started before chunk N's
//! store write is acknowledged.

pub mod audio;
pub mod longdoc;
pub mod video;

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{truncate_status, IngestError};
use crate::models::{
    family_for_extension, ChunkRecord, DocumentRecord, FormatFamily, Scope,
};
use crate::progress;
use crate::services::ServiceContext;
use crate::sharing::DocumentManager;
use crate::splitters::{json, markup, tabular, text};
use crate::store::{ChunkStore, MetadataStore};

/// Longest error text written to the status column.
const MAX_STATUS_CHARS: usize = 256;

pub struct Orchestrator {
    pub(crate) config: Config,
    pub(crate) metadata: Arc<dyn MetadataStore>,
    pub(crate) chunks: Arc<dyn ChunkStore>,
    pub(crate) services: ServiceContext,
    manager: DocumentManager,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        metadata: Arc<dyn MetadataStore>,
        chunks: Arc<dyn ChunkStore>,
        services: ServiceContext,
    ) -> Self {
        let manager = DocumentManager::new(metadata.clone(), chunks.clone());
        Self {
            config,
            metadata,
            chunks,
            services,
            manager,
        }
    }

    /// Ingest one uploaded file. Validation failures are returned before
    /// any metadata record is created; the temporary file is removed in
    /// every case.
    pub async fn ingest(
        &self,
        document_id: &str,
        scope: Scope,
        temp_file: &Path,
        original_name: &str,
    ) -> Result<(), IngestError> {
        let result = self
            .validate_and_run(document_id, scope, temp_file, original_name)
            .await;

        if let Err(err) = tokio::fs::remove_file(temp_file).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %temp_file.display(), error = %err, "failed to remove temp file");
            }
        }

        result
    }

    async fn validate_and_run(
        &self,
        document_id: &str,
        scope: Scope,
        temp_file: &Path,
        original_name: &str,
    ) -> Result<(), IngestError> {
        let family = self.validate(temp_file, original_name)?;

        let mut doc = self
            .manager
            .create_document(document_id, original_name, scope)
            .await?;

        tracing::info!(
            document_id,
            file_name = original_name,
            version = doc.version,
            "ingestion started"
        );

        match self.run_pipeline(&mut doc, family, temp_file).await {
            Ok(()) => {
                tracing::info!(document_id, num_chunks = doc.num_chunks, "ingestion complete");
                Ok(())
            }
            Err(err) => {
                doc.status = truncate_status(&format!("Error: {err}"), MAX_STATUS_CHARS);
                doc.percentage_complete = 0;
                doc.touch();
                if let Err(store_err) = self.metadata.upsert(&doc).await {
                    tracing::warn!(document_id, error = %store_err, "failed to record error status");
                }
                tracing::error!(document_id, error = %err, "ingestion failed");
                Err(err)
            }
        }
    }

    fn validate(&self, temp_file: &Path, original_name: &str) -> Result<FormatFamily, IngestError> {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| {
                IngestError::Validation(format!("{original_name}: missing file extension"))
            })?;

        let family = family_for_extension(&extension).ok_or_else(|| {
            IngestError::Validation(format!("{original_name}: unsupported file type .{extension}"))
        })?;

        match family {
            FormatFamily::Video if !self.config.features.video_support => {
                return Err(IngestError::Validation(
                    "video ingestion is disabled".to_string(),
                ));
            }
            FormatFamily::Audio if !self.config.features.audio_support => {
                return Err(IngestError::Validation(
                    "audio ingestion is disabled".to_string(),
                ));
            }
            _ => {}
        }

        // Audio is governed by its own, larger ceiling.
        let size = std::fs::metadata(temp_file)?.len();
        if family == FormatFamily::Audio {
            let audio_ceiling = self.config.limits.audio_max_mb * 1024 * 1024;
            if size > audio_ceiling {
                return Err(IngestError::Validation(format!(
                    "{original_name}: audio file exceeds the {} MB limit",
                    self.config.limits.audio_max_mb
                )));
            }
        } else {
            let ceiling = self.config.limits.max_upload_mb * 1024 * 1024;
            if size > ceiling {
                return Err(IngestError::Validation(format!(
                    "{original_name}: file size {size} bytes exceeds the {} MB limit",
                    self.config.limits.max_upload_mb
                )));
            }
        }

        Ok(family)
    }

    async fn run_pipeline(
        &self,
        doc: &mut DocumentRecord,
        family: FormatFamily,
        temp_file: &Path,
    ) -> Result<(), IngestError> {
        match family {
            FormatFamily::Text => {
                let content = tokio::fs::read_to_string(temp_file).await?;
                let segments = text::split_words(&content, self.config.chunking.words_per_chunk);
                self.save_segments(doc, &segments, "chunk").await?;
            }
            FormatFamily::Markup => {
                let content = tokio::fs::read_to_string(temp_file).await?;
                let chunking = &self.config.chunking;
                let is_html = doc.file_name.to_lowercase().ends_with(".html")
                    || doc.file_name.to_lowercase().ends_with(".htm");
                let segments = if is_html {
                    markup::split_html(&content, chunking.markup_min_words, chunking.markup_target_words)
                } else {
                    markup::split_markdown(&content, chunking.markup_min_words, chunking.markup_target_words)
                };
                self.save_segments(doc, &segments, "chunk").await?;
            }
            FormatFamily::Json => {
                let content = tokio::fs::read_to_string(temp_file).await?;
                let segments = json::split_json(&content, self.config.chunking.json_max_chars)?;
                self.save_segments(doc, &segments, "chunk").await?;
            }
            FormatFamily::Tabular => {
                let bytes = tokio::fs::read(temp_file).await?;
                let max_chars = self.config.chunking.tabular_max_chars;
                let tables = if doc.file_name.to_lowercase().ends_with(".xlsx") {
                    tabular::split_xlsx(&bytes, &doc.file_name, max_chars)?
                } else {
                    vec![tabular::split_csv(&bytes, &doc.file_name, max_chars)?]
                };
                self.save_tables(doc, &tables).await?;
            }
            FormatFamily::LongDocument(kind) => {
                let bytes = tokio::fs::read(temp_file).await?;
                self.run_longdoc(doc, kind, bytes).await?;
            }
            FormatFamily::Audio => {
                self.run_audio(doc, temp_file).await?;
            }
            FormatFamily::Video => {
                let bytes = tokio::fs::read(temp_file).await?;
                self.run_video(doc, &bytes).await?;
            }
        }

        self.finalize(doc).await
    }

    /// Persist a flat list of segments under the document's own file name.
    pub(crate) async fn save_segments(
        &self,
        doc: &mut DocumentRecord,
        segments: &[String],
        noun: &str,
    ) -> Result<(), IngestError> {
        doc.number_of_pages = segments.len() as i64;
        self.metadata.upsert(doc).await?;
        for (i, segment) in segments.iter().enumerate() {
            self.save_chunk(doc, (i + 1) as i64, segment, None, None, noun)
                .await?;
        }
        Ok(())
    }

    async fn save_tables(
        &self,
        doc: &mut DocumentRecord,
        tables: &[tabular::TableSegments],
    ) -> Result<(), IngestError> {
        doc.number_of_pages = tables.iter().map(|t| t.segments.len() as i64).sum();
        self.metadata.upsert(doc).await?;

        let mut sequence = 0;
        for table in tables {
            for segment in &table.segments {
                sequence += 1;
                self.save_chunk(doc, sequence, segment, None, Some(&table.file_name), "chunk")
                    .await?;
            }
        }
        Ok(())
    }

    /// Embed and persist one chunk, then advance status and percentage.
    /// Empty text still produces a stored chunk, just without an
    /// embedding call.
    pub(crate) async fn save_chunk(
        &self,
        doc: &mut DocumentRecord,
        sequence: i64,
        chunk_text: &str,
        video_ocr_text: Option<String>,
        file_name: Option<&str>,
        noun: &str,
    ) -> Result<(), IngestError> {
        let mut chunk = ChunkRecord::from_document(doc, sequence, chunk_text);
        chunk.video_ocr_chunk_text = video_ocr_text;
        if let Some(name) = file_name {
            chunk.file_name = name.to_string();
        }
        if !chunk_text.trim().is_empty() {
            chunk.embedding = self.services.embeddings.embed(chunk_text).await?;
        }
        self.chunks.upsert_chunk(&chunk).await?;

        doc.num_chunks = sequence;
        let status = format!("Saving {noun} {sequence} of {}", doc.number_of_pages);
        self.update_status(doc, &status, sequence).await
    }

    /// Write a status label and the percentage it implies.
    pub(crate) async fn update_status(
        &self,
        doc: &mut DocumentRecord,
        status: &str,
        current_count: i64,
    ) -> Result<(), IngestError> {
        doc.percentage_complete = progress::percentage(
            status,
            current_count,
            doc.number_of_pages,
            doc.percentage_complete,
        );
        doc.status = status.to_string();
        doc.touch();
        self.metadata.upsert(doc).await?;
        Ok(())
    }

    /// Final metadata pass and terminal status.
    async fn finalize(&self, doc: &mut DocumentRecord) -> Result<(), IngestError> {
        if self.config.features.metadata_extraction {
            if let Some(inference) = &self.services.metadata_inference {
                self.update_status(doc, "Extracting final metadata", doc.num_chunks)
                    .await?;

                let sample = self.content_sample(doc).await?;
                match inference.infer(&sample).await? {
                    Some(inferred) => {
                        if inferred.title.is_some() {
                            doc.title = inferred.title;
                        }
                        if !inferred.authors.is_empty() {
                            doc.authors = inferred.authors;
                        }
                        if inferred.organization.is_some() {
                            doc.organization = inferred.organization;
                        }
                        if inferred.publication_date.is_some() {
                            doc.publication_date = inferred.publication_date;
                        }
                        if !inferred.keywords.is_empty() {
                            doc.keywords = inferred.keywords;
                        }
                        if inferred.abstract_text.is_some() {
                            doc.abstract_text = inferred.abstract_text;
                        }
                        if inferred.classification.is_some() {
                            doc.document_classification = inferred.classification;
                        }
                        doc.touch();
                        self.metadata.upsert(doc).await?;
                        if let Err(err) = self.chunks.propagate_metadata(doc).await {
                            tracing::warn!(document_id = %doc.id, error = %err, "chunk metadata propagation failed");
                        }
                    }
                    None => {
                        tracing::warn!(document_id = %doc.id, "metadata inference vetoed the document; no fields applied");
                    }
                }
            }
        }

        self.update_status(doc, "Processing complete", doc.num_chunks)
            .await
    }

    /// Leading chunk text used as the inference sample.
    async fn content_sample(&self, doc: &DocumentRecord) -> Result<String, IngestError> {
        let chunks = self.chunks.chunks_for_document(&doc.id).await?;
        Ok(chunks
            .iter()
            .take(3)
            .map(|c| c.chunk_text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
