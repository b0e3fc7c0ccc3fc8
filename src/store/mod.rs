//! Storage abstraction for documents and chunks.
//!
//! The [`MetadataStore`] is authoritative for document identity, versions,
//! and sharing state. The [`ChunkStore`] is a derived projection of the
//! search index; it is only ever updated explicitly (per-chunk upserts
//! during ingestion, bulk propagation after metadata changes).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChunkRecord, DocumentRecord, Scope};

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert or replace a document record by id.
    async fn upsert(&self, doc: &DocumentRecord) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>>;

    /// All versions for a (scope, file_name) pair, newest first.
    async fn versions(&self, scope: &Scope, file_name: &str) -> Result<Vec<DocumentRecord>>;

    /// All documents in a scope, any version.
    async fn list(&self, scope: &Scope) -> Result<Vec<DocumentRecord>>;

    async fn delete(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert or overwrite a chunk by its deterministic id.
    async fn upsert_chunk(&self, chunk: &ChunkRecord) -> Result<()>;

    /// All chunks for a document, ordered by sequence.
    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<ChunkRecord>>;

    /// Delete a document's chunks, optionally limited to one version.
    async fn delete_document_chunks(&self, document_id: &str, version: Option<i64>) -> Result<()>;

    /// Copy the document's bibliographic fields and sharing list onto all
    /// of its chunks.
    async fn propagate_metadata(&self, doc: &DocumentRecord) -> Result<()>;
}
