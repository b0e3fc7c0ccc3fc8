//! In-memory store implementations for tests.
//!
//! `HashMap` and `Vec` behind `std::sync::RwLock`; every operation is an
//! immediately-ready future.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChunkRecord, DocumentRecord, Scope};

use super::{ChunkStore, MetadataStore};

#[derive(Default)]
pub struct InMemoryMetadataStore {
    docs: RwLock<HashMap<String, DocumentRecord>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn upsert(&self, doc: &DocumentRecord) -> Result<()> {
        self.docs
            .write()
            .unwrap()
            .insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.docs.read().unwrap().get(id).cloned())
    }

    async fn versions(&self, scope: &Scope, file_name: &str) -> Result<Vec<DocumentRecord>> {
        let mut matches: Vec<DocumentRecord> = self
            .docs
            .read()
            .unwrap()
            .values()
            .filter(|d| d.scope == *scope && d.file_name == file_name)
            .cloned()
            .collect();
        matches.sort_by_key(|d| std::cmp::Reverse(d.version));
        Ok(matches)
    }

    async fn list(&self, scope: &Scope) -> Result<Vec<DocumentRecord>> {
        let mut matches: Vec<DocumentRecord> = self
            .docs
            .read()
            .unwrap()
            .values()
            .filter(|d| d.scope == *scope)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.file_name.cmp(&b.file_name).then(b.version.cmp(&a.version)));
        Ok(matches)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.docs.write().unwrap().remove(id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryChunkStore {
    chunks: RwLock<Vec<ChunkRecord>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn upsert_chunk(&self, chunk: &ChunkRecord) -> Result<()> {
        let mut chunks = self.chunks.write().unwrap();
        chunks.retain(|c| c.id != chunk.id);
        chunks.push(chunk.clone());
        Ok(())
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<ChunkRecord>> {
        let mut matches: Vec<ChunkRecord> = self
            .chunks
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        matches.sort_by_key(|c| c.chunk_sequence);
        Ok(matches)
    }

    async fn delete_document_chunks(&self, document_id: &str, version: Option<i64>) -> Result<()> {
        self.chunks.write().unwrap().retain(|c| {
            c.document_id != document_id || version.is_some_and(|v| c.version != v)
        });
        Ok(())
    }

    async fn propagate_metadata(&self, doc: &DocumentRecord) -> Result<()> {
        let mut chunks = self.chunks.write().unwrap();
        for chunk in chunks.iter_mut().filter(|c| c.document_id == doc.id) {
            chunk.title = doc.title.clone();
            chunk.authors = doc.authors.clone();
            chunk.keywords = doc.keywords.clone();
            chunk.sharing = if doc.scope.supports_sharing() {
                doc.sharing.clone()
            } else {
                Vec::new()
            };
        }
        Ok(())
    }
}
