//! Sharing and versioning.
//!
//! The manager owns every mutation of a document's sharing list and the
//! version lineage for (scope, file_name). Per counterpart the state
//! machine is absent -> not_approved -> approved, with removal from
//! either sharing state. Metadata is authoritative; after each mutation
//! the updated sharing list is propagated to chunk records best-effort.

use std::sync::Arc;

use crate::error::IngestError;
use crate::models::{ApprovalStatus, DocumentRecord, Scope, SharingEntry};
use crate::store::{ChunkStore, MetadataStore};

pub struct DocumentManager {
    metadata: Arc<dyn MetadataStore>,
    chunks: Arc<dyn ChunkStore>,
}

impl DocumentManager {
    pub fn new(metadata: Arc<dyn MetadataStore>, chunks: Arc<dyn ChunkStore>) -> Self {
        Self { metadata, chunks }
    }

    /// Create a new document record at the next version for its
    /// (scope, file_name) lineage, starting at 1.
    pub async fn create_document(
        &self,
        id: &str,
        file_name: &str,
        scope: Scope,
    ) -> Result<DocumentRecord, IngestError> {
        let existing = self.metadata.versions(&scope, file_name).await?;
        let next_version = existing.first().map(|d| d.version + 1).unwrap_or(1);

        let mut doc = DocumentRecord::new(id, file_name, scope);
        doc.version = next_version;
        self.metadata.upsert(&doc).await?;
        Ok(doc)
    }

    async fn load(&self, document_id: &str) -> Result<DocumentRecord, IngestError> {
        self.metadata
            .get(document_id)
            .await?
            .ok_or_else(|| IngestError::Consistency(format!("document {document_id} not found")))
    }

    /// Owner-initiated share. Inserts a pending entry if absent; sharing
    /// with an already-listed counterpart is a no-op.
    pub async fn share(
        &self,
        document_id: &str,
        actor: &str,
        counterpart: &str,
    ) -> Result<(), IngestError> {
        let mut doc = self.load(document_id).await?;
        self.require_owner(&doc, actor)?;
        self.require_shareable(&doc)?;
        if counterpart == doc.scope.owner_id() {
            return Err(IngestError::Validation(
                "cannot share a document with its owner".to_string(),
            ));
        }

        if doc.sharing_entry(counterpart).is_none() {
            doc.sharing.push(SharingEntry::pending(counterpart));
            self.persist_and_propagate(&mut doc).await?;
        }
        Ok(())
    }

    /// Counterpart-initiated approval. Idempotent if already approved.
    pub async fn approve(&self, document_id: &str, counterpart: &str) -> Result<(), IngestError> {
        let mut doc = self.load(document_id).await?;
        self.require_shareable(&doc)?;

        let entry = doc
            .sharing
            .iter_mut()
            .find(|e| e.id == counterpart)
            .ok_or_else(|| {
                IngestError::Consistency(format!(
                    "document {document_id} is not shared with {counterpart}"
                ))
            })?;
        if entry.status == ApprovalStatus::Approved {
            return Ok(());
        }
        entry.status = ApprovalStatus::Approved;
        self.persist_and_propagate(&mut doc).await
    }

    /// Remove a counterpart from the sharing list. The owner may remove
    /// anyone; a shared user may remove themselves; groups cannot remove
    /// themselves; the owner can never be removed.
    pub async fn unshare(
        &self,
        document_id: &str,
        actor: &str,
        counterpart: &str,
    ) -> Result<(), IngestError> {
        let mut doc = self.load(document_id).await?;
        self.require_shareable(&doc)?;

        if counterpart == doc.scope.owner_id() {
            return Err(IngestError::Validation(
                "the owner cannot be removed from a document".to_string(),
            ));
        }
        let is_owner = actor == doc.scope.owner_id();
        let is_self_removal =
            actor == counterpart && matches!(doc.scope, Scope::Personal(_));
        if !is_owner && !is_self_removal {
            return Err(IngestError::Consistency(format!(
                "{actor} is not allowed to unshare document {document_id}"
            )));
        }

        let before = doc.sharing.len();
        doc.sharing.retain(|e| e.id != counterpart);
        if doc.sharing.len() == before {
            return Err(IngestError::Consistency(format!(
                "document {document_id} is not shared with {counterpart}"
            )));
        }
        self.persist_and_propagate(&mut doc).await
    }

    /// Delete a document and its chunk projection. Owner only. The
    /// metadata record is authoritative, so it goes first; the chunk
    /// cleanup is best-effort like propagation.
    pub async fn delete_document(
        &self,
        document_id: &str,
        actor: &str,
    ) -> Result<(), IngestError> {
        let doc = self.load(document_id).await?;
        self.require_owner(&doc, actor)?;

        self.metadata.delete(document_id).await?;
        if let Err(err) = self.chunks.delete_document_chunks(document_id, None).await {
            tracing::warn!(document_id, error = %err, "chunk cleanup after delete failed");
        }
        Ok(())
    }

    /// Whether `reader` may read the document. Public workspaces have no
    /// gate; otherwise the owner or an approved counterpart.
    pub fn can_read(doc: &DocumentRecord, reader: &str) -> bool {
        if !doc.scope.supports_sharing() {
            return true;
        }
        if reader == doc.scope.owner_id() {
            return true;
        }
        doc.sharing_entry(reader)
            .map(|e| e.status == ApprovalStatus::Approved)
            .unwrap_or(false)
    }

    fn require_owner(&self, doc: &DocumentRecord, actor: &str) -> Result<(), IngestError> {
        if actor != doc.scope.owner_id() {
            return Err(IngestError::Consistency(format!(
                "{actor} does not own document {}",
                doc.id
            )));
        }
        Ok(())
    }

    fn require_shareable(&self, doc: &DocumentRecord) -> Result<(), IngestError> {
        if !doc.scope.supports_sharing() {
            return Err(IngestError::Validation(
                "public workspace documents have no sharing list".to_string(),
            ));
        }
        Ok(())
    }

    /// Persist the metadata change, then push the new sharing list to all
    /// chunk records. Propagation failures are logged, never rolled back.
    /// A concurrent ingestion task for the same document may interleave
    /// here; writes are last-write-wins (check-and-set would change the
    /// store contract).
    async fn persist_and_propagate(&self, doc: &mut DocumentRecord) -> Result<(), IngestError> {
        doc.touch();
        self.metadata.upsert(doc).await?;
        if let Err(err) = self.chunks.propagate_metadata(doc).await {
            tracing::warn!(document_id = %doc.id, error = %err, "chunk sharing propagation failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkRecord;
    use crate::store::memory::{InMemoryChunkStore, InMemoryMetadataStore};

    fn manager() -> (DocumentManager, Arc<InMemoryMetadataStore>, Arc<InMemoryChunkStore>) {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let chunks = Arc::new(InMemoryChunkStore::new());
        let manager = DocumentManager::new(metadata.clone(), chunks.clone());
        (manager, metadata, chunks)
    }

    #[tokio::test]
    async fn versions_increase_strictly_from_one() {
        let (manager, _, _) = manager();
        let scope = Scope::Personal("u1".into());
        for (id, expected) in [("d1", 1), ("d2", 2), ("d3", 3)] {
            let doc = manager
                .create_document(id, "notes.txt", scope.clone())
                .await
                .unwrap();
            assert_eq!(doc.version, expected);
        }
        // A different file name starts its own lineage.
        let other = manager
            .create_document("d4", "other.txt", scope)
            .await
            .unwrap();
        assert_eq!(other.version, 1);
    }

    #[tokio::test]
    async fn share_then_approve_round_trip() {
        let (manager, metadata, _) = manager();
        manager
            .create_document("d1", "a.txt", Scope::Personal("u1".into()))
            .await
            .unwrap();

        manager.share("d1", "u1", "u2").await.unwrap();
        let doc = metadata.get("d1").await.unwrap().unwrap();
        assert_eq!(doc.sharing[0].status, ApprovalStatus::NotApproved);
        assert!(!DocumentManager::can_read(&doc, "u2"));

        manager.approve("d1", "u2").await.unwrap();
        let doc = metadata.get("d1").await.unwrap().unwrap();
        assert_eq!(doc.sharing[0].status, ApprovalStatus::Approved);
        assert!(DocumentManager::can_read(&doc, "u2"));

        // Approval is idempotent.
        manager.approve("d1", "u2").await.unwrap();
    }

    #[tokio::test]
    async fn only_the_owner_may_share() {
        let (manager, _, _) = manager();
        manager
            .create_document("d1", "a.txt", Scope::Personal("u1".into()))
            .await
            .unwrap();
        let err = manager.share("d1", "u2", "u3").await.unwrap_err();
        assert!(matches!(err, IngestError::Consistency(_)));
    }

    #[tokio::test]
    async fn shared_user_may_remove_themselves_but_not_the_owner() {
        let (manager, metadata, _) = manager();
        manager
            .create_document("d1", "a.txt", Scope::Personal("u1".into()))
            .await
            .unwrap();
        manager.share("d1", "u1", "u2").await.unwrap();

        // Self-removal by a non-owner succeeds.
        manager.unshare("d1", "u2", "u2").await.unwrap();
        let doc = metadata.get("d1").await.unwrap().unwrap();
        assert!(doc.sharing.is_empty());

        // The owner cannot be removed, even by themselves.
        let err = manager.unshare("d1", "u1", "u1").await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[tokio::test]
    async fn group_cannot_remove_itself() {
        let (manager, _, _) = manager();
        manager
            .create_document("d1", "a.txt", Scope::Group("g1".into()))
            .await
            .unwrap();
        manager.share("d1", "g1", "g2").await.unwrap();
        let err = manager.unshare("d1", "g2", "g2").await.unwrap_err();
        assert!(matches!(err, IngestError::Consistency(_)));
    }

    #[tokio::test]
    async fn sharing_mutations_propagate_to_chunks() {
        let (manager, _metadata, chunks) = manager();
        let doc = manager
            .create_document("d1", "a.txt", Scope::Personal("u1".into()))
            .await
            .unwrap();
        for seq in 1..=2 {
            chunks
                .upsert_chunk(&ChunkRecord::from_document(&doc, seq, "text"))
                .await
                .unwrap();
        }

        manager.share("d1", "u1", "u2").await.unwrap();
        manager.approve("d1", "u2").await.unwrap();

        let stored = chunks.chunks_for_document("d1").await.unwrap();
        assert!(stored
            .iter()
            .all(|c| c.sharing.len() == 1 && c.sharing[0].status == ApprovalStatus::Approved));
    }

    #[tokio::test]
    async fn delete_removes_record_and_chunk_projection() {
        let (manager, metadata, chunks) = manager();
        let doc = manager
            .create_document("d1", "a.txt", Scope::Personal("u1".into()))
            .await
            .unwrap();
        for seq in 1..=3 {
            chunks
                .upsert_chunk(&ChunkRecord::from_document(&doc, seq, "text"))
                .await
                .unwrap();
        }

        manager.delete_document("d1", "u1").await.unwrap();
        assert!(metadata.get("d1").await.unwrap().is_none());
        assert!(chunks.chunks_for_document("d1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_the_owner_may_delete() {
        let (manager, metadata, _) = manager();
        manager
            .create_document("d1", "a.txt", Scope::Personal("u1".into()))
            .await
            .unwrap();

        let err = manager.delete_document("d1", "u2").await.unwrap_err();
        assert!(matches!(err, IngestError::Consistency(_)));
        assert!(metadata.get("d1").await.unwrap().is_some());
    }

    /// Chunk store whose propagation always fails, as when the search
    /// index is unreachable.
    struct OfflineChunkIndex;

    #[async_trait::async_trait]
    impl crate::store::ChunkStore for OfflineChunkIndex {
        async fn upsert_chunk(&self, _chunk: &ChunkRecord) -> anyhow::Result<()> {
            Ok(())
        }

        async fn chunks_for_document(
            &self,
            _document_id: &str,
        ) -> anyhow::Result<Vec<ChunkRecord>> {
            Ok(Vec::new())
        }

        async fn delete_document_chunks(
            &self,
            _document_id: &str,
            _version: Option<i64>,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn propagate_metadata(&self, _doc: &DocumentRecord) -> anyhow::Result<()> {
            anyhow::bail!("chunk index offline")
        }
    }

    #[tokio::test]
    async fn propagation_failure_does_not_roll_back_metadata() {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let manager = DocumentManager::new(metadata.clone(), Arc::new(OfflineChunkIndex));
        manager
            .create_document("d1", "a.txt", Scope::Personal("u1".into()))
            .await
            .unwrap();

        manager.share("d1", "u1", "u2").await.unwrap();
        manager.approve("d1", "u2").await.unwrap();

        let doc = metadata.get("d1").await.unwrap().unwrap();
        assert_eq!(doc.sharing.len(), 1);
        assert_eq!(doc.sharing[0].status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn public_scope_has_no_sharing_gate() {
        let (manager, metadata, _) = manager();
        manager
            .create_document("d1", "a.txt", Scope::Public("w1".into()))
            .await
            .unwrap();
        let err = manager.share("d1", "w1", "u2").await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));

        let doc = metadata.get("d1").await.unwrap().unwrap();
        assert!(DocumentManager::can_read(&doc, "anyone"));
    }
}
