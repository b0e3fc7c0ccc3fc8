//! SQLite-backed store implementations.
//!
//! One database holds both tables. The `Scope` union flattens to three
//! mutually-exclusive columns; list fields (authors, keywords, sharing)
//! serialize to JSON text; embeddings are little-endian f32 BLOBs.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::models::{ChunkRecord, DocumentRecord, Scope, SharingEntry};

use super::{ChunkStore, MetadataStore};

pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id                      TEXT PRIMARY KEY,
            file_name               TEXT NOT NULL,
            user_id                 TEXT,
            group_id                TEXT,
            public_workspace_id     TEXT,
            version                 INTEGER NOT NULL,
            status                  TEXT NOT NULL,
            percentage_complete     INTEGER NOT NULL,
            num_chunks              INTEGER NOT NULL,
            number_of_pages         INTEGER NOT NULL,
            current_file_chunk      INTEGER NOT NULL,
            num_file_chunks         INTEGER NOT NULL,
            document_classification TEXT,
            title                   TEXT,
            authors                 TEXT NOT NULL DEFAULT '[]',
            organization            TEXT,
            publication_date        TEXT,
            keywords                TEXT NOT NULL DEFAULT '[]',
            abstract_text           TEXT,
            upload_date             INTEGER NOT NULL,
            last_updated            INTEGER NOT NULL,
            sharing                 TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_lineage
         ON documents (file_name, user_id, group_id, public_workspace_id, version)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id                   TEXT PRIMARY KEY,
            document_id          TEXT NOT NULL,
            user_id              TEXT,
            group_id             TEXT,
            public_workspace_id  TEXT,
            file_name            TEXT NOT NULL,
            chunk_text           TEXT NOT NULL,
            video_ocr_chunk_text TEXT,
            embedding            BLOB NOT NULL,
            chunk_sequence       INTEGER NOT NULL,
            version              INTEGER NOT NULL,
            title                TEXT,
            authors              TEXT NOT NULL DEFAULT '[]',
            keywords             TEXT NOT NULL DEFAULT '[]',
            sharing              TEXT NOT NULL DEFAULT '[]',
            upload_date          INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks (document_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Encode a float vector as little-endian f32 bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn decode_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Sharing lists persist as a JSON array of `"<id>,<status>"` strings,
/// the storage encoding kept for record compatibility.
fn encode_sharing(entries: &[SharingEntry]) -> String {
    let encoded: Vec<String> = entries.iter().map(SharingEntry::encode).collect();
    serde_json::to_string(&encoded).unwrap_or_else(|_| "[]".to_string())
}

fn decode_sharing(raw: &str) -> Vec<SharingEntry> {
    decode_list(raw)
        .iter()
        .map(|s| SharingEntry::decode(s))
        .collect()
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<DocumentRecord> {
    let scope = Scope::from_columns(
        row.try_get("user_id")?,
        row.try_get("group_id")?,
        row.try_get("public_workspace_id")?,
    )?;
    let authors: String = row.try_get("authors")?;
    let keywords: String = row.try_get("keywords")?;
    let sharing: String = row.try_get("sharing")?;

    Ok(DocumentRecord {
        id: row.try_get("id")?,
        file_name: row.try_get("file_name")?,
        scope,
        version: row.try_get("version")?,
        status: row.try_get("status")?,
        percentage_complete: row.try_get("percentage_complete")?,
        num_chunks: row.try_get("num_chunks")?,
        number_of_pages: row.try_get("number_of_pages")?,
        current_file_chunk: row.try_get("current_file_chunk")?,
        num_file_chunks: row.try_get("num_file_chunks")?,
        document_classification: row.try_get("document_classification")?,
        title: row.try_get("title")?,
        authors: decode_list(&authors),
        organization: row.try_get("organization")?,
        publication_date: row.try_get("publication_date")?,
        keywords: decode_list(&keywords),
        abstract_text: row.try_get("abstract_text")?,
        upload_date: row.try_get("upload_date")?,
        last_updated: row.try_get("last_updated")?,
        sharing: decode_sharing(&sharing),
    })
}

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ChunkRecord> {
    let scope = Scope::from_columns(
        row.try_get("user_id")?,
        row.try_get("group_id")?,
        row.try_get("public_workspace_id")?,
    )?;
    let authors: String = row.try_get("authors")?;
    let keywords: String = row.try_get("keywords")?;
    let sharing: String = row.try_get("sharing")?;
    let embedding: Vec<u8> = row.try_get("embedding")?;

    Ok(ChunkRecord {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        scope,
        file_name: row.try_get("file_name")?,
        chunk_text: row.try_get("chunk_text")?,
        video_ocr_chunk_text: row.try_get("video_ocr_chunk_text")?,
        embedding: blob_to_vec(&embedding),
        chunk_sequence: row.try_get("chunk_sequence")?,
        version: row.try_get("version")?,
        title: row.try_get("title")?,
        authors: decode_list(&authors),
        keywords: decode_list(&keywords),
        sharing: decode_sharing(&sharing),
        upload_date: row.try_get("upload_date")?,
    })
}

/// Scope filter clause with the owner id bound by the caller.
fn scope_column(scope: &Scope) -> &'static str {
    match scope {
        Scope::Personal(_) => "user_id",
        Scope::Group(_) => "group_id",
        Scope::Public(_) => "public_workspace_id",
    }
}

pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn upsert(&self, doc: &DocumentRecord) -> Result<()> {
        let (user_id, group_id, public_workspace_id) = doc.scope.to_columns();
        sqlx::query(
            r#"
            INSERT INTO documents (id, file_name, user_id, group_id, public_workspace_id,
                                   version, status, percentage_complete, num_chunks,
                                   number_of_pages, current_file_chunk, num_file_chunks,
                                   document_classification, title, authors, organization,
                                   publication_date, keywords, abstract_text,
                                   upload_date, last_updated, sharing)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                percentage_complete = excluded.percentage_complete,
                num_chunks = excluded.num_chunks,
                number_of_pages = excluded.number_of_pages,
                current_file_chunk = excluded.current_file_chunk,
                num_file_chunks = excluded.num_file_chunks,
                document_classification = excluded.document_classification,
                title = excluded.title,
                authors = excluded.authors,
                organization = excluded.organization,
                publication_date = excluded.publication_date,
                keywords = excluded.keywords,
                abstract_text = excluded.abstract_text,
                last_updated = excluded.last_updated,
                sharing = excluded.sharing
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.file_name)
        .bind(user_id)
        .bind(group_id)
        .bind(public_workspace_id)
        .bind(doc.version)
        .bind(&doc.status)
        .bind(doc.percentage_complete)
        .bind(doc.num_chunks)
        .bind(doc.number_of_pages)
        .bind(doc.current_file_chunk)
        .bind(doc.num_file_chunks)
        .bind(&doc.document_classification)
        .bind(&doc.title)
        .bind(encode_list(&doc.authors))
        .bind(&doc.organization)
        .bind(&doc.publication_date)
        .bind(encode_list(&doc.keywords))
        .bind(&doc.abstract_text)
        .bind(doc.upload_date)
        .bind(doc.last_updated)
        .bind(encode_sharing(&doc.sharing))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn versions(&self, scope: &Scope, file_name: &str) -> Result<Vec<DocumentRecord>> {
        let sql = format!(
            "SELECT * FROM documents WHERE {} = ? AND file_name = ? ORDER BY version DESC",
            scope_column(scope)
        );
        let rows = sqlx::query(&sql)
            .bind(scope.owner_id())
            .bind(file_name)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn list(&self, scope: &Scope) -> Result<Vec<DocumentRecord>> {
        let sql = format!(
            "SELECT * FROM documents WHERE {} = ? ORDER BY file_name, version DESC",
            scope_column(scope)
        );
        let rows = sqlx::query(&sql)
            .bind(scope.owner_id())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct SqliteChunkStore {
    pool: SqlitePool,
}

impl SqliteChunkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn upsert_chunk(&self, chunk: &ChunkRecord) -> Result<()> {
        let (user_id, group_id, public_workspace_id) = chunk.scope.to_columns();
        sqlx::query(
            r#"
            INSERT INTO chunks (id, document_id, user_id, group_id, public_workspace_id,
                                file_name, chunk_text, video_ocr_chunk_text, embedding,
                                chunk_sequence, version, title, authors, keywords,
                                sharing, upload_date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                file_name = excluded.file_name,
                chunk_text = excluded.chunk_text,
                video_ocr_chunk_text = excluded.video_ocr_chunk_text,
                embedding = excluded.embedding,
                version = excluded.version,
                title = excluded.title,
                authors = excluded.authors,
                keywords = excluded.keywords,
                sharing = excluded.sharing
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(user_id)
        .bind(group_id)
        .bind(public_workspace_id)
        .bind(&chunk.file_name)
        .bind(&chunk.chunk_text)
        .bind(&chunk.video_ocr_chunk_text)
        .bind(vec_to_blob(&chunk.embedding))
        .bind(chunk.chunk_sequence)
        .bind(chunk.version)
        .bind(&chunk.title)
        .bind(encode_list(&chunk.authors))
        .bind(encode_list(&chunk.keywords))
        .bind(encode_sharing(&chunk.sharing))
        .bind(chunk.upload_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<ChunkRecord>> {
        let rows =
            sqlx::query("SELECT * FROM chunks WHERE document_id = ? ORDER BY chunk_sequence")
                .bind(document_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn delete_document_chunks(&self, document_id: &str, version: Option<i64>) -> Result<()> {
        match version {
            Some(v) => {
                sqlx::query("DELETE FROM chunks WHERE document_id = ? AND version = ?")
                    .bind(document_id)
                    .bind(v)
                    .execute(&self.pool)
                    .await?;
            }
            None => {
                sqlx::query("DELETE FROM chunks WHERE document_id = ?")
                    .bind(document_id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn propagate_metadata(&self, doc: &DocumentRecord) -> Result<()> {
        let sharing = if doc.scope.supports_sharing() {
            encode_sharing(&doc.sharing)
        } else {
            "[]".to_string()
        };
        sqlx::query(
            "UPDATE chunks SET title = ?, authors = ?, keywords = ?, sharing = ?
             WHERE document_id = ?",
        )
        .bind(&doc.title)
        .bind(encode_list(&doc.authors))
        .bind(encode_list(&doc.keywords))
        .bind(sharing)
        .bind(&doc.id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("chunk metadata propagation for {}", doc.id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{chunk_id, ApprovalStatus};

    async fn test_pool() -> SqlitePool {
        let dir = tempfile::tempdir().unwrap();
        // Keep the tempdir alive for the pool's lifetime by leaking it;
        // the OS reclaims the file when the test process exits.
        let path = dir.keep().join("test.db");
        let pool = connect(&path).await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[test]
    fn blob_roundtrip() {
        let v = vec![1.0f32, -2.5, 3.125, 0.0];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }

    #[tokio::test]
    async fn document_roundtrip_preserves_scope_and_sharing() {
        let pool = test_pool().await;
        let store = SqliteMetadataStore::new(pool);

        let mut doc = DocumentRecord::new("d1", "report.pdf", Scope::Group("g1".into()));
        doc.title = Some("Q3 Report".into());
        doc.authors = vec!["Ada".into(), "Alan".into()];
        doc.sharing = vec![SharingEntry {
            id: "g2".into(),
            status: ApprovalStatus::Approved,
        }];
        store.upsert(&doc).await.unwrap();

        let loaded = store.get("d1").await.unwrap().unwrap();
        assert_eq!(loaded.scope, Scope::Group("g1".into()));
        assert_eq!(loaded.authors, vec!["Ada", "Alan"]);
        assert_eq!(loaded.sharing.len(), 1);
        assert_eq!(loaded.sharing[0].status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn versions_query_orders_descending() {
        let pool = test_pool().await;
        let store = SqliteMetadataStore::new(pool);
        let scope = Scope::Personal("u1".into());

        for v in 1..=3 {
            let mut doc = DocumentRecord::new(format!("d{v}"), "a.txt", scope.clone());
            doc.version = v;
            store.upsert(&doc).await.unwrap();
        }

        let versions = store.versions(&scope, "a.txt").await.unwrap();
        assert_eq!(
            versions.iter().map(|d| d.version).collect::<Vec<_>>(),
            vec![3, 2, 1]
        );
    }

    #[tokio::test]
    async fn chunk_roundtrip_preserves_embedding() {
        let pool = test_pool().await;
        let store = SqliteChunkStore::new(pool);

        let doc = DocumentRecord::new("d1", "a.txt", Scope::Personal("u1".into()));
        let mut chunk = ChunkRecord::from_document(&doc, 1, "hello");
        chunk.embedding = vec![0.5, -0.25, 1.0];
        store.upsert_chunk(&chunk).await.unwrap();

        let loaded = store.chunks_for_document("d1").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, chunk_id("d1", 1));
        assert_eq!(loaded[0].embedding, vec![0.5, -0.25, 1.0]);
    }

    #[tokio::test]
    async fn propagation_strips_sharing_for_public_scope() {
        let pool = test_pool().await;
        let store = SqliteChunkStore::new(pool);

        let mut doc = DocumentRecord::new("d1", "a.txt", Scope::Public("w1".into()));
        store
            .upsert_chunk(&ChunkRecord::from_document(&doc, 1, "text"))
            .await
            .unwrap();
        doc.sharing.push(SharingEntry::pending("u2"));
        store.propagate_metadata(&doc).await.unwrap();

        let chunks = store.chunks_for_document("d1").await.unwrap();
        assert!(chunks[0].sharing.is_empty());
    }
}
