//! Core data models for documents, chunks, tenancy scopes, and sharing.
//!
//! The metadata store is authoritative for document identity, version, and
//! sharing state; chunk records are a derived projection that mirrors the
//! owning document's scope and sharing list.

use chrono::Utc;

/// Tenancy partition of a document. A record's scope never changes after
/// creation; exactly one of the three storage columns is populated from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Owned by a single user.
    Personal(String),
    /// Owned by a group.
    Group(String),
    /// Public workspace; no sharing gate applies.
    Public(String),
}

impl Scope {
    /// The identifier of the owning user, group, or workspace.
    pub fn owner_id(&self) -> &str {
        match self {
            Scope::Personal(id) | Scope::Group(id) | Scope::Public(id) => id,
        }
    }

    /// Whether this scope carries a sharing list (public workspaces do not).
    pub fn supports_sharing(&self) -> bool {
        !matches!(self, Scope::Public(_))
    }

    /// Flatten to the three mutually-exclusive storage columns
    /// `(user_id, group_id, public_workspace_id)`.
    pub fn to_columns(&self) -> (Option<&str>, Option<&str>, Option<&str>) {
        match self {
            Scope::Personal(id) => (Some(id), None, None),
            Scope::Group(id) => (None, Some(id), None),
            Scope::Public(id) => (None, None, Some(id)),
        }
    }

    /// Rebuild from storage columns. Errors when zero or multiple columns
    /// are set.
    pub fn from_columns(
        user_id: Option<String>,
        group_id: Option<String>,
        public_workspace_id: Option<String>,
    ) -> anyhow::Result<Self> {
        match (user_id, group_id, public_workspace_id) {
            (Some(id), None, None) => Ok(Scope::Personal(id)),
            (None, Some(id), None) => Ok(Scope::Group(id)),
            (None, None, Some(id)) => Ok(Scope::Public(id)),
            _ => anyhow::bail!("document record must have exactly one scope field set"),
        }
    }
}

/// Per-counterpart sharing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    NotApproved,
    Approved,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::NotApproved => "not_approved",
            ApprovalStatus::Approved => "approved",
        }
    }
}

/// One entry in a document's sharing list.
///
/// Stored as `"<id>,<status>"` at the storage boundary for compatibility
/// with existing records; typed everywhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharingEntry {
    pub id: String,
    pub status: ApprovalStatus,
}

impl SharingEntry {
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ApprovalStatus::NotApproved,
        }
    }

    /// Wire/storage encoding: `"<id>,<status>"`.
    pub fn encode(&self) -> String {
        format!("{},{}", self.id, self.status.as_str())
    }

    /// Parse the storage encoding. An entry without a status suffix is
    /// treated as not approved.
    pub fn decode(raw: &str) -> Self {
        match raw.rsplit_once(',') {
            Some((id, "approved")) => Self {
                id: id.to_string(),
                status: ApprovalStatus::Approved,
            },
            Some((id, "not_approved")) => Self {
                id: id.to_string(),
                status: ApprovalStatus::NotApproved,
            },
            _ => Self {
                id: raw.to_string(),
                status: ApprovalStatus::NotApproved,
            },
        }
    }
}

/// Primary metadata record for one uploaded document version.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    /// Opaque identifier assigned by the caller at creation.
    pub id: String,
    pub file_name: String,
    pub scope: Scope,
    /// Strictly increasing per (scope, file_name); highest is current.
    pub version: i64,
    /// Free-text human-readable phase label.
    pub status: String,
    /// 0–100, monotonic non-decreasing except on error reset.
    pub percentage_complete: i64,
    pub num_chunks: i64,
    /// Chunk-count estimate; may be revised as the pipeline learns more.
    pub number_of_pages: i64,
    /// Position within the physical sub-files of a pre-split source.
    pub current_file_chunk: i64,
    pub num_file_chunks: i64,
    pub document_classification: Option<String>,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub organization: Option<String>,
    pub publication_date: Option<String>,
    pub keywords: Vec<String>,
    pub abstract_text: Option<String>,
    /// Epoch seconds.
    pub upload_date: i64,
    pub last_updated: i64,
    /// Shared users (personal scope) or groups (group scope); empty for
    /// public workspaces.
    pub sharing: Vec<SharingEntry>,
}

impl DocumentRecord {
    pub fn new(id: impl Into<String>, file_name: impl Into<String>, scope: Scope) -> Self {
        let now = Utc::now().timestamp();
        Self {
            id: id.into(),
            file_name: file_name.into(),
            scope,
            version: 1,
            status: "Queued for processing".to_string(),
            percentage_complete: 0,
            num_chunks: 0,
            number_of_pages: 0,
            current_file_chunk: 1,
            num_file_chunks: 1,
            document_classification: None,
            title: None,
            authors: Vec::new(),
            organization: None,
            publication_date: None,
            keywords: Vec::new(),
            abstract_text: None,
            upload_date: now,
            last_updated: now,
            sharing: Vec::new(),
        }
    }

    /// Touch the last-updated timestamp.
    pub fn touch(&mut self) {
        self.last_updated = Utc::now().timestamp();
    }

    /// Find a sharing entry by counterpart id.
    pub fn sharing_entry(&self, counterpart: &str) -> Option<&SharingEntry> {
        self.sharing.iter().find(|e| e.id == counterpart)
    }
}

/// One retrieval-sized unit of extracted text with its embedding.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// Deterministic: `"<document_id>_<sequence>"`, so re-running a
    /// pipeline re-upserts in place.
    pub id: String,
    pub document_id: String,
    pub scope: Scope,
    pub file_name: String,
    pub chunk_text: String,
    /// Video only: the OCR text stream for the same time window.
    pub video_ocr_chunk_text: Option<String>,
    pub embedding: Vec<f32>,
    pub chunk_sequence: i64,
    /// Copied from the document version at creation time.
    pub version: i64,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub keywords: Vec<String>,
    /// Copy of the owning document's sharing list (personal/group scopes).
    pub sharing: Vec<SharingEntry>,
    pub upload_date: i64,
}

/// Deterministic chunk identifier for `(document_id, sequence)`.
pub fn chunk_id(document_id: &str, sequence: i64) -> String {
    format!("{document_id}_{sequence}")
}

impl ChunkRecord {
    /// Build a chunk from its owning document, inheriting scope, version,
    /// bibliographic fields, and the sharing list.
    pub fn from_document(doc: &DocumentRecord, sequence: i64, text: impl Into<String>) -> Self {
        Self {
            id: chunk_id(&doc.id, sequence),
            document_id: doc.id.clone(),
            scope: doc.scope.clone(),
            file_name: doc.file_name.clone(),
            chunk_text: text.into(),
            video_ocr_chunk_text: None,
            embedding: Vec::new(),
            chunk_sequence: sequence,
            version: doc.version,
            title: doc.title.clone(),
            authors: doc.authors.clone(),
            keywords: doc.keywords.clone(),
            sharing: if doc.scope.supports_sharing() {
                doc.sharing.clone()
            } else {
                Vec::new()
            },
            upload_date: doc.upload_date,
        }
    }
}

/// Format family inferred from a file extension; selects the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatFamily {
    Text,
    Markup,
    Json,
    Tabular,
    LongDocument(LongDocKind),
    Audio,
    Video,
}

/// Sub-kind of the long-document pipeline; drives reassembly policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongDocKind {
    Pdf,
    Word,
    Presentation,
    Image,
}

/// Map a lowercase file extension to its format family. `None` means the
/// extension is not on the allow-list.
pub fn family_for_extension(ext: &str) -> Option<FormatFamily> {
    let family = match ext {
        "txt" | "log" => FormatFamily::Text,
        "md" | "markdown" | "html" | "htm" => FormatFamily::Markup,
        "json" => FormatFamily::Json,
        "csv" | "xlsx" => FormatFamily::Tabular,
        "pdf" => FormatFamily::LongDocument(LongDocKind::Pdf),
        "docx" | "doc" => FormatFamily::LongDocument(LongDocKind::Word),
        "pptx" | "ppt" => FormatFamily::LongDocument(LongDocKind::Presentation),
        "png" | "jpg" | "jpeg" | "bmp" | "tiff" | "heif" => {
            FormatFamily::LongDocument(LongDocKind::Image)
        }
        "mp3" | "wav" | "m4a" | "flac" | "ogg" => FormatFamily::Audio,
        "mp4" | "mov" | "avi" | "mkv" | "webm" => FormatFamily::Video,
        _ => return None,
    };
    Some(family)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_columns_roundtrip() {
        for scope in [
            Scope::Personal("u1".into()),
            Scope::Group("g1".into()),
            Scope::Public("w1".into()),
        ] {
            let (u, g, p) = scope.to_columns();
            let rebuilt = Scope::from_columns(
                u.map(String::from),
                g.map(String::from),
                p.map(String::from),
            )
            .unwrap();
            assert_eq!(rebuilt, scope);
        }
    }

    #[test]
    fn scope_rejects_ambiguous_columns() {
        assert!(Scope::from_columns(Some("u".into()), Some("g".into()), None).is_err());
        assert!(Scope::from_columns(None, None, None).is_err());
    }

    #[test]
    fn sharing_entry_encoding_roundtrip() {
        let entry = SharingEntry {
            id: "user-7".into(),
            status: ApprovalStatus::Approved,
        };
        assert_eq!(entry.encode(), "user-7,approved");
        assert_eq!(SharingEntry::decode("user-7,approved"), entry);
        assert_eq!(
            SharingEntry::decode("user-9,not_approved").status,
            ApprovalStatus::NotApproved
        );
    }

    #[test]
    fn sharing_entry_decode_bare_id() {
        let entry = SharingEntry::decode("lonely");
        assert_eq!(entry.id, "lonely");
        assert_eq!(entry.status, ApprovalStatus::NotApproved);
    }

    #[test]
    fn chunk_id_is_deterministic() {
        assert_eq!(chunk_id("doc-1", 3), "doc-1_3");
        assert_eq!(chunk_id("doc-1", 3), chunk_id("doc-1", 3));
    }

    #[test]
    fn chunk_inherits_sharing_only_for_gated_scopes() {
        let mut doc = DocumentRecord::new("d1", "a.txt", Scope::Personal("u1".into()));
        doc.sharing.push(SharingEntry::pending("u2"));
        let chunk = ChunkRecord::from_document(&doc, 1, "hello");
        assert_eq!(chunk.sharing.len(), 1);

        let mut public = DocumentRecord::new("d2", "a.txt", Scope::Public("w1".into()));
        public.sharing.push(SharingEntry::pending("u2"));
        let chunk = ChunkRecord::from_document(&public, 1, "hello");
        assert!(chunk.sharing.is_empty());
    }

    #[test]
    fn extension_allow_list() {
        assert_eq!(family_for_extension("txt"), Some(FormatFamily::Text));
        assert_eq!(
            family_for_extension("pdf"),
            Some(FormatFamily::LongDocument(LongDocKind::Pdf))
        );
        assert_eq!(family_for_extension("exe"), None);
    }
}
