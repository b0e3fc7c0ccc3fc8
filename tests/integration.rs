//! End-to-end pipeline tests against in-memory stores and scripted
//! service fakes.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use docpipe::config::{Config, DbConfig};
use docpipe::error::IngestError;
use docpipe::models::{ApprovalStatus, DocumentRecord, Scope};
use docpipe::pipeline::Orchestrator;
use docpipe::services::{
    EmbeddingApi, ExtractedPage, ExtractionApi, ExtractionJob, InferredMetadata, JobStatus,
    MetadataInferenceApi, ServiceContext, TimedLine, TranscriptionApi, VideoIndexApi,
    VideoInsights,
};
use docpipe::sharing::DocumentManager;
use docpipe::store::memory::{InMemoryChunkStore, InMemoryMetadataStore};
use docpipe::store::{ChunkStore, MetadataStore};

// --- scripted fakes --------------------------------------------------------

struct FakeExtraction {
    pages: Vec<ExtractedPage>,
}

impl FakeExtraction {
    fn with_pages(contents: &[&str]) -> Self {
        Self {
            pages: contents
                .iter()
                .enumerate()
                .map(|(i, content)| ExtractedPage {
                    page_number: (i + 1) as i64,
                    content: content.to_string(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ExtractionApi for FakeExtraction {
    async fn submit(&self, _file_name: &str, _bytes: &[u8]) -> Result<String, IngestError> {
        Ok("job-1".to_string())
    }

    async fn poll(&self, _job_id: &str) -> Result<ExtractionJob, IngestError> {
        Ok(ExtractionJob {
            status: JobStatus::Succeeded,
            pages: self.pages.clone(),
            retry_after: None,
        })
    }
}

struct FakeEmbedding;

#[async_trait]
impl EmbeddingApi for FakeEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, IngestError> {
        Ok(vec![0.25, -0.5, 0.75])
    }
}

struct FailingEmbedding {
    message: String,
}

#[async_trait]
impl EmbeddingApi for FailingEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, IngestError> {
        Err(IngestError::ExternalService(self.message.clone()))
    }
}

struct FakeTranscription;

#[async_trait]
impl TranscriptionApi for FakeTranscription {
    async fn transcribe(&self, _wav: &[u8], _locale: &str) -> Result<Vec<String>, IngestError> {
        Ok(vec!["hello world".to_string()])
    }
}

struct FakeVideo {
    transcript: Vec<TimedLine>,
    ocr: Vec<TimedLine>,
}

#[async_trait]
impl VideoIndexApi for FakeVideo {
    async fn submit(&self, _file_name: &str, _bytes: &[u8]) -> Result<String, IngestError> {
        Ok("video-1".to_string())
    }

    async fn poll(&self, _video_id: &str) -> Result<VideoInsights, IngestError> {
        Ok(VideoInsights {
            state: JobStatus::Succeeded,
            progress: 100,
            transcript: self.transcript.clone(),
            ocr: self.ocr.clone(),
        })
    }
}

struct FakeInference {
    result: Option<InferredMetadata>,
}

#[async_trait]
impl MetadataInferenceApi for FakeInference {
    async fn infer(&self, _sample_text: &str) -> Result<Option<InferredMetadata>, IngestError> {
        Ok(self.result.clone())
    }
}

/// Metadata store wrapper that records every (status, percentage) write.
struct RecordingMetadataStore {
    inner: InMemoryMetadataStore,
    log: Mutex<Vec<(String, i64)>>,
}

impl RecordingMetadataStore {
    fn new() -> Self {
        Self {
            inner: InMemoryMetadataStore::new(),
            log: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MetadataStore for RecordingMetadataStore {
    async fn upsert(&self, doc: &DocumentRecord) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push((doc.status.clone(), doc.percentage_complete));
        self.inner.upsert(doc).await
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<DocumentRecord>> {
        self.inner.get(id).await
    }

    async fn versions(&self, scope: &Scope, file_name: &str) -> anyhow::Result<Vec<DocumentRecord>> {
        self.inner.versions(scope, file_name).await
    }

    async fn list(&self, scope: &Scope) -> anyhow::Result<Vec<DocumentRecord>> {
        self.inner.list(scope).await
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        self.inner.delete(id).await
    }
}

// --- harness ---------------------------------------------------------------

fn test_config() -> Config {
    Config {
        db: DbConfig {
            path: PathBuf::from("unused.db"),
        },
        limits: Default::default(),
        features: Default::default(),
        chunking: Default::default(),
        extraction: Default::default(),
        embedding: Default::default(),
        transcription: Default::default(),
        video_index: Default::default(),
        citations: Default::default(),
        workers: Default::default(),
    }
}

fn base_services() -> ServiceContext {
    ServiceContext {
        extraction: Arc::new(FakeExtraction::with_pages(&[])),
        embeddings: Arc::new(FakeEmbedding),
        transcription: Arc::new(FakeTranscription),
        video: Arc::new(FakeVideo {
            transcript: Vec::new(),
            ocr: Vec::new(),
        }),
        citations: None,
        metadata_inference: None,
    }
}

struct Harness {
    orchestrator: Orchestrator,
    metadata: Arc<InMemoryMetadataStore>,
    chunks: Arc<InMemoryChunkStore>,
    dir: TempDir,
}

fn harness(config: Config, services: ServiceContext) -> Harness {
    let metadata = Arc::new(InMemoryMetadataStore::new());
    let chunks = Arc::new(InMemoryChunkStore::new());
    let orchestrator = Orchestrator::new(config, metadata.clone(), chunks.clone(), services);
    Harness {
        orchestrator,
        metadata,
        chunks,
        dir: tempfile::tempdir().unwrap(),
    }
}

impl Harness {
    /// Stage upload bytes under a throwaway path; the pipeline deletes it.
    fn stage(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    async fn ingest(
        &self,
        id: &str,
        scope: Scope,
        temp_file: &Path,
        name: &str,
    ) -> Result<(), IngestError> {
        self.orchestrator.ingest(id, scope, temp_file, name).await
    }
}

fn personal(id: &str) -> Scope {
    Scope::Personal(id.to_string())
}

// --- tests -----------------------------------------------------------------

#[tokio::test]
async fn pdf_ingestion_produces_one_chunk_per_page() {
    let mut services = base_services();
    services.extraction = Arc::new(FakeExtraction::with_pages(&[
        "page one text",
        "page two text",
        "page three text",
    ]));
    let h = harness(test_config(), services);

    let upload = h.stage("upload", b"%PDF-1.4 not really parseable");
    h.ingest("doc-1", personal("u1"), &upload, "report.pdf")
        .await
        .unwrap();

    let doc = h.metadata.get("doc-1").await.unwrap().unwrap();
    assert_eq!(doc.status, "Processing complete");
    assert_eq!(doc.percentage_complete, 100);
    assert_eq!(doc.num_chunks, 3);
    assert_eq!(doc.version, 1);

    let chunks = h.chunks.chunks_for_document("doc-1").await.unwrap();
    assert_eq!(chunks.len(), 3);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.id, format!("doc-1_{}", i + 1));
        assert_eq!(chunk.chunk_sequence, (i + 1) as i64);
        assert!(!chunk.embedding.is_empty());
    }
    assert_eq!(chunks[1].chunk_text, "page two text");
}

#[tokio::test]
async fn empty_extracted_pages_are_dropped() {
    let mut services = base_services();
    services.extraction = Arc::new(FakeExtraction::with_pages(&["first", "   ", "third"]));
    let h = harness(test_config(), services);

    let upload = h.stage("upload", b"%PDF-");
    h.ingest("doc-1", personal("u1"), &upload, "sparse.pdf")
        .await
        .unwrap();

    let chunks = h.chunks.chunks_for_document("doc-1").await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].chunk_text, "first");
    assert_eq!(chunks[1].chunk_text, "third");
}

#[tokio::test]
async fn image_with_no_text_still_yields_one_chunk() {
    let mut services = base_services();
    services.extraction = Arc::new(FakeExtraction::with_pages(&[""]));
    let h = harness(test_config(), services);

    let upload = h.stage("upload", b"\x89PNG");
    h.ingest("doc-1", personal("u1"), &upload, "scan.png")
        .await
        .unwrap();

    let chunks = h.chunks.chunks_for_document("doc-1").await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].chunk_text, "");
    // No embedding call for empty text.
    assert!(chunks[0].embedding.is_empty());
}

#[tokio::test]
async fn csv_segments_each_carry_the_header() {
    let mut config = test_config();
    // Rows serialize to "N, N" (4 chars); three rows plus separators fit.
    config.chunking.tabular_max_chars = 14;
    let h = harness(config, base_services());

    let csv = "a,b\n1,2\n3,4\n5,6\n7,8\n9,0\n";
    let upload = h.stage("upload", csv.as_bytes());
    h.ingest("doc-1", personal("u1"), &upload, "table.csv")
        .await
        .unwrap();

    let chunks = h.chunks.chunks_for_document("doc-1").await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.chunk_text.starts_with("a, b\n")));
    assert_eq!(chunks[0].chunk_text, "a, b\n1, 2\n3, 4\n5, 6");
    assert_eq!(chunks[1].chunk_text, "a, b\n7, 8\n9, 0");
}

#[tokio::test]
async fn text_ingestion_splits_on_word_windows() {
    let mut config = test_config();
    config.chunking.words_per_chunk = 5;
    let h = harness(config, base_services());

    let words: Vec<String> = (0..12).map(|i| format!("w{i}")).collect();
    let upload = h.stage("upload", words.join(" ").as_bytes());
    h.ingest("doc-1", personal("u1"), &upload, "notes.txt")
        .await
        .unwrap();

    let chunks = h.chunks.chunks_for_document("doc-1").await.unwrap();
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].chunk_text, "w0 w1 w2 w3 w4");
    assert_eq!(chunks[2].chunk_text, "w10 w11");
}

#[tokio::test]
async fn reingesting_the_same_name_bumps_the_version() {
    let h = harness(test_config(), base_services());
    let scope = personal("u1");

    for (id, expected_version) in [("doc-1", 1), ("doc-2", 2)] {
        let upload = h.stage("upload", b"same file twice");
        h.ingest(id, scope.clone(), &upload, "notes.txt")
            .await
            .unwrap();
        let doc = h.metadata.get(id).await.unwrap().unwrap();
        assert_eq!(doc.version, expected_version);
    }

    // A different scope starts its own lineage.
    let upload = h.stage("upload", b"same name elsewhere");
    h.ingest("doc-3", personal("u2"), &upload, "notes.txt")
        .await
        .unwrap();
    assert_eq!(h.metadata.get("doc-3").await.unwrap().unwrap().version, 1);

    // Old versions keep their chunks.
    assert_eq!(h.chunks.chunks_for_document("doc-1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn video_windows_follow_the_transcript() {
    let mut services = base_services();
    services.video = Arc::new(FakeVideo {
        transcript: vec![
            TimedLine { start_secs: 0.0, text: "a".into() },
            TimedLine { start_secs: 29.0, text: "b".into() },
            TimedLine { start_secs: 31.0, text: "c".into() },
            TimedLine { start_secs: 61.0, text: "d".into() },
        ],
        ocr: vec![TimedLine { start_secs: 10.0, text: "SLIDE 1".into() }],
    });
    let h = harness(test_config(), services);

    let upload = h.stage("upload", b"video bytes");
    h.ingest("doc-1", personal("u1"), &upload, "talk.mp4")
        .await
        .unwrap();

    let chunks = h.chunks.chunks_for_document("doc-1").await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].chunk_text, "a b");
    assert_eq!(chunks[0].video_ocr_chunk_text.as_deref(), Some("SLIDE 1"));
    assert_eq!(chunks[1].chunk_text, "c d");
    assert!(chunks[1].video_ocr_chunk_text.is_none());
}

#[tokio::test]
async fn video_without_transcript_completes_with_zero_chunks() {
    let mut services = base_services();
    services.video = Arc::new(FakeVideo {
        transcript: Vec::new(),
        ocr: vec![TimedLine { start_secs: 1.0, text: "SIGN".into() }],
    });
    let h = harness(test_config(), services);

    let upload = h.stage("upload", b"video bytes");
    h.ingest("doc-1", personal("u1"), &upload, "silent.mp4")
        .await
        .unwrap();

    let doc = h.metadata.get("doc-1").await.unwrap().unwrap();
    assert_eq!(doc.status, "Processing complete");
    assert_eq!(doc.num_chunks, 0);
    assert!(h.chunks.chunks_for_document("doc-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn unsupported_extension_is_rejected_before_any_record() {
    let h = harness(test_config(), base_services());
    let upload = h.stage("upload", b"MZ");
    let err = h
        .ingest("doc-1", personal("u1"), &upload, "setup.exe")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));
    assert!(h.metadata.get("doc-1").await.unwrap().is_none());
    // The temp file is removed even on rejection.
    assert!(!upload.exists());
}

#[tokio::test]
async fn disabled_video_support_rejects_uploads() {
    let mut config = test_config();
    config.features.video_support = false;
    let h = harness(config, base_services());

    let upload = h.stage("upload", b"video bytes");
    let err = h
        .ingest("doc-1", personal("u1"), &upload, "talk.mp4")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));
}

#[tokio::test]
async fn oversized_audio_is_rejected() {
    let mut config = test_config();
    config.limits.audio_max_mb = 1;
    let h = harness(config, base_services());

    let upload = h.stage("upload", &vec![0u8; 1_200_000]);
    let err = h
        .ingest("doc-1", personal("u1"), &upload, "talk.m4a")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));
    assert!(h.metadata.get("doc-1").await.unwrap().is_none());
}

#[tokio::test]
async fn audio_has_its_own_ceiling_above_the_general_limit() {
    let mut config = test_config();
    config.limits.max_upload_mb = 1;
    config.limits.audio_max_mb = 4;
    let h = harness(config, base_services());

    // Larger than the general limit but under the audio ceiling: passes
    // validation. The same size is rejected for a non-audio format.
    let upload = h.stage("upload", &vec![0u8; 1_200_000]);
    if let Err(err) = h.ingest("doc-1", personal("u1"), &upload, "talk.m4a").await {
        assert!(!matches!(err, IngestError::Validation(_)), "{err}");
    }

    let upload = h.stage("upload", &vec![0u8; 1_200_000]);
    let err = h
        .ingest("doc-2", personal("u1"), &upload, "notes.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));
}

#[tokio::test]
async fn failure_records_truncated_error_status_and_resets_progress() {
    let mut services = base_services();
    services.embeddings = Arc::new(FailingEmbedding {
        message: "x".repeat(600),
    });
    let h = harness(test_config(), services);

    let upload = h.stage("upload", b"some words to embed");
    let err = h
        .ingest("doc-1", personal("u1"), &upload, "notes.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::ExternalService(_)));

    let doc = h.metadata.get("doc-1").await.unwrap().unwrap();
    assert!(doc.status.starts_with("Error: "));
    assert!(doc.status.chars().count() <= 256);
    assert_eq!(doc.percentage_complete, 0);
    assert!(!upload.exists());
}

#[tokio::test]
async fn progress_never_decreases_during_a_successful_run() {
    let recording = Arc::new(RecordingMetadataStore::new());
    let chunks = Arc::new(InMemoryChunkStore::new());
    let mut config = test_config();
    config.chunking.words_per_chunk = 2;
    let orchestrator = Orchestrator::new(config, recording.clone(), chunks, base_services());

    let dir = tempfile::tempdir().unwrap();
    let upload = dir.path().join("upload");
    std::fs::write(&upload, "one two three four five six seven eight").unwrap();
    orchestrator
        .ingest("doc-1", personal("u1"), &upload, "notes.txt")
        .await
        .unwrap();

    let log = recording.log.lock().unwrap();
    assert!(log.len() > 2);
    for pair in log.windows(2) {
        assert!(
            pair[1].1 >= pair[0].1,
            "progress regressed: {:?} -> {:?}",
            pair[0],
            pair[1]
        );
    }
    assert_eq!(log.last().unwrap().1, 100);
}

#[tokio::test]
async fn inferred_metadata_is_applied_and_propagated_to_chunks() {
    let mut services = base_services();
    services.extraction = Arc::new(FakeExtraction::with_pages(&["body text"]));
    services.metadata_inference = Some(Arc::new(FakeInference {
        result: Some(InferredMetadata {
            title: Some("Annual Report".to_string()),
            authors: vec!["J. Doe".to_string()],
            keywords: vec!["finance".to_string()],
            ..Default::default()
        }),
    }));
    let h = harness(test_config(), services);

    let upload = h.stage("upload", b"%PDF-");
    h.ingest("doc-1", personal("u1"), &upload, "annual.pdf")
        .await
        .unwrap();

    let doc = h.metadata.get("doc-1").await.unwrap().unwrap();
    assert_eq!(doc.title.as_deref(), Some("Annual Report"));
    assert_eq!(doc.authors, vec!["J. Doe".to_string()]);
    assert_eq!(doc.status, "Processing complete");

    let chunks = h.chunks.chunks_for_document("doc-1").await.unwrap();
    assert_eq!(chunks[0].title.as_deref(), Some("Annual Report"));
}

#[tokio::test]
async fn inference_veto_skips_metadata_but_completes_ingestion() {
    let mut services = base_services();
    services.extraction = Arc::new(FakeExtraction::with_pages(&["body text"]));
    services.metadata_inference = Some(Arc::new(FakeInference { result: None }));
    let h = harness(test_config(), services);

    let upload = h.stage("upload", b"%PDF-");
    h.ingest("doc-1", personal("u1"), &upload, "odd.pdf")
        .await
        .unwrap();

    let doc = h.metadata.get("doc-1").await.unwrap().unwrap();
    assert!(doc.title.is_none());
    assert_eq!(doc.status, "Processing complete");
    assert_eq!(doc.percentage_complete, 100);
}

#[tokio::test]
async fn sharing_after_ingestion_reaches_chunk_records() {
    let h = harness(test_config(), base_services());
    let upload = h.stage("upload", b"shareable words");
    h.ingest("doc-1", personal("u1"), &upload, "notes.txt")
        .await
        .unwrap();

    let manager = DocumentManager::new(h.metadata.clone(), h.chunks.clone());
    manager.share("doc-1", "u1", "u2").await.unwrap();
    manager.approve("doc-1", "u2").await.unwrap();

    let chunks = h.chunks.chunks_for_document("doc-1").await.unwrap();
    assert!(!chunks.is_empty());
    assert!(chunks
        .iter()
        .all(|c| c.sharing[0].id == "u2" && c.sharing[0].status == ApprovalStatus::Approved));
}
