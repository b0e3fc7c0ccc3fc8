use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub video_index: VideoIndexConfig,
    #[serde(default)]
    pub citations: CitationsConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Maximum accepted upload size for non-audio formats, in megabytes.
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,
    /// Ceiling for audio uploads, in megabytes; replaces `max_upload_mb`
    /// for the audio family.
    #[serde(default = "default_audio_max_mb")]
    pub audio_max_mb: u64,
}

fn default_max_upload_mb() -> u64 {
    150
}
fn default_audio_max_mb() -> u64 {
    300
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_mb: default_max_upload_mb(),
            audio_max_mb: default_audio_max_mb(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeaturesConfig {
    #[serde(default = "default_true")]
    pub video_support: bool,
    #[serde(default = "default_true")]
    pub audio_support: bool,
    #[serde(default = "default_true")]
    pub metadata_extraction: bool,
    /// Retain original file bytes in object storage for citations.
    #[serde(default)]
    pub enhanced_citations: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            video_support: true,
            audio_support: true,
            metadata_extraction: true,
            enhanced_citations: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Fixed window for plain text, Word re-flow, and audio transcripts.
    #[serde(default = "default_words_per_chunk")]
    pub words_per_chunk: usize,
    /// Minimum words before a markup fragment may stand alone.
    #[serde(default = "default_markup_min_words")]
    pub markup_min_words: usize,
    /// Target words per merged markup chunk.
    #[serde(default = "default_markup_target_words")]
    pub markup_target_words: usize,
    /// Hard character ceiling for JSON fragments.
    #[serde(default = "default_json_max_chars")]
    pub json_max_chars: usize,
    /// Character ceiling for tabular data rows, header excluded.
    #[serde(default = "default_tabular_max_chars")]
    pub tabular_max_chars: usize,
}

fn default_words_per_chunk() -> usize {
    400
}
fn default_markup_min_words() -> usize {
    600
}
fn default_markup_target_words() -> usize {
    1200
}
fn default_json_max_chars() -> usize {
    4000
}
fn default_tabular_max_chars() -> usize {
    800
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            words_per_chunk: default_words_per_chunk(),
            markup_min_words: default_markup_min_words(),
            markup_target_words: default_markup_target_words(),
            json_max_chars: default_json_max_chars(),
            tabular_max_chars: default_tabular_max_chars(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Page ceiling accepted by the extraction service; oversized paginated
    /// sources are pre-split into sub-files of at most a quarter of this.
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    /// Size ceiling accepted by the extraction service, in megabytes.
    #[serde(default = "default_extraction_size_mb")]
    pub size_limit_mb: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Wall-clock ceiling for a single extraction job.
    #[serde(default = "default_poll_ceiling_secs")]
    pub poll_ceiling_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_page_limit() -> usize {
    2000
}
fn default_extraction_size_mb() -> u64 {
    500
}
fn default_poll_interval_secs() -> u64 {
    30
}
fn default_poll_ceiling_secs() -> u64 {
    600
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_max_attempts() -> u32 {
    5
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            page_limit: default_page_limit(),
            size_limit_mb: default_extraction_size_mb(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_ceiling_secs: default_poll_ceiling_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_retries: u32,
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: None,
            timeout_secs: default_embedding_timeout_secs(),
            max_retries: default_max_attempts(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptionConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Maximum segment duration accepted by the service, in seconds.
    #[serde(default = "default_segment_secs")]
    pub max_segment_secs: u64,
}

fn default_locale() -> String {
    "en-US".to_string()
}
fn default_segment_secs() -> u64 {
    540
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            locale: default_locale(),
            max_segment_secs: default_segment_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VideoIndexConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_video_poll_ceiling_secs")]
    pub poll_ceiling_secs: u64,
}

fn default_video_poll_ceiling_secs() -> u64 {
    1800
}

impl Default for VideoIndexConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            poll_interval_secs: default_poll_interval_secs(),
            poll_ceiling_secs: default_video_poll_ceiling_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CitationsConfig {
    /// Object-storage gateway endpoint for original-file retention.
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkersConfig {
    /// Maximum ingestion tasks running concurrently across documents.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.limits.max_upload_mb == 0 {
        anyhow::bail!("limits.max_upload_mb must be > 0");
    }
    if config.chunking.words_per_chunk == 0 {
        anyhow::bail!("chunking.words_per_chunk must be > 0");
    }
    if config.chunking.markup_min_words > config.chunking.markup_target_words {
        anyhow::bail!("chunking.markup_min_words must not exceed markup_target_words");
    }
    if config.chunking.tabular_max_chars == 0 {
        anyhow::bail!("chunking.tabular_max_chars must be > 0");
    }
    if config.extraction.page_limit < 4 {
        anyhow::bail!("extraction.page_limit must be >= 4");
    }
    if config.workers.max_concurrent == 0 {
        anyhow::bail!("workers.max_concurrent must be > 0");
    }
    if config.features.enhanced_citations && config.citations.endpoint.is_none() {
        anyhow::bail!("citations.endpoint is required when features.enhanced_citations is enabled");
    }
    Ok(())
}
