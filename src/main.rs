//! # docpipe CLI
//!
//! Command-line interface for the docpipe ingestion pipeline. Provides
//! database initialization, document ingestion, progress inspection,
//! version listing, and sharing management.
//!
//! ## Usage
//!
//! ```bash
//! docpipe --config ./config/docpipe.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docpipe init` | Create the SQLite database and run schema migrations |
//! | `docpipe ingest <file>...` | Ingest files into a tenancy scope |
//! | `docpipe status <id>` | Show a document's status and progress |
//! | `docpipe versions <file>` | List version lineage for a file name |
//! | `docpipe share <id>` | Share a document with a user or group |
//! | `docpipe approve <id>` | Approve a pending share as the counterpart |
//! | `docpipe unshare <id>` | Remove a counterpart from the sharing list |
//! | `docpipe delete <id>` | Delete a document and its chunks |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! docpipe init --config ./config/docpipe.toml
//!
//! # Ingest a PDF into a personal scope
//! docpipe ingest report.pdf --user u-123
//!
//! # Share it, then approve as the counterpart
//! docpipe share <doc-id> --actor u-123 --with u-456
//! docpipe approve <doc-id> --by u-456
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use docpipe::config::{load_config, Config};
use docpipe::logging::init_tracing;
use docpipe::models::Scope;
use docpipe::pipeline::Orchestrator;
use docpipe::services::{
    embedding::HttpEmbeddingClient, extraction::HttpExtractionClient,
    storage::HttpObjectStorageClient, transcription::HttpTranscriptionClient,
    video::HttpVideoIndexClient, ServiceContext,
};
use docpipe::sharing::DocumentManager;
use docpipe::store::sqlite::{
    connect, run_migrations, SqliteChunkStore, SqliteMetadataStore,
};
use docpipe::store::{ChunkStore, MetadataStore};
use docpipe::worker::WorkerPool;

/// docpipe: multi-tenant document ingestion, chunking, versioning, and
/// sharing pipeline.
#[derive(Parser)]
#[command(
    name = "docpipe",
    about = "Multi-tenant document ingestion, chunking, versioning, and sharing pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docpipe.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Scope selector shared by commands that address a tenancy partition.
/// Exactly one of the three must be given.
#[derive(clap::Args)]
struct ScopeArgs {
    /// Personal scope: owning user id.
    #[arg(long, group = "scope")]
    user: Option<String>,

    /// Group scope: owning group id.
    #[arg(long, group = "scope")]
    group: Option<String>,

    /// Public workspace scope: workspace id.
    #[arg(long, group = "scope")]
    workspace: Option<String>,
}

impl ScopeArgs {
    fn to_scope(&self) -> Result<Scope> {
        match (&self.user, &self.group, &self.workspace) {
            (Some(id), None, None) => Ok(Scope::Personal(id.clone())),
            (None, Some(id), None) => Ok(Scope::Group(id.clone())),
            (None, None, Some(id)) => Ok(Scope::Public(id.clone())),
            _ => anyhow::bail!("exactly one of --user, --group, --workspace is required"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest one or more files into a tenancy scope.
    ///
    /// Each file runs the full pipeline: validation, format dispatch,
    /// chunking, embedding, progress tracking, and the final metadata
    /// pass. Files run concurrently up to `workers.max_concurrent`.
    Ingest {
        /// Paths of the files to ingest.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Document id to assign (single file only); a random id is
        /// generated when omitted.
        #[arg(long)]
        id: Option<String>,
    },

    /// Show a document's status, progress, and chunk counts.
    Status {
        /// Document id.
        id: String,
    },

    /// List the version lineage for a file name within a scope.
    Versions {
        /// Original file name.
        file_name: String,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Share a document with a user or group (owner only).
    Share {
        /// Document id.
        id: String,

        /// Acting owner id.
        #[arg(long)]
        actor: String,

        /// Counterpart user or group id to share with.
        #[arg(long = "with")]
        counterpart: String,
    },

    /// Approve a pending share as the counterpart.
    Approve {
        /// Document id.
        id: String,

        /// Approving counterpart id.
        #[arg(long)]
        by: String,
    },

    /// Remove a counterpart from a document's sharing list.
    Unshare {
        /// Document id.
        id: String,

        /// Acting id (the owner, or a shared user removing themselves).
        #[arg(long)]
        actor: String,

        /// Counterpart to remove.
        #[arg(long)]
        counterpart: String,
    },

    /// Delete a document and all of its chunks (owner only).
    Delete {
        /// Document id.
        id: String,

        /// Acting owner id.
        #[arg(long)]
        actor: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = connect(&config.db.path).await?;
            run_migrations(&pool).await?;
            println!("Database initialized at {}", config.db.path.display());
        }
        Commands::Ingest { files, scope, id } => {
            let scope = scope.to_scope()?;
            if id.is_some() && files.len() > 1 {
                anyhow::bail!("--id only applies to a single file");
            }
            let (metadata, chunks) = open_stores(&config).await?;
            let services = build_services(&config)?;
            let max_concurrent = config.workers.max_concurrent;
            let orchestrator =
                Arc::new(Orchestrator::new(config, metadata.clone(), chunks, services));
            let pool = WorkerPool::new(orchestrator, max_concurrent);

            let mut jobs = Vec::new();
            for file in files {
                let document_id = id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                let original_name = file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .with_context(|| format!("{} has no usable name", file.display()))?
                    .to_string();

                // The pipeline consumes and deletes its input; work on a copy.
                let temp_file = std::env::temp_dir().join(format!("docpipe-{document_id}"));
                tokio::fs::copy(&file, &temp_file).await?;

                let handle =
                    pool.spawn_ingest(document_id.clone(), scope.clone(), temp_file, original_name);
                jobs.push((document_id, handle));
            }

            for (document_id, handle) in jobs {
                handle.await?;
                match metadata.get(&document_id).await? {
                    Some(doc) => println!(
                        "{document_id}: {} ({}%), {} chunks, version {}",
                        doc.status, doc.percentage_complete, doc.num_chunks, doc.version
                    ),
                    None => println!("{document_id}: rejected before processing"),
                }
            }
        }
        Commands::Status { id } => {
            let (metadata, _) = open_stores(&config).await?;
            match metadata.get(&id).await? {
                Some(doc) => {
                    println!("id:       {}", doc.id);
                    println!("file:     {}", doc.file_name);
                    println!("version:  {}", doc.version);
                    println!("status:   {}", doc.status);
                    println!("progress: {}%", doc.percentage_complete);
                    println!("chunks:   {} of {}", doc.num_chunks, doc.number_of_pages);
                    if !doc.sharing.is_empty() {
                        println!("shared:");
                        for entry in &doc.sharing {
                            println!("  {} ({})", entry.id, entry.status.as_str());
                        }
                    }
                }
                None => anyhow::bail!("document {id} not found"),
            }
        }
        Commands::Versions { file_name, scope } => {
            let scope = scope.to_scope()?;
            let (metadata, _) = open_stores(&config).await?;
            let versions = metadata.versions(&scope, &file_name).await?;
            if versions.is_empty() {
                println!("No versions of {file_name}");
            }
            for doc in versions {
                println!(
                    "v{}  {}  {} ({}%)",
                    doc.version, doc.id, doc.status, doc.percentage_complete
                );
            }
        }
        Commands::Share {
            id,
            actor,
            counterpart,
        } => {
            let manager = open_manager(&config).await?;
            manager.share(&id, &actor, &counterpart).await?;
            println!("Shared {id} with {counterpart} (pending approval)");
        }
        Commands::Approve { id, by } => {
            let manager = open_manager(&config).await?;
            manager.approve(&id, &by).await?;
            println!("Approved sharing of {id} for {by}");
        }
        Commands::Unshare {
            id,
            actor,
            counterpart,
        } => {
            let manager = open_manager(&config).await?;
            manager.unshare(&id, &actor, &counterpart).await?;
            println!("Removed {counterpart} from {id}");
        }
        Commands::Delete { id, actor } => {
            let manager = open_manager(&config).await?;
            manager.delete_document(&id, &actor).await?;
            println!("Deleted {id}");
        }
    }

    Ok(())
}

async fn open_stores(config: &Config) -> Result<(Arc<dyn MetadataStore>, Arc<dyn ChunkStore>)> {
    let pool = connect(&config.db.path).await?;
    run_migrations(&pool).await?;
    Ok((
        Arc::new(SqliteMetadataStore::new(pool.clone())),
        Arc::new(SqliteChunkStore::new(pool)),
    ))
}

async fn open_manager(config: &Config) -> Result<DocumentManager> {
    let (metadata, chunks) = open_stores(config).await?;
    Ok(DocumentManager::new(metadata, chunks))
}

fn build_services(config: &Config) -> Result<ServiceContext> {
    let citations = if config.features.enhanced_citations {
        let endpoint = config
            .citations
            .endpoint
            .as_deref()
            .context("citations.endpoint is required when enhanced citations are enabled")?;
        Some(Arc::new(HttpObjectStorageClient::new(endpoint)?) as _)
    } else {
        None
    };

    Ok(ServiceContext {
        extraction: Arc::new(HttpExtractionClient::new(&config.extraction)?),
        embeddings: Arc::new(HttpEmbeddingClient::new(&config.embedding)?),
        transcription: Arc::new(HttpTranscriptionClient::new(&config.transcription)?),
        video: Arc::new(HttpVideoIndexClient::new(&config.video_index)?),
        citations,
        // Bibliographic inference is an optional deployment add-on with no
        // bundled client.
        metadata_inference: None,
    })
}
