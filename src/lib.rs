//! # docpipe
//!
//! A multi-tenant document ingestion, chunking, versioning, and sharing
//! pipeline for hybrid search.
//!
//! docpipe accepts heterogeneous uploads (text, markup, JSON, tabular,
//! office/PDF/image, audio, video) on behalf of personal, group, and
//! public-workspace scopes, splits each into retrieval-sized chunks with
//! format-specific policies, embeds and indexes them, and tracks progress
//! and version lineage per document. Sharing between tenants is
//! approval-gated and propagated from metadata records to chunk records.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────┐
//! │  Upload   │──▶│ Orchestrator │──▶│   Pipelines    │
//! │ (CLI/API) │   │ validate +   │   │ splitters/     │
//! └──────────┘   │ dispatch     │   │ longdoc/media  │
//!                └──────┬───────┘   └──────┬────────┘
//!                       │                  │ chunks + progress
//!                       ▼                  ▼
//!                ┌──────────────┐   ┌───────────────┐
//!                │ MetadataStore │   │  ChunkStore    │
//!                │ (authoritative)│◀─│ (projection)   │
//!                └──────────────┘   └───────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Documents, chunks, scopes, sharing entries |
//! | [`splitters`] | Format-specific split policies |
//! | [`extract`] | Local metadata probes and PDF pre-split |
//! | [`pipeline`] | Ingestion orchestrator and format pipelines |
//! | [`progress`] | Monotonic progress-percentage state machine |
//! | [`sharing`] | Version lineage and approval-gated sharing |
//! | [`services`] | External service traits and HTTP clients |
//! | [`store`] | Metadata and chunk store backends |
//! | [`worker`] | Bounded per-document task pool |

pub mod config;
pub mod error;
pub mod extract;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod services;
pub mod sharing;
pub mod splitters;
pub mod store;
pub mod worker;
