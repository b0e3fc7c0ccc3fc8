//! Bounded worker pool for ingestion tasks.
//!
//! One background task per document upload, keyed by `document_id`.
//! Documents run in parallel up to the configured limit; within one
//! document the pipeline is strictly sequential.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::models::Scope;
use crate::pipeline::Orchestrator;

pub struct WorkerPool {
    orchestrator: Arc<Orchestrator>,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(orchestrator: Arc<Orchestrator>, max_concurrent: usize) -> Self {
        Self {
            orchestrator,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Spawn an ingestion task. The handle resolves when the pipeline has
    /// run to completion or failure; mid-pipeline cancellation is not
    /// supported.
    pub fn spawn_ingest(
        &self,
        document_id: String,
        scope: Scope,
        temp_file: PathBuf,
        original_name: String,
    ) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let permits = self.permits.clone();

        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            if let Err(err) = orchestrator
                .ingest(&document_id, scope, &temp_file, &original_name)
                .await
            {
                tracing::error!(document_id, error = %err, "ingestion task failed");
            }
        })
    }
}
