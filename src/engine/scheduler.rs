//! Flow scheduling — submission, status, cancellation, and the bounded
//! worker pool.

use std::collections::HashMap;
use std::path::Component;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::job::{FlowJob, JobSnapshot, Step};
use crate::engine::store::{CancelOutcome, JobStore};
use crate::engine::worker::{Worker, WorkerDeps};
use crate::error::{Error, JobError};
use crate::session::SessionFactory;

/// Accepts flows, hands them to a bounded worker pool, and serves
/// status/cancel/list queries.
///
/// `submit` never blocks waiting for a worker: excess submissions queue on
/// the pool's semaphore and start in submission order as permits free up.
pub struct FlowScheduler {
    config: EngineConfig,
    store: Arc<JobStore>,
    factory: Arc<dyn SessionFactory>,
    permits: Arc<Semaphore>,
    workers: RwLock<HashMap<Uuid, JoinHandle<()>>>,
}

impl FlowScheduler {
    pub fn new(config: EngineConfig, factory: Arc<dyn SessionFactory>) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_workers.max(1)));
        Self {
            config,
            store: Arc::new(JobStore::new()),
            factory,
            permits,
            workers: RwLock::new(HashMap::new()),
        }
    }

    /// Create a job for the given steps and enqueue it. Returns as soon as
    /// the job is stored at PENDING.
    pub async fn submit(
        &self,
        steps: Vec<Step>,
        output_subdir: Option<&str>,
    ) -> Result<Uuid, Error> {
        let id = Uuid::new_v4();

        let mut output_dir = self.config.download_root.clone();
        if let Some(subdir) = output_subdir {
            validate_subdir(subdir)?;
            output_dir.push(subdir);
        }
        output_dir.push(id.to_string());

        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|err| JobError::OutputDir {
                id,
                reason: err.to_string(),
            })?;

        self.store.insert(FlowJob::new(id, output_dir, steps)).await;

        let worker = Worker::new(
            id,
            WorkerDeps {
                config: self.config.clone(),
                store: self.store.clone(),
                factory: self.factory.clone(),
            },
        );
        let permits = self.permits.clone();
        let handle = tokio::spawn(async move {
            // A closed pool (shutdown) yields no permit; the worker still
            // runs so it can observe its cancel flag and stamp the job.
            let _permit = permits.acquire_owned().await.ok();
            worker.run().await;
        });

        let mut workers = self.workers.write().await;
        workers.retain(|_, handle| !handle.is_finished());
        workers.insert(id, handle);
        drop(workers);

        tracing::info!(job = %id, "flow submitted");
        Ok(id)
    }

    /// Immutable snapshot of the job's current fields.
    pub async fn status(&self, id: Uuid) -> Result<JobSnapshot, JobError> {
        self.store
            .snapshot(id)
            .await
            .ok_or(JobError::NotFound { id })
    }

    /// Set the job's cancel signal. The worker observes it at the next
    /// step boundary.
    pub async fn cancel(&self, id: Uuid) -> Result<CancelOutcome, JobError> {
        let outcome = self.store.cancel(id).await?;
        tracing::info!(job = %id, already_terminal = outcome.already_terminal, "cancel requested");
        Ok(outcome)
    }

    /// Snapshots of every job, oldest first.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        self.store.list().await
    }

    /// Signal every job to stop, then wait for in-flight workers to drain.
    pub async fn shutdown(&self) {
        self.store.cancel_all().await;
        self.permits.close();
        let handles: Vec<JoinHandle<()>> = self
            .workers
            .write()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for result in join_all(handles).await {
            if let Err(err) = result {
                if !err.is_cancelled() {
                    tracing::warn!(error = %err, "worker task panicked during shutdown");
                }
            }
        }
    }
}

/// An output subdirectory must stay inside the download root.
fn validate_subdir(subdir: &str) -> Result<(), Error> {
    let ok = !subdir.is_empty()
        && std::path::Path::new(subdir)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(())
    } else {
        Err(crate::error::ConfigError::InvalidValue {
            key: "output_subdir".to_string(),
            message: format!("{subdir:?} must be a relative path without traversal"),
        }
        .into())
    }
}
