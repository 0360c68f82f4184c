//! Shared job registry and per-job cancel signals.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::engine::job::{FlowJob, JobSnapshot};
use crate::error::JobError;

/// Outcome of a cancel request.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CancelOutcome {
    pub ok: bool,
    /// The job had already finished; the signal was set but is harmless.
    pub already_terminal: bool,
}

struct JobEntry {
    job: FlowJob,
    cancel: Arc<AtomicBool>,
}

/// Process-wide registry of jobs.
///
/// Each job is written by exactly one worker and read by any number of
/// status/list callers; the lock scope is a single map access, so readers
/// always observe a consistent snapshot.
pub struct JobStore {
    jobs: RwLock<HashMap<Uuid, JobEntry>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Store a new job and arm its cancel signal.
    pub async fn insert(&self, job: FlowJob) -> Arc<AtomicBool> {
        let cancel = Arc::new(AtomicBool::new(false));
        self.jobs.write().await.insert(
            job.id,
            JobEntry {
                job,
                cancel: cancel.clone(),
            },
        );
        cancel
    }

    pub async fn snapshot(&self, id: Uuid) -> Option<JobSnapshot> {
        self.jobs.read().await.get(&id).map(|e| e.job.snapshot())
    }

    /// Snapshots of every job, oldest first.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<JobSnapshot> = self
            .jobs
            .read()
            .await
            .values()
            .map(|e| e.job.snapshot())
            .collect();
        snapshots.sort_by_key(|s| s.created_at);
        snapshots
    }

    pub async fn cancel_flag(&self, id: Uuid) -> Option<Arc<AtomicBool>> {
        self.jobs.read().await.get(&id).map(|e| e.cancel.clone())
    }

    /// Set a job's cancel signal. Idempotent; a no-op beyond signalling if
    /// the job is already terminal.
    pub async fn cancel(&self, id: Uuid) -> std::result::Result<CancelOutcome, JobError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(&id).ok_or(JobError::NotFound { id })?;
        entry.cancel.store(true, Ordering::SeqCst);
        Ok(CancelOutcome {
            ok: true,
            already_terminal: entry.job.state.is_terminal(),
        })
    }

    /// Set every job's cancel signal (engine shutdown).
    pub async fn cancel_all(&self) {
        for entry in self.jobs.read().await.values() {
            entry.cancel.store(true, Ordering::SeqCst);
        }
    }

    /// Run a mutation against a job under the write lock. Only the owning
    /// worker calls this.
    pub async fn update<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut FlowJob) -> T,
    ) -> std::result::Result<T, JobError> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&id).ok_or(JobError::NotFound { id })?;
        Ok(f(&mut entry.job))
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}
