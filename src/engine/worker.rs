//! Per-job worker execution.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Utc;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::detect;
use crate::engine::interpreter::{RunOutcome, StepRunner};
use crate::engine::job::DownloadResult;
use crate::engine::state::JobState;
use crate::engine::store::JobStore;
use crate::session::SessionFactory;

/// Shared dependencies for worker execution.
#[derive(Clone)]
pub struct WorkerDeps {
    pub config: EngineConfig,
    pub store: Arc<JobStore>,
    pub factory: Arc<dyn SessionFactory>,
}

/// Worker that executes a single job from start to terminal state.
pub struct Worker {
    job_id: Uuid,
    deps: WorkerDeps,
}

impl Worker {
    pub fn new(job_id: Uuid, deps: WorkerDeps) -> Self {
        Self { job_id, deps }
    }

    /// Run the job to a terminal state. Never panics the pool; every exit
    /// path stamps the job.
    pub async fn run(self) {
        let Some(cancel) = self.deps.store.cancel_flag(self.job_id).await else {
            tracing::error!(job = %self.job_id, "job disappeared before execution");
            return;
        };

        if cancel.load(Ordering::SeqCst) {
            self.finish(JobState::Canceled, "canceled before start", None)
                .await;
            return;
        }

        let started = self
            .deps
            .store
            .update(self.job_id, |job| {
                job.transition_to(JobState::Running, None)?;
                Ok::<_, crate::error::JobError>((
                    job.steps.clone(),
                    job.output_dir.clone(),
                    job.started_at.unwrap_or(job.created_at),
                ))
            })
            .await;

        let (steps, output_dir, started_at) = match started {
            Ok(Ok(fields)) => fields,
            Ok(Err(err)) | Err(err) => {
                tracing::error!(job = %self.job_id, error = %err, "could not start job");
                return;
            }
        };

        tracing::info!(job = %self.job_id, steps = steps.len(), "worker starting");

        let session = match self.deps.factory.create(&output_dir).await {
            Ok(session) => session,
            Err(err) => {
                tracing::error!(job = %self.job_id, error = %err, "session construction failed");
                self.finish(
                    JobState::Failed,
                    format!("session construction failed: {err}"),
                    None,
                )
                .await;
                return;
            }
        };

        let runner = StepRunner::new(session.as_ref(), &self.deps.config, &output_dir);
        let outcome = runner.run(&steps, cancel.as_ref()).await;

        // Teardown is unconditional and must never mask the outcome.
        if let Err(err) = session.close().await {
            tracing::warn!(job = %self.job_id, error = %err, "session teardown failed");
        }

        match outcome {
            Ok(RunOutcome::Completed { download }) => {
                let result = match download {
                    Some(result) => Some(result),
                    None => self.detect_leftover(&output_dir, started_at).await,
                };
                self.finish(JobState::Success, "ok", result).await;
            }
            Ok(RunOutcome::Canceled { steps_run }) => {
                tracing::info!(job = %self.job_id, steps_run, "job canceled");
                self.finish(JobState::Canceled, "canceled by caller", None)
                    .await;
            }
            Err(failure) => {
                tracing::warn!(job = %self.job_id, error = %failure.error, "job failed");
                self.finish(JobState::Failed, failure.to_string(), None).await;
            }
        }
    }

    /// Best-effort capture of a download no step waited for. Only files
    /// modified after the job started are considered, so a pre-existing
    /// file is never attributed to this job.
    async fn detect_leftover(
        &self,
        output_dir: &std::path::Path,
        started_at: chrono::DateTime<Utc>,
    ) -> Option<DownloadResult> {
        match detect::latest_file(output_dir, started_at).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(job = %self.job_id, error = %err, "leftover detection failed");
                None
            }
        }
    }

    /// Stamp the terminal state, message, and result. A canceled job's
    /// result is discarded by passing `None`.
    async fn finish(
        &self,
        state: JobState,
        message: impl Into<String>,
        result: Option<DownloadResult>,
    ) {
        let message = message.into();
        let updated = self
            .deps
            .store
            .update(self.job_id, move |job| {
                job.result = result;
                job.transition_to(state, Some(message))
            })
            .await;

        match updated {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!(job = %self.job_id, error = %err, "invalid terminal transition")
            }
            Err(err) => tracing::error!(job = %self.job_id, error = %err, "job vanished"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::job::{ActionKind, FlowJob, Step};
    use crate::session::testkit::{ScriptedFactory, ScriptedSession, SessionCall};
    use std::time::Duration;
    use tempfile::TempDir;

    fn deps(factory: ScriptedFactory, root: &TempDir) -> WorkerDeps {
        WorkerDeps {
            config: EngineConfig {
                download_root: root.path().to_path_buf(),
                default_step_timeout: Duration::from_millis(100),
                wait_probe_interval: Duration::from_millis(100),
                retry_delay: Duration::from_millis(10),
                ..EngineConfig::default()
            },
            store: Arc::new(JobStore::new()),
            factory: Arc::new(factory),
        }
    }

    async fn insert_job(deps: &WorkerDeps, root: &TempDir, steps: Vec<Step>) -> Uuid {
        let id = Uuid::new_v4();
        let dir = root.path().join(id.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        deps.store.insert(FlowJob::new(id, dir, steps)).await;
        id
    }

    #[tokio::test]
    async fn session_closes_even_when_a_step_fails() {
        let root = TempDir::new().unwrap();
        let session = ScriptedSession::new().never_clickable();
        let factory = ScriptedFactory::new();
        factory.push(session.clone());
        let deps = deps(factory, &root);

        let steps = vec![
            Step::new(ActionKind::Click)
                .with_target("#never")
                .with_timeout_secs(1),
        ];
        let id = insert_job(&deps, &root, steps).await;

        Worker::new(id, deps.clone()).run().await;

        let snap = deps.store.snapshot(id).await.unwrap();
        assert_eq!(snap.state, JobState::Failed);
        assert!(snap.message.contains("timed out"));
        assert!(snap.finished_at.is_some());
        assert!(session.calls().contains(&SessionCall::Close));
    }

    #[tokio::test]
    async fn session_construction_failure_is_fatal() {
        let root = TempDir::new().unwrap();
        let deps = deps(ScriptedFactory::failing(), &root);
        let id = insert_job(
            &deps,
            &root,
            vec![Step::new(ActionKind::Navigate).with_value("https://x")],
        )
        .await;

        Worker::new(id, deps.clone()).run().await;

        let snap = deps.store.snapshot(id).await.unwrap();
        assert_eq!(snap.state, JobState::Failed);
        assert!(snap.message.contains("session construction failed"));
    }

    #[tokio::test]
    async fn pre_start_cancel_runs_nothing() {
        let root = TempDir::new().unwrap();
        let factory = ScriptedFactory::new();
        let deps = deps(factory, &root);
        let id = insert_job(
            &deps,
            &root,
            vec![Step::new(ActionKind::Navigate).with_value("https://x")],
        )
        .await;
        deps.store.cancel(id).await.unwrap();

        Worker::new(id, deps.clone()).run().await;

        let snap = deps.store.snapshot(id).await.unwrap();
        assert_eq!(snap.state, JobState::Canceled);
        assert!(snap.started_at.is_none());
        assert!(snap.result.is_none());
    }
}
