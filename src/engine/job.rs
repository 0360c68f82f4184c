//! Flow, step, and result models.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::state::JobState;
use crate::error::JobError;

/// Operation a step performs against the automation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    WaitVisible,
    WaitClickable,
    WaitInvisible,
    WaitUrlContains,
    WaitForDownload,
    Sleep,
    ExecuteScript,
    ExpectText,
    Screenshot,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::Click => "click",
            Self::Type => "type",
            Self::WaitVisible => "wait_visible",
            Self::WaitClickable => "wait_clickable",
            Self::WaitInvisible => "wait_invisible",
            Self::WaitUrlContains => "wait_url_contains",
            Self::WaitForDownload => "wait_for_download",
            Self::Sleep => "sleep",
            Self::ExecuteScript => "execute_script",
            Self::ExpectText => "expect_text",
            Self::Screenshot => "screenshot",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declarative instruction within a flow. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub action: ActionKind,
    /// Target-element descriptor (CSS selector or XPath, see `Locator`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// URL, text, script code, URL substring, name glob, or seconds,
    /// depending on the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Per-step wait budget; falls back to the engine default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Additional attempts after a transient failure.
    #[serde(default)]
    pub retry_count: u32,
    /// Suppress this step's failure instead of aborting the job.
    #[serde(default)]
    pub optional: bool,
}

impl Step {
    pub fn new(action: ActionKind) -> Self {
        Self {
            action,
            target: None,
            value: None,
            timeout_secs: None,
            retry_count: 0,
            optional: false,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retry_count = retries;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Effective wait budget for this step.
    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_secs.map(Duration::from_secs).unwrap_or(default)
    }
}

/// Downloaded-artifact capture: path, size, and content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResult {
    pub file_path: PathBuf,
    pub file_size: u64,
    pub sha256: String,
}

/// One execution instance of a flow. Mutated only by the worker that owns
/// it; read concurrently through snapshots.
#[derive(Debug, Clone)]
pub struct FlowJob {
    pub id: Uuid,
    pub output_dir: PathBuf,
    pub state: JobState,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<Step>,
    pub result: Option<DownloadResult>,
}

impl FlowJob {
    pub fn new(id: Uuid, output_dir: PathBuf, steps: Vec<Step>) -> Self {
        Self {
            id,
            output_dir,
            state: JobState::Pending,
            message: String::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            steps,
            result: None,
        }
    }

    /// Transition to a new state, stamping timestamps. Rejected once the
    /// job is terminal.
    pub fn transition_to(
        &mut self,
        target: JobState,
        message: Option<String>,
    ) -> std::result::Result<(), JobError> {
        if !self.state.can_transition_to(target) {
            return Err(JobError::InvalidTransition {
                id: self.id,
                state: self.state.to_string(),
                target: target.to_string(),
            });
        }

        self.state = target;
        if let Some(message) = message {
            self.message = message;
        }
        match target {
            JobState::Running if self.started_at.is_none() => {
                self.started_at = Some(Utc::now());
            }
            JobState::Success | JobState::Failed | JobState::Canceled => {
                self.finished_at = Some(Utc::now());
            }
            _ => {}
        }
        Ok(())
    }

    /// Immutable copy of the caller-visible fields.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id,
            state: self.state,
            message: self.message.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            output_dir: self.output_dir.clone(),
            result: self.result.clone(),
        }
    }
}

/// Point-in-time view of a job, safe to hand to status/list callers.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub state: JobState,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub output_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DownloadResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&ActionKind::WaitForDownload).unwrap(),
            "\"wait_for_download\""
        );
        let parsed: ActionKind = serde_json::from_str("\"execute_script\"").unwrap();
        assert_eq!(parsed, ActionKind::ExecuteScript);
    }

    #[test]
    fn step_deserializes_with_defaults() {
        let step: Step = serde_json::from_str(r##"{"action": "click", "target": "#go"}"##).unwrap();
        assert_eq!(step.action, ActionKind::Click);
        assert_eq!(step.target.as_deref(), Some("#go"));
        assert_eq!(step.value, None);
        assert_eq!(step.retry_count, 0);
        assert!(!step.optional);
        assert_eq!(
            step.timeout(Duration::from_secs(20)),
            Duration::from_secs(20)
        );
    }

    #[test]
    fn step_timeout_prefers_own_budget() {
        let step = Step::new(ActionKind::WaitVisible)
            .with_target("#bar")
            .with_timeout_secs(5);
        assert_eq!(step.timeout(Duration::from_secs(20)), Duration::from_secs(5));
    }

    #[test]
    fn job_transitions_stamp_timestamps() {
        let mut job = FlowJob::new(Uuid::new_v4(), PathBuf::from("/tmp/x"), vec![]);
        assert_eq!(job.state, JobState::Pending);
        assert!(job.started_at.is_none());

        job.transition_to(JobState::Running, None).unwrap();
        assert!(job.started_at.is_some());
        assert!(job.finished_at.is_none());

        job.transition_to(JobState::Success, Some("ok".to_string()))
            .unwrap();
        assert_eq!(job.message, "ok");
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn terminal_job_rejects_further_transitions() {
        let mut job = FlowJob::new(Uuid::new_v4(), PathBuf::from("/tmp/x"), vec![]);
        job.transition_to(JobState::Running, None).unwrap();
        job.transition_to(JobState::Failed, Some("boom".to_string()))
            .unwrap();

        let err = job
            .transition_to(JobState::Success, None)
            .expect_err("terminal state must be frozen");
        assert!(matches!(err, JobError::InvalidTransition { .. }));
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.message, "boom");
    }

    #[test]
    fn snapshot_carries_caller_visible_fields() {
        let id = Uuid::new_v4();
        let mut job = FlowJob::new(id, PathBuf::from("/tmp/out"), vec![]);
        job.result = Some(DownloadResult {
            file_path: PathBuf::from("/tmp/out/a.csv"),
            file_size: 42,
            sha256: "deadbeef".to_string(),
        });

        let snap = job.snapshot();
        assert_eq!(snap.job_id, id);
        assert_eq!(snap.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(snap.result.unwrap().file_size, 42);
    }
}
