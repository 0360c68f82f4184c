//! Job state machine.

use serde::{Deserialize, Serialize};

/// State of a flow job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Job is queued and waiting for a worker.
    Pending,
    /// Job is being executed by its worker.
    Running,
    /// All steps ran to completion.
    Success,
    /// A step failed or the session could not be built.
    Failed,
    /// The cancel signal was observed before or between steps.
    Canceled,
}

impl JobState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: JobState) -> bool {
        use JobState::*;

        matches!(
            (self, target),
            (Pending, Running) | (Pending, Canceled) |
            (Running, Success) | (Running, Failed) | (Running, Canceled)
        )
    }

    /// Check if this is a terminal state. Terminal jobs never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        };
        write!(f, "{s}")
    }
}
