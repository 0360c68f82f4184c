//! Error types for the flow engine.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Step error: {0}")]
    Step(#[from] StepError),

    #[error("Download detection error: {0}")]
    Detect(#[from] DetectError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Automation session construction and teardown errors.
///
/// Any of these is fatal to the owning job — session construction is
/// never retried.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("WebDriver endpoint {url} is not reachable")]
    Unreachable { url: String },

    #[error("failed to start WebDriver session: {0}")]
    NewSession(#[from] fantoccini::error::NewSessionError),

    #[error("failed to configure session: {0}")]
    Setup(#[from] fantoccini::error::CmdError),
}

/// Failures raised while executing a single step.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("timed out after {timeout:?} waiting for {condition}")]
    WaitTimeout { condition: String, timeout: Duration },

    #[error("element not found: {locator}")]
    ElementNotFound { locator: String },

    #[error("click intercepted: {locator}")]
    ClickIntercepted { locator: String },

    #[error("expected text {expected:?} not present in element text")]
    TextMismatch { expected: String },

    #[error("download not detected within {timeout:?}")]
    DownloadTimeout { timeout: Duration },

    #[error("{action} step requires a target")]
    MissingTarget { action: String },

    #[error("{action} step requires a value")]
    MissingValue { action: String },

    #[error("invalid {action} value {value:?}: {reason}")]
    InvalidValue {
        action: String,
        value: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("webdriver command failed: {0}")]
    Driver(#[from] fantoccini::error::CmdError),
}

impl StepError {
    /// Whether the interpreter may retry this failure within a step's
    /// bounded retry budget. Covers wait timeouts, missing elements,
    /// intercepted clicks, and text assertions; everything else aborts
    /// the step on first occurrence.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::WaitTimeout { .. }
            | Self::ElementNotFound { .. }
            | Self::ClickIntercepted { .. }
            | Self::TextMismatch { .. } => true,
            Self::Driver(err) => driver_transient(err),
            _ => false,
        }
    }

    /// Configuration-class errors abort the job regardless of the step's
    /// `optional` flag.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::MissingTarget { .. } | Self::MissingValue { .. } | Self::InvalidValue { .. }
        )
    }
}

/// Classify raw WebDriver failures that map onto the transient taxonomy.
fn driver_transient(err: &fantoccini::error::CmdError) -> bool {
    if err.is_no_such_element() {
        return true;
    }
    let text = err.to_string();
    text.contains("click intercepted") || text.contains("stale element")
}

/// Download-detector errors.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("no stable download appeared within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("invalid name pattern {pattern:?}: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Job-store errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job {id} not found")]
    NotFound { id: Uuid },

    #[error("job {id} already in state {state}, cannot transition to {target}")]
    InvalidTransition {
        id: Uuid,
        state: String,
        target: String,
    },

    #[error("failed to create output directory for job {id}: {reason}")]
    OutputDir { id: Uuid, reason: String },
}

/// Document-text-extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported document type: {path}")]
    Unsupported { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tool execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool {0} not found")]
    NotFound(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("path escapes sandbox: {0}")]
    NotAuthorized(String),
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
