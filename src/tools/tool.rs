//! Tool abstraction for the agent-facing surface.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub use crate::error::ToolError;

/// Result payload returned by a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    pub result: Value,
    #[serde(skip)]
    pub duration: Duration,
}

impl ToolOutput {
    pub fn success(result: Value, duration: Duration) -> Self {
        Self { result, duration }
    }
}

/// Definition advertised to the calling agent.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A capability the calling agent can invoke. The transport that carries
/// the invocation is out of scope; parameters arrive as JSON.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the accepted parameters.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError>;
}

/// Fetch a required string parameter.
pub fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    params.get(key).and_then(|v| v.as_str()).ok_or_else(|| {
        ToolError::InvalidParameters(format!("missing required string parameter `{key}`"))
    })
}
