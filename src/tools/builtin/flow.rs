//! Flow-engine tools: submit, status, cancel, list.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::engine::{FlowScheduler, Step};
use crate::error::JobError;
use crate::tools::tool::{Tool, ToolError, ToolOutput, require_str};

fn parse_job_id(params: &Value) -> Result<Uuid, ToolError> {
    let raw = require_str(params, "job_id")?;
    raw.parse()
        .map_err(|_| ToolError::InvalidParameters(format!("`{raw}` is not a valid job id")))
}

fn job_error(err: JobError) -> ToolError {
    ToolError::ExecutionFailed(err.to_string())
}

// ── submit_flow ─────────────────────────────────────────────────────

/// Start a flow and return its job id immediately.
pub struct SubmitFlowTool {
    scheduler: Arc<FlowScheduler>,
}

impl SubmitFlowTool {
    pub fn new(scheduler: Arc<FlowScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for SubmitFlowTool {
    fn name(&self) -> &str {
        "submit_flow"
    }

    fn description(&self) -> &str {
        "Start an ordered browser-automation flow (navigate, click, type, waits, \
         download detection). Returns a job_id right away; poll flow_status for progress."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "steps": {
                    "type": "array",
                    "description": "Ordered step list. Each step: {action, target?, value?, timeout_secs?, retry_count?, optional?}",
                    "items": {"type": "object"}
                },
                "output_subdir": {
                    "type": "string",
                    "description": "Optional subdirectory under the download root to group this job's output"
                }
            },
            "required": ["steps"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();

        let steps = params
            .get("steps")
            .cloned()
            .ok_or_else(|| ToolError::InvalidParameters("missing `steps`".to_string()))?;
        let steps: Vec<Step> = serde_json::from_value(steps)
            .map_err(|err| ToolError::InvalidParameters(format!("bad step list: {err}")))?;
        let output_subdir = params.get("output_subdir").and_then(|v| v.as_str());

        let job_id = self
            .scheduler
            .submit(steps, output_subdir)
            .await
            .map_err(|err| ToolError::ExecutionFailed(err.to_string()))?;

        Ok(ToolOutput::success(
            json!({ "job_id": job_id }),
            start.elapsed(),
        ))
    }
}

// ── flow_status ─────────────────────────────────────────────────────

/// Poll one job's state, message, timestamps, and result.
pub struct FlowStatusTool {
    scheduler: Arc<FlowScheduler>,
}

impl FlowStatusTool {
    pub fn new(scheduler: Arc<FlowScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for FlowStatusTool {
    fn name(&self) -> &str {
        "flow_status"
    }

    fn description(&self) -> &str {
        "Current status of a flow job: state (PENDING/RUNNING/SUCCESS/FAILED/CANCELED), \
         message, timestamps, output directory, and download result when present."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "job_id": {"type": "string", "description": "Id returned by submit_flow"}
            },
            "required": ["job_id"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let job_id = parse_job_id(&params)?;
        let snapshot = self.scheduler.status(job_id).await.map_err(job_error)?;
        let result = serde_json::to_value(&snapshot)
            .map_err(|err| ToolError::ExecutionFailed(err.to_string()))?;
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

// ── cancel_flow ─────────────────────────────────────────────────────

/// Request cooperative cancellation of a job.
pub struct CancelFlowTool {
    scheduler: Arc<FlowScheduler>,
}

impl CancelFlowTool {
    pub fn new(scheduler: Arc<FlowScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for CancelFlowTool {
    fn name(&self) -> &str {
        "cancel_flow"
    }

    fn description(&self) -> &str {
        "Cancel a flow job. Cancellation is cooperative: the job stops at the next \
         step boundary. Has no effect on a job that already finished."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "job_id": {"type": "string", "description": "Id returned by submit_flow"}
            },
            "required": ["job_id"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let job_id = parse_job_id(&params)?;
        let outcome = self.scheduler.cancel(job_id).await.map_err(job_error)?;
        Ok(ToolOutput::success(
            json!({ "ok": outcome.ok, "already_terminal": outcome.already_terminal }),
            start.elapsed(),
        ))
    }
}

// ── list_flows ──────────────────────────────────────────────────────

/// List every known job, oldest first.
pub struct ListFlowsTool {
    scheduler: Arc<FlowScheduler>,
}

impl ListFlowsTool {
    pub fn new(scheduler: Arc<FlowScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for ListFlowsTool {
    fn name(&self) -> &str {
        "list_flows"
    }

    fn description(&self) -> &str {
        "List all flow jobs with their current status, oldest first."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "required": []})
    }

    async fn execute(&self, _params: Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let jobs = self.scheduler.list().await;
        let jobs = serde_json::to_value(&jobs)
            .map_err(|err| ToolError::ExecutionFailed(err.to_string()))?;
        Ok(ToolOutput::success(
            json!({ "jobs": jobs }),
            start.elapsed(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::JobState;
    use crate::session::testkit::ScriptedFactory;
    use std::time::Duration;
    use tempfile::TempDir;

    fn scheduler(root: &TempDir) -> Arc<FlowScheduler> {
        let config = EngineConfig {
            download_root: root.path().to_path_buf(),
            default_step_timeout: Duration::from_millis(100),
            wait_probe_interval: Duration::from_millis(50),
            retry_delay: Duration::from_millis(10),
            ..EngineConfig::default()
        };
        Arc::new(FlowScheduler::new(config, Arc::new(ScriptedFactory::new())))
    }

    async fn wait_terminal(scheduler: &FlowScheduler, id: Uuid) -> JobState {
        for _ in 0..200 {
            let snap = scheduler.status(id).await.unwrap();
            if snap.state.is_terminal() {
                return snap.state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never reached a terminal state");
    }

    #[tokio::test]
    async fn submit_then_status_roundtrip() {
        let root = TempDir::new().unwrap();
        let scheduler = scheduler(&root);

        let submit = SubmitFlowTool::new(scheduler.clone());
        let output = submit
            .execute(json!({
                "steps": [
                    {"action": "navigate", "value": "https://example.com"},
                    {"action": "execute_script", "value": "return 1;"}
                ]
            }))
            .await
            .unwrap();
        let job_id: Uuid = output.result["job_id"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();

        assert_eq!(wait_terminal(&scheduler, job_id).await, JobState::Success);

        let status = FlowStatusTool::new(scheduler.clone());
        let output = status
            .execute(json!({"job_id": job_id.to_string()}))
            .await
            .unwrap();
        assert_eq!(output.result["state"], "SUCCESS");
        assert_eq!(output.result["message"], "ok");

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_steps_are_rejected() {
        let root = TempDir::new().unwrap();
        let scheduler = scheduler(&root);
        let submit = SubmitFlowTool::new(scheduler.clone());

        let err = submit
            .execute(json!({"steps": [{"action": "fly_to_the_moon"}]}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));

        let err = submit.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn status_of_unknown_job_fails() {
        let root = TempDir::new().unwrap();
        let scheduler = scheduler(&root);
        let status = FlowStatusTool::new(scheduler.clone());

        let err = status
            .execute(json!({"job_id": Uuid::new_v4().to_string()}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(_)));

        let err = status
            .execute(json!({"job_id": "not-a-uuid"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn cancel_and_list_report_jobs() {
        let root = TempDir::new().unwrap();
        let scheduler = scheduler(&root);

        let submit = SubmitFlowTool::new(scheduler.clone());
        let output = submit
            .execute(json!({
                "steps": [{"action": "sleep", "value": "2"}]
            }))
            .await
            .unwrap();
        let job_id = output.result["job_id"].as_str().unwrap().to_string();

        let cancel = CancelFlowTool::new(scheduler.clone());
        let output = cancel.execute(json!({"job_id": job_id})).await.unwrap();
        assert_eq!(output.result["ok"], true);

        let list = ListFlowsTool::new(scheduler.clone());
        let output = list.execute(json!({})).await.unwrap();
        assert_eq!(output.result["jobs"].as_array().unwrap().len(), 1);

        scheduler.shutdown().await;
    }
}
