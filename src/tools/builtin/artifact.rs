//! Artifact-text composition: feed a finished job's download into the
//! document-text-extraction boundary.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::engine::{FlowScheduler, JobState};
use crate::extract::DocumentExtractor;
use crate::tools::tool::{Tool, ToolError, ToolOutput, require_str};

/// Extract text from the artifact a successful flow downloaded.
pub struct ArtifactTextTool {
    scheduler: Arc<FlowScheduler>,
    extractor: Arc<dyn DocumentExtractor>,
}

impl ArtifactTextTool {
    pub fn new(scheduler: Arc<FlowScheduler>, extractor: Arc<dyn DocumentExtractor>) -> Self {
        Self {
            scheduler,
            extractor,
        }
    }
}

#[async_trait]
impl Tool for ArtifactTextTool {
    fn name(&self) -> &str {
        "artifact_text"
    }

    fn description(&self) -> &str {
        "Extract text (with chunk boundaries) from the file a successful flow job \
         downloaded. The job must be in state SUCCESS and carry a download result."
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

        let raw = require_str(&params, "job_id")?;
        let job_id: Uuid = raw
            .parse()
            .map_err(|_| ToolError::InvalidParameters(format!("`{raw}` is not a valid job id")))?;

        let snapshot = self
            .scheduler
            .status(job_id)
            .await
            .map_err(|err| ToolError::ExecutionFailed(err.to_string()))?;

        if snapshot.state != JobState::Success {
            return Err(ToolError::ExecutionFailed(format!(
                "job {job_id} is {}, not SUCCESS",
                snapshot.state
            )));
        }
        let Some(result) = snapshot.result else {
            return Err(ToolError::ExecutionFailed(format!(
                "job {job_id} has no downloaded artifact"
            )));
        };

        let extraction = self
            .extractor
            .extract(&result.file_path)
            .await
            .map_err(|err| ToolError::ExecutionFailed(err.to_string()))?;

        Ok(ToolOutput::success(
            json!({
                "file_path": result.file_path,
                "sha256": result.sha256,
                "text": extraction.text,
                "chunks": extraction.chunks,
            }),
            start.elapsed(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::extract::PlainTextExtractor;
    use crate::session::testkit::ScriptedFactory;
    use std::time::Duration;
    use tempfile::TempDir;

    fn scheduler(root: &TempDir) -> Arc<FlowScheduler> {
        let config = EngineConfig {
            download_root: root.path().to_path_buf(),
            default_step_timeout: Duration::from_millis(500),
            wait_probe_interval: Duration::from_millis(50),
            poll_interval: Duration::from_millis(25),
            ..EngineConfig::default()
        };
        Arc::new(FlowScheduler::new(config, Arc::new(ScriptedFactory::new())))
    }

    fn tool(scheduler: &Arc<FlowScheduler>) -> ArtifactTextTool {
        ArtifactTextTool::new(scheduler.clone(), Arc::new(PlainTextExtractor::new()))
    }

    #[tokio::test]
    async fn extracts_text_from_downloaded_artifact() {
        let root = TempDir::new().unwrap();
        let scheduler = scheduler(&root);

        let steps = vec![
            crate::engine::Step::new(crate::engine::ActionKind::WaitForDownload)
                .with_value("*.csv")
                .with_timeout_secs(5),
        ];
        let job_id = scheduler.submit(steps, None).await.unwrap();
        let output_dir = scheduler.status(job_id).await.unwrap().output_dir;
        std::fs::write(output_dir.join("grades.csv"), "name,grade\nbob,A\n").unwrap();

        for _ in 0..200 {
            if scheduler.status(job_id).await.unwrap().state.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let output = tool(&scheduler)
            .execute(json!({"job_id": job_id.to_string()}))
            .await
            .unwrap();
        assert!(output.result["text"].as_str().unwrap().contains("bob,A"));
        assert!(!output.result["chunks"].as_array().unwrap().is_empty());

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn job_without_artifact_is_an_error() {
        let root = TempDir::new().unwrap();
        let scheduler = scheduler(&root);

        let steps = vec![
            crate::engine::Step::new(crate::engine::ActionKind::ExecuteScript)
                .with_value("return 1;"),
        ];
        let job_id = scheduler.submit(steps, None).await.unwrap();
        for _ in 0..200 {
            if scheduler.status(job_id).await.unwrap().state.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let err = tool(&scheduler)
            .execute(json!({"job_id": job_id.to_string()}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no downloaded artifact"));

        scheduler.shutdown().await;
    }
}
