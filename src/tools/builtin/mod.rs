//! Built-in tools exposing the flow engine, artifact extraction, and
//! sandboxed download browsing.

pub mod artifact;
pub mod file;
pub mod flow;

pub use artifact::ArtifactTextTool;
pub use file::{FindDownloadTool, ListDownloadsTool};
pub use flow::{CancelFlowTool, FlowStatusTool, ListFlowsTool, SubmitFlowTool};

use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::FlowScheduler;
use crate::extract::DocumentExtractor;
use crate::tools::registry::ToolRegistry;

/// Register every built-in tool against one engine instance.
pub async fn register_builtin(
    registry: &ToolRegistry,
    scheduler: Arc<FlowScheduler>,
    extractor: Arc<dyn DocumentExtractor>,
    download_root: PathBuf,
) {
    registry
        .register(Arc::new(SubmitFlowTool::new(scheduler.clone())))
        .await;
    registry
        .register(Arc::new(FlowStatusTool::new(scheduler.clone())))
        .await;
    registry
        .register(Arc::new(CancelFlowTool::new(scheduler.clone())))
        .await;
    registry
        .register(Arc::new(ListFlowsTool::new(scheduler.clone())))
        .await;
    registry
        .register(Arc::new(ArtifactTextTool::new(scheduler, extractor)))
        .await;
    registry
        .register(Arc::new(ListDownloadsTool::new(download_root.clone())))
        .await;
    registry
        .register(Arc::new(FindDownloadTool::new(download_root)))
        .await;
}
