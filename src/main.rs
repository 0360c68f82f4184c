use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use flowrunner::config::EngineConfig;
use flowrunner::engine::{FlowScheduler, JobState, Step};
use flowrunner::extract::PlainTextExtractor;
use flowrunner::session::WebDriverFactory;
use flowrunner::tools::{ToolRegistry, register_builtin};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env();
    let _log_guard = init_tracing(&config);

    eprintln!("flowrunner v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   WebDriver: {}", config.webdriver_url);
    eprintln!("   Downloads: {}", config.download_root.display());
    eprintln!("   Workers:   {}", config.max_workers);

    let factory = Arc::new(WebDriverFactory::new(&config));
    let scheduler = Arc::new(FlowScheduler::new(config.clone(), factory));

    let registry = ToolRegistry::new();
    register_builtin(
        &registry,
        scheduler.clone(),
        Arc::new(PlainTextExtractor::new()),
        config.download_root.clone(),
    )
    .await;
    tracing::info!(tools = registry.count(), "tool surface ready");

    // Demo driver: submit the flow described by a JSON file and poll its
    // status until it reaches a terminal state.
    let Some(flow_path) = std::env::args().nth(1) else {
        eprintln!("usage: flowrunner <flow.json>");
        std::process::exit(2);
    };

    let raw = std::fs::read_to_string(&flow_path)
        .with_context(|| format!("reading flow file {flow_path}"))?;
    let steps: Vec<Step> = serde_json::from_str(&raw).context("parsing flow steps")?;

    let job_id = scheduler.submit(steps, None).await?;
    println!("job {job_id}");

    loop {
        let status = scheduler.status(job_id).await?;
        println!("{} {}", status.state, status.message);
        if status.state.is_terminal() {
            println!("{}", serde_json::to_string_pretty(&status)?);
            scheduler.shutdown().await;
            if status.state != JobState::Success {
                std::process::exit(1);
            }
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// Initialize tracing; the returned guard must outlive the process's
/// logging when a file appender is configured.
fn init_tracing(config: &EngineConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "flowrunner.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
            None
        }
    }
}
