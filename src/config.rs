//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory under which each job gets its private output directory.
    pub download_root: PathBuf,
    /// WebDriver endpoint (chromedriver).
    pub webdriver_url: String,
    /// Run the browser headless.
    pub headless: bool,
    /// Maximum number of jobs executing at once; excess submissions queue.
    pub max_workers: usize,
    /// Browser page-load timeout.
    pub page_load_timeout: Duration,
    /// Browser script-execution timeout.
    pub script_timeout: Duration,
    /// Step wait used when a step does not carry its own timeout.
    pub default_step_timeout: Duration,
    /// Interval between condition probes inside a wait-type step.
    pub wait_probe_interval: Duration,
    /// Fixed delay between retry attempts of a failing step.
    pub retry_delay: Duration,
    /// Download-detector polling interval.
    pub poll_interval: Duration,
    /// Selector of a loading overlay that may briefly cover click targets.
    pub loading_overlay: Option<String>,
    /// How long to wait for the loading overlay to clear before re-clicking.
    pub overlay_wait: Duration,
    /// When set, logs are additionally written to daily files in this directory.
    pub log_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            download_root: PathBuf::from("./downloads"),
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            max_workers: 2,
            page_load_timeout: Duration::from_secs(30),
            script_timeout: Duration::from_secs(30),
            default_step_timeout: Duration::from_secs(20),
            wait_probe_interval: Duration::from_millis(250),
            retry_delay: Duration::from_millis(500),
            poll_interval: Duration::from_millis(500),
            loading_overlay: None,
            overlay_wait: Duration::from_secs(2),
            log_dir: None,
        }
    }
}

impl EngineConfig {
    /// Build a configuration from `FLOWRUNNER_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let download_root = std::env::var("FLOWRUNNER_DOWNLOAD_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| defaults.download_root.clone());

        let webdriver_url = std::env::var("FLOWRUNNER_WEBDRIVER_URL")
            .unwrap_or_else(|_| defaults.webdriver_url.clone());

        let headless = std::env::var("FLOWRUNNER_HEADLESS")
            .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(defaults.headless);

        let max_workers = std::env::var("FLOWRUNNER_MAX_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_workers);

        let page_load_timeout = env_secs("FLOWRUNNER_PAGE_WAIT_SECS", defaults.page_load_timeout);
        let default_step_timeout =
            env_secs("FLOWRUNNER_STEP_WAIT_SECS", defaults.default_step_timeout);

        let loading_overlay = std::env::var("FLOWRUNNER_LOADING_OVERLAY").ok();

        let log_dir = std::env::var("FLOWRUNNER_LOG_DIR").map(PathBuf::from).ok();

        Self {
            download_root,
            webdriver_url,
            headless,
            max_workers,
            page_load_timeout,
            script_timeout: page_load_timeout,
            default_step_timeout,
            loading_overlay,
            log_dir,
            ..defaults
        }
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
