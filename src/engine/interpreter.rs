//! Sequential step execution.
//!
//! Runs one job's step list strictly in order against its session,
//! applying bounded fixed-delay retry for transient failures,
//! optional-failure suppression, action-specific fallbacks, and
//! cooperative cancellation at step boundaries.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::time::{Instant, sleep};

use crate::config::EngineConfig;
use crate::detect;
use crate::engine::job::{ActionKind, DownloadResult, Step};
use crate::error::{DetectError, StepError};
use crate::session::{BrowserSession, Locator};

/// Outcome of running a full step list.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every step ran or was suppressed; carries the download captured by
    /// a wait_for_download step, if any.
    Completed { download: Option<DownloadResult> },
    /// The cancel signal was observed at a step boundary.
    Canceled { steps_run: usize },
}

/// A step that exhausted its attempts or hit a fatal error.
#[derive(Debug)]
pub struct StepFailure {
    /// Zero-based position in the flow.
    pub index: usize,
    pub action: ActionKind,
    pub error: StepError,
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "step {} ({}) failed: {}",
            self.index + 1,
            self.action,
            self.error
        )
    }
}

/// Conditions a wait-type step can block on.
enum WaitCondition<'a> {
    Visible(&'a Locator),
    Clickable(&'a Locator),
    Invisible(&'a Locator),
    UrlContains(&'a str),
}

impl std::fmt::Display for WaitCondition<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Visible(locator) => write!(f, "{locator} to become visible"),
            Self::Clickable(locator) => write!(f, "{locator} to become clickable"),
            Self::Invisible(locator) => write!(f, "{locator} to disappear"),
            Self::UrlContains(needle) => write!(f, "url to contain {needle:?}"),
        }
    }
}

/// Executes one job's steps against one session.
pub struct StepRunner<'a> {
    session: &'a dyn BrowserSession,
    config: &'a EngineConfig,
    output_dir: &'a Path,
}

impl<'a> StepRunner<'a> {
    pub fn new(
        session: &'a dyn BrowserSession,
        config: &'a EngineConfig,
        output_dir: &'a Path,
    ) -> Self {
        Self {
            session,
            config,
            output_dir,
        }
    }

    /// Run all steps in submission order.
    pub async fn run(
        &self,
        steps: &[Step],
        cancel: &AtomicBool,
    ) -> Result<RunOutcome, StepFailure> {
        let mut download = None;

        for (index, step) in steps.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                return Ok(RunOutcome::Canceled { steps_run: index });
            }

            match self.run_step(step).await {
                Ok(Some(result)) => download = Some(result),
                Ok(None) => {}
                Err(error) if step.optional && !error.is_config() => {
                    tracing::warn!(
                        step = index + 1,
                        action = %step.action,
                        error = %error,
                        "optional step failed; continuing"
                    );
                }
                Err(error) => {
                    return Err(StepFailure {
                        index,
                        action: step.action,
                        error,
                    });
                }
            }
        }

        Ok(RunOutcome::Completed { download })
    }

    /// One step through its bounded retry loop. Only transient failures
    /// are retried, with a fixed delay between attempts.
    async fn run_step(&self, step: &Step) -> Result<Option<DownloadResult>, StepError> {
        let attempts = step.retry_count.saturating_add(1);
        let mut attempt = 1;
        loop {
            match self.attempt(step).await {
                Ok(result) => return Ok(result),
                Err(error) if error.is_transient() && attempt < attempts => {
                    tracing::debug!(
                        action = %step.action,
                        attempt,
                        error = %error,
                        "transient step failure; retrying"
                    );
                    attempt += 1;
                    sleep(self.config.retry_delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// A single attempt at a step, dispatched by action kind.
    async fn attempt(&self, step: &Step) -> Result<Option<DownloadResult>, StepError> {
        let timeout = step.timeout(self.config.default_step_timeout);

        match step.action {
            ActionKind::Navigate => {
                self.session.navigate(require_value(step)?).await?;
            }
            ActionKind::Click => {
                self.click(&require_target(step)?, timeout).await?;
            }
            ActionKind::Type => {
                let locator = require_target(step)?;
                let text = step.value.as_deref().unwrap_or("");
                self.wait_until(WaitCondition::Visible(&locator), timeout)
                    .await?;
                // Clearing existing content is best-effort.
                if let Err(error) = self.session.clear(&locator).await {
                    tracing::debug!(locator = %locator, error = %error, "clear failed; typing anyway");
                }
                self.session.type_text(&locator, text).await?;
            }
            ActionKind::WaitVisible => {
                let locator = require_target(step)?;
                self.wait_until(WaitCondition::Visible(&locator), timeout)
                    .await?;
            }
            ActionKind::WaitClickable => {
                let locator = require_target(step)?;
                self.wait_until(WaitCondition::Clickable(&locator), timeout)
                    .await?;
            }
            ActionKind::WaitInvisible => {
                let locator = require_target(step)?;
                self.wait_until(WaitCondition::Invisible(&locator), timeout)
                    .await?;
            }
            ActionKind::WaitUrlContains => {
                self.wait_until(WaitCondition::UrlContains(require_value(step)?), timeout)
                    .await?;
            }
            ActionKind::Sleep => {
                let raw = step.value.as_deref().unwrap_or("1");
                let secs: f64 = raw.parse().map_err(|_| StepError::InvalidValue {
                    action: step.action.to_string(),
                    value: raw.to_string(),
                    reason: "expected a number of seconds".to_string(),
                })?;
                sleep(Duration::from_secs_f64(secs.max(0.0))).await;
            }
            ActionKind::ExecuteScript => {
                self.session.execute_script(require_value(step)?).await?;
            }
            ActionKind::ExpectText => {
                let locator = require_target(step)?;
                let expected = require_value(step)?;
                self.wait_until(WaitCondition::Visible(&locator), timeout)
                    .await?;
                let text = self.session.element_text(&locator).await?;
                if !text.contains(expected.trim()) {
                    return Err(StepError::TextMismatch {
                        expected: expected.to_string(),
                    });
                }
            }
            ActionKind::Screenshot => {
                let bytes = self.session.screenshot().await?;
                let name = format!("{}.png", Utc::now().timestamp_millis());
                tokio::fs::write(self.output_dir.join(name), bytes).await?;
            }
            ActionKind::WaitForDownload => {
                let result = detect::wait_for_download(
                    self.output_dir,
                    step.value.as_deref(),
                    timeout,
                    self.config.poll_interval,
                )
                .await
                .map_err(|error| match error {
                    DetectError::Timeout { timeout } => StepError::DownloadTimeout { timeout },
                    DetectError::Pattern { pattern, reason } => StepError::InvalidValue {
                        action: step.action.to_string(),
                        value: pattern,
                        reason,
                    },
                    DetectError::Io(io) => StepError::Io(io),
                })?;
                return Ok(Some(result));
            }
        }

        Ok(None)
    }

    /// Click with the interception fallback chain: wait for the target to
    /// be clickable, click, and if something covers it give a known
    /// loading overlay a moment to clear, scroll the target into view,
    /// re-click, and finally fall back to a script-driven click.
    async fn click(&self, locator: &Locator, timeout: Duration) -> Result<(), StepError> {
        self.wait_until(WaitCondition::Clickable(locator), timeout)
            .await?;

        match self.session.click(locator).await {
            Err(StepError::ClickIntercepted { .. }) => {}
            other => return other,
        }

        if let Some(overlay) = &self.config.loading_overlay {
            let overlay = Locator::parse(overlay);
            if let Err(error) = self
                .wait_until(WaitCondition::Invisible(&overlay), self.config.overlay_wait)
                .await
            {
                tracing::debug!(overlay = %overlay, error = %error, "overlay did not clear");
            }
        }

        self.session.scroll_into_view(locator).await?;
        match self.session.click(locator).await {
            Err(StepError::ClickIntercepted { .. }) => {
                self.session.click_via_script(locator).await
            }
            other => other,
        }
    }

    /// Block until the condition holds or the budget elapses.
    async fn wait_until(
        &self,
        condition: WaitCondition<'_>,
        timeout: Duration,
    ) -> Result<(), StepError> {
        let interval = self.config.wait_probe_interval;
        let deadline = Instant::now() + timeout;

        loop {
            if self.probe(&condition).await? {
                return Ok(());
            }
            if Instant::now() + interval >= deadline {
                return Err(StepError::WaitTimeout {
                    condition: condition.to_string(),
                    timeout,
                });
            }
            sleep(interval).await;
        }
    }

    async fn probe(&self, condition: &WaitCondition<'_>) -> Result<bool, StepError> {
        match condition {
            WaitCondition::Visible(locator) => self.session.is_displayed(locator).await,
            WaitCondition::Clickable(locator) => self.session.is_clickable(locator).await,
            WaitCondition::Invisible(locator) => {
                Ok(!self.session.is_displayed(locator).await?)
            }
            WaitCondition::UrlContains(needle) => {
                Ok(self.session.current_url().await?.contains(needle))
            }
        }
    }
}

fn require_target(step: &Step) -> Result<Locator, StepError> {
    step.target
        .as_deref()
        .map(Locator::parse)
        .ok_or_else(|| StepError::MissingTarget {
            action: step.action.to_string(),
        })
}

fn require_value(step: &Step) -> Result<&str, StepError> {
    step.value.as_deref().ok_or_else(|| StepError::MissingValue {
        action: step.action.to_string(),
    })
}
