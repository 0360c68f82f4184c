//! Isolated browser automation sessions.
//!
//! Core components:
//! - `locator` — target descriptor parsing (structural XPath vs. flat CSS)
//! - `webdriver` — fantoccini-backed factory and session
//! - `testkit` — scripted in-memory doubles for exercising the engine
//!
//! One session is built per job, bound to the job's private download
//! directory, and torn down when the job finishes. Sessions are never
//! shared between jobs.

pub mod locator;
pub mod testkit;
pub mod webdriver;

pub use locator::Locator;
pub use webdriver::{WebDriverFactory, WebDriverSession};

use std::path::Path;

use async_trait::async_trait;

use crate::error::{SessionError, StepError};

/// Capability surface a job uses to drive its browser.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), StepError>;

    async fn current_url(&self) -> Result<String, StepError>;

    /// Whether the target element exists and is displayed. A missing
    /// element reports `false` rather than an error so wait loops can
    /// keep polling.
    async fn is_displayed(&self, locator: &Locator) -> Result<bool, StepError>;

    /// Whether the target element is displayed and enabled.
    async fn is_clickable(&self, locator: &Locator) -> Result<bool, StepError>;

    async fn click(&self, locator: &Locator) -> Result<(), StepError>;

    /// Script-driven click, the last resort when a native click stays
    /// intercepted.
    async fn click_via_script(&self, locator: &Locator) -> Result<(), StepError>;

    async fn scroll_into_view(&self, locator: &Locator) -> Result<(), StepError>;

    async fn clear(&self, locator: &Locator) -> Result<(), StepError>;

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), StepError>;

    async fn element_text(&self, locator: &Locator) -> Result<String, StepError>;

    async fn execute_script(&self, code: &str) -> Result<(), StepError>;

    /// PNG bytes of the current view.
    async fn screenshot(&self) -> Result<Vec<u8>, StepError>;

    /// Tear the session down. The session must be considered gone whether
    /// or not this reports an error.
    async fn close(&self) -> Result<(), StepError>;
}

/// Builds one isolated session per job, downloads routed into the job's
/// private directory. Construction failure is fatal for the job.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self, download_dir: &Path) -> Result<Box<dyn BrowserSession>, SessionError>;
}
