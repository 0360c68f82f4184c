//! Scripted session doubles for exercising the engine without a browser.
//!
//! Used by the crate's own tests and by downstream integration tests; the
//! knobs cover the failure modes the interpreter must handle (elements
//! that never appear, intercepted clicks, flaky clicks, failing clears).

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{SessionError, StepError};
use crate::session::{BrowserSession, Locator, SessionFactory};

/// One recorded call against a [`ScriptedSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Navigate(String),
    Click(String),
    ScriptClick(String),
    ScrollIntoView(String),
    Clear(String),
    Type(String, String),
    ElementText(String),
    ExecuteScript(String),
    Screenshot,
    Close,
}

#[derive(Debug, Default)]
struct Inner {
    calls: Mutex<Vec<SessionCall>>,
    url: Mutex<String>,
    element_text: Mutex<String>,
    /// Initial `is_displayed` probes answered with `false`.
    hidden_probes: AtomicUsize,
    /// When set, `is_displayed` always answers `false`.
    never_visible: AtomicBool,
    /// When set, `is_clickable` always answers `false`.
    never_clickable: AtomicBool,
    /// Initial clicks rejected as intercepted.
    intercepted_clicks: AtomicUsize,
    /// Initial clicks rejected as element-not-found (transient).
    failing_clicks: AtomicUsize,
    /// When set, `clear` fails.
    fail_clear: AtomicBool,
}

/// Scripted [`BrowserSession`]. Cloning shares state, so a test can keep a
/// handle while the engine drives the session.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSession {
    inner: Arc<Inner>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hidden_probes(self, probes: usize) -> Self {
        self.inner.hidden_probes.store(probes, Ordering::SeqCst);
        self
    }

    pub fn never_visible(self) -> Self {
        self.inner.never_visible.store(true, Ordering::SeqCst);
        self
    }

    pub fn never_clickable(self) -> Self {
        self.inner.never_clickable.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_intercepted_clicks(self, clicks: usize) -> Self {
        self.inner.intercepted_clicks.store(clicks, Ordering::SeqCst);
        self
    }

    pub fn with_failing_clicks(self, clicks: usize) -> Self {
        self.inner.failing_clicks.store(clicks, Ordering::SeqCst);
        self
    }

    pub fn with_failing_clear(self) -> Self {
        self.inner.fail_clear.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_element_text(self, text: impl Into<String>) -> Self {
        *self.inner.element_text.lock().expect("lock poisoned") = text.into();
        self
    }

    /// Everything the engine has asked this session to do, in order.
    pub fn calls(&self) -> Vec<SessionCall> {
        self.inner.calls.lock().expect("lock poisoned").clone()
    }

    pub fn click_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SessionCall::Click(_)))
            .count()
    }

    fn note(&self, call: SessionCall) {
        self.inner.calls.lock().expect("lock poisoned").push(call);
    }

    /// Consume one unit from a countdown knob; true while units remain.
    fn consume(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&self, url: &str) -> Result<(), StepError> {
        self.note(SessionCall::Navigate(url.to_string()));
        *self.inner.url.lock().expect("lock poisoned") = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String, StepError> {
        Ok(self.inner.url.lock().expect("lock poisoned").clone())
    }

    async fn is_displayed(&self, _locator: &Locator) -> Result<bool, StepError> {
        if self.inner.never_visible.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(!Self::consume(&self.inner.hidden_probes))
    }

    async fn is_clickable(&self, _locator: &Locator) -> Result<bool, StepError> {
        Ok(!self.inner.never_clickable.load(Ordering::SeqCst))
    }

    async fn click(&self, locator: &Locator) -> Result<(), StepError> {
        self.note(SessionCall::Click(locator.to_string()));
        if Self::consume(&self.inner.intercepted_clicks) {
            return Err(StepError::ClickIntercepted {
                locator: locator.to_string(),
            });
        }
        if Self::consume(&self.inner.failing_clicks) {
            return Err(StepError::ElementNotFound {
                locator: locator.to_string(),
            });
        }
        Ok(())
    }

    async fn click_via_script(&self, locator: &Locator) -> Result<(), StepError> {
        self.note(SessionCall::ScriptClick(locator.to_string()));
        Ok(())
    }

    async fn scroll_into_view(&self, locator: &Locator) -> Result<(), StepError> {
        self.note(SessionCall::ScrollIntoView(locator.to_string()));
        Ok(())
    }

    async fn clear(&self, locator: &Locator) -> Result<(), StepError> {
        self.note(SessionCall::Clear(locator.to_string()));
        if self.inner.fail_clear.load(Ordering::SeqCst) {
            return Err(StepError::ElementNotFound {
                locator: locator.to_string(),
            });
        }
        Ok(())
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), StepError> {
        self.note(SessionCall::Type(locator.to_string(), text.to_string()));
        Ok(())
    }

    async fn element_text(&self, locator: &Locator) -> Result<String, StepError> {
        self.note(SessionCall::ElementText(locator.to_string()));
        Ok(self.inner.element_text.lock().expect("lock poisoned").clone())
    }

    async fn execute_script(&self, code: &str) -> Result<(), StepError> {
        self.note(SessionCall::ExecuteScript(code.to_string()));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, StepError> {
        self.note(SessionCall::Screenshot);
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn close(&self) -> Result<(), StepError> {
        self.note(SessionCall::Close);
        Ok(())
    }
}

/// Factory handing out scripted sessions in submission order. When its
/// queue is empty it hands out a fresh all-green session.
#[derive(Debug, Default)]
pub struct ScriptedFactory {
    queue: Mutex<VecDeque<ScriptedSession>>,
    fail: AtomicBool,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose every `create` fails, for exercising fatal
    /// session-construction handling.
    pub fn failing() -> Self {
        let factory = Self::default();
        factory.fail.store(true, Ordering::SeqCst);
        factory
    }

    /// Queue a session for the next job; keep a clone to inspect calls.
    pub fn push(&self, session: ScriptedSession) {
        self.queue
            .lock()
            .expect("lock poisoned")
            .push_back(session);
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn create(&self, _download_dir: &Path) -> Result<Box<dyn BrowserSession>, SessionError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SessionError::Unreachable {
                url: "scripted".to_string(),
            });
        }
        let session = self
            .queue
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or_default();
        Ok(Box::new(session))
    }
}
