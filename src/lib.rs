//! flowrunner — asynchronous browser-automation flow engine.
//!
//! Executes declarative, ordered step sequences ("flows") against
//! isolated WebDriver sessions, tracks each flow as a long-running job
//! with pollable status and cooperative cancellation, and detects and
//! fingerprints downloaded artifacts. A tool registry exposes the engine
//! to a calling agent over any transport.

pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod extract;
pub mod session;
pub mod tools;
