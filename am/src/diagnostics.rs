//! Injectable diagnostic sink
//!
//! The messager never logs directly; it reports through a [`Diagnostics`]
//! implementation so embedders can route or capture its warnings.

use std::sync::Mutex;

use tracing::{error, info, warn};

/// One method per severity
pub trait Diagnostics: Send + Sync {
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
}

/// Default sink: forwards to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn error(&self, message: &str) {
        error!(target: "asyncmessager", "{}", message);
    }

    fn warn(&self, message: &str) {
        warn!(target: "asyncmessager", "{}", message);
    }

    fn info(&self, message: &str) {
        info!(target: "asyncmessager", "{}", message);
    }
}

/// Severity of a recorded diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warn,
    Info,
}

/// Sink that keeps every diagnostic in memory
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    entries: Mutex<Vec<(Severity, String)>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Severity, String)> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries().iter().filter(|(s, _)| *s == severity).count()
    }

    /// True if any entry of this severity contains `needle`
    pub fn contains(&self, severity: Severity, needle: &str) -> bool {
        self.entries()
            .iter()
            .any(|(s, message)| *s == severity && message.contains(needle))
    }

    fn record(&self, severity: Severity, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((severity, message.to_string()));
        }
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn error(&self, message: &str) {
        self.record(Severity::Error, message);
    }

    fn warn(&self, message: &str) {
        self.record(Severity::Warn, message);
    }

    fn info(&self, message: &str) {
        self.record(Severity::Info, message);
    }
}
