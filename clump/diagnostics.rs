//! Injected reporting channel for recoverable and fatal input problems.
//!
//! The resolver and the ingesters never print. They hand messages to a
//! [`Diagnostics`] sink so that the binary can route them through `log` while tests
//! inspect them directly.

use log::{error, warn};

/// A sink for diagnostics raised while reading inputs.
pub trait Diagnostics {
    /// A recoverable issue. Processing continues.
    fn warn(&mut self, message: &str);
    /// An unrecoverable issue for the file being processed. The caller still
    /// receives the matching error value and decides how to stop.
    fn fail(&mut self, message: &str);
}

/// Forwards every message to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn warn(&mut self, message: &str) {
        warn!("{message}");
    }

    fn fail(&mut self, message: &str) {
        error!("{message}");
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default, Clone)]
pub struct CollectedDiagnostics {
    pub warnings: Vec<String>,
    pub failures: Vec<String>,
}

impl CollectedDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when any warning contains `needle`.
    pub fn warned_about(&self, needle: &str) -> bool {
        self.warnings.iter().any(|message| message.contains(needle))
    }
}

impl Diagnostics for CollectedDiagnostics {
    fn warn(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    fn fail(&mut self, message: &str) {
        self.failures.push(message.to_string());
    }
}
