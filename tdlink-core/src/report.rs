// ABOUTME: Process-wide error channel used by the dispatcher and the client loop.
// ABOUTME: Reporting never fails; the default implementation logs through tracing.

use std::error::Error;
use std::sync::Mutex;

/// Sink for errors that are recovered locally but must not go unnoticed
pub trait ErrorReporter: Send + Sync {
    /// Record an error with a short context label (e.g., "dispatch", "authorization")
    fn report(&self, error: &(dyn Error + 'static), context: &str);
}

/// Logs every report at error level and counts it
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &(dyn Error + 'static), context: &str) {
        tracing::error!(context = %context, error = %error, "Recovered error");
        crate::metrics::record_error(context);
    }
}

/// A single captured report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reported {
    pub context: String,
    pub message: String,
}

/// Keeps reports in memory so tests can assert on them
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<Reported>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything reported so far
    pub fn reports(&self) -> Vec<Reported> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, error: &(dyn Error + 'static), context: &str) {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Reported {
                context: context.to_string(),
                message: error.to_string(),
            });
    }
}
