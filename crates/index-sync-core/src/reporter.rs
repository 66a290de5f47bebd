//! Status and progress reporting.

use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Sink for run progress.
///
/// `fatal` only records the failure; aborting is done by returning the error.
pub trait Reporter: Send + Sync {
    fn status(&self, message: &str);
    fn warn(&self, message: &str);
    fn fatal(&self, message: &str, detail: &dyn std::error::Error);
}

/// Reporter writing to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn status(&self, message: &str) {
        info!("{}", message);
    }

    fn warn(&self, message: &str) {
        warn!("{}", message);
    }

    fn fatal(&self, message: &str, detail: &dyn std::error::Error) {
        error!("{}: {}", message, detail);
    }
}

/// A timed unit of work reported on start and end.
pub struct Activity<'a> {
    reporter: &'a dyn Reporter,
    name: String,
    started: Instant,
}

impl<'a> Activity<'a> {
    pub fn start(reporter: &'a dyn Reporter, name: impl Into<String>) -> Self {
        let name = name.into();
        reporter.status(&format!("{}: started", name));
        Self {
            reporter,
            name,
            started: Instant::now(),
        }
    }

    pub fn set_status(&self, message: &str) {
        self.reporter.status(&format!("{}: {}", self.name, message));
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn end(self) -> Duration {
        let elapsed = self.elapsed();
        self.reporter.status(&format!(
            "{}: finished in {:.2}s",
            self.name,
            elapsed.as_secs_f64()
        ));
        elapsed
    }
}
