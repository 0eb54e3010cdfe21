//! Progress reporting for sync tasks.
//!
//! Two modes:
//! - Interactive (TTY): an indicatif bar driven by task snapshots and events
//! - Logging (non-TTY): structured `tracing` lines

mod interactive;
mod logging;

use std::sync::Arc;

use console::Term;
use crmsync::sync::{ProgressCallback, SyncProgress, TaskSnapshot};

pub(crate) use interactive::InteractiveReporter;
pub(crate) use logging::LoggingReporter;

pub(crate) enum ProgressReporter {
    Interactive(InteractiveReporter),
    Logging(LoggingReporter),
}

impl ProgressReporter {
    /// Pick the mode from whether stdout is a terminal.
    pub(crate) fn new() -> Self {
        if Term::stdout().is_term() {
            Self::Interactive(InteractiveReporter::new())
        } else {
            Self::Logging(LoggingReporter::new())
        }
    }

    pub(crate) fn handle(&self, event: SyncProgress) {
        match self {
            Self::Interactive(r) => r.handle(event),
            Self::Logging(r) => r.handle(event),
        }
    }

    /// Refresh from a polled snapshot.
    pub(crate) fn update(&self, snapshot: &TaskSnapshot) {
        if let Self::Interactive(r) = self {
            r.update(snapshot);
        }
    }

    /// Adapter for [`crmsync::sync::TaskRegistryBuilder::progress`].
    pub(crate) fn as_callback(self: &Arc<Self>) -> ProgressCallback {
        let reporter = Arc::clone(self);
        Box::new(move |event| reporter.handle(event))
    }

    pub(crate) fn finish(&self, snapshot: &TaskSnapshot) {
        if let Self::Interactive(r) = self {
            r.finish(snapshot);
        }
    }

    pub(crate) fn is_interactive(&self) -> bool {
        matches!(self, Self::Interactive(_))
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
