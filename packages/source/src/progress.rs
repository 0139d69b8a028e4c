//! Progress reporting for the startup pipeline.
//!
//! Ingestion, surface building and calibration can take a while on large
//! cities. Stages report through [`ProgressCallback`] so the CLI can draw
//! progress bars while the server and tests stay silent.

use std::sync::Arc;

/// Receives progress updates from a long-running stage.
///
/// Implementations must be `Send + Sync`; callbacks are shared across tokio
/// tasks and rayon workers.
pub trait ProgressCallback: Send + Sync {
    /// Sets the expected number of work units.
    fn set_total(&self, total: u64);

    /// Advances progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Updates the message shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Marks the stage as complete.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
