//! Progress reporting for backfill runs.

use indicatif::ProgressBar;

/// Snapshot of a run's progress, emitted after each task completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Tasks completed so far. Monotonically increasing within a run.
    pub processed: u64,
}

/// Receives progress snapshots during a run.
///
/// Implemented for closures, for `()` (no reporting) and for an indicatif
/// [`ProgressBar`].
pub trait ProgressCallback: Send {
    fn on_progress(&mut self, progress: Progress);
}

impl<F: FnMut(Progress) + Send> ProgressCallback for F {
    fn on_progress(&mut self, progress: Progress) {
        self(progress);
    }
}

impl ProgressCallback for () {
    fn on_progress(&mut self, _progress: Progress) {}
}

impl ProgressCallback for ProgressBar {
    fn on_progress(&mut self, progress: Progress) {
        self.set_position(progress.processed);
    }
}
