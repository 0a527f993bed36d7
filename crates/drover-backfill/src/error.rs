//! Error types for the backfill executor.

use thiserror::Error;

use drover_store::StoreError;

/// Errors that abort a backfill run.
///
/// Per-document repair failures are not errors at this level; they are
/// isolated, counted in the summary and reported there.
#[derive(Debug, Error)]
pub enum BackfillError {
    /// Concurrency must be a positive integer.
    #[error("concurrency must be positive")]
    InvalidConcurrency,

    /// The scan cursor itself failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
