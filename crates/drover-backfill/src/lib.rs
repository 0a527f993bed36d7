//! Concurrent backfill executor.
//!
//! Scans a collection for documents missing a derived field, computes the
//! missing value with a pure function, and persists it with conditional
//! single-document updates, under a fixed concurrency ceiling. A single
//! document's failure never aborts the scan; the run ends with a summary of
//! successes, failures and skips.

mod derive;
mod error;
mod executor;
mod progress;

pub use derive::slugify;
pub use error::BackfillError;
pub use executor::{BackfillOptions, BackfillSpec, DeriveFn, Summary, run};
pub use progress::{Progress, ProgressCallback};
