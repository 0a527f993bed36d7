//! Error types for the migration engine.

use thiserror::Error;

use drover_store::StoreError;

/// Errors that can occur in migration operations.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Two registered migrations share a name. Fatal at load time.
    #[error("duplicate migration name: {0}")]
    DuplicateName(String),

    /// No registered migration has this name.
    #[error("unknown migration: {0}")]
    Unknown(String),

    /// The migration is not reversible.
    #[error("migration is not reversible: {0}")]
    NotReversible(String),

    /// The migration has not been applied.
    #[error("migration has not been applied: {0}")]
    NotApplied(String),

    /// A specific migration's `up` failed.
    #[error("failed to apply migration {name}: {source}")]
    Apply {
        name: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// A specific migration's `down` failed.
    #[error("failed to revert migration {name}: {source}")]
    Revert {
        name: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Migration-author failure with a free-form reason.
    #[error("{0}")]
    Failed(String),
}
