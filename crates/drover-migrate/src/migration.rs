//! The [`Migration`] trait: the contract the registry loads.

use async_trait::async_trait;

use drover_store::DocumentStore;

use crate::MigrateError;

/// A versioned unit of change against the document store.
///
/// `up` and `down` must be safe to retry (at-least-once semantics): prefer
/// conditional inserts and updates over blind writes, since a crash between
/// a successful `up` and its ledger entry re-runs the migration.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique human-readable identifier, also used as the stable ledger key.
    fn name(&self) -> &'static str;

    /// Sortable identifier derived from creation time; the sole ordering
    /// key among migrations (`20201129-172729-00` style). Ties fall back to
    /// lexical order of `name`.
    fn sequence_key(&self) -> &'static str;

    /// Human-readable description. Informational only.
    fn description(&self) -> &'static str;

    /// Whether `down` is implemented. Non-reversible migrations fail fast
    /// on revert rather than silently no-op.
    fn reversible(&self) -> bool {
        true
    }

    /// Ignored migrations are excluded from apply/revert passes but remain
    /// addressable by name.
    fn ignored(&self) -> bool {
        false
    }

    /// Forward transformation.
    async fn up(&self, store: &dyn DocumentStore) -> Result<(), MigrateError>;

    /// Inverse transformation; only invoked when `reversible` is true.
    async fn down(&self, store: &dyn DocumentStore) -> Result<(), MigrateError> {
        let _ = store;
        Err(MigrateError::NotReversible(self.name().to_string()))
    }
}
