//! Migration runner: ordering plus ledger bookkeeping.
//!
//! The runner never retries a failing migration and never parallelizes:
//! migrations may depend on the state left by their predecessors, so an
//! apply pass is strictly sequential and stops at the first failure, with
//! the ledger reflecting exactly the migrations that truly completed.

use tracing::{error, info};

use drover_store::DocumentStore;

use crate::{Ledger, MigrateError, Registry};

/// The migration that stopped an apply pass.
#[derive(Debug)]
pub struct FailedMigration {
    /// Name of the failing migration.
    pub name: String,
    /// Why it failed.
    pub error: MigrateError,
}

/// Outcome of an apply pass: the migrations that succeeded, and the one
/// that failed, if any. Migrations after a failure are never attempted.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Names applied during this pass, in order.
    pub applied: Vec<String>,
    /// First failure, if the pass stopped early.
    pub failed: Option<FailedMigration>,
}

/// Applied/pending split, read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Names recorded in the ledger.
    pub applied: Vec<String>,
    /// Registered, non-ignored names not yet applied, in application order.
    pub pending: Vec<String>,
}

/// Applies and reverts migrations against a store.
///
/// Concurrent runners are not safe: the design assumes single-writer access
/// to the ledger, enforced by the embedding system (for example a
/// distributed lock held for the duration of the pass), not by the runner.
pub struct Runner<'a> {
    registry: &'a Registry,
    store: &'a dyn DocumentStore,
}

impl<'a> Runner<'a> {
    /// Create a runner over a registry and an explicitly passed store handle.
    pub fn new(registry: &'a Registry, store: &'a dyn DocumentStore) -> Self {
        Self { registry, store }
    }

    /// Names of registered, non-ignored migrations missing from the ledger,
    /// in application order.
    async fn pending(&self) -> Result<Vec<String>, MigrateError> {
        let ledger = Ledger::new(self.store);
        let mut pending = Vec::new();
        for migration in self.registry.list() {
            if migration.ignored() {
                continue;
            }
            if !ledger.contains(migration.name()).await? {
                pending.push(migration.name().to_string());
            }
        }
        Ok(pending)
    }

    /// Apply every pending migration in ascending sequence order.
    ///
    /// Stops at the first failure; the report names both the migrations
    /// that succeeded and the one that failed. `Err` is reserved for
    /// infrastructure problems (the ledger itself being unreadable).
    pub async fn apply_pending(&self) -> Result<ApplyReport, MigrateError> {
        let ledger = Ledger::new(self.store);
        let pending = self.pending().await?;
        let mut report = ApplyReport::default();

        for name in pending {
            let migration = self.registry.find(&name)?;
            info!(name = migration.name(), "applying migration");

            match migration.up(self.store).await {
                Ok(()) => {
                    // Strictly after a successful up, so a crash in between
                    // re-runs the (idempotent) migration instead of losing it.
                    ledger.record(migration.name()).await?;
                    info!(name = migration.name(), "migration applied");
                    report.applied.push(migration.name().to_string());
                }
                Err(e) => {
                    error!(name = migration.name(), error = %e, "migration failed, stopping pass");
                    report.failed = Some(FailedMigration {
                        name: migration.name().to_string(),
                        error: MigrateError::Apply {
                            name: migration.name().to_string(),
                            source: Box::new(e),
                        },
                    });
                    break;
                }
            }
        }

        Ok(report)
    }

    /// Explicitly apply a single migration by name, ignored ones included.
    ///
    /// The conditional ledger append makes re-applying a recorded migration
    /// a no-op at the bookkeeping level; the migration's own idempotency
    /// covers the data side.
    pub async fn apply(&self, name: &str) -> Result<(), MigrateError> {
        let migration = self.registry.find(name)?;
        info!(name, "applying migration by name");
        migration.up(self.store).await.map_err(|e| MigrateError::Apply {
            name: name.to_string(),
            source: Box::new(e),
        })?;
        Ledger::new(self.store).record(name).await
    }

    /// Revert a named migration: run `down`, then remove the ledger entry.
    pub async fn revert(&self, name: &str) -> Result<(), MigrateError> {
        let migration = self.registry.find(name)?;
        if !migration.reversible() {
            return Err(MigrateError::NotReversible(name.to_string()));
        }

        let ledger = Ledger::new(self.store);
        if !ledger.contains(name).await? {
            return Err(MigrateError::NotApplied(name.to_string()));
        }

        info!(name, "reverting migration");
        migration
            .down(self.store)
            .await
            .map_err(|e| MigrateError::Revert {
                name: name.to_string(),
                source: Box::new(e),
            })?;
        ledger.remove(name).await?;
        info!(name, "migration reverted");
        Ok(())
    }

    /// Read-only applied/pending split. No side effects.
    pub async fn status(&self) -> Result<Status, MigrateError> {
        let ledger = Ledger::new(self.store);
        let applied = ledger
            .applied()
            .await?
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        let pending = self.pending().await?;
        Ok(Status { applied, pending })
    }
}
