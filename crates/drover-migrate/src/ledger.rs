//! Persisted ledger of applied migrations.
//!
//! One document per applied migration, keyed by migration name, in a
//! dedicated collection. The append is conditional (skip if present) so an
//! `up` re-run after a crash between the data change and the ledger write
//! stays harmless.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use drover_store::{Document, DocumentStore, Filter};

use crate::MigrateError;

/// Collection holding the ledger documents.
pub const MIGRATIONS_COLLECTION: &str = "migrations";

/// A single ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigration {
    /// Migration name (the ledger key).
    pub name: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
}

/// Handle over the ledger collection of a specific store.
///
/// The ledger assumes a single writer; see [`crate::Runner`].
pub struct Ledger<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> Ledger<'a> {
    /// Wrap the ledger collection of `store`.
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Names of applied migrations, in application order.
    pub async fn applied(&self) -> Result<Vec<AppliedMigration>, MigrateError> {
        use futures_util::TryStreamExt;

        let docs: Vec<Document> = self
            .store
            .find(MIGRATIONS_COLLECTION, Filter::new())
            .await?
            .try_collect()
            .await?;

        let mut entries: Vec<AppliedMigration> = docs
            .into_iter()
            .map(|doc| {
                let applied_at = doc
                    .field("applied_at")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()?
                    .unwrap_or_else(Utc::now);
                Ok(AppliedMigration {
                    name: doc.id,
                    applied_at,
                })
            })
            .collect::<Result<_, serde_json::Error>>()
            .map_err(drover_store::StoreError::from)?;
        entries.sort_by(|a, b| a.applied_at.cmp(&b.applied_at).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }

    /// Whether a migration name is recorded as applied.
    pub async fn contains(&self, name: &str) -> Result<bool, MigrateError> {
        let entry = self
            .store
            .find_one(MIGRATIONS_COLLECTION, Filter::new().id(name))
            .await?;
        Ok(entry.is_some())
    }

    /// Record a migration as applied. No-op if already recorded.
    pub async fn record(&self, name: &str) -> Result<(), MigrateError> {
        if self.contains(name).await? {
            debug!(name, "ledger entry already present, skipping append");
            return Ok(());
        }
        let entry = Document::new(name, json!({ "applied_at": Utc::now() }));
        self.store
            .insert_many(MIGRATIONS_COLLECTION, vec![entry])
            .await?;
        Ok(())
    }

    /// Remove a migration from the ledger.
    pub async fn remove(&self, name: &str) -> Result<(), MigrateError> {
        self.store
            .delete_many(MIGRATIONS_COLLECTION, Filter::new().id(name))
            .await?;
        Ok(())
    }
}
