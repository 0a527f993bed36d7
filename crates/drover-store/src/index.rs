//! Declarative index synchronization.
//!
//! Given the set of indexes a collection should have, diffs against the
//! store's actual indexes: creates the missing ones and drops the stale
//! ones. The diff is computed over index identity (keys plus uniqueness),
//! never declaration order, so reordering declarations never drops a live
//! index. Safe to invoke repeatedly.

use std::collections::BTreeMap;

use tracing::info;

use crate::{DocumentStore, IndexOrder, IndexSpec, StoreError};

/// A declared index: ordered key fields and a uniqueness flag.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    keys: Vec<(String, IndexOrder)>,
    unique: bool,
}

impl IndexDefinition {
    /// Declare an ascending index over the given fields.
    pub fn ascending(fields: &[&str]) -> Self {
        Self {
            keys: fields
                .iter()
                .map(|field| (field.to_string(), IndexOrder::Ascending))
                .collect(),
            unique: false,
        }
    }

    /// Mark this index as unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Resolve to a concrete spec; fails on malformed definitions.
    pub fn to_spec(&self) -> Result<IndexSpec, StoreError> {
        IndexSpec::new(self.keys.clone(), self.unique)
    }
}

/// What a synchronization pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSyncReport {
    /// Names of indexes created.
    pub created: Vec<String>,
    /// Names of indexes dropped.
    pub dropped: Vec<String>,
}

impl IndexSyncReport {
    /// Whether the pass changed nothing.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.dropped.is_empty()
    }
}

/// Synchronize a collection's indexes to the declared set.
///
/// Drops happen before creates so a redefined index (same name, different
/// uniqueness) is replaced rather than rejected.
pub async fn sync_indexes(
    store: &dyn DocumentStore,
    collection: &str,
    declared: &[IndexDefinition],
) -> Result<IndexSyncReport, StoreError> {
    let mut desired: Vec<IndexSpec> = Vec::with_capacity(declared.len());
    for definition in declared {
        let spec = definition.to_spec()?;
        if desired.iter().any(|existing| existing.name == spec.name) {
            return Err(StoreError::InvalidIndex(format!(
                "index {} declared twice for collection {}",
                spec.name, collection
            )));
        }
        desired.push(spec);
    }

    let existing = store.list_indexes(collection).await?;

    let stale: Vec<&IndexSpec> = existing
        .iter()
        .filter(|current| !desired.iter().any(|spec| spec.same_definition(current)))
        .collect();
    let missing: Vec<&IndexSpec> = desired
        .iter()
        .filter(|spec| !existing.iter().any(|current| current.same_definition(spec)))
        .collect();

    let mut report = IndexSyncReport::default();

    for spec in stale {
        store.drop_index(collection, &spec.name).await?;
        info!(collection, index = %spec.name, "dropped stale index");
        report.dropped.push(spec.name.clone());
    }

    for spec in missing {
        store.create_index(collection, spec.clone()).await?;
        info!(collection, index = %spec.name, unique = spec.unique, "created index");
        report.created.push(spec.name.clone());
    }

    Ok(report)
}

/// Declarative mapping from entity kind (collection) to its index set.
#[derive(Debug, Clone, Default)]
pub struct EntityIndexes {
    entities: BTreeMap<String, Vec<IndexDefinition>>,
}

impl EntityIndexes {
    /// An empty declaration set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the indexes for an entity kind.
    pub fn entity(mut self, collection: impl Into<String>, indexes: Vec<IndexDefinition>) -> Self {
        self.entities.insert(collection.into(), indexes);
        self
    }

    /// Synchronize every declared entity kind; returns per-collection reports.
    pub async fn sync_all(
        &self,
        store: &dyn DocumentStore,
    ) -> Result<BTreeMap<String, IndexSyncReport>, StoreError> {
        let mut reports = BTreeMap::new();
        for (collection, declared) in &self.entities {
            let report = sync_indexes(store, collection, declared).await?;
            reports.insert(collection.clone(), report);
        }
        Ok(reports)
    }
}
