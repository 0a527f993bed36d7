//! In-memory store backend.
//!
//! Used by the test suites and runnable end to end. Collections are created
//! lazily on first write, matching the behavior of schemaless stores.

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use futures_util::stream;

use crate::types::PRIMARY_INDEX;
use crate::{
    Document, DocumentStore, DocumentStream, Filter, IndexSpec, StoreError, Update, UpdateOutcome,
};

/// Thread-safe in-memory document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, Vec<Document>>,
    indexes: DashMap<String, Vec<IndexSpec>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every document in a collection, in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|docs| docs.clone())
            .unwrap_or_default()
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    /// Whether a collection holds no documents.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn unique_violation(
        &self,
        collection: &str,
        existing: &[Document],
        doc: &Document,
    ) -> Option<String> {
        let indexes = self.indexes.get(collection)?;
        for spec in indexes.iter().filter(|spec| spec.unique) {
            // Documents missing any key field are not indexed.
            if !spec.keys.iter().all(|(field, _)| doc.has_field(field)) {
                continue;
            }
            let collides = existing.iter().any(|other| {
                other.id != doc.id
                    && spec
                        .keys
                        .iter()
                        .all(|(field, _)| other.field(field) == doc.field(field))
            });
            if collides {
                return Some(spec.name.clone());
            }
        }
        None
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, collection: &str, filter: Filter) -> Result<DocumentStream, StoreError> {
        let matching: Vec<Document> = self
            .documents(collection)
            .into_iter()
            .filter(|doc| filter.matches(doc))
            .collect();
        Ok(stream::iter(matching.into_iter().map(Ok)).boxed())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Filter,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| filter.matches(doc)).cloned()))
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Filter,
        update: Update,
    ) -> Result<UpdateOutcome, StoreError> {
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(UpdateOutcome {
                matched: 0,
                modified: 0,
            });
        };
        match docs.iter_mut().find(|doc| filter.matches(doc)) {
            Some(doc) => {
                let modified = update.apply(&mut doc.body);
                Ok(UpdateOutcome {
                    matched: 1,
                    modified: modified as u64,
                })
            }
            None => Ok(UpdateOutcome {
                matched: 0,
                modified: 0,
            }),
        }
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<(), StoreError> {
        let mut entry = self.collections.entry(collection.to_string()).or_default();
        for doc in docs {
            if entry.iter().any(|existing| existing.id == doc.id) {
                return Err(StoreError::DuplicateKey {
                    index: PRIMARY_INDEX.to_string(),
                });
            }
            if let Some(index) = self.unique_violation(collection, &entry, &doc) {
                return Err(StoreError::DuplicateKey { index });
            }
            entry.push(doc);
        }
        Ok(())
    }

    async fn delete_many(&self, collection: &str, filter: Filter) -> Result<u64, StoreError> {
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|doc| !filter.matches(doc));
        Ok((before - docs.len()) as u64)
    }

    async fn create_index(&self, collection: &str, spec: IndexSpec) -> Result<(), StoreError> {
        let mut indexes = self.indexes.entry(collection.to_string()).or_default();
        match indexes.iter().find(|existing| existing.name == spec.name) {
            Some(existing) if existing.same_definition(&spec) => Ok(()),
            Some(_) => Err(StoreError::InvalidIndex(format!(
                "index {} already exists with a different definition",
                spec.name
            ))),
            None => {
                indexes.push(spec);
                Ok(())
            }
        }
    }

    async fn drop_index(&self, collection: &str, name: &str) -> Result<(), StoreError> {
        if let Some(mut indexes) = self.indexes.get_mut(collection) {
            indexes.retain(|spec| spec.name != name);
        }
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, StoreError> {
        Ok(self
            .indexes
            .get(collection)
            .map(|indexes| indexes.clone())
            .unwrap_or_default())
    }
}
