//! The [`DocumentStore`] trait: the contract every store backend implements.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::{Document, Filter, IndexSpec, StoreError, Update, UpdateOutcome};

/// A fallible cursor over documents.
///
/// Backends must keep read-ahead bounded: the HTTP implementation fetches
/// one page at a time as the stream is polled.
pub type DocumentStream = BoxStream<'static, Result<Document, StoreError>>;

/// Document CRUD plus index management against a single store.
///
/// All operations act on one named collection. The only atomicity guarantee
/// is per single-document update; callers must not assume cross-document
/// transactions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a cursor over every document matching `filter`.
    async fn find(&self, collection: &str, filter: Filter) -> Result<DocumentStream, StoreError>;

    /// Fetch the first document matching `filter`, if any.
    async fn find_one(
        &self,
        collection: &str,
        filter: Filter,
    ) -> Result<Option<Document>, StoreError>;

    /// Atomically update the first document matching `filter`.
    ///
    /// The filter is re-evaluated as part of the update, so a conditional
    /// filter (for example "target field still missing") makes the write
    /// race-safe against concurrent writers.
    async fn update_one(
        &self,
        collection: &str,
        filter: Filter,
        update: Update,
    ) -> Result<UpdateOutcome, StoreError>;

    /// Insert documents. Fails with [`StoreError::DuplicateKey`] if a unique
    /// index (or a document id) collides.
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<(), StoreError>;

    /// Delete every document matching `filter`; returns the deleted count.
    async fn delete_many(&self, collection: &str, filter: Filter) -> Result<u64, StoreError>;

    /// Create an index. Creating an identical index again is a no-op.
    async fn create_index(&self, collection: &str, spec: IndexSpec) -> Result<(), StoreError>;

    /// Drop an index by name. Dropping an unknown index is a no-op.
    async fn drop_index(&self, collection: &str, name: &str) -> Result<(), StoreError>;

    /// List the indexes currently defined on a collection, excluding the
    /// store's built-in primary index.
    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, StoreError>;
}
