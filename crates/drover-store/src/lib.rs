//! Document store boundary for drover.
//!
//! This crate defines the store interface the migration runner, backfill
//! executor and index synchronizer operate against:
//!
//! - **Trait**: [`DocumentStore`] — cursor reads plus atomic single-document
//!   updates; no cross-document transactions are assumed.
//! - **HTTP client**: [`HttpStore`] — reqwest client for a JSON document
//!   store API, with bounded retry of transient failures.
//! - **Memory backend**: [`MemoryStore`] — in-process store used by the test
//!   suites and runnable end to end.
//! - **Index sync**: declarative index definitions diffed against the
//!   store's actual indexes.

mod error;
mod http;
mod index;
mod memory;
mod store;
mod types;

pub use error::StoreError;
pub use http::HttpStore;
pub use index::{EntityIndexes, IndexDefinition, IndexSyncReport, sync_indexes};
pub use memory::MemoryStore;
pub use store::{DocumentStore, DocumentStream};
pub use types::{Document, FieldPredicate, Filter, IndexOrder, IndexSpec, Update, UpdateOutcome};
