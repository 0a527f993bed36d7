//! The backfill run loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use drover_store::{Document, DocumentStore, Filter, StoreError, Update};

use crate::{BackfillError, Progress, ProgressCallback};

/// Default bound on simultaneously in-flight repairs.
const DEFAULT_CONCURRENCY: usize = 10;

/// What to scan and which field to repair from which.
#[derive(Debug, Clone)]
pub struct BackfillSpec {
    /// Collection to scan.
    pub collection: String,
    /// Scan query selecting candidate documents (typically "target field
    /// missing").
    pub scan: Filter,
    /// Field the missing value is derived from.
    pub source_field: String,
    /// Field being repaired.
    pub target_field: String,
}

impl BackfillSpec {
    /// Scan `collection` for documents where `target_field` is absent/null
    /// and derive it from `source_field`.
    pub fn new(
        collection: impl Into<String>,
        source_field: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        let target_field = target_field.into();
        Self {
            collection: collection.into(),
            scan: Filter::new().missing(&target_field),
            source_field: source_field.into(),
            target_field,
        }
    }

    /// Replace the scan query (for example to also match already-repaired
    /// documents, which then count as skipped).
    pub fn with_scan(mut self, scan: Filter) -> Self {
        self.scan = scan;
        self
    }
}

/// Tuning knobs for a run.
pub struct BackfillOptions {
    /// Bound on simultaneously in-flight repair operations. This is a
    /// worker-pool bound on outstanding store round-trips, not a thread
    /// count.
    pub concurrency: usize,
    /// Whether per-item failures advance the progress counter.
    pub count_failures: bool,
    /// External cancellation: flips to `true` to stop new dispatches.
    /// In-flight repairs drain and the partial summary is still accurate.
    pub cancel: Option<watch::Receiver<bool>>,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            count_failures: true,
            cancel: None,
        }
    }
}

/// Counts for a completed (or cancelled) run.
///
/// `succeeded + failed + skipped_already_present == total_scanned` always
/// holds; documents never pulled from the cursor after a cancellation are
/// not counted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    /// Documents pulled from the scan cursor and processed.
    pub total_scanned: u64,
    /// Repairs that wrote the derived value.
    pub succeeded: u64,
    /// Isolated per-document failures.
    pub failed: u64,
    /// Documents that already had the target field (including repairs lost
    /// to a concurrent writer).
    pub skipped_already_present: u64,
    /// Whether the run was cancelled before the cursor was exhausted.
    pub cancelled: bool,
}

/// Pure derivation from the source field value to the target field value.
pub type DeriveFn = dyn Fn(&Value) -> Option<Value> + Send + Sync;

enum RepairOutcome {
    Succeeded,
    Skipped,
    Failed(String),
    Cursor(StoreError),
}

/// Repair every document matched by `spec.scan`, at most
/// `options.concurrency` at a time.
///
/// Resolves once the cursor is exhausted (or cancellation fired) and every
/// dispatched repair has completed. Per-document failures are counted, not
/// propagated; only cursor-level failures abort with `Err`.
pub async fn run(
    store: &dyn DocumentStore,
    spec: &BackfillSpec,
    derive: &DeriveFn,
    options: BackfillOptions,
    progress: &mut dyn ProgressCallback,
) -> Result<Summary, BackfillError> {
    if options.concurrency == 0 {
        return Err(BackfillError::InvalidConcurrency);
    }

    info!(
        collection = %spec.collection,
        source = %spec.source_field,
        target = %spec.target_field,
        concurrency = options.concurrency,
        "starting backfill"
    );

    let cursor = store.find(&spec.collection, spec.scan.clone()).await?;

    let cancelled = Arc::new(AtomicBool::new(false));
    let cursor = match options.cancel {
        Some(rx) => cursor
            .take_until(wait_for_cancel(rx, cancelled.clone()))
            .boxed(),
        None => cursor,
    };

    // buffer_unordered bounds in-flight repairs and, transitively, cursor
    // read-ahead: the next document is pulled only when pool capacity frees
    // up.
    let mut outcomes = cursor
        .map(|item| async move {
            match item {
                Ok(doc) => repair(store, spec, derive, doc).await,
                Err(e) => RepairOutcome::Cursor(e),
            }
        })
        .buffer_unordered(options.concurrency);

    let mut summary = Summary::default();
    let mut processed: u64 = 0;
    let mut fatal: Option<StoreError> = None;

    while let Some(outcome) = outcomes.next().await {
        match outcome {
            RepairOutcome::Succeeded => {
                summary.total_scanned += 1;
                summary.succeeded += 1;
                processed += 1;
                progress.on_progress(Progress { processed });
            }
            RepairOutcome::Skipped => {
                summary.total_scanned += 1;
                summary.skipped_already_present += 1;
                processed += 1;
                progress.on_progress(Progress { processed });
            }
            RepairOutcome::Failed(reason) => {
                summary.total_scanned += 1;
                summary.failed += 1;
                warn!(collection = %spec.collection, reason, "document repair failed");
                if options.count_failures {
                    processed += 1;
                    progress.on_progress(Progress { processed });
                }
            }
            RepairOutcome::Cursor(e) => {
                // The scan itself broke; remember it, let in-flight repairs
                // drain, then surface it.
                fatal = Some(e);
            }
        }
    }

    if let Some(e) = fatal {
        return Err(e.into());
    }

    summary.cancelled = cancelled.load(Ordering::SeqCst);
    info!(
        total_scanned = summary.total_scanned,
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped_already_present,
        cancelled = summary.cancelled,
        "backfill finished"
    );
    Ok(summary)
}

/// Completes when the watch flag flips to true; never completes if the
/// sender is dropped without signalling.
async fn wait_for_cancel(mut rx: watch::Receiver<bool>, flag: Arc<AtomicBool>) {
    loop {
        if *rx.borrow() {
            flag.store(true, Ordering::SeqCst);
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn repair(
    store: &dyn DocumentStore,
    spec: &BackfillSpec,
    derive: &DeriveFn,
    doc: Document,
) -> RepairOutcome {
    // Re-check against the live document: a concurrent external writer may
    // have repaired it since the cursor read it.
    let current = match store
        .find_one(&spec.collection, Filter::new().id(&doc.id))
        .await
    {
        Ok(Some(current)) => current,
        Ok(None) => {
            debug!(id = %doc.id, "document deleted mid-scan, skipping");
            return RepairOutcome::Skipped;
        }
        Err(e) => return RepairOutcome::Failed(e.to_string()),
    };

    if current.has_field(&spec.target_field) {
        return RepairOutcome::Skipped;
    }

    let Some(source) = current.field(&spec.source_field) else {
        return RepairOutcome::Failed(format!(
            "document {} has no {} to derive from",
            current.id, spec.source_field
        ));
    };

    let Some(derived) = derive(source) else {
        return RepairOutcome::Failed(format!(
            "could not derive {} for document {}",
            spec.target_field, current.id
        ));
    };

    // Conditional update: only writes if the target is still missing, so a
    // racing backfill never clobbers the winner's value.
    let filter = Filter::new().id(&current.id).missing(&spec.target_field);
    let update = Update::new().set(&spec.target_field, derived);
    match store.update_one(&spec.collection, filter, update).await {
        Ok(outcome) if outcome.matched == 0 => RepairOutcome::Skipped,
        Ok(_) => RepairOutcome::Succeeded,
        Err(e) => RepairOutcome::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use drover_store::{DocumentStream, IndexSpec, MemoryStore, UpdateOutcome};
    use serde_json::json;

    use super::*;

    fn slug_of(value: &Value) -> Option<Value> {
        value
            .as_str()
            .map(|s| Value::String(s.to_lowercase().replace(' ', "-")))
    }

    async fn seed_lists(store: &MemoryStore, missing: usize, present: usize) {
        let mut docs = Vec::new();
        for i in 0..missing {
            docs.push(Document::new(
                format!("m{}", i),
                json!({ "title": format!("List {}", i), "slug": null }),
            ));
        }
        for i in 0..present {
            docs.push(Document::new(
                format!("p{}", i),
                json!({ "title": format!("Other {}", i), "slug": format!("other-{}", i) }),
            ));
        }
        store.insert_many("lists", docs).await.unwrap();
    }

    fn spec() -> BackfillSpec {
        // Scan everything so already-present documents are visible as skips.
        BackfillSpec::new("lists", "title", "slug").with_scan(Filter::new())
    }

    #[tokio::test]
    async fn repairs_missing_and_skips_present() {
        let store = MemoryStore::new();
        seed_lists(&store, 3, 7).await;

        let summary = run(
            &store,
            &spec(),
            &slug_of,
            BackfillOptions::default(),
            &mut (),
        )
        .await
        .unwrap();

        assert_eq!(summary.total_scanned, 10);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.skipped_already_present, 7);
        assert_eq!(summary.failed, 0);
        assert!(!summary.cancelled);

        for doc in store.documents("lists") {
            let title = doc.field("title").unwrap().as_str().unwrap();
            let expected = title.to_lowercase().replace(' ', "-");
            assert_eq!(doc.field("slug").unwrap(), &json!(expected));
        }
    }

    #[tokio::test]
    async fn per_item_failures_do_not_abort_the_scan() {
        let store = MemoryStore::new();
        store
            .insert_many(
                "lists",
                vec![
                    Document::new("a", json!({ "title": "Good", "slug": null })),
                    Document::new("b", json!({ "slug": null })), // no source field
                    Document::new("c", json!({ "title": "Also Good", "slug": null })),
                ],
            )
            .await
            .unwrap();

        let summary = run(
            &store,
            &spec(),
            &slug_of,
            BackfillOptions::default(),
            &mut (),
        )
        .await
        .unwrap();

        assert_eq!(summary.total_scanned, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped_already_present, 0);
    }

    #[tokio::test]
    async fn progress_counts_every_processed_task() {
        let store = MemoryStore::new();
        seed_lists(&store, 4, 2).await;

        let mut seen = Vec::new();
        let mut progress = |progress: Progress| seen.push(progress.processed);
        let summary = run(
            &store,
            &spec(),
            &slug_of,
            BackfillOptions::default(),
            &mut progress,
        )
        .await
        .unwrap();

        assert_eq!(summary.total_scanned, 6);
        // Monotonically increasing, one tick per task.
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn invalid_concurrency_is_rejected() {
        let store = MemoryStore::new();
        let options = BackfillOptions {
            concurrency: 0,
            ..Default::default()
        };
        let err = run(&store, &spec(), &slug_of, options, &mut ())
            .await
            .unwrap_err();
        assert!(matches!(err, BackfillError::InvalidConcurrency));
    }

    /// Wraps a store and gauges how many repairs are in flight at once.
    struct GaugedStore {
        inner: MemoryStore,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl GaugedStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for GaugedStore {
        async fn find(
            &self,
            collection: &str,
            filter: Filter,
        ) -> Result<DocumentStream, StoreError> {
            self.inner.find(collection, filter).await
        }

        async fn find_one(
            &self,
            collection: &str,
            filter: Filter,
        ) -> Result<Option<Document>, StoreError> {
            // Each repair issues exactly one find_one, so the number of
            // concurrent find_one calls tracks in-flight repairs.
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            let result = self.inner.find_one(collection, filter).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn update_one(
            &self,
            collection: &str,
            filter: Filter,
            update: Update,
        ) -> Result<UpdateOutcome, StoreError> {
            self.inner.update_one(collection, filter, update).await
        }

        async fn insert_many(
            &self,
            collection: &str,
            docs: Vec<Document>,
        ) -> Result<(), StoreError> {
            self.inner.insert_many(collection, docs).await
        }

        async fn delete_many(&self, collection: &str, filter: Filter) -> Result<u64, StoreError> {
            self.inner.delete_many(collection, filter).await
        }

        async fn create_index(&self, collection: &str, spec: IndexSpec) -> Result<(), StoreError> {
            self.inner.create_index(collection, spec).await
        }

        async fn drop_index(&self, collection: &str, name: &str) -> Result<(), StoreError> {
            self.inner.drop_index(collection, name).await
        }

        async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, StoreError> {
            self.inner.list_indexes(collection).await
        }
    }

    #[tokio::test]
    async fn concurrency_ceiling_is_never_exceeded() {
        let inner = MemoryStore::new();
        seed_lists(&inner, 40, 0).await;
        let store = GaugedStore::new(inner);

        let options = BackfillOptions {
            concurrency: 4,
            ..Default::default()
        };
        let summary = run(&store, &spec(), &slug_of, options, &mut ())
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 40);
        let peak = store.peak.load(Ordering::SeqCst);
        assert!(peak <= 4, "peak in-flight repairs was {}", peak);
        // The pool actually overlapped work.
        assert!(peak > 1, "repairs never overlapped");
    }

    #[tokio::test]
    async fn cancellation_returns_accurate_partial_summary() {
        let inner = MemoryStore::new();
        seed_lists(&inner, 50, 0).await;
        let store = GaugedStore::new(inner); // find_one sleeps, slowing repairs

        let (tx, rx) = watch::channel(false);
        let options = BackfillOptions {
            concurrency: 2,
            cancel: Some(rx),
            ..Default::default()
        };

        let mut progress = |progress: Progress| {
            if progress.processed == 6 {
                tx.send(true).ok();
            }
        };

        let summary = run(&store, &spec(), &slug_of, options, &mut progress)
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert!(summary.total_scanned < 50, "cancellation stopped dispatch");
        assert_eq!(
            summary.succeeded + summary.failed + summary.skipped_already_present,
            summary.total_scanned
        );
    }

    /// A store whose reads pretend the target is still missing, simulating a
    /// concurrent writer that repairs the document between the re-check and
    /// the conditional update.
    struct RacingStore {
        inner: MemoryStore,
        target_field: String,
    }

    #[async_trait]
    impl DocumentStore for RacingStore {
        async fn find(
            &self,
            collection: &str,
            filter: Filter,
        ) -> Result<DocumentStream, StoreError> {
            self.inner.find(collection, filter).await
        }

        async fn find_one(
            &self,
            collection: &str,
            filter: Filter,
        ) -> Result<Option<Document>, StoreError> {
            let mut doc = self.inner.find_one(collection, filter).await?;
            if let Some(ref mut doc) = doc
                && let Some(object) = doc.body.as_object_mut()
            {
                object.remove(&self.target_field);
            }
            Ok(doc)
        }

        async fn update_one(
            &self,
            collection: &str,
            filter: Filter,
            update: Update,
        ) -> Result<UpdateOutcome, StoreError> {
            self.inner.update_one(collection, filter, update).await
        }

        async fn insert_many(
            &self,
            collection: &str,
            docs: Vec<Document>,
        ) -> Result<(), StoreError> {
            self.inner.insert_many(collection, docs).await
        }

        async fn delete_many(&self, collection: &str, filter: Filter) -> Result<u64, StoreError> {
            self.inner.delete_many(collection, filter).await
        }

        async fn create_index(&self, collection: &str, spec: IndexSpec) -> Result<(), StoreError> {
            self.inner.create_index(collection, spec).await
        }

        async fn drop_index(&self, collection: &str, name: &str) -> Result<(), StoreError> {
            self.inner.drop_index(collection, name).await
        }

        async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, StoreError> {
            self.inner.list_indexes(collection).await
        }
    }

    #[tokio::test]
    async fn conditional_update_never_clobbers_a_concurrent_writer() {
        let inner = MemoryStore::new();
        inner
            .insert_many(
                "lists",
                vec![Document::new(
                    "l1",
                    json!({ "title": "Mine", "slug": "theirs" }),
                )],
            )
            .await
            .unwrap();
        let store = RacingStore {
            inner,
            target_field: "slug".to_string(),
        };

        let summary = run(
            &store,
            &spec(),
            &slug_of,
            BackfillOptions::default(),
            &mut (),
        )
        .await
        .unwrap();

        // The conditional filter matched nothing; the race loser skipped.
        assert_eq!(summary.skipped_already_present, 1);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(
            store.inner.documents("lists")[0].field("slug").unwrap(),
            &json!("theirs")
        );
    }
}
