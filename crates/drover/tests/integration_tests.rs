//! End-to-end backfill scenario against the in-memory store.

use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use drover_backfill::{BackfillOptions, BackfillSpec, slugify};
use drover_store::{Document, DocumentStore, Filter, MemoryStore};

fn derive_slug(value: &Value) -> Option<Value> {
    value.as_str().map(|text| Value::String(slugify(text)))
}

/// 300 lists missing their slug, 700 already repaired.
async fn seed_lists(store: &MemoryStore) {
    let mut docs = Vec::with_capacity(1000);
    for i in 0..1000 {
        let title = format!("Reading List {}", i);
        let body = if i < 300 {
            json!({ "title": title, "slug": null })
        } else {
            json!({ "title": title, "slug": slugify(&title) })
        };
        docs.push(Document::new(format!("list-{}", i), body));
    }
    store.insert_many("lists", docs).await.unwrap();
}

#[tokio::test]
async fn backfills_every_missing_slug_exactly_once() {
    let store = MemoryStore::new();
    seed_lists(&store).await;

    let spec = BackfillSpec::new("lists", "title", "slug").with_scan(Filter::new());
    let summary = drover_backfill::run(
        &store,
        &spec,
        &derive_slug,
        BackfillOptions::default(),
        &mut (),
    )
    .await
    .unwrap();

    assert_eq!(summary.total_scanned, 1000);
    assert_eq!(summary.succeeded, 300);
    assert_eq!(summary.skipped_already_present, 700);
    assert_eq!(summary.failed, 0);
    assert!(!summary.cancelled);

    // Every document now carries the deterministic slug of its title.
    for doc in store.documents("lists") {
        let title = doc.field("title").and_then(Value::as_str).unwrap();
        assert_eq!(
            doc.field("slug"),
            Some(&Value::String(slugify(title))),
            "wrong slug for {}",
            doc.id
        );
    }

    // A second run finds nothing left to repair.
    let summary = drover_backfill::run(
        &store,
        &spec,
        &derive_slug,
        BackfillOptions::default(),
        &mut (),
    )
    .await
    .unwrap();
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.skipped_already_present, 1000);
}

#[tokio::test]
async fn default_scan_only_visits_unrepaired_documents() {
    let store = MemoryStore::new();
    seed_lists(&store).await;

    let spec = BackfillSpec::new("lists", "title", "slug");
    let summary = drover_backfill::run(
        &store,
        &spec,
        &derive_slug,
        BackfillOptions::default(),
        &mut (),
    )
    .await
    .unwrap();

    assert_eq!(summary.total_scanned, 300);
    assert_eq!(summary.succeeded, 300);
    assert_eq!(summary.skipped_already_present, 0);
}
