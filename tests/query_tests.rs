// tests/query_tests.rs

use std::sync::Arc;

use codefeed::query::{
    Filter, FilterOp, MemoryBackend, QueryAdapter, QueryDescriptor, QueryError, Row,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize, PartialEq)]
struct Note {
    id: i64,
    title: String,
}

fn setup() -> (MemoryBackend, QueryAdapter) {
    let backend = MemoryBackend::new();
    backend.add_unique_key("notes", &["title"]);
    backend.seed(
        "notes",
        vec![
            json!({ "title": "alpha", "pinned": true }),
            json!({ "title": "beta", "pinned": true }),
            json!({ "title": "gamma", "pinned": false }),
        ],
    );
    let adapter = QueryAdapter::new(Arc::new(backend.clone()));
    (backend, adapter)
}

#[tokio::test]
async fn single_needs_exactly_one_row() {
    let (_, db) = setup();

    let one = db
        .single::<Note>(&QueryDescriptor::from("notes").filter(Filter::eq("title", "beta")))
        .await;
    assert_eq!(one.data().map(|n| n.id), Some(2));

    let none = db
        .single::<Note>(&QueryDescriptor::from("notes").filter(Filter::eq("title", "zeta")))
        .await;
    assert_eq!(none.error(), Some(&QueryError::NotFound));
    assert!(none.data().is_none());

    let many = db
        .single::<Note>(&QueryDescriptor::from("notes").filter(Filter::eq("pinned", true)))
        .await;
    assert_eq!(many.error(), Some(&QueryError::TooManyRows(2)));
    assert!(many.data().is_none());
}

#[tokio::test]
async fn maybe_single_treats_zero_rows_as_success() {
    let (_, db) = setup();

    let none = db
        .maybe_single::<Note>(&QueryDescriptor::from("notes").filter(Filter::eq("title", "zeta")))
        .await;
    assert!(none.is_ok());
    assert_eq!(none.into_result(), Ok(None));

    let many = db
        .maybe_single::<Note>(&QueryDescriptor::from("notes").filter(Filter::eq("pinned", true)))
        .await;
    assert!(matches!(many.error(), Some(QueryError::TooManyRows(_))));
}

#[tokio::test]
async fn invalid_filters_never_reach_the_backend() {
    let (backend, db) = setup();
    backend.reset_calls();

    let result = db
        .many::<Note>(&QueryDescriptor::from("notes").filter(Filter { op: FilterOp::Like, ..Filter::eq("id", 3) }))
        .await;

    assert!(matches!(
        result.error(),
        Some(QueryError::InvalidFilter { column, .. }) if column == "id"
    ));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn backend_failures_are_normalized() {
    let (backend, db) = setup();
    backend.fail_table("notes", "socket closed");

    let result = db.many::<Note>(&QueryDescriptor::from("notes")).await;

    assert_eq!(
        result.error(),
        Some(&QueryError::Backend("socket closed".to_string()))
    );
    assert!(result.data().is_none());
}

#[tokio::test]
async fn unique_violations_surface_as_conflicts() {
    let (_, db) = setup();
    let mut row = Row::new();
    row.insert("title".into(), json!("alpha"));

    let result = db.insert::<Note>("notes", vec![row]).await;

    assert!(matches!(result.error(), Some(QueryError::Conflict(_))));
}

#[tokio::test]
async fn failed_batch_insert_writes_nothing() {
    let (backend, db) = setup();
    let rows: Vec<Row> = ["delta", "alpha"]
        .iter()
        .map(|t| {
            let mut row = Row::new();
            row.insert("title".into(), json!(t));
            row
        })
        .collect();

    let result = db.insert::<Note>("notes", rows).await;

    assert!(!result.is_ok());
    assert_eq!(backend.rows("notes").len(), 3);
}

#[tokio::test]
async fn unfiltered_writes_are_refused() {
    let (backend, db) = setup();
    let mut patch = Row::new();
    patch.insert("title".into(), json!("x"));

    let updated = db.update::<Note>("notes", patch, &[]).await;
    let removed = db.remove("notes", &[]).await;

    assert!(matches!(updated.error(), Some(QueryError::InvalidFilter { .. })));
    assert!(matches!(removed.error(), Some(QueryError::InvalidFilter { .. })));
    assert_eq!(backend.rows("notes").len(), 3);
}

#[tokio::test]
async fn count_and_range_windows() {
    let (_, db) = setup();
    let q = QueryDescriptor::from("notes").order_by("id", false);

    let count = db.count(&q).await;
    assert_eq!(count.data(), Some(&3));

    let page = db.many::<Note>(&q.clone().range(1, 2).count()).await;
    assert_eq!(page.data().map(|n| n.iter().map(|n| n.id).collect::<Vec<_>>()), Some(vec![2, 3]));
    assert_eq!(page.count(), Some(3));
}

#[tokio::test]
async fn exclude_and_or_groups() {
    let (_, db) = setup();
    let q = QueryDescriptor::from("notes")
        .exclude(Filter::eq("title", "alpha"))
        .any_of(vec![Filter::eq("title", "alpha"), Filter::eq("pinned", true)])
        .order_by("id", false);

    let notes = db.many::<Note>(&q).await.require().unwrap();
    assert_eq!(notes, vec![Note { id: 2, title: "beta".into() }]);
}

#[tokio::test]
async fn exclude_keeps_rows_with_a_null_column() {
    let backend = MemoryBackend::new();
    backend.seed(
        "snippets",
        vec![
            json!({ "title": "a", "language": "rust" }),
            json!({ "title": "b", "language": null }),
            json!({ "title": "c" }),
            json!({ "title": "d", "language": "go" }),
        ],
    );
    let db = QueryAdapter::new(Arc::new(backend));

    let q = QueryDescriptor::from("snippets")
        .exclude(Filter::eq("language", "rust"))
        .order_by("id", false);
    let snippets = db.many::<Note>(&q).await.require().unwrap();

    let titles: Vec<_> = snippets.into_iter().map(|n| n.title).collect();
    assert_eq!(titles, vec!["b", "c", "d"]);
}

#[tokio::test]
async fn unknown_rpc_is_a_backend_error() {
    let (_, db) = setup();
    let result = db.rpc::<serde_json::Value>("missing_fn", json!({})).await;
    assert!(matches!(result.error(), Some(QueryError::Backend(_))));
}

#[test]
fn filter_operator_defaults_to_eq() {
    let omitted: Filter = serde_json::from_value(json!({ "column": "title", "value": "alpha" })).unwrap();
    let unknown: Filter =
        serde_json::from_value(json!({ "column": "title", "op": "approx", "value": "alpha" })).unwrap();
    assert_eq!(omitted.op, FilterOp::Eq);
    assert_eq!(unknown.op, FilterOp::Eq);
}
