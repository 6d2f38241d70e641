use std::sync::Arc;

use orchestration::{Direction, ErrorKind, FailurePolicy};
use serde_json::json;
use store::MemoryStore;

use super::*;
use crate::test_support::{context, entity, restore_context, save_context, FakeGithub};

fn strategy() -> LabelStrategy {
    LabelStrategy::new(entity(ENTITY))
}

#[test]
fn test_convert_drops_empty_description() {
    let catalog = crate::converter_catalog();

    let label = convert(
        &json!({ "name": "bug", "color": "d73a4a", "description": "", "default": true }),
        &catalog,
    )
    .unwrap();

    assert_eq!(label, json!({ "name": "bug", "color": "d73a4a", "description": null }));
}

#[test]
fn test_convert_requires_color() {
    let err = convert(&json!({ "name": "bug" }), &crate::converter_catalog()).unwrap_err();

    assert!(matches!(err, ConversionError::MissingField { ref field } if field == "color"));
}

#[tokio::test]
async fn test_save_writes_every_label() {
    let github = Arc::new(FakeGithub::new().label("bug", "d73a4a").label("docs", "0075ca"));
    let store = Arc::new(MemoryStore::new());

    let count = strategy()
        .save(&save_context(&github, &store))
        .await
        .unwrap();

    assert_eq!(count, 2);
    let saved = store.collection(ENTITY).unwrap();
    assert_eq!(saved[0]["name"], "bug");
    assert_eq!(saved[1]["color"], "0075ca");
}

#[tokio::test]
async fn test_restore_creates_missing_and_skips_existing_case_insensitively() {
    let github = Arc::new(FakeGithub::new().label("Bug", "d73a4a"));
    let store = Arc::new(MemoryStore::new());
    store.insert(
        ENTITY,
        vec![
            json!({ "name": "bug", "color": "d73a4a" }),
            json!({ "name": "docs", "color": "0075ca", "description": "Documentation" }),
        ],
    );

    let count = strategy()
        .restore(&restore_context(&github, &store))
        .await
        .unwrap();

    assert_eq!(count, 2);
    assert_eq!(github.calls_to("labels.create"), 1);
    assert_eq!(github.label_names(), vec!["Bug", "docs"]);
    let args = &github.args_of("labels.create")[0];
    assert_eq!(args.get_str("description"), Some("Documentation"));
}

#[tokio::test]
async fn test_restore_of_empty_backup_makes_no_calls() {
    let github = Arc::new(FakeGithub::new());
    let store = Arc::new(MemoryStore::new());

    let count = strategy()
        .restore(&restore_context(&github, &store))
        .await
        .unwrap();

    assert_eq!(count, 0);
    assert_eq!(github.calls_to("labels.list"), 0);
}

#[tokio::test]
async fn test_failed_label_does_not_stop_siblings_under_continue() {
    let github = Arc::new(
        FakeGithub::new().fail_when("labels.create", |args| args.get_str("name") == Some("a")),
    );
    let store = Arc::new(MemoryStore::new());
    store.insert(
        ENTITY,
        vec![
            json!({ "name": "a", "color": "111111" }),
            json!({ "name": "b", "color": "222222" }),
        ],
    );

    let err = strategy()
        .restore(&restore_context(&github, &store))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RecordFailures);
    assert_eq!(err.processed(), 1);
    assert_eq!(github.label_names(), vec!["b"]);
}

#[tokio::test]
async fn test_failed_label_stops_siblings_under_abort() {
    let github = Arc::new(FakeGithub::new().always_fail("labels.create"));
    let store = Arc::new(MemoryStore::new());
    store.insert(
        ENTITY,
        vec![
            json!({ "name": "a", "color": "111111" }),
            json!({ "name": "b", "color": "222222" }),
        ],
    );
    let ctx = context(&github, &store, Direction::Restore, FailurePolicy::AbortOnError);

    let err = strategy().restore(&ctx).await.unwrap_err();

    assert_eq!(err.processed(), 0);
    assert_eq!(github.calls_to("labels.create"), 1);
}
