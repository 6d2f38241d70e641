use std::sync::atomic::AtomicU32;

use serde_json::{json, Value};

use super::*;
use crate::test_support::FakeBoundary;
use crate::{EntityDescriptor, ErrorKind, OperationDecl, RemoteCallError};

fn catalog() -> ConverterCatalog {
    ConverterCatalog::new().with("milestone", |raw, _| {
        Ok(json!({
            "number": crate::convert::required_u64(raw, "number")?,
            "title": crate::convert::required_str(raw, "title")?,
        }))
    })
}

fn descriptors() -> Vec<EntityDescriptor> {
    vec![EntityDescriptor::new("milestone")
        .operation(
            "list_milestones",
            OperationDecl::calls("milestones.list").converter("milestone"),
        )
        .operation(
            "get_milestone",
            OperationDecl::calls("milestones.get")
                .converter("milestone")
                .arguments(["number"])
                .cache_key("{number}"),
        )
        .operation(
            "create_milestone",
            OperationDecl::calls("milestones.create").converter("milestone"),
        )]
}

fn invoker(boundary: &Arc<FakeBoundary>, max_attempts: u32) -> Invoker {
    let catalog = catalog();
    let registry = Registry::build(&descriptors(), boundary.as_ref(), &catalog).unwrap();
    Invoker::new(
        Arc::new(registry),
        Arc::clone(boundary) as Arc<dyn BoundaryClient>,
        Arc::new(catalog),
        RetryConfig::immediate(max_attempts),
    )
}

fn milestones() -> Value {
    json!([
        { "number": 1, "title": "v1", "state": "open" },
        { "number": 2, "title": "v2", "state": "closed" },
    ])
}

fn scripted() -> FakeBoundary {
    FakeBoundary::new()
        .respond("milestones.list", |_| Ok(milestones()))
        .respond("milestones.get", |args| {
            Ok(json!({ "number": args.get_u64("number"), "title": "one" }))
        })
        .respond("milestones.create", |args| {
            Ok(json!({ "number": 10, "title": args.get_str("title") }))
        })
}

// ---------------------------------------------------------------------------
// Caching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_repeated_read_calls_boundary_once() {
    let boundary = Arc::new(scripted());
    let invoker = invoker(&boundary, 3);
    let args = CallArgs::new().with("owner", "octo").with("repo", "hello");

    let first = invoker.invoke("list_milestones", &args).await.unwrap();
    let second = invoker.invoke("list_milestones", &args).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(boundary.calls_to("milestones.list"), 1);
    let stats = invoker.stats();
    assert_eq!(stats.invocations, 2);
    assert_eq!(stats.remote_calls, 1);
    assert_eq!(stats.cache_hits, 1);
}

#[tokio::test]
async fn test_repeated_write_calls_boundary_every_time() {
    let boundary = Arc::new(scripted());
    let invoker = invoker(&boundary, 3);
    let args = CallArgs::new().with("title", "v3");

    invoker.invoke("create_milestone", &args).await.unwrap();
    invoker.invoke("create_milestone", &args).await.unwrap();

    assert_eq!(boundary.calls_to("milestones.create"), 2);
    assert_eq!(invoker.cached_entries(), 0);
}

#[tokio::test]
async fn test_different_arguments_are_cached_separately() {
    let boundary = Arc::new(scripted());
    let invoker = invoker(&boundary, 3);

    invoker
        .invoke("get_milestone", &CallArgs::new().with("number", 1))
        .await
        .unwrap();
    invoker
        .invoke("get_milestone", &CallArgs::new().with("number", 2))
        .await
        .unwrap();
    invoker
        .invoke("get_milestone", &CallArgs::new().with("number", 1))
        .await
        .unwrap();

    assert_eq!(boundary.calls_to("milestones.get"), 2);
    assert_eq!(invoker.cached_entries(), 2);
}

#[tokio::test]
async fn test_clear_cache_forces_a_new_call() {
    let boundary = Arc::new(scripted());
    let invoker = invoker(&boundary, 3);
    let args = CallArgs::new();

    invoker.invoke("list_milestones", &args).await.unwrap();
    invoker.clear_cache();
    invoker.invoke("list_milestones", &args).await.unwrap();

    assert_eq!(boundary.calls_to("milestones.list"), 2);
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_list_results_are_converted_element_wise() {
    let boundary = Arc::new(scripted());
    let invoker = invoker(&boundary, 3);

    let value = invoker
        .invoke("list_milestones", &CallArgs::new())
        .await
        .unwrap();

    assert_eq!(
        *value,
        json!([{ "number": 1, "title": "v1" }, { "number": 2, "title": "v2" }])
    );
}

#[tokio::test]
async fn test_conversion_failure_is_reported_and_not_cached() {
    let boundary = Arc::new(
        FakeBoundary::new().respond("milestones.list", |_| Ok(json!([{ "number": 1 }]))),
    );
    let invoker = invoker(&boundary, 3);

    let err = invoker
        .invoke("list_milestones", &CallArgs::new())
        .await
        .unwrap_err();
    invoker
        .invoke("list_milestones", &CallArgs::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conversion);
    assert_eq!(invoker.cached_entries(), 0);
    assert_eq!(boundary.calls_to("milestones.list"), 2);
}

#[derive(Debug, serde::Deserialize, PartialEq)]
struct Milestone {
    number: u64,
    title: String,
}

#[tokio::test]
async fn test_invoke_as_decodes_typed_models() {
    let boundary = Arc::new(scripted());
    let invoker = invoker(&boundary, 3);

    let milestones: Vec<Milestone> = invoker
        .invoke_as("list_milestones", &CallArgs::new())
        .await
        .unwrap();

    assert_eq!(
        milestones,
        [
            Milestone {
                number: 1,
                title: "v1".to_string()
            },
            Milestone {
                number: 2,
                title: "v2".to_string()
            }
        ]
    );
}

#[tokio::test]
async fn test_invoke_as_reports_shape_mismatch_as_conversion_error() {
    let boundary = Arc::new(scripted());
    let invoker = invoker(&boundary, 3);

    let err = invoker
        .invoke_as::<Milestone>("list_milestones", &CallArgs::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        InvokeError::Conversion {
            source: ConversionError::Decode { .. },
            ..
        }
    ));
}

// ---------------------------------------------------------------------------
// Record-by-record conversion
// ---------------------------------------------------------------------------

fn mixed() -> FakeBoundary {
    FakeBoundary::new().respond("milestones.list", |_| {
        Ok(json!([
            { "number": 1, "title": "v1" },
            { "number": 2 },
            { "number": 3, "title": "v3" },
        ]))
    })
}

#[tokio::test]
async fn test_invoke_each_keeps_records_around_a_rejected_one() {
    let boundary = Arc::new(mixed());
    let invoker = invoker(&boundary, 3);

    let records = invoker
        .invoke_each("list_milestones", &CallArgs::new())
        .await
        .unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(records[0], Ok(json!({ "number": 1, "title": "v1" })));
    assert!(matches!(
        records[1],
        Err(ConversionError::InvalidRecord { index: Some(1), .. })
    ));
    assert_eq!(records[2], Ok(json!({ "number": 3, "title": "v3" })));
}

#[tokio::test]
async fn test_invoke_each_does_not_cache_a_partly_rejected_listing() {
    let boundary = Arc::new(mixed());
    let invoker = invoker(&boundary, 3);

    invoker
        .invoke_each("list_milestones", &CallArgs::new())
        .await
        .unwrap();
    invoker
        .invoke_each("list_milestones", &CallArgs::new())
        .await
        .unwrap();

    assert_eq!(invoker.cached_entries(), 0);
    assert_eq!(boundary.calls_to("milestones.list"), 2);
}

#[tokio::test]
async fn test_invoke_each_shares_the_cache_with_invoke() {
    let boundary = Arc::new(scripted());
    let invoker = invoker(&boundary, 3);

    let records = invoker
        .invoke_each("list_milestones", &CallArgs::new())
        .await
        .unwrap();
    let whole = invoker
        .invoke("list_milestones", &CallArgs::new())
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(
        *whole,
        json!([{ "number": 1, "title": "v1" }, { "number": 2, "title": "v2" }])
    );
    assert_eq!(boundary.calls_to("milestones.list"), 1);
    assert_eq!(invoker.stats().cache_hits, 1);
}

#[tokio::test]
async fn test_invoke_each_as_decodes_each_record_separately() {
    let boundary = Arc::new(mixed());
    let invoker = invoker(&boundary, 3);

    let records = invoker
        .invoke_each_as::<Milestone>("list_milestones", &CallArgs::new())
        .await
        .unwrap();

    let titles: Vec<_> = records
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|m| m.title.as_str())
        .collect();
    assert_eq!(titles, ["v1", "v3"]);
    assert!(records[1].is_err());
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_retryable_read_failure_is_bounded_by_max_attempts() {
    let boundary = Arc::new(FakeBoundary::new().respond("milestones.list", |_| {
        Err(RemoteCallError::retryable("milestones.list", "503").with_status(503))
    }));
    let invoker = invoker(&boundary, 3);

    let err = invoker
        .invoke("list_milestones", &CallArgs::new())
        .await
        .unwrap_err();

    assert_eq!(boundary.calls_to("milestones.list"), 3);
    assert_eq!(err.kind(), ErrorKind::RemoteRetryable);
    assert!(matches!(err, InvokeError::Remote { attempts: 3, .. }));
    assert_eq!(invoker.stats().retries, 2);
}

#[tokio::test]
async fn test_read_recovers_after_transient_failure() {
    let boundary = Arc::new(FakeBoundary::new().respond_in_sequence(
        "milestones.list",
        vec![
            Err(RemoteCallError::retryable("milestones.list", "timeout")),
            Ok(milestones()),
        ],
    ));
    let invoker = invoker(&boundary, 3);

    let value = invoker
        .invoke("list_milestones", &CallArgs::new())
        .await
        .unwrap();

    assert_eq!(value.as_array().map(Vec::len), Some(2));
    assert_eq!(boundary.calls_to("milestones.list"), 2);
}

#[tokio::test]
async fn test_writes_are_not_retried_by_default() {
    let boundary = Arc::new(FakeBoundary::new().respond("milestones.create", |_| {
        Err(RemoteCallError::retryable("milestones.create", "502"))
    }));
    let invoker = invoker(&boundary, 3);

    let err = invoker
        .invoke("create_milestone", &CallArgs::new())
        .await
        .unwrap_err();

    assert!(matches!(err, InvokeError::Remote { attempts: 1, .. }));
    assert_eq!(boundary.calls_to("milestones.create"), 1);
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unknown_operation_never_reaches_the_boundary() {
    let boundary = Arc::new(scripted());
    let invoker = invoker(&boundary, 3);

    let err = invoker
        .invoke("list_widgets", &CallArgs::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnknownOperation);
    assert!(boundary.calls().is_empty());
}

struct FixedOperation {
    calls: AtomicU32,
}

#[async_trait]
impl ExplicitOperation for FixedOperation {
    async fn execute(&self, _args: &CallArgs) -> Result<DomainValue, InvokeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!([]))
    }
}

#[tokio::test]
async fn test_explicit_override_takes_precedence_over_registry() {
    let boundary = Arc::new(scripted());
    let handler = Arc::new(FixedOperation {
        calls: AtomicU32::new(0),
    });
    let invoker = invoker(&boundary, 3).with_override(
        "list_milestones",
        Arc::clone(&handler) as Arc<dyn ExplicitOperation>,
    );

    let first = invoker
        .invoke("list_milestones", &CallArgs::new())
        .await
        .unwrap();
    invoker
        .invoke("list_milestones", &CallArgs::new())
        .await
        .unwrap();

    assert_eq!(*first, json!([]));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    assert!(boundary.calls().is_empty());
}

#[tokio::test]
async fn test_override_may_name_an_undeclared_operation() {
    let boundary = Arc::new(scripted());
    let handler: Arc<dyn ExplicitOperation> = Arc::new(FixedOperation {
        calls: AtomicU32::new(0),
    });
    let invoker = invoker(&boundary, 3).with_override("list_widgets", handler);

    assert!(invoker
        .invoke("list_widgets", &CallArgs::new())
        .await
        .is_ok());
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_of_one_key_share_a_single_cache_entry() {
    const TASKS: u64 = 16;
    let boundary = Arc::new(scripted());
    let invoker = Arc::new(invoker(&boundary, 3));
    let args = CallArgs::new().with("owner", "octo").with("repo", "hello");

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..TASKS {
        let invoker = Arc::clone(&invoker);
        let args = args.clone();
        tasks.spawn(async move { invoker.invoke("list_milestones", &args).await });
    }
    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        results.push(joined.unwrap().unwrap());
    }

    assert_eq!(results.len() as u64, TASKS);
    assert!(results.iter().all(|value| **value == *results[0]));
    assert_eq!(invoker.cached_entries(), 1);
    // Concurrent misses may each reach the boundary; there is no in-flight
    // de-duplication.
    let stats = invoker.stats();
    assert!((1..=TASKS).contains(&stats.remote_calls));
    assert_eq!(stats.remote_calls + stats.cache_hits, TASKS);
    assert_eq!(stats.invocations, TASKS);
}
