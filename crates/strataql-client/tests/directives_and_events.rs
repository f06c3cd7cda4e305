//! Per-type cache directives and observability events.
//!
//! Type-level directives fill the gap between executor-supplied path
//! metadata and plain inheritance: a field resolving to a configured type
//! gets that type's directive, which then bounds the whole response through
//! the restrictive metadata fold. Events fire at every observable pipeline
//! point and can be detached by listener id.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use strataql_client::{Client, ClientConfig, EventKind, Mode, RequestOptions};
use strataql_test_utils::{fetched, MockExecutor, FIXTURE_SDL};

fn client_with_type_controls() -> (Client, Arc<MockExecutor>) {
    let executor = Arc::new(MockExecutor::new());
    let mut type_cache_controls = HashMap::new();
    type_cache_controls.insert("User".to_string(), "private, max-age=10".to_string());
    let client = Client::builder()
        .config(ClientConfig {
            schema: Some(FIXTURE_SDL.to_string()),
            mode: Mode::Server,
            type_cache_controls,
            ..ClientConfig::default()
        })
        .executor(executor.clone())
        .build()
        .expect("test client builds");
    (client, executor)
}

#[tokio::test]
async fn test_type_directive_bounds_field_and_response() {
    let (client, executor) = client_with_type_controls();
    executor.respond_with(fetched(
        json!({"user": {"id": "1", "name": "Ada"}}),
        "public, max-age=300",
    ));

    let result = client
        .request(
            "{ user(id: \"1\") { id name } }",
            RequestOptions {
                await_data_cached: true,
                ..RequestOptions::default()
            },
        )
        .await
        .expect("query succeeds")
        .into_single()
        .expect("single result");

    let user = result
        .cache_metadata
        .get(r#"user({"id":"1"})"#)
        .expect("type directive recorded for the field");
    assert!(user.private);
    assert_eq!(user.effective_max_age(), Some(10));

    // The header said 300 seconds, but the response can only live as long
    // as its most restrictive part.
    let query = result.cache_metadata.query().expect("query entry present");
    assert_eq!(query.effective_max_age(), Some(10));
    assert!(query.private);

    let entity = client.entity_cache_entry("User:1").expect("entity written");
    assert_eq!(
        entity.metadata.cache_control.as_deref(),
        Some("private, max-age=10")
    );
}

#[tokio::test]
async fn test_executor_path_metadata_takes_precedence() {
    let (client, executor) = client_with_type_controls();
    let mut response = fetched(
        json!({"user": {"id": "1", "name": "Ada"}}),
        "public, max-age=300",
    );
    let mut paths = HashMap::new();
    paths.insert(r#"user({"id":"1"})"#.to_string(), "max-age=5".to_string());
    response.cache_metadata = Some(paths);
    executor.respond_with(response);

    let result = client
        .request(
            "{ user(id: \"1\") { id name } }",
            RequestOptions {
                await_data_cached: true,
                ..RequestOptions::default()
            },
        )
        .await
        .expect("query succeeds")
        .into_single()
        .expect("single result");

    let user = result
        .cache_metadata
        .get(r#"user({"id":"1"})"#)
        .expect("path directive recorded");
    assert_eq!(user.effective_max_age(), Some(5), "server path metadata wins");
    assert!(!user.private);
}

#[tokio::test]
async fn test_pipeline_events_fire_and_detach() {
    let (client, executor) = common::client_with_mock();
    executor.respond_with(fetched(
        json!({"user": {"id": "1", "name": "Ada"}}),
        "public, max-age=300",
    ));

    let fetches = Arc::new(AtomicUsize::new(0));
    let hits = Arc::new(AtomicUsize::new(0));
    let misses = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&fetches);
    client.on(EventKind::Fetch, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = Arc::clone(&hits);
    let hit_listener = client.on(EventKind::CacheHit, move |event| {
        assert!(event.payload["queryHash"].is_string());
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = Arc::clone(&misses);
    client.on(EventKind::CacheMiss, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let options = RequestOptions {
        await_data_cached: true,
        ..RequestOptions::default()
    };
    client
        .request("{ user(id: \"1\") { id name } }", options.clone())
        .await
        .expect("cold query succeeds");
    client
        .request("{ user(id: \"1\") { id name } }", RequestOptions::default())
        .await
        .expect("hot replay succeeds");

    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert_eq!(misses.load(Ordering::SeqCst), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Detached listeners stop observing.
    assert!(client.off(EventKind::CacheHit, hit_listener));
    client
        .request("{ user(id: \"1\") { id name } }", RequestOptions::default())
        .await
        .expect("second replay succeeds");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_error_event_carries_the_code() {
    let (client, _) = common::client_with_mock();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    client.on(EventKind::Error, move |event| {
        assert_eq!(event.payload["code"], "UNKNOWN_FIELD");
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let result = client
        .request("{ user(id: \"1\") { shoeSize } }", RequestOptions::default())
        .await;
    assert!(result.is_err());
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}
