//! In-flight request coalescing: one fetch per fingerprint, shared
//! outcomes, and registry hygiene on failure.
//!
//! This test protects the concurrency contract: two concurrent requests
//! with an identical fingerprint issue exactly one executor call and
//! observe structurally equal results; when the fetch rejects, every
//! coalesced caller receives the same rejection and both registries end
//! empty.

mod common;

use std::time::Duration;

use common::client_with_mock;
use serde_json::json;
use strataql_client::{RequestOptions, StrataQLError};
use strataql_test_utils::fetched;

const QUERY: &str = "{ user(id: \"1\") { id name } }";

#[tokio::test]
async fn test_concurrent_identical_queries_share_one_fetch() {
    let (client, executor) = client_with_mock();
    executor.set_delay(Duration::from_millis(50));
    executor.respond_with(fetched(
        json!({"user": {"id": "1", "name": "Ada"}}),
        "public, max-age=300",
    ));

    let (first, second) = tokio::join!(
        client.request(QUERY, RequestOptions::default()),
        client.request(QUERY, RequestOptions::default()),
    );

    let first = first.expect("first caller succeeds").into_single().expect("single");
    let second = second.expect("second caller succeeds").into_single().expect("single");

    assert_eq!(executor.calls(), 1, "exactly one fetch for both callers");
    assert_eq!(first.data, second.data);
    assert_eq!(first.cache_metadata.len(), second.cache_metadata.len());
    assert_eq!(first.query_hash, second.query_hash);
}

#[tokio::test]
async fn test_three_way_coalescing() {
    let (client, executor) = client_with_mock();
    executor.set_delay(Duration::from_millis(50));
    executor.respond_with(fetched(
        json!({"user": {"id": "1", "name": "Ada"}}),
        "public, max-age=300",
    ));

    let (a, b, c) = tokio::join!(
        client.request(QUERY, RequestOptions::default()),
        client.request(QUERY, RequestOptions::default()),
        client.request(QUERY, RequestOptions::default()),
    );

    assert_eq!(executor.calls(), 1);
    for outcome in [a, b, c] {
        let result = outcome.expect("caller succeeds").into_single().expect("single");
        assert_eq!(result.data, json!({"user": {"id": "1", "name": "Ada"}}));
    }
}

#[tokio::test]
async fn test_distinct_queries_do_not_coalesce() {
    let (client, executor) = client_with_mock();
    executor.set_delay(Duration::from_millis(20));
    executor.respond_with(fetched(
        json!({"user": {"id": "1", "name": "Ada"}}),
        "public, max-age=300",
    ));
    executor.respond_with(fetched(
        json!({"user": {"id": "2", "name": "Grace"}}),
        "public, max-age=300",
    ));

    let (one, two) = tokio::join!(
        client.request("{ user(id: \"1\") { id name } }", RequestOptions::default()),
        client.request("{ user(id: \"2\") { id name } }", RequestOptions::default()),
    );

    assert!(one.is_ok());
    assert!(two.is_ok());
    assert_eq!(executor.calls(), 2, "different fingerprints fetch separately");
}

#[tokio::test]
async fn test_executor_rejection_drains_every_waiter() {
    let (client, executor) = client_with_mock();
    executor.set_delay(Duration::from_millis(50));
    executor.fail_with(StrataQLError::Executor {
        message: "upstream unavailable".to_string(),
        errors:  Some(json!([{"message": "upstream unavailable"}])),
    });

    let (a, b, c) = tokio::join!(
        client.request(QUERY, RequestOptions::default()),
        client.request(QUERY, RequestOptions::default()),
        client.request(QUERY, RequestOptions::default()),
    );

    assert_eq!(executor.calls(), 1, "one failing fetch serves all three");
    for outcome in [a, b, c] {
        let error = outcome.expect_err("all callers receive the rejection");
        assert!(
            matches!(error, StrataQLError::Executor { .. }),
            "unexpected error: {error}"
        );
    }

    // The registries are clean: a retry begins a fresh fetch.
    executor.respond_with(fetched(
        json!({"user": {"id": "1", "name": "Ada"}}),
        "public, max-age=300",
    ));
    let retry = client
        .request(QUERY, RequestOptions::default())
        .await
        .expect("retry succeeds");
    assert!(retry.into_single().is_ok());
    assert_eq!(executor.calls(), 2);
}

#[tokio::test]
async fn test_no_cache_state_mutates_on_rejection() {
    let (client, executor) = client_with_mock();
    executor.fail_with(StrataQLError::Executor {
        message: "boom".to_string(),
        errors:  None,
    });

    let result = client.request(QUERY, RequestOptions::default()).await;
    assert!(result.is_err());
    assert_eq!(client.response_cache_size(), 0);
    assert_eq!(client.query_path_cache_size(), 0);
    assert_eq!(client.entity_cache_size(), 0);
}
