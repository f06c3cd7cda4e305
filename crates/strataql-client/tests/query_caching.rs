//! Query caching end to end: cold fetch, hot replay, partial synthesis.
//!
//! This test protects the core promise of the client:
//! 1. A cold query hits the executor exactly once; a hot replay within TTL
//!    hits it zero times and returns the same result and fingerprint.
//! 2. A wider query over already-cached data fetches only the missing
//!    fields and composes the final response from both sources.
//! 3. The response record stores exactly the data delivered to the caller.

mod common;

use common::client_with_mock;
use serde_json::json;
use strataql_client::RequestOptions;
use strataql_test_utils::fetched;

fn cached_options() -> RequestOptions {
    RequestOptions {
        await_data_cached: true,
        ..RequestOptions::default()
    }
}

#[tokio::test]
async fn test_cold_query_then_hot_replay() {
    let (client, executor) = client_with_mock();
    executor.respond_with(fetched(
        json!({"user": {"id": "1", "name": "Ada"}}),
        "public, max-age=300",
    ));

    let first = client
        .request("{ user(id: \"1\") { id name } }", cached_options())
        .await
        .expect("cold query succeeds")
        .into_single()
        .expect("single result");
    assert_eq!(first.data, json!({"user": {"id": "1", "name": "Ada"}}));
    assert_eq!(executor.calls(), 1);

    let second = client
        .request("{ user(id: \"1\") { id name } }", RequestOptions::default())
        .await
        .expect("hot replay succeeds")
        .into_single()
        .expect("single result");

    assert_eq!(executor.calls(), 1, "replay must not contact the executor");
    assert_eq!(second.data, first.data);
    assert_eq!(second.query_hash, first.query_hash);
}

#[tokio::test]
async fn test_partial_synthesis_fetches_only_missing_fields() {
    let (client, executor) = client_with_mock();
    executor.respond_with(fetched(
        json!({"user": {"id": "1", "name": "Ada"}}),
        "public, max-age=300",
    ));
    executor.respond_with(fetched(
        json!({"user": {"id": "1", "email": "a@b"}}),
        "public, max-age=300",
    ));

    client
        .request("{ user(id: \"1\") { id name } }", cached_options())
        .await
        .expect("seed query succeeds");

    let widened = client
        .request("{ user(id: \"1\") { id name email } }", cached_options())
        .await
        .expect("widened query succeeds")
        .into_single()
        .expect("single result");

    assert_eq!(executor.calls(), 2);
    let rewritten = &executor.queries()[1];
    assert!(rewritten.contains("email"), "rewritten query: {rewritten}");
    assert!(rewritten.contains("id"), "resource key retained: {rewritten}");
    assert!(
        !rewritten.contains("name"),
        "cached field must not be refetched: {rewritten}"
    );

    assert_eq!(
        widened.data,
        json!({"user": {"id": "1", "name": "Ada", "email": "a@b"}})
    );
}

#[tokio::test]
async fn test_partial_result_is_response_cached_under_its_own_fingerprint() {
    let (client, executor) = client_with_mock();
    executor.respond_with(fetched(
        json!({"user": {"id": "1", "name": "Ada"}}),
        "public, max-age=300",
    ));
    executor.respond_with(fetched(
        json!({"user": {"id": "1", "email": "a@b"}}),
        "public, max-age=300",
    ));

    client
        .request("{ user(id: \"1\") { id name } }", cached_options())
        .await
        .expect("seed query succeeds");
    client
        .request("{ user(id: \"1\") { id name email } }", cached_options())
        .await
        .expect("widened query succeeds");

    // Replaying the widened query is now a response-tier hit.
    let replay = client
        .request("{ user(id: \"1\") { id name email } }", RequestOptions::default())
        .await
        .expect("replay succeeds")
        .into_single()
        .expect("single result");
    assert_eq!(executor.calls(), 2);
    assert_eq!(
        replay.data,
        json!({"user": {"id": "1", "name": "Ada", "email": "a@b"}})
    );
}

#[tokio::test]
async fn test_response_record_matches_delivered_data() {
    let (client, executor) = client_with_mock();
    executor.respond_with(fetched(
        json!({"user": {"id": "1", "name": "Ada"}}),
        "public, max-age=300",
    ));

    let result = client
        .request("{ user(id: \"1\") { id name } }", cached_options())
        .await
        .expect("query succeeds")
        .into_single()
        .expect("single result");

    let hash = result.query_hash.as_deref().expect("queries carry a fingerprint");
    let entry = client
        .response_cache_entry(hash)
        .expect("response record written");
    assert_eq!(entry.value["data"], result.data);
    assert!(entry
        .metadata
        .cache_control
        .as_deref()
        .expect("directive recorded")
        .contains("max-age"));
}

#[tokio::test]
async fn test_all_three_tiers_populated_by_one_query() {
    let (client, executor) = client_with_mock();
    executor.respond_with(fetched(
        json!({"user": {"id": "1", "name": "Ada"}}),
        "public, max-age=300",
    ));

    client
        .request("{ user(id: \"1\") { id name } }", cached_options())
        .await
        .expect("query succeeds");

    assert_eq!(client.response_cache_size(), 1);
    // One record for the user object plus one per leaf (id, name).
    assert_eq!(client.query_path_cache_size(), 3);
    assert_eq!(client.entity_cache_size(), 1);

    let entity = client.entity_cache_entry("User:1").expect("entity written");
    assert_eq!(entity.value["type_name"], "User");
}

#[tokio::test]
async fn test_aliased_query_shares_cached_values() {
    let (client, executor) = client_with_mock();
    executor.respond_with(fetched(
        json!({"user": {"id": "1", "name": "Ada"}}),
        "public, max-age=300",
    ));

    client
        .request("{ user(id: \"1\") { id name } }", cached_options())
        .await
        .expect("seed query succeeds");

    // Same field under an alias: response shape differs (new fingerprint),
    // but every value is already in the lower tiers.
    let aliased = client
        .request("{ account: user(id: \"1\") { id name } }", cached_options())
        .await
        .expect("aliased query succeeds")
        .into_single()
        .expect("single result");

    assert_eq!(executor.calls(), 1, "aliased replay is served from the tiers");
    assert_eq!(aliased.data, json!({"account": {"id": "1", "name": "Ada"}}));
}

#[tokio::test]
async fn test_expired_directive_forces_refetch() {
    let (client, executor) = client_with_mock();
    executor.respond_with(fetched(
        json!({"user": {"id": "1", "name": "Ada"}}),
        "max-age=0",
    ));
    executor.respond_with(fetched(
        json!({"user": {"id": "1", "name": "Ada"}}),
        "max-age=0",
    ));

    client
        .request("{ user(id: \"1\") { id name } }", cached_options())
        .await
        .expect("first query succeeds");
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    client
        .request("{ user(id: \"1\") { id name } }", cached_options())
        .await
        .expect("second query succeeds");

    assert_eq!(executor.calls(), 2, "expired entries are not served");
}
