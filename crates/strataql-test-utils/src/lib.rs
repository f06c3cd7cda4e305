//! Test utilities for the StrataQL ecosystem: a scripted mock executor, a
//! channel-backed subscriber, and shared schema fixtures.

#![forbid(unsafe_code)]
// Missing docs allowed for internal items - public API is fully documented
#![allow(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use strataql_client::executor::{Executor, FetchOptions};
use strataql_client::subscriber::Subscriber;
use strataql_core::ast::AstDocument;
use strataql_core::{FetchedResponse, Result, StrataQLError};
use tokio::sync::mpsc;

/// Schema shared by the integration tests: users with identity, posts
/// without, one mutation, one subscription.
pub const FIXTURE_SDL: &str = r"
    type Query {
        user(id: ID!): User
        posts: [Post!]
        serverTime: String
    }
    type Mutation {
        updateUser(id: ID!, name: String): User
    }
    type Subscription {
        userUpdated: User
    }
    type User {
        id: ID!
        name: String
        email: String
        friends: [User]
    }
    type Post {
        title: String
        author: User
    }
";

/// Build a successful fetch payload with a `Cache-Control` header.
#[must_use]
pub fn fetched(data: JsonValue, cache_control: &str) -> FetchedResponse {
    let mut headers = HashMap::new();
    headers.insert("cache-control".to_string(), cache_control.to_string());
    FetchedResponse {
        data,
        headers,
        cache_metadata: None,
        errors: None,
    }
}

enum Scripted {
    Respond(FetchedResponse),
    Fail(StrataQLError),
}

/// Executor returning scripted responses in order, counting every call.
///
/// The orchestrator's coalescing and replay guarantees are asserted through
/// the call counter: a cache hit means the counter does not move.
#[derive(Default)]
pub struct MockExecutor {
    script: Mutex<VecDeque<Scripted>>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl MockExecutor {
    /// Fresh executor with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn respond_with(&self, response: FetchedResponse) {
        self.script
            .lock()
            .expect("mock script lock")
            .push_back(Scripted::Respond(response));
    }

    /// Queue a rejection.
    pub fn fail_with(&self, error: StrataQLError) {
        self.script
            .lock()
            .expect("mock script lock")
            .push_back(Scripted::Fail(error));
    }

    /// Delay every resolve, keeping fetches in flight long enough for
    /// concurrent callers to coalesce.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("mock delay lock") = Some(delay);
    }

    /// How many times `resolve` ran.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every query string the executor received, in order.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("mock queries lock").clone()
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn resolve(
        &self,
        query: &str,
        _ast: &AstDocument,
        _options: &FetchOptions,
    ) -> Result<FetchedResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries
            .lock()
            .expect("mock queries lock")
            .push(query.to_string());

        let delay = *self.delay.lock().expect("mock delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().expect("mock script lock").pop_front();
        match scripted {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(error)) => Err(error),
            None => Err(StrataQLError::Internal {
                message: format!("mock executor script exhausted by query: {query}"),
            }),
        }
    }
}

/// Subscriber handing out a channel the test feeds messages into.
#[derive(Default)]
pub struct ChannelSubscriber {
    sender: Mutex<Option<mpsc::Sender<FetchedResponse>>>,
}

impl ChannelSubscriber {
    /// Fresh subscriber; the channel opens on the first `resolve`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one message to the open subscription. Returns `false` when
    /// no subscription is open or the stream was dropped.
    pub async fn push(&self, message: FetchedResponse) -> bool {
        let sender = self.sender.lock().expect("subscriber lock").clone();
        match sender {
            Some(sender) => sender.send(message).await.is_ok(),
            None => false,
        }
    }

    /// Close the transport; the subscription stream ends.
    pub fn close(&self) {
        self.sender.lock().expect("subscriber lock").take();
    }
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
    async fn resolve(
        &self,
        _query: &str,
        _hash: &str,
        _ast: &AstDocument,
        _options: &FetchOptions,
    ) -> Result<mpsc::Receiver<FetchedResponse>> {
        let (sender, receiver) = mpsc::channel(16);
        *self.sender.lock().expect("subscriber lock") = Some(sender);
        Ok(receiver)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_mock_executor_replays_script_in_order() {
        let executor = MockExecutor::new();
        executor.respond_with(fetched(json!({"a": 1}), "max-age=60"));
        executor.respond_with(fetched(json!({"a": 2}), "max-age=60"));

        let schema = strataql_core::SchemaIndex::from_sdl(FIXTURE_SDL, "id").expect("fixture");
        let parser = strataql_core::RequestParser::new(std::sync::Arc::new(schema));
        let mut ctx = strataql_core::RequestContext::new();
        let parsed = parser
            .parse("{ serverTime }", &strataql_core::RequestOptions::default(), &mut ctx)
            .expect("parses");

        let first = executor
            .resolve(&parsed.query, &parsed.ast, &FetchOptions::default())
            .await
            .expect("scripted");
        assert_eq!(first.data["a"], 1);
        assert_eq!(executor.calls(), 1);

        let second = executor
            .resolve(&parsed.query, &parsed.ast, &FetchOptions::default())
            .await
            .expect("scripted");
        assert_eq!(second.data["a"], 2);
        assert_eq!(executor.calls(), 2);

        let exhausted = executor
            .resolve(&parsed.query, &parsed.ast, &FetchOptions::default())
            .await;
        assert!(exhausted.is_err());
    }

    #[tokio::test]
    async fn test_channel_subscriber_round_trip() {
        let subscriber = ChannelSubscriber::new();
        assert!(!subscriber.push(fetched(json!({}), "no-store")).await);

        let schema = strataql_core::SchemaIndex::from_sdl(FIXTURE_SDL, "id").expect("fixture");
        let parser = strataql_core::RequestParser::new(std::sync::Arc::new(schema));
        let mut ctx = strataql_core::RequestContext::new();
        let parsed = parser
            .parse(
                "subscription { userUpdated { id name } }",
                &strataql_core::RequestOptions::default(),
                &mut ctx,
            )
            .expect("parses");

        let mut receiver = subscriber
            .resolve(&parsed.query, "h", &parsed.ast, &FetchOptions::default())
            .await
            .expect("opens");
        assert!(subscriber.push(fetched(json!({"n": 1}), "no-store")).await);
        let message = receiver.recv().await.expect("delivered");
        assert_eq!(message.data["n"], 1);
    }
}
