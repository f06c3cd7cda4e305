//! Shared wiring for the client integration tests: a server-mode client
//! over the scripted mock executor.

// Each test binary compiles this module separately and uses a subset of it.
#![allow(dead_code)]

use std::sync::Arc;

use strataql_client::{Client, ClientConfig, Mode};
use strataql_test_utils::{ChannelSubscriber, MockExecutor, FIXTURE_SDL};

/// Client wired to a fresh mock executor.
pub fn client_with_mock() -> (Client, Arc<MockExecutor>) {
    let executor = Arc::new(MockExecutor::new());
    let client = Client::builder()
        .config(ClientConfig {
            schema: Some(FIXTURE_SDL.to_string()),
            mode: Mode::Server,
            ..ClientConfig::default()
        })
        .executor(executor.clone())
        .build()
        .expect("test client builds");
    (client, executor)
}

/// Client wired to a mock executor and a channel subscriber.
pub fn client_with_subscriber() -> (Client, Arc<MockExecutor>, Arc<ChannelSubscriber>) {
    let executor = Arc::new(MockExecutor::new());
    let subscriber = Arc::new(ChannelSubscriber::new());
    let client = Client::builder()
        .config(ClientConfig {
            schema: Some(FIXTURE_SDL.to_string()),
            mode: Mode::Server,
            ..ClientConfig::default()
        })
        .executor(executor.clone())
        .subscriber(subscriber.clone())
        .build()
        .expect("test client builds");
    (client, executor, subscriber)
}
