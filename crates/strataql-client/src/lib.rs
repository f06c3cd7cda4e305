//! # StrataQL Client
//!
//! The request orchestrator over the [`strataql-core`](strataql_core) cache
//! engine: one [`Client`] per configuration, driving parse → analyse →
//! fetch → resolve with in-flight request coalescing, plus the bundled HTTP
//! executor, the subscriber seam and the event emitter.
//!
//! ## Example
//!
//! ```ignore
//! use strataql_client::{Client, ClientConfig, RequestOptions};
//!
//! let client = Client::create(ClientConfig {
//!     schema: Some(sdl.to_string()),
//!     url: Some("https://api.example.com/graphql".to_string()),
//!     ..ClientConfig::default()
//! })?;
//!
//! let outcome = client
//!     .request("{ user(id: \"1\") { id name } }", RequestOptions::default())
//!     .await?
//!     .into_single()?;
//! println!("{}", outcome.data);
//! ```

#![forbid(unsafe_code)]
// Missing docs allowed for internal items - public API is fully documented
#![allow(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
pub mod events;
pub mod executor;
pub mod subscriber;

pub use client::{Client, ClientBuilder, RequestOutcome};
pub use events::{Event, EventEmitter, EventKind, ListenerId};
pub use executor::{Executor, FetchOptions, HttpExecutor};
// Re-export the core types callers interact with.
pub use strataql_core::{
    CacheMetadata, CachePromise, CacheSnapshot, ClientConfig, FetchedResponse, Mode,
    RequestOptions, RequestResult, Result, StrataQLError, SubscriptionsConfig,
};
pub use subscriber::{Subscriber, SubscriptionStream};
