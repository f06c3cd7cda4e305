//! # StrataQL
//!
//! Umbrella crate for the StrataQL GraphQL client: a transparent,
//! three-tier, content-addressed cache (responses / query paths / data
//! entities) behind a single `request` entry point.
//!
//! Most applications only need [`Client`] and [`ClientConfig`]; the
//! underlying engine is re-exported as [`core`] for direct access to the
//! cache manager, parser and stores.

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

/// The cache engine: cacheability, parser, tier stores, cache manager.
pub use strataql_core as core;

pub use strataql_client::{
    Client, ClientBuilder, ClientConfig, Event, EventKind, Executor, FetchedResponse,
    HttpExecutor, ListenerId, Mode, RequestOptions, RequestOutcome, RequestResult, Result,
    StrataQLError, Subscriber, SubscriptionStream, SubscriptionsConfig,
};
