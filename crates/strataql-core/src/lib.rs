//! # StrataQL Core
//!
//! Three-tier cache engine for an isomorphic GraphQL client.
//!
//! ## Architecture
//!
//! A request flows parse → analyse → fetch → resolve:
//!
//! ```text
//! raw query string
//!         ↓
//!   RequestParser          variable/fragment inlining, resource keys,
//!         ↓                canonical print, field type map
//!   hash_request → H
//!         ↓
//!   CacheManager::analyse  responses / query-paths / data-entities
//!    ↙        ↘
//!  full hit   rewritten query → external executor
//!                  ↓
//!   CacheManager::resolve_*  normalised writes into the three tiers
//!         ↓
//!   composite result (+ cache promise)
//! ```
//!
//! ### Key Components
//!
//! - **Cacheability** ([`cacheability`]): parsed `Cache-Control` with a
//!   validity predicate
//! - **Fingerprint** ([`fingerprint`]): stable request and query-path hashes
//! - **AST helpers** ([`ast`]): operation extraction, fragment-aware field
//!   iteration, the six field coordinates
//! - **Request parser** ([`request`]): normalisation and schema-guided
//!   annotation
//! - **Tier stores** ([`store`]): bounded LRU maps with per-entry metadata
//! - **Cache manager** ([`cache`]): analyse/resolve over the three tiers,
//!   in-flight request coalescing, export/import
//!
//! ## Example
//!
//! ```ignore
//! use strataql_core::cache::CacheManager;
//! use strataql_core::request::{RequestContext, RequestOptions, RequestParser};
//! use strataql_core::schema::SchemaIndex;
//!
//! let schema = SchemaIndex::from_sdl(sdl, "id")?;
//! let parser = RequestParser::new(std::sync::Arc::new(schema));
//!
//! let mut ctx = RequestContext::new();
//! let parsed = parser.parse(query, &RequestOptions::default(), &mut ctx)?;
//! let hash = strataql_core::fingerprint::hash_request(&parsed.query);
//!
//! match cache.analyse(&hash, &parsed.ast)? {
//!     CacheAnalysis::Hit { data, .. } => { /* serve from cache */ }
//!     CacheAnalysis::Partial { updated_query, .. } => { /* fetch the rest */ }
//!     CacheAnalysis::Miss => { /* fetch everything */ }
//! }
//! ```

#![forbid(unsafe_code)]
// Missing docs allowed for internal items - public API is fully documented
#![allow(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ast;
pub mod cache;
pub mod cacheability;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod metadata;
pub mod request;
pub mod schema;
pub mod store;

pub(crate) mod clock;

// Re-export the types most callers touch.
pub use cache::{
    CacheAnalysis, CacheManager, CachePromise, CacheSnapshot, FetchedResponse, RequestResult,
    ResolveOptions,
};
pub use cacheability::Cacheability;
pub use config::{CacheControls, CachemapOptions, ClientConfig, Mode, SubscriptionsConfig};
pub use error::{Result, StrataQLError};
pub use metadata::CacheMetadata;
pub use request::{ParsedRequest, RequestContext, RequestOptions, RequestParser};
pub use schema::SchemaIndex;
