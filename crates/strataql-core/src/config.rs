//! Client configuration.
//!
//! [`ClientConfig`] enumerates every recognised option. Exactly one schema
//! source is required; everything else has defaults. Validation happens at
//! `create` time so a misconfigured client never serves a request.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::error::{Result, StrataQLError};
use crate::store::StoreConfig;

/// Default resource key used for entity identity.
pub const DEFAULT_RESOURCE_KEY: &str = "id";

/// Default cache directives per operation kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheControls {
    /// Applied to query responses when the executor supplies no directive.
    pub query: String,
    /// Applied to mutation writes. Mutations are not cacheable by
    /// themselves; their writes become servable only where they refresh
    /// already-known entities.
    pub mutation: String,
    /// Applied to subscription messages; same rationale as mutations.
    pub subscription: String,
}

impl Default for CacheControls {
    fn default() -> Self {
        Self {
            query:        "public, max-age=60".to_string(),
            mutation:     "max-age=0, no-cache, no-store".to_string(),
            subscription: "max-age=0, no-cache, no-store".to_string(),
        }
    }
}

/// Per-tier store bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachemapOptions {
    /// Bounds for the response tier.
    pub responses: StoreConfig,
    /// Bounds for the query-path tier.
    pub query_paths: StoreConfig,
    /// Bounds for the data-entity tier.
    pub entities: StoreConfig,
}

/// Subscription transport configuration, consumed by the configured
/// subscriber implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionsConfig {
    /// Transport address (e.g. a WebSocket URL).
    pub address: String,
    /// Opaque transport options.
    pub opts: Option<JsonValue>,
}

/// Executor strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Fetch through the bundled HTTP executor (`url` required).
    #[default]
    Default,
    /// Execute through a caller-injected executor (and subscriber, when
    /// subscriptions are used); `url` is ignored.
    Server,
}

/// Every recognised client option.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Schema SDL. Exactly one of `schema`/`introspection` is required.
    pub schema: Option<String>,
    /// Introspection-result JSON. Exactly one of `schema`/`introspection`
    /// is required.
    pub introspection: Option<JsonValue>,
    /// GraphQL endpoint for the bundled HTTP executor.
    pub url: Option<String>,
    /// Subscription transport configuration.
    pub subscriptions: Option<SubscriptionsConfig>,
    /// Per-tier store bounds.
    pub cachemap_options: CachemapOptions,
    /// Default cache directives per operation kind.
    pub default_cache_controls: CacheControls,
    /// Per-type cache directives, applied to fields resolving to the type
    /// when the executor supplies no path-level directive.
    pub type_cache_controls: HashMap<String, String>,
    /// Field carrying entity identity. Defaults to `"id"`.
    pub resource_key: Option<String>,
    /// Wrap HTTP requests in batch envelopes.
    pub batch: bool,
    /// HTTP fetch timeout.
    pub fetch_timeout: Option<Duration>,
    /// Extra headers sent with every HTTP fetch.
    pub headers: HashMap<String, String>,
    /// Executor strategy.
    pub mode: Mode,
}

impl ClientConfig {
    /// The effective resource key.
    #[must_use]
    pub fn resource_key(&self) -> &str {
        self.resource_key.as_deref().unwrap_or(DEFAULT_RESOURCE_KEY)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StrataQLError::Config`] when no schema source (or both) is
    /// supplied, when default mode lacks a `url`, or when the resource key
    /// is empty.
    pub fn validate(&self) -> Result<()> {
        match (&self.schema, &self.introspection) {
            (None, None) => {
                return Err(StrataQLError::Config {
                    message: "one of 'schema' or 'introspection' is required".to_string(),
                })
            }
            (Some(_), Some(_)) => {
                return Err(StrataQLError::Config {
                    message: "'schema' and 'introspection' are mutually exclusive".to_string(),
                })
            }
            _ => {}
        }

        if self.mode == Mode::Default && self.url.is_none() {
            return Err(StrataQLError::Config {
                message: "default mode requires 'url' for the HTTP executor".to_string(),
            });
        }

        if self.resource_key.as_deref() == Some("") {
            return Err(StrataQLError::Config {
                message: "'resource_key' cannot be empty".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> ClientConfig {
        ClientConfig {
            schema: Some("type Query { ping: String }".to_string()),
            url: Some("http://localhost:4000/graphql".to_string()),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn test_minimal_config_validates() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn test_schema_source_required() {
        let config = ClientConfig {
            url: Some("http://localhost:4000/graphql".to_string()),
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(StrataQLError::Config { .. })));
    }

    #[test]
    fn test_schema_sources_mutually_exclusive() {
        let config = ClientConfig {
            introspection: Some(serde_json::json!({"__schema": {}})),
            ..minimal()
        };
        assert!(matches!(config.validate(), Err(StrataQLError::Config { .. })));
    }

    #[test]
    fn test_default_mode_requires_url() {
        let config = ClientConfig {
            url: None,
            ..minimal()
        };
        assert!(matches!(config.validate(), Err(StrataQLError::Config { .. })));
    }

    #[test]
    fn test_server_mode_does_not_require_url() {
        let config = ClientConfig {
            url: None,
            mode: Mode::Server,
            ..minimal()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resource_key_defaults_to_id() {
        assert_eq!(minimal().resource_key(), "id");
        let custom = ClientConfig {
            resource_key: Some("uuid".to_string()),
            ..minimal()
        };
        assert_eq!(custom.resource_key(), "uuid");
    }

    #[test]
    fn test_default_directives_make_writes_uncacheable() {
        let controls = CacheControls::default();
        assert!(controls.mutation.contains("no-store"));
        assert!(controls.subscription.contains("no-cache"));
    }
}
