//! The executor seam and the bundled HTTP executor.
//!
//! The cache core never talks to a network; it hands the (possibly
//! rewritten) query to an [`Executor`] and resolves whatever comes back.
//! Default mode wires in [`HttpExecutor`]: a reqwest POST of the standard
//! GraphQL JSON envelope. Server mode injects a caller-supplied
//! implementation instead; the contract is identical.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use strataql_core::ast::AstDocument;
use strataql_core::{FetchedResponse, Result, StrataQLError};
use tracing::debug;

/// Per-fetch options handed to the executor.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Opaque request id, for correlation.
    pub request_id: String,
    /// Operation name, when the document has one.
    pub operation_name: Option<String>,
    /// Caller-supplied grouping key.
    pub tag: Option<JsonValue>,
}

/// External query/mutation execution.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute one operation and return its response envelope.
    async fn resolve(
        &self,
        query: &str,
        ast: &AstDocument,
        options: &FetchOptions,
    ) -> Result<FetchedResponse>;
}

/// HTTP executor: POSTs the GraphQL JSON envelope to one endpoint.
#[derive(Debug)]
pub struct HttpExecutor {
    client: reqwest::Client,
    url: String,
    batch: bool,
}

impl HttpExecutor {
    /// Build the executor.
    ///
    /// # Errors
    ///
    /// Returns [`StrataQLError::Config`] when a header name/value is
    /// malformed or the HTTP client cannot be constructed.
    pub fn new(
        url: &str,
        headers: &HashMap<String, String>,
        fetch_timeout: Option<Duration>,
        batch: bool,
    ) -> Result<Self> {
        let mut header_map = reqwest::header::HeaderMap::new();
        for (name, value) in headers {
            let name = reqwest::header::HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                StrataQLError::Config {
                    message: format!("invalid header name '{name}': {e}"),
                }
            })?;
            let value = reqwest::header::HeaderValue::from_str(value).map_err(|e| {
                StrataQLError::Config {
                    message: format!("invalid header value for '{name}': {e}"),
                }
            })?;
            header_map.insert(name, value);
        }

        let mut builder = reqwest::Client::builder().default_headers(header_map);
        if let Some(timeout) = fetch_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| StrataQLError::Config {
            message: format!("HTTP client construction failed: {e}"),
        })?;

        Ok(Self {
            client,
            url: url.to_string(),
            batch,
        })
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn resolve(
        &self,
        query: &str,
        _ast: &AstDocument,
        options: &FetchOptions,
    ) -> Result<FetchedResponse> {
        let envelope = json!({
            "query": query,
            "operationName": options.operation_name,
        });
        let payload = if self.batch {
            json!([envelope])
        } else {
            envelope
        };

        debug!(request_id = %options.request_id, url = %self.url, "dispatching fetch");
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| StrataQLError::Executor {
                message: format!("fetch failed: {e}"),
                errors:  None,
            })?;

        let status = response.status();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }

        let mut body: JsonValue = response.json().await.map_err(|e| StrataQLError::Executor {
            message: format!("response body is not JSON: {e}"),
            errors:  None,
        })?;
        if self.batch {
            body = match body {
                JsonValue::Array(mut entries) if !entries.is_empty() => entries.remove(0),
                other => other,
            };
        }

        let errors = body.get("errors").filter(|e| !e.is_null()).cloned();
        if !status.is_success() {
            return Err(StrataQLError::Executor {
                message: format!("executor returned HTTP {status}"),
                errors,
            });
        }

        let data = body.get("data").cloned().unwrap_or(JsonValue::Null);
        if data.is_null() {
            // A GraphQL response without data is a failed request, with or
            // without an errors array to explain it.
            return Err(StrataQLError::Executor {
                message: "executor returned no data".to_string(),
                errors,
            });
        }

        let cache_metadata = body
            .get("extensions")
            .and_then(|extensions| extensions.get("cacheMetadata"))
            .and_then(|paths| {
                serde_json::from_value::<HashMap<String, String>>(paths.clone()).ok()
            });

        Ok(FetchedResponse {
            data,
            headers,
            cache_metadata,
            errors,
        })
    }
}
