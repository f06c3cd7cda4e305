//! The client: configuration, orchestration, cache surface.
//!
//! [`Client::request`] is the only public entry point of the pipeline. One
//! request flows parse → response-tier check → admission (coalescing) →
//! analyse → fetch → resolve → pending drain, with events emitted at each
//! observable point. Mutations skip the response tier entirely;
//! subscriptions pump every delivered message through the resolve stage
//! into a lazy stream.
//!
//! `create` always returns a fresh instance: there is no process-global
//! registry. The default/server split is a constructor-time executor
//! strategy: default mode wires the bundled HTTP executor, server mode
//! requires injected `Executor`/`Subscriber` implementations.

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};
use strataql_core::cache::{Admission, CacheAnalysis, CacheMetrics, SharedOutcome};
use strataql_core::fingerprint::hash_request;
use strataql_core::store::StoreEntry;
use strataql_core::{
    CacheManager, CacheSnapshot, ClientConfig, FetchedResponse, Mode, ParsedRequest,
    RequestContext, RequestOptions, RequestResult, ResolveOptions, Result, SchemaIndex,
    StrataQLError,
};
use tokio::sync::mpsc;
use tracing::debug;

use crate::events::{EventEmitter, EventKind, ListenerId};
use crate::executor::{Executor, FetchOptions, HttpExecutor};
use crate::subscriber::{Subscriber, SubscriptionStream};

/// What one request produced: a single result, or a message stream for
/// subscriptions.
#[derive(Debug)]
pub enum RequestOutcome {
    /// Query or mutation result.
    Single(RequestResult),
    /// Subscription message stream.
    Stream(SubscriptionStream),
}

impl RequestOutcome {
    /// Unwrap a single result.
    ///
    /// # Errors
    ///
    /// Returns [`StrataQLError::Internal`] when the outcome is a stream.
    pub fn into_single(self) -> Result<RequestResult> {
        match self {
            Self::Single(result) => Ok(result),
            Self::Stream(_) => Err(StrataQLError::Internal {
                message: "expected a single result, got a subscription stream".to_string(),
            }),
        }
    }

    /// Unwrap a subscription stream.
    ///
    /// # Errors
    ///
    /// Returns [`StrataQLError::Internal`] when the outcome is a single
    /// result.
    pub fn into_stream(self) -> Result<SubscriptionStream> {
        match self {
            Self::Stream(stream) => Ok(stream),
            Self::Single(_) => Err(StrataQLError::Internal {
                message: "expected a subscription stream, got a single result".to_string(),
            }),
        }
    }
}

/// Builder wiring configuration and collaborator strategies.
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    executor: Option<Arc<dyn Executor>>,
    subscriber: Option<Arc<dyn Subscriber>>,
}

impl ClientBuilder {
    /// Fresh builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply the configuration.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Inject an executor (required in server mode, optional otherwise).
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Inject a subscriber for subscription support.
    #[must_use]
    pub fn subscriber(mut self, subscriber: Arc<dyn Subscriber>) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    /// Validate configuration and construct the client.
    ///
    /// # Errors
    ///
    /// Returns [`StrataQLError::Config`] on invalid configuration, a missing
    /// executor in server mode, or an unbuildable schema source.
    pub fn build(self) -> Result<Client> {
        self.config.validate()?;
        let resource_key = self.config.resource_key().to_string();

        let schema = match (&self.config.schema, &self.config.introspection) {
            (Some(sdl), None) => SchemaIndex::from_sdl(sdl, &resource_key)?,
            (None, Some(introspection)) => {
                SchemaIndex::from_introspection(introspection, &resource_key)?
            }
            // validate() already rejected both remaining combinations.
            _ => {
                return Err(StrataQLError::Config {
                    message: "exactly one schema source is required".to_string(),
                })
            }
        };

        let executor: Arc<dyn Executor> = match (self.executor, self.config.mode) {
            (Some(executor), _) => executor,
            (None, Mode::Server) => {
                return Err(StrataQLError::Config {
                    message: "server mode requires an injected executor".to_string(),
                })
            }
            (None, Mode::Default) => {
                let url = self.config.url.as_deref().ok_or_else(|| StrataQLError::Config {
                    message: "default mode requires 'url'".to_string(),
                })?;
                Arc::new(HttpExecutor::new(
                    url,
                    &self.config.headers,
                    self.config.fetch_timeout,
                    self.config.batch,
                )?)
            }
        };

        let cache = CacheManager::new(&self.config);
        let parser = strataql_core::RequestParser::new(Arc::new(schema));

        Ok(Client {
            inner: Arc::new(ClientInner {
                parser,
                cache,
                executor,
                subscriber: self.subscriber,
                events: EventEmitter::new(),
            }),
        })
    }
}

struct ClientInner {
    parser: strataql_core::RequestParser,
    cache: Arc<CacheManager>,
    executor: Arc<dyn Executor>,
    subscriber: Option<Arc<dyn Subscriber>>,
    events: EventEmitter,
}

/// The isomorphic GraphQL client.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a client from configuration. Always a fresh instance.
    ///
    /// # Errors
    ///
    /// As [`ClientBuilder::build`].
    pub fn create(config: ClientConfig) -> Result<Self> {
        ClientBuilder::new().config(config).build()
    }

    /// Start a builder, for injecting executor/subscriber strategies.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Run one request through the pipeline.
    ///
    /// Queries and mutations produce [`RequestOutcome::Single`];
    /// subscriptions produce [`RequestOutcome::Stream`].
    ///
    /// # Errors
    ///
    /// Parse/validation errors reject without touching cache state;
    /// executor errors reject after draining any coalesced waiters with the
    /// same rejection. A request never returns partial cached data *and* a
    /// rejection.
    pub async fn request(&self, query: &str, options: RequestOptions) -> Result<RequestOutcome> {
        let mut ctx = RequestContext::new();
        let outcome = self.dispatch(query, &options, &mut ctx).await;
        if let Err(error) = &outcome {
            self.inner.events.emit(
                EventKind::Error,
                json!({
                    "requestId": ctx.request_id,
                    "code": error.code(),
                    "message": error.to_string(),
                }),
            );
        }
        outcome
    }

    async fn dispatch(
        &self,
        query: &str,
        options: &RequestOptions,
        ctx: &mut RequestContext,
    ) -> Result<RequestOutcome> {
        let parsed = self.inner.parser.parse(query, options, ctx)?;
        self.inner.events.emit(
            EventKind::Request,
            json!({
                "requestId": ctx.request_id,
                "operation": parsed.operation.as_str(),
                "operationName": ctx.operation_name,
            }),
        );

        match parsed.operation {
            strataql_core::ast::OperationKind::Query => self
                .execute_query(&parsed, options, ctx)
                .await
                .map(RequestOutcome::Single),
            strataql_core::ast::OperationKind::Mutation => self
                .execute_mutation(&parsed, options, ctx)
                .await
                .map(RequestOutcome::Single),
            strataql_core::ast::OperationKind::Subscription => self
                .execute_subscription(&parsed, options, ctx)
                .await
                .map(RequestOutcome::Stream),
        }
    }

    async fn execute_query(
        &self,
        parsed: &ParsedRequest,
        options: &RequestOptions,
        ctx: &RequestContext,
    ) -> Result<RequestResult> {
        let hash = hash_request(&parsed.query);

        if let Some(result) = self.inner.cache.cached_response(&hash) {
            self.emit_cache_event(EventKind::CacheHit, &hash, ctx);
            return Ok(result);
        }

        match self.inner.cache.registry().join_or_begin(&hash, &parsed.query) {
            Admission::Join(receiver) => {
                debug!(request_id = %ctx.request_id, hash, "awaiting in-flight request");
                let outcome = receiver.await.map_err(|_| StrataQLError::Cancelled {
                    request_id: ctx.request_id.clone(),
                    reason:     "in-flight request vanished before completion".to_string(),
                })?;
                let shared = outcome?;
                Ok(RequestResult {
                    data: shared.data,
                    cache_metadata: shared.cache_metadata,
                    query_hash: Some(shared.query_hash),
                    cache_promise: None,
                })
            }
            Admission::Begin => {
                let result = self.fetch_and_resolve(parsed, &hash, options, ctx).await;
                let shared = match &result {
                    Ok(resolved) => Ok(SharedOutcome {
                        data: resolved.data.clone(),
                        cache_metadata: resolved.cache_metadata.clone(),
                        query_hash: hash.clone(),
                    }),
                    Err(error) => Err(error.clone()),
                };
                self.inner.cache.registry().complete(&hash, &shared);

                let mut result = result?;
                if options.await_data_cached {
                    if let Some(promise) = result.cache_promise.take() {
                        promise.wait().await?;
                    }
                }
                Ok(result)
            }
        }
    }

    async fn fetch_and_resolve(
        &self,
        parsed: &ParsedRequest,
        hash: &str,
        options: &RequestOptions,
        ctx: &RequestContext,
    ) -> Result<RequestResult> {
        let resolve_options = ResolveOptions {
            tag: options.tag.clone(),
        };

        match self.inner.cache.analyse(hash, &parsed.ast)? {
            CacheAnalysis::Hit {
                data,
                cache_metadata,
            } => {
                self.emit_cache_event(EventKind::CacheHit, hash, ctx);
                let promise = self.inner.cache.clone().cache_full_hit(
                    hash,
                    &data,
                    &cache_metadata,
                    options.tag.clone(),
                );
                Ok(RequestResult {
                    data,
                    cache_metadata,
                    query_hash: Some(hash.to_string()),
                    cache_promise: Some(promise),
                })
            }
            CacheAnalysis::Partial {
                data,
                cache_metadata,
                updated_query,
                updated_ast,
            } => {
                self.emit_cache_event(EventKind::CacheMiss, hash, ctx);
                let fetched = self.fetch(&updated_query, &updated_ast, options, ctx).await?;
                self.inner.cache.clone().resolve_query(
                    &parsed.query,
                    &updated_ast,
                    hash,
                    fetched,
                    Some((data, cache_metadata)),
                    &resolve_options,
                    ctx,
                )
            }
            CacheAnalysis::Miss => {
                self.emit_cache_event(EventKind::CacheMiss, hash, ctx);
                let fetched = self.fetch(&parsed.query, &parsed.ast, options, ctx).await?;
                self.inner.cache.clone().resolve_query(
                    &parsed.query,
                    &parsed.ast,
                    hash,
                    fetched,
                    None,
                    &resolve_options,
                    ctx,
                )
            }
        }
    }

    async fn execute_mutation(
        &self,
        parsed: &ParsedRequest,
        options: &RequestOptions,
        ctx: &RequestContext,
    ) -> Result<RequestResult> {
        let fetched = self.fetch(&parsed.query, &parsed.ast, options, ctx).await?;
        let mut result = self.inner.cache.clone().resolve_mutation(
            &parsed.ast,
            fetched,
            &ResolveOptions {
                tag: options.tag.clone(),
            },
            ctx,
        )?;
        if options.await_data_cached {
            if let Some(promise) = result.cache_promise.take() {
                promise.wait().await?;
            }
        }
        Ok(result)
    }

    async fn execute_subscription(
        &self,
        parsed: &ParsedRequest,
        options: &RequestOptions,
        ctx: &RequestContext,
    ) -> Result<SubscriptionStream> {
        let Some(subscriber) = self.inner.subscriber.clone() else {
            return Err(StrataQLError::Config {
                message: "no subscriber configured for subscription operations".to_string(),
            });
        };

        let hash = hash_request(&parsed.query);
        self.inner.events.emit(
            EventKind::Subscription,
            json!({"requestId": ctx.request_id, "queryHash": hash}),
        );

        let mut messages = subscriber
            .resolve(&parsed.query, &hash, &parsed.ast, &self.fetch_options(options, ctx))
            .await?;

        let (shaped_tx, shaped_rx) = mpsc::channel(16);
        let inner = Arc::clone(&self.inner);
        let ast = parsed.ast.clone();
        let message_ctx = ctx.clone();
        let resolve_options = ResolveOptions {
            tag: options.tag.clone(),
        };
        tokio::spawn(async move {
            while let Some(message) = messages.recv().await {
                let shaped = inner.cache.clone().resolve_subscription(
                    &ast,
                    message,
                    &resolve_options,
                    &message_ctx,
                );
                inner.events.emit(
                    EventKind::Subscription,
                    json!({"requestId": message_ctx.request_id, "delivered": shaped.is_ok()}),
                );
                if shaped_tx.send(shaped).await.is_err() {
                    // The caller abandoned the stream; stop pumping. The
                    // subscriber observes its channel closing.
                    break;
                }
            }
        });

        Ok(SubscriptionStream::new(shaped_rx))
    }

    async fn fetch(
        &self,
        query: &str,
        ast: &strataql_core::ast::AstDocument,
        options: &RequestOptions,
        ctx: &RequestContext,
    ) -> Result<FetchedResponse> {
        self.inner.events.emit(
            EventKind::Fetch,
            json!({"requestId": ctx.request_id, "queryLength": query.len()}),
        );
        self.inner
            .executor
            .resolve(query, ast, &self.fetch_options(options, ctx))
            .await
    }

    fn fetch_options(&self, options: &RequestOptions, ctx: &RequestContext) -> FetchOptions {
        FetchOptions {
            request_id:     ctx.request_id.clone(),
            operation_name: ctx.operation_name.clone(),
            tag:            options.tag.clone(),
        }
    }

    fn emit_cache_event(&self, kind: EventKind, hash: &str, ctx: &RequestContext) {
        self.inner.events.emit(
            kind,
            json!({"requestId": ctx.request_id, "queryHash": hash}),
        );
    }

    // ------------------------------------------------------------------
    // Cache surface
    // ------------------------------------------------------------------

    /// Drop every cached entry and all registry state.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Export all three tiers, optionally filtered by tag.
    #[must_use]
    pub fn export_caches(&self, tag: Option<&JsonValue>) -> CacheSnapshot {
        self.inner.cache.export(tag)
    }

    /// Import a snapshot produced by [`export_caches`](Self::export_caches).
    ///
    /// # Errors
    ///
    /// Returns [`StrataQLError::Store`] on malformed snapshot entries.
    pub fn import_caches(&self, snapshot: CacheSnapshot) -> Result<()> {
        self.inner.cache.import(snapshot)
    }

    /// Entry count of the response tier.
    #[must_use]
    pub fn response_cache_size(&self) -> usize {
        self.inner.cache.response_cache_size()
    }

    /// Entry count of the query-path tier.
    #[must_use]
    pub fn query_path_cache_size(&self) -> usize {
        self.inner.cache.query_path_cache_size()
    }

    /// Entry count of the data-entity tier.
    #[must_use]
    pub fn entity_cache_size(&self) -> usize {
        self.inner.cache.entity_cache_size()
    }

    /// One response tier entry by fingerprint.
    #[must_use]
    pub fn response_cache_entry(&self, key: &str) -> Option<StoreEntry> {
        self.inner.cache.response_cache_entry(key)
    }

    /// One query-path tier entry by path hash.
    #[must_use]
    pub fn query_path_cache_entry(&self, key: &str) -> Option<StoreEntry> {
        self.inner.cache.query_path_cache_entry(key)
    }

    /// One data-entity tier entry by `Type:id` key.
    #[must_use]
    pub fn entity_cache_entry(&self, key: &str) -> Option<StoreEntry> {
        self.inner.cache.entity_cache_entry(key)
    }

    /// Per-tier counters.
    #[must_use]
    pub fn cache_metrics(&self) -> CacheMetrics {
        self.inner.cache.metrics()
    }

    /// Register an event listener.
    pub fn on(
        &self,
        kind: EventKind,
        callback: impl Fn(&crate::events::Event) + Send + Sync + 'static,
    ) -> ListenerId {
        self.inner.events.on(kind, callback)
    }

    /// Remove an event listener by id.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.inner.events.off(kind, id)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("response_cache_size", &self.response_cache_size())
            .field("query_path_cache_size", &self.query_path_cache_size())
            .field("entity_cache_size", &self.entity_cache_size())
            .finish_non_exhaustive()
    }
}
