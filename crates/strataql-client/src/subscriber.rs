//! The subscriber seam and the subscription result stream.
//!
//! Subscription transports (WebSocket and friends) live outside the core;
//! a [`Subscriber`] delivers raw messages over a channel, and the
//! orchestrator pumps each one through the resolve stage into a
//! [`SubscriptionStream`] of shaped results. Dropping the stream cancels
//! the pump; the subscriber observes its channel closing.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use strataql_core::ast::AstDocument;
use strataql_core::{FetchedResponse, RequestResult, Result};
use tokio::sync::mpsc;

use crate::executor::FetchOptions;

/// External subscription transport.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Open a subscription and return its message channel.
    async fn resolve(
        &self,
        query: &str,
        hash: &str,
        ast: &AstDocument,
        options: &FetchOptions,
    ) -> Result<mpsc::Receiver<FetchedResponse>>;
}

/// Lazy sequence of shaped subscription results.
#[derive(Debug)]
pub struct SubscriptionStream {
    receiver: mpsc::Receiver<Result<RequestResult>>,
}

impl SubscriptionStream {
    pub(crate) fn new(receiver: mpsc::Receiver<Result<RequestResult>>) -> Self {
        Self { receiver }
    }

    /// Await the next shaped message; `None` when the transport ended.
    pub async fn next_message(&mut self) -> Option<Result<RequestResult>> {
        self.receiver.recv().await
    }
}

impl Stream for SubscriptionStream {
    type Item = Result<RequestResult>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
