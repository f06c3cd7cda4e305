//! Active/pending request registries: in-flight coalescing.
//!
//! Two concurrent requests with the same fingerprint must share one fetch.
//! The first caller to arrive *begins* (its fingerprint enters `active`);
//! later callers *join* (a oneshot sender is parked under the fingerprint
//! in `pending`). Whichever way the active request ends, `complete` drains
//! every parked waiter with the shared outcome and clears both entries
//! exactly once. Both maps live under one mutex so join-or-begin is atomic.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::StrataQLError;
use crate::metadata::CacheMetadata;

/// The outcome shared between the active caller and every joined waiter.
#[derive(Debug, Clone)]
pub struct SharedOutcome {
    /// Shaped response data.
    pub data: serde_json::Value,
    /// Per-path cache metadata.
    pub cache_metadata: CacheMetadata,
    /// The request fingerprint.
    pub query_hash: String,
}

/// What a waiter receives when the active request finishes.
pub type OutcomeResult = std::result::Result<SharedOutcome, StrataQLError>;

type Waiter = oneshot::Sender<OutcomeResult>;

/// Admission decision for one arriving request.
#[derive(Debug)]
pub enum Admission {
    /// No request with this fingerprint is in flight; the caller fetches.
    Begin,
    /// A fetch is in flight; await the shared outcome.
    Join(oneshot::Receiver<OutcomeResult>),
}

#[derive(Default)]
struct RegistryState {
    /// Fingerprint → canonical query of the in-flight request.
    active: HashMap<String, String>,
    /// Fingerprint → waiters parked behind the in-flight request.
    pending: HashMap<String, Vec<Waiter>>,
}

/// The two request registries under one lock.
#[derive(Default)]
pub struct RequestRegistry {
    state: Mutex<RegistryState>,
}

impl RequestRegistry {
    /// Fresh, empty registries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically admit a request: begin when idle, join when a fetch for
    /// the same fingerprint is already in flight.
    #[must_use]
    pub fn join_or_begin(&self, hash: &str, query: &str) -> Admission {
        let mut state = self.state.lock();
        if state.active.contains_key(hash) {
            let (tx, rx) = oneshot::channel();
            state.pending.entry(hash.to_string()).or_default().push(tx);
            debug!(hash, "joined in-flight request");
            Admission::Join(rx)
        } else {
            state.active.insert(hash.to_string(), query.to_string());
            Admission::Begin
        }
    }

    /// Whether a fetch is in flight for the fingerprint.
    #[must_use]
    pub fn is_active(&self, hash: &str) -> bool {
        self.state.lock().active.contains_key(hash)
    }

    /// Canonical query of the in-flight request, when one exists.
    #[must_use]
    pub fn active_query(&self, hash: &str) -> Option<String> {
        self.state.lock().active.get(hash).cloned()
    }

    /// Number of waiters parked behind the fingerprint.
    #[must_use]
    pub fn pending_count(&self, hash: &str) -> usize {
        self.state.lock().pending.get(hash).map_or(0, Vec::len)
    }

    /// Deliver the outcome to every parked waiter and clear both entries.
    ///
    /// Safe to call when nothing is parked; waiters that dropped their
    /// receiver are skipped silently: abandonment must never leave dangling
    /// state.
    pub fn complete(&self, hash: &str, outcome: &OutcomeResult) {
        let waiters = {
            let mut state = self.state.lock();
            state.active.remove(hash);
            state.pending.remove(hash).unwrap_or_default()
        };
        let count = waiters.len();
        for waiter in waiters {
            // A closed receiver means the caller went away; nothing to do.
            let _ = waiter.send(outcome.clone());
        }
        if count > 0 {
            debug!(hash, waiters = count, "drained pending requests");
        }
    }

    /// Drop all registry state. Used by `clear_cache`.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.active.clear();
        state.pending.clear();
    }
}

impl std::fmt::Debug for RequestRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RequestRegistry")
            .field("active", &state.active.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}
