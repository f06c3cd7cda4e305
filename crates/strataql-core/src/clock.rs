//! Wall-clock access for TTL bookkeeping.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix timestamp in seconds.
///
/// All `stored_at` fields and validity windows are expressed in epoch seconds
/// so snapshots stay meaningful across restarts.
#[must_use]
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
