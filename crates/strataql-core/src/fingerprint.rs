//! Request and query-path fingerprinting.
//!
//! Two hash families index the cache tiers:
//!
//! - **Request fingerprints** (`hash_request`) identify a whole canonical
//!   query string; the response tier is keyed by them.
//! - **Path hashes** (`hash_path`) identify one rooted, argument-qualified
//!   query path such as `query.user({"id":"1"}).name`; the query-path tier is
//!   keyed by them. Because the digest covers the rooted path alone, two
//!   different documents that traverse the same path share records: this is
//!   what lets a partial query be synthesised from fragments cached by an
//!   earlier, differently-shaped query.
//!
//! Both are SHA-256 truncated to 128 bits, hex-encoded. Hashes must be stable
//! across restarts: snapshots exported by one process are imported by another.

use sha2::{Digest, Sha256};

/// Length of an emitted fingerprint in hex characters (128 bits).
pub const FINGERPRINT_LEN: usize = 32;

/// Compute the fingerprint of a canonical query string.
///
/// Canonicalisation (variable inlining, fragment inlining, whitespace
/// normalisation) happens in the request parser; this function assumes its
/// input is already canonical. Same input always produces the same output,
/// in this process or any other.
///
/// # Example
///
/// ```
/// use strataql_core::fingerprint::hash_request;
///
/// let a = hash_request("{ user(id: \"1\") { id name } }");
/// let b = hash_request("{ user(id: \"1\") { id name } }");
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 32);
/// ```
#[must_use]
pub fn hash_request(query: &str) -> String {
    digest_128(query.as_bytes())
}

/// Compute the hash of a rooted query path.
///
/// The path is the `.`-joined traversal from the operation root down to a
/// field, with serialised arguments attached to argument-bearing segments so
/// `user({"id":"1"})` and `user({"id":"2"})` never collide.
#[must_use]
pub fn hash_path(path: &str) -> String {
    digest_128(path.as_bytes())
}

fn digest_128(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let mut out = hex::encode(hasher.finalize());
    out.truncate(FINGERPRINT_LEN);
    out
}
