//! Cache-Control directive parsing and validity.
//!
//! A [`Cacheability`] is a parsed `Cache-Control` directive plus the instant
//! it was stored, and answers the one question every tier read asks: is this
//! entry still servable now? Parsing is tolerant: unknown directives are
//! preserved and re-printed so a round trip through the cache never loses
//! information the origin sent.
//!
//! Merging two cacheabilities (done when combining [`CacheMetadata`] paths)
//! takes the **minimum** freshness lifetime and the **union** of restrictive
//! flags, so a combined entry is never fresher than its strictest part.
//!
//! [`CacheMetadata`]: crate::metadata::CacheMetadata

use serde::{Deserialize, Serialize};

use crate::clock::current_timestamp;

/// A parsed `Cache-Control` directive with a validity predicate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cacheability {
    /// `max-age` in seconds, when present.
    pub max_age: Option<u64>,

    /// `s-maxage` in seconds, when present. Takes precedence over `max-age`
    /// for the effective freshness lifetime, as it does for shared caches.
    pub s_max_age: Option<u64>,

    /// `no-cache`: the entry may be stored but never served without
    /// revalidation; this cache has no revalidation channel, so it is
    /// equivalent to "never valid".
    pub no_cache: bool,

    /// `no-store`: the entry must not be served, ever.
    pub no_store: bool,

    /// `public` flag, preserved for printing.
    pub public: bool,

    /// `private` flag. Restrictive: survives merges.
    pub private: bool,

    /// `stale-while-revalidate` window in seconds. Within the window the
    /// entry still reports valid; scheduling the background refresh is the
    /// caller's concern.
    pub stale_while_revalidate: Option<u64>,

    /// Unknown directives, preserved verbatim in parse order.
    pub extensions: Vec<String>,

    /// Entity tag from the response headers, when one accompanied the
    /// directive.
    pub etag: Option<String>,

    /// Unix timestamp (seconds) at which the guarded value was stored.
    pub stored_at: u64,
}

/// Dehydrated summary of a [`Cacheability`], serialisable into snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheabilityMetadata {
    /// The canonical `Cache-Control` string.
    pub cache_control: String,

    /// Entity tag, when present.
    pub etag: Option<String>,

    /// Absolute expiry instant (Unix seconds), SWR window included. Zero for
    /// entries that can never be served.
    pub ttl: u64,
}

impl Cacheability {
    /// Parse a `Cache-Control` header value.
    ///
    /// Parsing is tolerant: unknown directives are kept and re-printed, and
    /// malformed numeric values degrade to the directive being treated as an
    /// extension rather than failing the parse. `stored_at` is stamped with
    /// the current time.
    ///
    /// # Example
    ///
    /// ```
    /// use strataql_core::cacheability::Cacheability;
    ///
    /// let c = Cacheability::parse_cache_control("public, max-age=300");
    /// assert_eq!(c.max_age, Some(300));
    /// assert!(c.public);
    /// ```
    #[must_use]
    pub fn parse_cache_control(value: &str) -> Self {
        let mut cacheability = Self {
            stored_at: current_timestamp(),
            ..Self::default()
        };

        for raw in value.split(',') {
            let directive = raw.trim();
            if directive.is_empty() {
                continue;
            }
            let (name, arg) = match directive.split_once('=') {
                Some((n, a)) => (n.trim(), Some(a.trim().trim_matches('"'))),
                None => (directive, None),
            };
            match (name.to_ascii_lowercase().as_str(), arg) {
                ("max-age", Some(secs)) if secs.parse::<u64>().is_ok() => {
                    cacheability.max_age = secs.parse().ok();
                }
                ("s-maxage", Some(secs)) if secs.parse::<u64>().is_ok() => {
                    cacheability.s_max_age = secs.parse().ok();
                }
                ("stale-while-revalidate", Some(secs)) if secs.parse::<u64>().is_ok() => {
                    cacheability.stale_while_revalidate = secs.parse().ok();
                }
                ("no-cache", None) => cacheability.no_cache = true,
                ("no-store", None) => cacheability.no_store = true,
                ("public", None) => cacheability.public = true,
                ("private", None) => cacheability.private = true,
                _ => cacheability.extensions.push(directive.to_string()),
            }
        }

        cacheability
    }

    /// Print the canonical `Cache-Control` string.
    ///
    /// Canonical order: visibility flags, restrictions, lifetimes, then any
    /// preserved unknown directives. `parse_cache_control` of the output
    /// reproduces the same directive set.
    #[must_use]
    pub fn print_cache_control(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if self.public {
            parts.push("public".to_string());
        }
        if self.private {
            parts.push("private".to_string());
        }
        if self.no_cache {
            parts.push("no-cache".to_string());
        }
        if self.no_store {
            parts.push("no-store".to_string());
        }
        if let Some(secs) = self.max_age {
            parts.push(format!("max-age={secs}"));
        }
        if let Some(secs) = self.s_max_age {
            parts.push(format!("s-maxage={secs}"));
        }
        if let Some(secs) = self.stale_while_revalidate {
            parts.push(format!("stale-while-revalidate={secs}"));
        }
        parts.extend(self.extensions.iter().cloned());
        parts.join(", ")
    }

    /// Effective freshness lifetime in seconds: `s-maxage` else `max-age`.
    #[must_use]
    pub fn effective_max_age(&self) -> Option<u64> {
        self.s_max_age.or(self.max_age)
    }

    /// Whether the guarded value may be served right now.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(current_timestamp())
    }

    /// Whether the guarded value may be served at `now` (Unix seconds).
    ///
    /// `no-store` and `no-cache` are never valid. Otherwise the entry is
    /// valid while `now` falls inside `stored_at + lifetime`, extended by the
    /// `stale-while-revalidate` window when one is present.
    #[must_use]
    pub fn is_valid_at(&self, now: u64) -> bool {
        if self.no_store || self.no_cache {
            return false;
        }
        let Some(lifetime) = self.effective_max_age() else {
            return false;
        };
        let window = lifetime.saturating_add(self.stale_while_revalidate.unwrap_or(0));
        self.stored_at.saturating_add(window) >= now
    }

    /// Dehydrated summary: canonical directive, etag and absolute expiry.
    #[must_use]
    pub fn metadata(&self) -> CacheabilityMetadata {
        let ttl = match self.effective_max_age() {
            Some(lifetime) if !self.no_cache && !self.no_store => {
                let window = lifetime.saturating_add(self.stale_while_revalidate.unwrap_or(0));
                self.stored_at.saturating_add(window)
            }
            _ => 0,
        };
        CacheabilityMetadata {
            cache_control: self.print_cache_control(),
            etag: self.etag.clone(),
            ttl,
        }
    }

    /// Merge two cacheabilities into the stricter combination.
    ///
    /// The result takes the minimum of each lifetime present on either side,
    /// the union of the restrictive flags (`no-cache`, `no-store`,
    /// `private`), and the earlier `stored_at`: so the merged entry expires
    /// no later than its strictest input.
    #[must_use]
    pub fn merge_restrictive(&self, other: &Self) -> Self {
        let mut extensions = self.extensions.clone();
        for ext in &other.extensions {
            if !extensions.contains(ext) {
                extensions.push(ext.clone());
            }
        }
        Self {
            max_age: min_present(self.max_age, other.max_age),
            s_max_age: min_present(self.s_max_age, other.s_max_age),
            no_cache: self.no_cache || other.no_cache,
            no_store: self.no_store || other.no_store,
            public: self.public && other.public,
            private: self.private || other.private,
            stale_while_revalidate: min_present(
                self.stale_while_revalidate,
                other.stale_while_revalidate,
            ),
            extensions,
            etag: self.etag.clone().or_else(|| other.etag.clone()),
            stored_at: self.stored_at.min(other.stored_at),
        }
    }

    /// Replace the storage instant. Used when rehydrating snapshot entries
    /// whose `stored_at` must survive the round trip.
    #[must_use]
    pub fn with_stored_at(mut self, stored_at: u64) -> Self {
        self.stored_at = stored_at;
        self
    }
}

fn min_present(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_common_directives() {
        let c = Cacheability::parse_cache_control("public, max-age=300, s-maxage=600");
        assert!(c.public);
        assert_eq!(c.max_age, Some(300));
        assert_eq!(c.s_max_age, Some(600));
        assert!(!c.no_cache);
    }

    #[test]
    fn test_parse_preserves_unknown_directives() {
        let c = Cacheability::parse_cache_control("max-age=60, immutable, community=\"UCI\"");
        assert_eq!(c.extensions, vec!["immutable", "community=\"UCI\""]);
        let printed = c.print_cache_control();
        assert!(printed.contains("immutable"));
        assert!(printed.contains("community=\"UCI\""));
    }

    #[test]
    fn test_print_is_canonical() {
        let c = Cacheability::parse_cache_control("max-age=60,   public");
        assert_eq!(c.print_cache_control(), "public, max-age=60");
    }

    #[test]
    fn test_parse_print_round_trip() {
        let source = "public, no-cache, max-age=30, stale-while-revalidate=10";
        let printed = Cacheability::parse_cache_control(source).print_cache_control();
        let reparsed = Cacheability::parse_cache_control(&printed);
        assert_eq!(reparsed.print_cache_control(), printed);
    }

    #[test]
    fn test_no_store_never_valid() {
        let mut c = Cacheability::parse_cache_control("no-store, max-age=9999");
        c.stored_at = 1000;
        assert!(!c.is_valid_at(1000));
    }

    #[test]
    fn test_no_cache_never_valid() {
        let mut c = Cacheability::parse_cache_control("no-cache, max-age=9999");
        c.stored_at = 1000;
        assert!(!c.is_valid_at(1001));
    }

    #[test]
    fn test_validity_window() {
        let mut c = Cacheability::parse_cache_control("max-age=60");
        c.stored_at = 1000;
        assert!(c.is_valid_at(1000));
        assert!(c.is_valid_at(1060));
        assert!(!c.is_valid_at(1061));
    }

    #[test]
    fn test_stale_while_revalidate_extends_window() {
        let mut c = Cacheability::parse_cache_control("max-age=60, stale-while-revalidate=30");
        c.stored_at = 1000;
        assert!(c.is_valid_at(1090));
        assert!(!c.is_valid_at(1091));
    }

    #[test]
    fn test_missing_lifetime_is_invalid() {
        let mut c = Cacheability::parse_cache_control("public");
        c.stored_at = 1000;
        assert!(!c.is_valid_at(1000));
    }

    #[test]
    fn test_s_maxage_takes_precedence() {
        let c = Cacheability::parse_cache_control("max-age=10, s-maxage=20");
        assert_eq!(c.effective_max_age(), Some(20));
    }

    #[test]
    fn test_merge_takes_minimum_lifetime() {
        let a = Cacheability::parse_cache_control("max-age=300");
        let b = Cacheability::parse_cache_control("max-age=60");
        assert_eq!(a.merge_restrictive(&b).max_age, Some(60));
    }

    #[test]
    fn test_merge_unions_restrictive_flags() {
        let a = Cacheability::parse_cache_control("public, max-age=300");
        let b = Cacheability::parse_cache_control("private, no-cache, max-age=300");
        let merged = a.merge_restrictive(&b);
        assert!(merged.private);
        assert!(merged.no_cache);
        assert!(!merged.public);
    }

    #[test]
    fn test_merge_keeps_earliest_storage() {
        let a = Cacheability::parse_cache_control("max-age=60").with_stored_at(2000);
        let b = Cacheability::parse_cache_control("max-age=60").with_stored_at(1000);
        assert_eq!(a.merge_restrictive(&b).stored_at, 1000);
    }

    #[test]
    fn test_metadata_expiry() {
        let c = Cacheability::parse_cache_control("max-age=60").with_stored_at(1000);
        let meta = c.metadata();
        assert_eq!(meta.ttl, 1060);
        assert_eq!(meta.cache_control, "max-age=60");
    }

    #[test]
    fn test_metadata_expiry_zero_when_unservable() {
        let c = Cacheability::parse_cache_control("no-store").with_stored_at(1000);
        assert_eq!(c.metadata().ttl, 0);
    }
}
