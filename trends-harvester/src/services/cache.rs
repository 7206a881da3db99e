//! TTL response cache
//!
//! Keyed by geography and category selector. Entries expire lazily: an expired
//! entry is dropped by the `get` that finds it. Lookups and inserts are
//! serialized by one mutex; no harvest work ever runs under it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// `(GEO, selector)` cache key
///
/// The geography is upper-cased and the selector lower-cased on construction,
/// so `("in", "Sports")` and `("IN", "sports")` share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    geo: String,
    selector: String,
}

impl CacheKey {
    pub fn new(geo: &str, selector: &str) -> Self {
        Self {
            geo: geo.trim().to_uppercase(),
            selector: selector.trim().to_lowercase(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.geo, self.selector)
    }
}

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Map from key to value with a fixed time-to-live
pub struct ResponseCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, CacheEntry<V>>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh value for `key`, if any (expired entries are evicted)
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let age = entries.get(key)?.stored_at.elapsed();
        if age < self.ttl {
            debug!(key = %key, age_secs = age.as_secs(), "Cache hit");
            return entries.get(key).map(|entry| entry.value.clone());
        }

        entries.remove(key);
        debug!(key = %key, "Cache entry expired");
        None
    }

    /// Store or replace the value for `key`
    pub fn put(&self, key: CacheKey, value: V) {
        debug!(key = %key, "Cache set");
        let entry = CacheEntry {
            value,
            stored_at: Instant::now(),
        };
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, entry);
    }

    /// Remove every entry; returns how many were removed
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let removed = entries.len();
        entries.clear();
        info!(removed, "Cache cleared");
        removed
    }

    /// Stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
