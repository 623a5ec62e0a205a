//! Per-patient domain cache.
//!
//! Keyed by (site, patient, domain, canonicalized extra parameters) so
//! differently-filtered requests never collide, and scoped to a site so
//! two gateways against different listeners can share a process. TTL on
//! read, LRU eviction on write. The cache lock is independent of the
//! session locks and is never held across network I/O; lookups and
//! stores hand owned data across the lock boundary.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::trace;
use vista_vpr::DomainItem;

/// Cache key for one domain fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// `host:port` of the listener.
    pub site: String,
    /// Patient DFN.
    pub dfn: String,
    /// Domain type token.
    pub domain: String,
    /// Sorted-JSON serialization of the extra parameters.
    pub extra: String,
}

struct CacheEntry {
    stored_at: Instant,
    items: Vec<DomainItem>,
}

/// TTL-and-capacity-bounded cache of normalized domain fetches.
pub struct DomainCache {
    inner: Mutex<LruCache<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl DomainCache {
    /// Create a cache holding at most `capacity` entries for `ttl` each.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Look up a fresh entry, returning an owned deep copy.
    ///
    /// Expired entries are dropped on the way out. A miss is normal
    /// control flow, not an error.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<DomainItem>> {
        let mut cache = self.inner.lock().expect("cache lock poisoned");
        let fresh = match cache.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.items.clone()),
            Some(_) => None,
            None => return None,
        };
        if fresh.is_none() {
            trace!(?key, "evicting expired cache entry");
            cache.pop(key);
        }
        fresh
    }

    /// Store a fetch result.
    pub fn put(&self, key: CacheKey, items: Vec<DomainItem>) {
        let mut cache = self.inner.lock().expect("cache lock poisoned");
        cache.put(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                items,
            },
        );
    }

    /// Drop every entry for one patient, across all domains.
    pub fn invalidate_patient(&self, dfn: &str) {
        let mut cache = self.inner.lock().expect("cache lock poisoned");
        let stale: Vec<CacheKey> = cache
            .iter()
            .filter(|(key, _)| key.dfn == dfn)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            cache.pop(&key);
        }
    }

    /// Number of live entries (expired ones included until touched).
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
