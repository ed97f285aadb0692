//! Query result cache
//!
//! Transparent LRU+TTL cache over `search_query`: keys combine the clause
//! tree, the branch, and the evaluation options; entries expire by
//! wall-clock TTL and by LRU eviction. Mutations invalidate by branch.
//! The cache is an optimisation only; it never serves results past TTL and
//! correctness never depends on it.

use crate::ast::{Query, QueryOptions};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Default entry time-to-live
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Default capacity before LRU eviction
pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    query: u64,
    branch: String,
    opts: u64,
}

struct CacheEntry {
    ids: Vec<String>,
    inserted: Instant,
}

/// LRU+TTL cache keyed by `(hash(query), branch, hash(opts))`.
pub struct QueryCache {
    inner: Mutex<LruCache<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl QueryCache {
    /// Cache with explicit capacity and TTL
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least one");
        QueryCache {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Cache with the default capacity (1000) and TTL (60 s)
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    fn key(query: &Query, branch: &str, opts: &QueryOptions) -> CacheKey {
        CacheKey {
            query: hash_json(query),
            branch: branch.to_string(),
            opts: hash_json(opts),
        }
    }

    /// Cached ids for a query, unless absent or expired
    pub fn get(&self, query: &Query, branch: &str, opts: &QueryOptions) -> Option<Vec<String>> {
        let key = Self::key(query, branch, opts);
        let mut inner = self.inner.lock();
        match inner.get(&key) {
            Some(entry) if entry.inserted.elapsed() <= self.ttl => Some(entry.ids.clone()),
            Some(_) => {
                inner.pop(&key);
                None
            }
            None => None,
        }
    }

    /// Store the ids for a query
    pub fn put(&self, query: &Query, branch: &str, opts: &QueryOptions, ids: Vec<String>) {
        let key = Self::key(query, branch, opts);
        self.inner.lock().put(
            key,
            CacheEntry {
                ids,
                inserted: Instant::now(),
            },
        );
    }

    /// Drop every entry for a branch
    pub fn invalidate_branch(&self, branch: &str) {
        let mut inner = self.inner.lock();
        let stale: Vec<CacheKey> = inner
            .iter()
            .filter(|(key, _)| key.branch == branch)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            inner.pop(&key);
        }
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn hash_json<T: serde::Serialize>(value: &T) -> u64 {
    let json = serde_json::to_string(value).unwrap_or_default();
    let mut hasher = DefaultHasher::new();
    json.hash(&mut hasher);
    hasher.finish()
}
