use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::builder::CacheBuilder;
use crate::store::sharded::ShardedStore;

// ---------------------------------------------------------------------------
// Cache interior
// ---------------------------------------------------------------------------

/// Shared interior of a [`Cache`].
///
/// The counters sit directly on the interior rather than behind a stats
/// type: every one of them is stamped on the hot path, and `read_throughs`
/// belongs to the lookup path as a whole — the coordinator records it when a
/// miss goes on to the durable store, so one snapshot covers cache and
/// read-through behavior together.
pub(crate) struct Inner<K, V> {
    store: ShardedStore<K, V>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    read_throughs: AtomicU64,
}

// ---------------------------------------------------------------------------
// Cache handle
// ---------------------------------------------------------------------------

/// A concurrent bounded in-memory cache with sampled-LRU eviction.
///
/// The key space is partitioned over independently-locked shards; each shard
/// holds an equal slice of the total capacity and evicts on its own.  The
/// handle is cheap to clone and all clones observe the same entries.
///
/// # Example
/// ```
/// use cortado::CacheBuilder;
///
/// let cache: cortado::Cache<String, String> = CacheBuilder::new(100).build();
/// cache.put("hello".to_string(), "world".to_string());
/// assert_eq!(cache.get("hello"), Some(std::sync::Arc::new("world".to_string())));
/// ```
pub struct Cache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Cache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn new(total_capacity: usize, num_shards: usize, sample_size: usize) -> Self {
        Cache {
            inner: Arc::new(Inner {
                store: ShardedStore::new(total_capacity, num_shards, sample_size),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
                read_throughs: AtomicU64::new(0),
            }),
        }
    }

    /// Returns a [`CacheBuilder`] for constructing a new cache.
    pub fn builder(total_capacity: usize) -> CacheBuilder<K, V> {
        CacheBuilder::new(total_capacity)
    }

    // -----------------------------------------------------------------------
    // Hot path
    // -----------------------------------------------------------------------

    /// Returns the value for `key` if present, re-stamping its recency.
    pub fn get<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.inner.store.get(key) {
            Some(value) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts `value` for `key`.  If the key already exists the value is
    /// replaced in place; only inserts of **new** keys may evict.
    pub fn put(&self, key: K, value: V) {
        if self.inner.store.insert(key, value) {
            self.inner.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Removes the entry for `key`, if present.  Returns whether a removal
    /// occurred; removing a missing key is a no-op.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.store.remove(key)
    }

    /// Recorded by the read-through coordinator when a miss goes on to the
    /// durable store.
    pub(crate) fn record_read_through(&self) {
        self.inner.read_throughs.fetch_add(1, Ordering::Relaxed);
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Returns a point-in-time snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            evictions: self.inner.evictions.load(Ordering::Relaxed),
            read_throughs: self.inner.read_throughs.load(Ordering::Relaxed),
        }
    }

    pub fn entry_count(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// Per-shard entry counts, in shard order.  Every element is bounded by
    /// [`shard_capacity`](Cache::shard_capacity) at all times.
    pub fn shard_sizes(&self) -> Vec<usize> {
        self.inner.store.shard_sizes()
    }

    /// The capacity of a single shard: `ceil(total_capacity / num_shards)`.
    pub fn shard_capacity(&self) -> usize {
        self.inner.store.shard_capacity()
    }

    pub fn num_shards(&self) -> usize {
        self.inner.store.num_shards()
    }
}

// ---------------------------------------------------------------------------
// CacheStats
// ---------------------------------------------------------------------------

/// A point-in-time snapshot of the lookup-path counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits (key found).
    pub hits: u64,
    /// Number of cache misses (key not found).
    pub misses: u64,
    /// Number of entries evicted due to capacity pressure.
    pub evictions: u64,
    /// Number of misses that went on to consult the durable store.
    pub read_throughs: u64,
}

impl CacheStats {
    /// `hits / (hits + misses)`, or `0.0` before any request.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn request_count(&self) -> u64 {
        self.hits + self.misses
    }
}
