use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::{AHashMap, RandomState};
use parking_lot::RwLock;
use rand::seq::IteratorRandom;

// ---------------------------------------------------------------------------
// StoreEntry
// ---------------------------------------------------------------------------

/// A single entry in the store.
///
/// `last_access` is a recency ordinal drawn from the store's monotonic tick
/// counter.  It is an atomic so that `get` can re-stamp it while holding only
/// the shard's **shared** lock; eviction reads it under the exclusive lock.
pub struct StoreEntry<V> {
    pub value: Arc<V>,
    pub last_access: AtomicU64,
}

// ---------------------------------------------------------------------------
// Shard
// ---------------------------------------------------------------------------

/// Cache-line padding to prevent false sharing between shards.
#[repr(align(64))]
pub(crate) struct Shard<K, V> {
    pub(crate) map: RwLock<AHashMap<K, StoreEntry<V>>>,
    /// Maximum number of entries this shard may hold.  Holds on entry and
    /// exit of every public store operation.
    capacity: usize,
}

// ---------------------------------------------------------------------------
// ShardedStore
// ---------------------------------------------------------------------------

/// A thread-safe bounded key-value store backed by `N` independently-locked
/// shards.
///
/// Reads take a shared lock, writes an exclusive lock, both per-shard, so
/// operations on different shards never contend.  Each shard enforces its own
/// capacity: when an insert would exceed it, one victim is evicted by
/// randomized sampling — the sampled entry with the smallest `last_access`
/// loses.  This approximates LRU for skewed workloads without the
/// pointer-chasing of a strict recency list.
pub struct ShardedStore<K, V> {
    shards: Box<[Shard<K, V>]>,
    /// Always `shards.len() - 1`; shards.len() is a power of two.
    shard_mask: usize,
    /// Hasher used only to compute shard indices.  The same hasher serves
    /// every operation so a key maps to one shard for the process lifetime.
    build_hasher: RandomState,
    /// Process-wide recency counter.  Strictly monotonic: `fetch_add` hands
    /// every caller a value greater than any previously observed one.
    tick: AtomicU64,
    /// Number of entries examined when choosing an eviction victim.
    sample_size: usize,
}

impl<K: Hash + Eq + Clone, V> ShardedStore<K, V> {
    /// `total_capacity` is distributed over the shards, rounded up to a
    /// shard-multiple: each shard gets `ceil(total_capacity / num_shards)`.
    pub fn new(total_capacity: usize, num_shards: usize, sample_size: usize) -> Self {
        assert!(num_shards.is_power_of_two());
        let per_shard = (total_capacity + num_shards - 1) / num_shards;
        let shards = (0..num_shards)
            .map(|_| Shard {
                map: RwLock::new(AHashMap::new()),
                capacity: per_shard,
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        ShardedStore {
            shards,
            shard_mask: num_shards - 1,
            build_hasher: RandomState::new(),
            tick: AtomicU64::new(1),
            sample_size,
        }
    }

    #[inline]
    fn shard_index<Q>(&self, key: &Q) -> usize
    where
        Q: Hash + ?Sized,
    {
        let h = self.build_hasher.hash_one(key);
        // Use the high bits (better avalanche from ahash).
        ((h >> 32) as usize) & self.shard_mask
    }

    /// Uniqueness and strict monotonicity are all callers rely on; no
    /// happens-before edge is claimed from the tick itself.
    #[inline]
    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    // -----------------------------------------------------------------------
    // Core operations
    // -----------------------------------------------------------------------

    /// Returns the value for `key` and re-stamps its recency, or `None` if
    /// absent.  A miss does not admit anything.
    pub fn get<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.shard_index(key);
        let map = self.shards[idx].map.read();
        let entry = map.get(key)?;
        entry.last_access.store(self.next_tick(), Ordering::Relaxed);
        Some(Arc::clone(&entry.value))
    }

    /// Inserts or replaces the value for `key`.
    ///
    /// Replacing an existing key swaps the value in place and re-stamps the
    /// entry; it never triggers eviction.  Inserting a new key into a full
    /// shard evicts exactly one sampled victim.  Returns `true` when an
    /// eviction occurred.
    pub fn insert(&self, key: K, value: V) -> bool {
        let idx = self.shard_index(&key);
        let shard = &self.shards[idx];
        let tick = self.next_tick();

        let mut map = shard.map.write();
        if let Some(entry) = map.get_mut(&key) {
            entry.value = Arc::new(value);
            entry.last_access.store(tick, Ordering::Relaxed);
            return false;
        }

        map.insert(
            key,
            StoreEntry {
                value: Arc::new(value),
                last_access: AtomicU64::new(tick),
            },
        );

        if map.len() > shard.capacity {
            Self::evict_sampled(&mut map, self.sample_size)
        } else {
            false
        }
    }

    /// Removes the entry for `key`.  Returns whether a removal occurred.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.shard_index(key);
        self.shards[idx].map.write().remove(key).is_some()
    }

    // -----------------------------------------------------------------------
    // Eviction
    // -----------------------------------------------------------------------

    /// Evicts one entry.  Caller must hold the shard's exclusive lock.
    ///
    /// Samples `min(sample_size, len)` entries and removes the one with the
    /// smallest `last_access`; ties break arbitrarily.  Maps barely larger
    /// than the sample are scanned in full instead, which both skips the RNG
    /// and guarantees the true oldest entry is found.
    fn evict_sampled(map: &mut AHashMap<K, StoreEntry<V>>, sample_size: usize) -> bool {
        if map.is_empty() {
            return false;
        }
        let k = sample_size.min(map.len());

        let victim = if map.len() <= k + 2 {
            map.iter()
                .min_by_key(|(_, e)| e.last_access.load(Ordering::Relaxed))
                .map(|(key, _)| key.clone())
        } else {
            let mut rng = rand::thread_rng();
            map.iter()
                .choose_multiple(&mut rng, k)
                .into_iter()
                .min_by_key(|(_, e)| e.last_access.load(Ordering::Relaxed))
                .map(|(key, _)| key.clone())
        };

        match victim {
            Some(key) => map.remove(&key).is_some(),
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Returns the total number of entries across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.map.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.map.read().is_empty())
    }

    /// Per-shard entry counts, in shard order.
    pub fn shard_sizes(&self) -> Vec<usize> {
        self.shards.iter().map(|s| s.map.read().len()).collect()
    }

    /// The capacity of a single shard (all shards are sized equally).
    pub fn shard_capacity(&self) -> usize {
        self.shards[0].capacity
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }
}
