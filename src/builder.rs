use std::hash::Hash;
use std::marker::PhantomData;

use crate::cache::Cache;

/// Number of random samples examined per eviction if not overridden.
pub const DEFAULT_SAMPLE_SIZE: usize = 8;

/// Shard fanout if not overridden.
pub const DEFAULT_NUM_SHARDS: usize = 32;

/// Builder for configuring and constructing a [`Cache`].
///
/// # Example
/// ```
/// use cortado::CacheBuilder;
///
/// let cache: cortado::Cache<String, String> = CacheBuilder::new(1_000)
///     .num_shards(64)
///     .sample_size(12)
///     .build();
/// ```
pub struct CacheBuilder<K, V> {
    total_capacity: usize,
    num_shards: usize,
    sample_size: usize,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> CacheBuilder<K, V> {
    pub fn new(total_capacity: usize) -> Self {
        assert!(total_capacity > 0, "total_capacity must be greater than 0");
        CacheBuilder {
            total_capacity,
            num_shards: DEFAULT_NUM_SHARDS,
            sample_size: DEFAULT_SAMPLE_SIZE,
            _marker: PhantomData,
        }
    }

    /// Set the shard fanout (must be a power of two; default: 32).
    ///
    /// Capacity is rounded up to a shard-multiple, so the logical capacity is
    /// `ceil(total_capacity / n) * n`.
    pub fn num_shards(mut self, n: usize) -> Self {
        assert!(n > 0 && n.is_power_of_two(), "num_shards must be a power of two");
        self.num_shards = n;
        self
    }

    /// Set the number of entries sampled per eviction (default: 8).
    ///
    /// Larger samples approximate LRU more closely at the cost of a longer
    /// scan under the shard's exclusive lock.
    pub fn sample_size(mut self, k: usize) -> Self {
        assert!(k > 0, "sample_size must be greater than 0");
        self.sample_size = k;
        self
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn build(self) -> Cache<K, V> {
        Cache::new(self.total_capacity, self.num_shards, self.sample_size)
    }
}
