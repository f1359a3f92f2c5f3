//! Request coordinator — the read-through/write-behind orchestration.
//!
//! Sits between the front end and the three concurrent subsystems: cache
//! shards, the session pool, and the write-behind queue.  Mutations update
//! the cache synchronously and enqueue the durable write; only a read miss
//! touches the store on the request path.

use std::sync::Arc;

use crate::cache::Cache;
use crate::db::session::{KvSession, SessionPool};
use crate::digest::key_digest;
use crate::error::Result;
use crate::writeback::TaskQueue;

/// Orchestrates one key space across cache, store, and write-behind queue.
///
/// The coordinator owns nothing long-lived itself — cache, pool, and queue
/// are constructed by the caller and shared; their lifetimes strictly exceed
/// any request in flight.
pub struct Coordinator<S: KvSession> {
    cache: Cache<String, Vec<u8>>,
    pool: Arc<SessionPool<S>>,
    queue: Arc<TaskQueue>,
}

impl<S: KvSession> Coordinator<S> {
    pub fn new(
        cache: Cache<String, Vec<u8>>,
        pool: Arc<SessionPool<S>>,
        queue: Arc<TaskQueue>,
    ) -> Self {
        Coordinator { cache, pool, queue }
    }

    /// Looks up `key`, reading through to the durable store on a cache miss
    /// and admitting the value the store returns.
    ///
    /// An empty store value is treated as absent: it is not admitted and the
    /// call returns `None`, the same policy the admission decision has
    /// always applied on this path.
    ///
    /// At most one store lookup happens per call.  Two concurrent calls on
    /// the same missing key may both look up — there is deliberately no
    /// single-flight consolidation, the lookup being cheaper than the lock
    /// coordination it would take to avoid it at a typical hit rate.
    ///
    /// A store error propagates without touching the cache.
    pub fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>> {
        if let Some(value) = self.cache.get(key) {
            return Ok(Some(value));
        }

        self.cache.record_read_through();
        let found = {
            let mut session = self.pool.acquire();
            session.lookup(&key_digest(key))?
        };

        match found {
            Some(value) if !value.is_empty() => {
                self.cache.put(key.to_string(), value.clone());
                Ok(Some(Arc::new(value)))
            }
            _ => Ok(None),
        }
    }

    /// Stores `value` under `key`: cache update first, then the durable
    /// upsert is enqueued on the same thread.  Returns as soon as the task
    /// is queued.
    pub fn put(&self, key: String, value: Vec<u8>) {
        let digest = key_digest(&key);
        self.cache.put(key.clone(), value.clone());
        self.queue.enqueue_upsert(digest, key, value);
    }

    /// Removes `key` from the cache (a miss is ignored) and enqueues the
    /// durable delete.
    pub fn delete(&self, key: &str) {
        self.cache.remove(key);
        self.queue.enqueue_delete(key_digest(key));
    }

    /// The cache this coordinator serves; exposes stats and introspection.
    pub fn cache(&self) -> &Cache<String, Vec<u8>> {
        &self.cache
    }

    /// The write-behind queue this coordinator feeds.
    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }
}
