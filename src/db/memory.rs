//! In-memory store backend.
//!
//! Stands in for MySQL in integration tests and demos: all sessions created
//! from one [`MemoryStore`] share a map keyed by digest, and the store counts
//! lookups so tests can assert how often the read-through path actually
//! consulted it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::db::session::KvSession;
use crate::digest::KeyDigest;
use crate::error::Result;

struct Row {
    #[allow(dead_code)]
    key: String,
    value: Vec<u8>,
}

struct MemoryInner {
    rows: Mutex<AHashMap<KeyDigest, Row>>,
    lookups: AtomicU64,
}

/// A shared in-memory durable store; hand out sessions via
/// [`session`](MemoryStore::session).
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: Arc::new(MemoryInner {
                rows: Mutex::new(AHashMap::new()),
                lookups: AtomicU64::new(0),
            }),
        }
    }

    /// Creates a session sharing this store's rows.
    pub fn session(&self) -> MemorySession {
        MemorySession {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Creates `n` sessions, e.g. to fill a `SessionPool`.
    pub fn sessions(&self, n: usize) -> Vec<MemorySession> {
        (0..n).map(|_| self.session()).collect()
    }

    /// Writes a row directly, bypassing the session interface.  Used by
    /// tests to pre-populate the store behind the cache's back.
    pub fn seed(&self, digest: KeyDigest, key: &str, value: &[u8]) {
        self.inner.rows.lock().insert(
            digest,
            Row {
                key: key.to_string(),
                value: value.to_vec(),
            },
        );
    }

    pub fn contains(&self, digest: &KeyDigest) -> bool {
        self.inner.rows.lock().contains_key(digest)
    }

    pub fn len(&self) -> usize {
        self.inner.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `lookup` calls served across all sessions.
    pub fn lookup_count(&self) -> u64 {
        self.inner.lookups.load(Ordering::Relaxed)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// One borrowable session over a [`MemoryStore`].
pub struct MemorySession {
    inner: Arc<MemoryInner>,
}

impl KvSession for MemorySession {
    fn lookup(&mut self, digest: &KeyDigest) -> Result<Option<Vec<u8>>> {
        self.inner.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self.inner.rows.lock().get(digest).map(|r| r.value.clone()))
    }

    fn upsert(&mut self, digest: &KeyDigest, key: &str, value: &[u8]) -> Result<()> {
        self.inner.rows.lock().insert(
            *digest,
            Row {
                key: key.to_string(),
                value: value.to_vec(),
            },
        );
        Ok(())
    }

    fn delete(&mut self, digest: &KeyDigest) -> Result<()> {
        self.inner.rows.lock().remove(digest);
        Ok(())
    }
}
