//! Durable-store sessions and the bounded session pool.
//!
//! A session is a reusable handle for issuing the three prepared statements
//! the service needs.  The pool holds a fixed set of sessions created at
//! process init; request handlers (read-through misses) and write-behind
//! workers borrow them for the duration of one statement.  Sizing rule: the
//! pool must be at least as large as the peak of concurrent miss-readers plus
//! write-behind workers, or those threads will queue on `acquire`.

use std::ops::{Deref, DerefMut};

use parking_lot::{Condvar, Mutex};

use crate::digest::KeyDigest;
use crate::error::Result;

// ---------------------------------------------------------------------------
// KvSession
// ---------------------------------------------------------------------------

/// One durable-store session: the three statement wrappers of the kv schema.
///
/// Callers receive `&mut self` because a session is held exclusively while
/// borrowed from the pool.  Implementations do not retry; errors propagate to
/// the caller, who logs and proceeds (worker) or surfaces a 500 (handler).
pub trait KvSession: Send + 'static {
    /// `select_kv(digest) -> value?`.  `None` means the digest is not in the
    /// store.  The session reports stored bytes as-is; the coordinator's
    /// admission policy additionally treats an empty value as absent.
    fn lookup(&mut self, digest: &KeyDigest) -> Result<Option<Vec<u8>>>;

    /// `insert_kv(digest, key, value)` with replace-on-duplicate semantics.
    fn upsert(&mut self, digest: &KeyDigest, key: &str, value: &[u8]) -> Result<()>;

    /// `delete_kv(digest)`; a missing digest is a no-op.
    fn delete(&mut self, digest: &KeyDigest) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SessionPool
// ---------------------------------------------------------------------------

/// A bounded pool of reusable sessions.
///
/// `acquire` blocks until a session is idle and hands it out exclusively via
/// an RAII guard; dropping the guard returns the session and wakes one
/// waiter.  A released session is immediately available again — there is no
/// cooldown and no health check.
pub struct SessionPool<S> {
    idle: Mutex<Vec<S>>,
    available: Condvar,
    size: usize,
}

impl<S> SessionPool<S> {
    /// Wraps an already-connected set of sessions.  The pool size is fixed
    /// for the pool's lifetime.
    pub fn new(sessions: Vec<S>) -> Self {
        assert!(!sessions.is_empty(), "session pool may not be empty");
        let size = sessions.len();
        SessionPool {
            idle: Mutex::new(sessions),
            available: Condvar::new(),
            size,
        }
    }

    /// Borrows a session, blocking until one is idle.
    pub fn acquire(&self) -> SessionGuard<'_, S> {
        let mut idle = self.idle.lock();
        while idle.is_empty() {
            self.available.wait(&mut idle);
        }
        let session = idle.pop();
        SessionGuard {
            pool: self,
            session,
        }
    }

    fn release(&self, session: S) {
        self.idle.lock().push(session);
        self.available.notify_one();
    }

    /// Number of sessions currently idle in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Total number of sessions the pool was built with.
    pub fn size(&self) -> usize {
        self.size
    }
}

// ---------------------------------------------------------------------------
// SessionGuard
// ---------------------------------------------------------------------------

/// Exclusive borrow of one pooled session; returns it on drop.
pub struct SessionGuard<'a, S> {
    pool: &'a SessionPool<S>,
    /// `Some` for the guard's whole life; taken only in `drop`.
    session: Option<S>,
}

impl<S> Deref for SessionGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.session.as_ref().expect("session taken before drop")
    }
}

impl<S> DerefMut for SessionGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.session.as_mut().expect("session taken before drop")
    }
}

impl<S> Drop for SessionGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn guard_returns_session_on_drop() {
        let pool = SessionPool::new(vec![1u32, 2]);
        assert_eq!(pool.idle_count(), 2);
        {
            let _a = pool.acquire();
            let _b = pool.acquire();
            assert_eq!(pool.idle_count(), 0);
        }
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn acquire_blocks_until_release() {
        let pool = Arc::new(SessionPool::new(vec![0u32]));
        let held = pool.acquire();

        let p = Arc::clone(&pool);
        let waiter = std::thread::spawn(move || {
            let _s = p.acquire(); // must block until the main thread releases
        });

        std::thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished(), "acquire returned while pool was empty");

        drop(held);
        waiter.join().unwrap();
    }

    #[test]
    fn no_session_is_held_twice() {
        const THREADS: usize = 8;
        const POOL: usize = 2;

        let pool = Arc::new(SessionPool::new((0..POOL as u32).collect()));
        let active = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let active = Arc::clone(&active);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let _s = pool.acquire();
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        assert!(now <= POOL, "{now} concurrent holders of {POOL} sessions");
                        std::thread::sleep(Duration::from_micros(100));
                        active.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(pool.idle_count(), POOL);
    }
}
