//! Write-behind queue and worker pool.
//!
//! Mutating requests enqueue a [`WriteTask`] after the cache has been
//! updated; a fixed pool of worker threads drains the queue in FIFO order,
//! borrowing a store session per task.  The request path only ever signals
//! the queue — it never waits on it.
//!
//! Because several workers drain concurrently, the order in which the store
//! commits writes for different keys — or even for the same key — is not
//! specified.  The cache is authoritative for live reads; staleness in the
//! store is bounded by queue drain latency.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use crate::db::session::{KvSession, SessionPool};
use crate::digest::KeyDigest;

/// Queue depths at which a growth warning is logged (every multiple).
const DEPTH_WARN_INTERVAL: usize = 1024;

// ---------------------------------------------------------------------------
// WriteTask
// ---------------------------------------------------------------------------

/// One durable mutation awaiting a worker.
pub enum WriteTask {
    Upsert {
        digest: KeyDigest,
        key: String,
        value: Vec<u8>,
    },
    Delete {
        digest: KeyDigest,
    },
}

impl fmt::Display for WriteTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteTask::Upsert { digest, key, .. } => {
                write!(f, "upsert(digest={}, key={key:?})", hex(digest))
            }
            WriteTask::Delete { digest } => write!(f, "delete(digest={})", hex(digest)),
        }
    }
}

fn hex(digest: &KeyDigest) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// TaskQueue
// ---------------------------------------------------------------------------

struct QueueInner {
    tasks: VecDeque<WriteTask>,
    /// Tasks dequeued but not yet completed by a worker.
    in_flight: usize,
    closed: bool,
}

/// Unbounded FIFO of pending durable writes.
///
/// Enqueue never blocks (beyond the mutex) and wakes one waiting worker.
/// The queue tracks in-flight tasks so [`wait_drained`](TaskQueue::wait_drained)
/// can observe the moment the backlog is fully applied, not merely dequeued.
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
    not_empty: Condvar,
    drained: Condvar,
}

impl TaskQueue {
    pub fn new() -> Self {
        TaskQueue {
            inner: Mutex::new(QueueInner {
                tasks: VecDeque::new(),
                in_flight: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
            drained: Condvar::new(),
        }
    }

    /// Queues a durable upsert.  Call only **after** the corresponding cache
    /// mutation on the same thread.
    pub fn enqueue_upsert(&self, digest: KeyDigest, key: String, value: Vec<u8>) {
        self.push(WriteTask::Upsert { digest, key, value });
    }

    /// Queues a durable delete.  Same ordering contract as
    /// [`enqueue_upsert`](TaskQueue::enqueue_upsert).
    pub fn enqueue_delete(&self, digest: KeyDigest) {
        self.push(WriteTask::Delete { digest });
    }

    fn push(&self, task: WriteTask) {
        let depth = {
            let mut inner = self.inner.lock();
            if inner.closed {
                warn!(task = %task, "task enqueued after shutdown; dropping");
                return;
            }
            inner.tasks.push_back(task);
            inner.tasks.len()
        };
        self.not_empty.notify_one();
        if depth % DEPTH_WARN_INTERVAL == 0 {
            warn!(depth, "write-behind queue is growing");
        }
    }

    /// Blocks until a task is available and dequeues it, or returns `None`
    /// once the queue is closed **and** empty — pending tasks are always
    /// drained before workers are told to exit.
    fn pop_blocking(&self) -> Option<WriteTask> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(task) = inner.tasks.pop_front() {
                inner.in_flight += 1;
                return Some(task);
            }
            if inner.closed {
                return None;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Marks one dequeued task as completed (successfully or not).
    fn task_done(&self) {
        let mut inner = self.inner.lock();
        inner.in_flight -= 1;
        if inner.tasks.is_empty() && inner.in_flight == 0 {
            self.drained.notify_all();
        }
    }

    /// Blocks until the queue is empty and no task is in flight.
    pub fn wait_drained(&self) {
        let mut inner = self.inner.lock();
        while !(inner.tasks.is_empty() && inner.in_flight == 0) {
            self.drained.wait(&mut inner);
        }
    }

    /// Closes the queue: workers finish the backlog, then exit.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.not_empty.notify_all();
    }

    /// Current number of queued (not yet dequeued) tasks.
    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// WriteBehind worker pool
// ---------------------------------------------------------------------------

/// Handle to the spawned worker threads.
pub struct WriteBehind {
    queue: Arc<TaskQueue>,
    workers: Vec<JoinHandle<()>>,
}

impl WriteBehind {
    /// Spawns `worker_count` threads draining `queue` against sessions
    /// borrowed from `pool`.
    ///
    /// The pool outlives the workers: [`shutdown`](WriteBehind::shutdown)
    /// joins every thread before returning, and each worker only borrows
    /// sessions for the duration of one statement.
    pub fn spawn<S: KvSession>(
        queue: Arc<TaskQueue>,
        pool: Arc<SessionPool<S>>,
        worker_count: usize,
    ) -> Self {
        assert!(worker_count > 0, "need at least one write-behind worker");
        let workers = (0..worker_count)
            .map(|i| {
                let queue = Arc::clone(&queue);
                let pool = Arc::clone(&pool);
                thread::Builder::new()
                    .name(format!("writeback-{i}"))
                    .spawn(move || run_worker(&queue, &pool))
                    .expect("failed to spawn write-behind worker")
            })
            .collect();
        WriteBehind { queue, workers }
    }

    /// Closes the queue, lets the workers finish the backlog, and joins them.
    pub fn shutdown(self) {
        self.queue.close();
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

/// Worker loop: dequeue, borrow a session, execute, release, repeat.
///
/// A failed statement is logged with the task identifier and dropped — never
/// re-enqueued.  The cached value remains authoritative until evicted.
fn run_worker<S: KvSession>(queue: &TaskQueue, pool: &SessionPool<S>) {
    while let Some(task) = queue.pop_blocking() {
        let result = {
            let mut session = pool.acquire();
            match &task {
                WriteTask::Upsert { digest, key, value } => session.upsert(digest, key, value),
                WriteTask::Delete { digest } => session.delete(digest),
            }
        };
        if let Err(e) = result {
            error!(task = %task, error = %e, "write-behind task failed; dropping");
        }
        queue.task_done();
    }
    debug!("write-behind worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::digest::key_digest;

    #[test]
    fn fifo_dequeue_order() {
        let queue = TaskQueue::new();
        queue.enqueue_upsert(key_digest("a"), "a".into(), b"1".to_vec());
        queue.enqueue_delete(key_digest("b"));
        queue.close();

        assert!(matches!(
            queue.pop_blocking(),
            Some(WriteTask::Upsert { .. })
        ));
        queue.task_done();
        assert!(matches!(
            queue.pop_blocking(),
            Some(WriteTask::Delete { .. })
        ));
        queue.task_done();
        assert!(queue.pop_blocking().is_none());
    }

    #[test]
    fn wait_drained_returns_on_empty_queue() {
        let queue = TaskQueue::new();
        queue.wait_drained(); // must not block
    }

    #[test]
    fn workers_drain_backlog_before_shutdown() {
        let store = MemoryStore::new();
        let pool = Arc::new(SessionPool::new(store.sessions(2)));
        let queue = Arc::new(TaskQueue::new());

        for i in 0..100 {
            let key = format!("k{i}");
            queue.enqueue_upsert(key_digest(&key), key, b"v".to_vec());
        }
        let workers = WriteBehind::spawn(queue, pool, 4);
        workers.shutdown();

        assert_eq!(store.len(), 100);
    }
}
