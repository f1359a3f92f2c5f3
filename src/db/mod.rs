//! Durable-store side: sessions, the bounded session pool, and backends.

pub mod memory;
pub mod mysql;
pub mod session;

pub use memory::{MemorySession, MemoryStore};
pub use mysql::{mysql_opts, MySqlSession};
pub use session::{KvSession, SessionGuard, SessionPool};
