//! MySQL-backed sessions.
//!
//! One [`MySqlSession`] wraps one long-lived connection.  Statements go
//! through the driver's prepared-statement path (`exec_*`), which prepares
//! once per connection and binds parameters positionally in the order the
//! schema defines: digest, key, value.

use mysql::prelude::Queryable;
use mysql::{Conn, Opts, OptsBuilder};

use crate::db::session::KvSession;
use crate::digest::KeyDigest;
use crate::error::Result;

const CREATE_KV: &str = "CREATE TABLE IF NOT EXISTS `kv` (
    `key_digest` BINARY(16) NOT NULL PRIMARY KEY,
    `key` TEXT NOT NULL,
    `value` BLOB NOT NULL
)";

const SELECT_KV: &str = "SELECT `value` FROM `kv` WHERE `key_digest` = ?";

const INSERT_KV: &str = "INSERT INTO `kv` (`key_digest`, `key`, `value`) VALUES (?, ?, ?)
    ON DUPLICATE KEY UPDATE `value` = VALUES(`value`)";

const DELETE_KV: &str = "DELETE FROM `kv` WHERE `key_digest` = ?";

/// Builds connection options for the kv database.
pub fn mysql_opts(host: &str, port: u16, user: &str, password: &str, database: &str) -> Opts {
    OptsBuilder::new()
        .ip_or_hostname(Some(host))
        .tcp_port(port)
        .user(Some(user))
        .pass(Some(password))
        .db_name(Some(database))
        .into()
}

/// A synchronous session to the durable MySQL store.
pub struct MySqlSession {
    conn: Conn,
}

impl MySqlSession {
    /// Opens one connection.  Sessions live from process init to teardown;
    /// there is no reconnect logic — a broken session surfaces statement
    /// errors to its borrower.
    pub fn connect(opts: Opts) -> Result<Self> {
        let conn = Conn::new(opts)?;
        Ok(MySqlSession { conn })
    }

    /// Creates the `kv` table if it does not exist.  Called once at startup
    /// on a single session.
    pub fn ensure_schema(&mut self) -> Result<()> {
        self.conn.query_drop(CREATE_KV)?;
        Ok(())
    }
}

impl KvSession for MySqlSession {
    fn lookup(&mut self, digest: &KeyDigest) -> Result<Option<Vec<u8>>> {
        let value = self
            .conn
            .exec_first::<Vec<u8>, _, _>(SELECT_KV, (digest.as_slice(),))?;
        Ok(value)
    }

    fn upsert(&mut self, digest: &KeyDigest, key: &str, value: &[u8]) -> Result<()> {
        self.conn
            .exec_drop(INSERT_KV, (digest.as_slice(), key, value))?;
        Ok(())
    }

    fn delete(&mut self, digest: &KeyDigest) -> Result<()> {
        self.conn.exec_drop(DELETE_KV, (digest.as_slice(),))?;
        Ok(())
    }
}
