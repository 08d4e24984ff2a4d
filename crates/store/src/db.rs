//! Connection handling and transaction boundaries.
//!
//! A fixed pool of SQLite connections is shared by request handlers and the
//! TTL sweeper; nobody gets a reserved connection. Conflicting writes
//! serialize on SQLite's write lock (WAL mode, busy timeout), which is the
//! correctness argument for running the sweeper concurrently with handlers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags, Transaction};
use segmentator_core::config::StoreConfig;
use segmentator_core::{SegmentatorError, SegmentatorResult};
use tracing::{info, warn};

use crate::schema;

/// Fixed-width UTC timestamp encoding. Lexicographic order equals
/// chronological order, so deadline predicates work as string compares.
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub fn encode_ts(t: DateTime<Utc>) -> String {
    t.format(TS_FORMAT).to_string()
}

pub fn decode_ts(s: &str) -> SegmentatorResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| SegmentatorError::Store(format!("malformed timestamp {s:?}: {e}")))
}

/// Map a driver error into the service taxonomy. Everything the driver
/// reports is treated as transient from the caller's point of view.
pub fn store_err(e: rusqlite::Error) -> SegmentatorError {
    SegmentatorError::Store(e.to_string())
}

/// Shared database handle: a round-robin pool of connections to one
/// SQLite database.
pub struct Db {
    pool: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl Db {
    /// Open the database, retrying once per second until the configured
    /// connect timeout elapses. Used at startup where the database file
    /// may live on storage that attaches late.
    pub fn connect(cfg: &StoreConfig) -> SegmentatorResult<Self> {
        let deadline = Instant::now() + Duration::from_secs(cfg.connect_timeout_secs);
        loop {
            match Self::open(&cfg.path, cfg.max_connections, cfg.busy_timeout_ms) {
                Ok(db) => {
                    info!(path = %cfg.path, pool = cfg.max_connections, "store connected");
                    return Ok(db);
                }
                Err(e) if Instant::now() < deadline => {
                    warn!(error = %e, path = %cfg.path, "store connect failed, retrying");
                    std::thread::sleep(Duration::from_secs(1));
                }
                Err(e) => {
                    return Err(SegmentatorError::Store(format!(
                        "connect to {} failed after {}s timeout: {e}",
                        cfg.path, cfg.connect_timeout_secs
                    )));
                }
            }
        }
    }

    /// Open a pool of connections against a database file and bootstrap the
    /// schema.
    pub fn open(path: &str, pool_size: usize, busy_timeout_ms: u64) -> SegmentatorResult<Self> {
        let pool_size = pool_size.max(1);
        let mut pool = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
            )
            .map_err(store_err)?;
            Self::configure(&conn, busy_timeout_ms)?;
            if i == 0 {
                schema::bootstrap(&conn).map_err(store_err)?;
            }
            pool.push(Mutex::new(conn));
        }
        Ok(Self {
            pool,
            next: AtomicUsize::new(0),
        })
    }

    /// Single-connection in-memory database. Pool size is forced to one
    /// because each in-memory connection would otherwise be its own database.
    pub fn open_in_memory() -> SegmentatorResult<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(store_err)?;
        schema::bootstrap(&conn).map_err(store_err)?;
        Ok(Self {
            pool: vec![Mutex::new(conn)],
            next: AtomicUsize::new(0),
        })
    }

    fn configure(conn: &Connection, busy_timeout_ms: u64) -> SegmentatorResult<()> {
        // journal_mode returns a result row, so query_row instead of execute
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
            .map_err(store_err)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(store_err)?;
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(store_err)?;
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))
            .map_err(store_err)?;
        Ok(())
    }

    /// Grab a connection, preferring an uncontended one.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        let start = self.next.fetch_add(1, Ordering::Relaxed);
        for i in 0..self.pool.len() {
            if let Some(guard) = self.pool[(start + i) % self.pool.len()].try_lock() {
                return guard;
            }
        }
        self.pool[start % self.pool.len()].lock()
    }

    /// Run a read or single-statement write on one connection.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> SegmentatorResult<T> {
        f(&self.conn()).map_err(store_err)
    }

    /// Run a multi-statement sequence inside one transaction. On failure the
    /// whole sequence rolls back; a rollback failure is reported as a
    /// compound integrity error carrying both the original and the rollback
    /// error.
    pub fn with_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> SegmentatorResult<T>,
    ) -> SegmentatorResult<T> {
        let mut guard = self.conn();
        let tx = guard.transaction().map_err(store_err)?;
        match f(&tx) {
            Ok(value) => {
                tx.commit().map_err(store_err)?;
                Ok(value)
            }
            Err(e) => match tx.rollback() {
                Ok(()) => Err(e),
                Err(rb) => Err(SegmentatorError::Integrity {
                    cause: e.to_string(),
                    rollback: rb.to_string(),
                }),
            },
        }
    }
}
