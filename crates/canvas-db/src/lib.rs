pub mod coalescer;
pub mod commit;
pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::{Result, anyhow};
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

pub use coalescer::{PendingCounts, WriteCoalescer};
pub use commit::FlushReport;

/// The storage handle. Owned by exactly one worker; nothing here is shared.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file and make sure every table exists.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL so external readers of the file don't block the worker
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self { conn })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        f(&self.conn)
    }

    pub fn with_conn_mut<F, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        f(&mut self.conn)
    }

    /// Release the storage handle. Consumes the database so it cannot be used again.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| anyhow!("failed to close database: {}", e))?;
        info!("Database closed");
        Ok(())
    }
}

/// Wall clock in Unix epoch milliseconds, used for `lastJoined` and `lastUsed`.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
