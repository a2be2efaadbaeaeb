//! Client-side persistence. Everything stored here is advisory: a failed read
//! or write is logged and degrades to "nothing cached", never to an error
//! surfaced to the workspace.

mod offline;
mod sync_status;

pub use offline::{LocalCommit, LocalOfflineStore, LocalPlayground, LocalPlaygroundUpdate};
pub use sync_status::{CommitSyncStatus, PlaygroundSyncStatus, SyncEvent};

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, Transaction};

use crate::error::Result;

/// One local SQLite database. Constructed once and passed to the stores that
/// use it; each `transact` call is one transaction.
pub struct LocalDb {
    name: &'static str,
    conn: Mutex<Option<Connection>>,
}

impl LocalDb {
    pub fn open<P: AsRef<Path>>(name: &'static str, path: P, schema: &str) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_schema(name, conn, schema)
    }

    pub fn open_in_memory(name: &'static str, schema: &str) -> Result<Self> {
        Self::with_schema(name, Connection::open_in_memory()?, schema)
    }

    fn with_schema(name: &'static str, conn: Connection, schema: &str) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(schema)?;
        Ok(Self {
            name,
            conn: Mutex::new(Some(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs `f` inside a transaction. The transaction commits only when `f`
    /// succeeds; any other exit drops it, which rolls back. Failures are
    /// logged under `op` and reported as `None`.
    pub fn transact<T, F>(&self, op: &'static str, f: F) -> Option<T>
    where
        F: FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
    {
        let mut guard = self.lock();
        let Some(conn) = guard.as_mut() else {
            tracing::warn!(db = self.name, op, "local database is closed");
            return None;
        };

        let result = conn.transaction().and_then(|tx| {
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        });

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(db = self.name, op, error = %e, "local database operation failed");
                None
            }
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    pub fn close(&self) {
        if let Some(conn) = self.lock().take() {
            if let Err((_, e)) = conn.close() {
                tracing::warn!(db = self.name, error = %e, "failed to close local database");
            }
        }
    }
}
