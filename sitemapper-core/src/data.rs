use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Result, params};
use sitemapper_scanner::{CacheEntry, CacheStore, ScanError};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// SQLite-backed result cache, one file per site.
///
/// The connection is dropped on [`Database::close`]; every later call
/// fails with [`rusqlite::Error::InvalidQuery`].
pub struct Database {
    conn: Mutex<Option<Connection>>,
}

impl Database {
    pub fn drop(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)?;
        // WAL side files may be left behind by an interrupted run
        for suffix in ["-wal", "-shm"] {
            let mut side = path.as_os_str().to_owned();
            side.push(suffix);
            let side = Path::new(&side);
            if side.exists() {
                fs::remove_file(side)?;
            }
        }
        Ok(())
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("cannot create {}: {}", parent.display(), e)),
                )
            })?;
        }

        let conn = Connection::open(path)?;

        // Concurrent readers while a crawl is writing
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let db = Database {
            conn: Mutex::new(Some(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(rusqlite::Error::InvalidQuery),
        }
    }

    fn init_schema(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS cache_entries (
                    key TEXT PRIMARY KEY,
                    stored_at INTEGER NOT NULL,  -- unix millis
                    payload TEXT NOT NULL        -- JSON
                );
                ",
            )
        })
    }

    pub fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row: Option<(i64, String)> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT stored_at, payload FROM cache_entries WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
        })?;

        match row {
            Some((stored_at, payload)) => {
                let payload = serde_json::from_str(&payload)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e)))?;
                Ok(Some(CacheEntry { stored_at, payload }))
            }
            None => Ok(None),
        }
    }

    pub fn put_entry(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let payload = entry.payload.to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO cache_entries (key, stored_at, payload) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET stored_at = excluded.stored_at, payload = excluded.payload",
                params![key, entry.stored_at, payload],
            )?;
            Ok(())
        })
    }

    pub fn entry_count(&self) -> Result<i64> {
        self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0)))
    }

    /// Delete entries older than `ttl`. Returns the number removed.
    pub fn purge_expired(&self, ttl: Duration) -> Result<usize> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp_millis().saturating_sub(ttl_ms);
        let removed = self.with_conn(|conn| {
            conn.execute("DELETE FROM cache_entries WHERE stored_at <= ?1", params![cutoff])
        })?;
        debug!("Purged {} expired cache entries", removed);
        Ok(removed)
    }

    /// Checkpoint the WAL and release the connection. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(conn) = conn {
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
            conn.close().map_err(|(_, e)| e)?;
        }
        Ok(())
    }
}

fn cache_error(e: rusqlite::Error) -> ScanError {
    ScanError::CacheError(e.to_string())
}

impl CacheStore for Database {
    fn get(&self, key: &str) -> sitemapper_scanner::Result<Option<CacheEntry>> {
        self.get_entry(key).map_err(cache_error)
    }

    fn put(&self, key: &str, entry: &CacheEntry) -> sitemapper_scanner::Result<()> {
        self.put_entry(key, entry).map_err(cache_error)
    }

    fn close(&self) -> sitemapper_scanner::Result<()> {
        Database::close(self).map_err(cache_error)
    }
}
