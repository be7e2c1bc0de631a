use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

pub mod models;

/// Raw persisted key-value layer. Values are opaque text; every write
/// records a per-key timestamp that never moves backwards.
pub trait CacheStore: Send + Sync {
    fn get_raw(&self, key: &str) -> Result<Option<String>>;

    fn set_raw(&self, key: &str, value: &str) -> Result<()>;

    /// Write several keys in one transaction: either all land or none do.
    fn set_many_raw(&self, entries: &[(&str, String)]) -> Result<()>;

    /// Drop the value but keep the key's write timestamp.
    fn clear(&self, key: &str) -> Result<()>;

    fn write_time(&self, key: &str) -> Result<Option<DateTime<Utc>>>;
}

/// SQLite-backed store. A file database gets a dedicated read connection
/// so that, under WAL, reads never queue behind an open write transaction.
#[derive(Clone)]
pub struct Database {
    writer: Arc<Mutex<Connection>>,
    reader: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let writer = Connection::open(path)
            .with_context(|| format!("Failed to open cache database {}", path))?;
        writer.execute_batch("PRAGMA journal_mode=WAL;")?;
        writer.execute_batch(SCHEMA_SQL)?;

        let reader = Connection::open(path)
            .with_context(|| format!("Failed to open read connection to {}", path))?;
        reader.execute_batch("PRAGMA query_only=ON;")?;

        Ok(Database {
            writer: Arc::new(Mutex::new(writer)),
            reader: Arc::new(Mutex::new(reader)),
        })
    }

    /// Private in-memory database, gone when the last handle drops.
    /// Reads and writes share its single connection.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        let conn = Arc::new(Mutex::new(conn));
        Ok(Database {
            writer: Arc::clone(&conn),
            reader: conn,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| anyhow!("cache database mutex poisoned"))
    }

    fn lock_reader(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| anyhow!("cache read connection mutex poisoned"))
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        bail!("cache key must not be empty");
    }
    Ok(())
}

impl CacheStore for Database {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        check_key(key)?;
        let conn = self.lock_reader()?;
        let value: Option<Option<String>> = conn
            .query_row(
                "SELECT value FROM cache_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        check_key(key)?;
        let conn = self.lock()?;
        conn.execute(UPSERT_SQL, params![key, value, Utc::now().timestamp_millis()])?;
        Ok(())
    }

    fn set_many_raw(&self, entries: &[(&str, String)]) -> Result<()> {
        for (key, _) in entries {
            check_key(key)?;
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now_ms = Utc::now().timestamp_millis();
        for (key, value) in entries {
            tx.execute(UPSERT_SQL, params![key, value, now_ms])?;
        }
        tx.commit()?;
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        check_key(key)?;
        let conn = self.lock()?;
        conn.execute(
            UPSERT_SQL,
            params![key, Option::<String>::None, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    fn write_time(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        check_key(key)?;
        let conn = self.lock_reader()?;
        let ms: Option<i64> = conn
            .query_row(
                "SELECT written_at_ms FROM cache_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ms.and_then(DateTime::<Utc>::from_timestamp_millis))
    }
}

// ── Typed facade ──────────────────────────────────────────────────────────────

/// Well-known keys. Each subsystem owns its own prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    RosterSnapshot,
    RosterLastFetch,
    LiveGameId,
    LiveAutoDetect,
    LiveMatchState,
    SeriesTargetId,
}

impl CacheKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKey::RosterSnapshot => "roster.snapshot",
            CacheKey::RosterLastFetch => "roster.last_fetch",
            CacheKey::LiveGameId => "live.game_id",
            CacheKey::LiveAutoDetect => "live.auto_detect",
            CacheKey::LiveMatchState => "live.state",
            CacheKey::SeriesTargetId => "series.target_id",
        }
    }
}

/// JSON-encoding wrapper around a [`CacheStore`].
///
/// Reads treat storage and decode failures as absence; single-key writes
/// are best effort and only logged on failure. Multi-key commits report
/// errors so the caller can decide what a failed commit means.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Cache { store }
    }

    pub fn get<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        let raw = match self.store.get_raw(key.as_str()) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Cache read of '{}' failed: {}", key.as_str(), e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Cache entry '{}' is unreadable, ignoring: {}", key.as_str(), e);
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: CacheKey, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(anyhow::Error::from)
            .and_then(|raw| self.store.set_raw(key.as_str(), &raw));
        match result {
            Ok(()) => debug!("Cache write '{}'", key.as_str()),
            Err(e) => warn!("Cache write of '{}' failed: {}", key.as_str(), e),
        }
    }

    pub fn clear(&self, key: CacheKey) {
        if let Err(e) = self.store.clear(key.as_str()) {
            warn!("Cache clear of '{}' failed: {}", key.as_str(), e);
        }
    }

    pub fn write_time(&self, key: CacheKey) -> Option<DateTime<Utc>> {
        match self.store.write_time(key.as_str()) {
            Ok(ts) => ts,
            Err(e) => {
                warn!("Cache timestamp read of '{}' failed: {}", key.as_str(), e);
                None
            }
        }
    }

    /// Atomically write several already-encoded values.
    pub fn commit(&self, entries: Vec<(CacheKey, serde_json::Value)>) -> Result<()> {
        let encoded = entries
            .into_iter()
            .map(|(key, value)| -> Result<(&'static str, String)> {
                Ok((key.as_str(), serde_json::to_string(&value)?))
            })
            .collect::<Result<Vec<_>>>()?;
        self.store.set_many_raw(&encoded)
    }
}

const UPSERT_SQL: &str = "INSERT INTO cache_entries (key, value, written_at_ms)
     VALUES (?1, ?2, ?3)
     ON CONFLICT(key) DO UPDATE SET
        value=excluded.value,
        written_at_ms=MAX(cache_entries.written_at_ms, excluded.written_at_ms)";

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    key            TEXT    PRIMARY KEY,
    value          TEXT,
    written_at_ms  INTEGER NOT NULL
);
"#;
