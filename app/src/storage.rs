//! Key-value storage tiers backed by SQLite, plus an in-memory tier
//!
//! The primary tier is the `app_settings` table. The legacy tier is the
//! `user_settings` table, which behaves like a browser cookie: values are
//! capped in size and expire.

use crate::error::GlossaError;
use crate::translations::KeyValueStore;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Maximum stored value size of the legacy tier, in bytes.
pub const LEGACY_CAPACITY: usize = 4096;

/// Lifetime of values written to the legacy tier.
pub const LEGACY_EXPIRY_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Primary,
    Legacy,
}

impl Tier {
    fn table(self) -> &'static str {
        match self {
            Tier::Primary => "app_settings",
            Tier::Legacy => "user_settings",
        }
    }
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    tier: Tier,
    capacity: Option<usize>,
    expiry: Option<Duration>,
}

impl SqliteStore {
    pub fn open(path: &Path, tier: Tier) -> Result<Self, GlossaError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, tier)
    }

    pub fn open_in_memory(tier: Tier) -> Result<Self, GlossaError> {
        Self::with_connection(Connection::open_in_memory()?, tier)
    }

    fn with_connection(conn: Connection, tier: Tier) -> Result<Self, GlossaError> {
        init_settings_tables(&conn)?;
        let (capacity, expiry) = match tier {
            Tier::Primary => (None, None),
            Tier::Legacy => (Some(LEGACY_CAPACITY), Some(Duration::days(LEGACY_EXPIRY_DAYS))),
        };
        Ok(Self {
            conn: Mutex::new(conn),
            tier,
            capacity,
            expiry,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, GlossaError> {
        self.conn
            .lock()
            .map_err(|_| GlossaError::Storage("Failed to acquire storage lock".to_string()))
    }

    fn is_expired(expires_at: Option<&str>) -> bool {
        expires_at
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc) <= Utc::now())
            .unwrap_or(false)
    }
}

/// Creates both settings tables, adding the expiry column to
/// `user_settings` tables created before it existed.
fn init_settings_tables(conn: &Connection) -> Result<(), GlossaError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS app_settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;

    let has_expiry: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info('user_settings') WHERE name = 'expires_at'",
        [],
        |row| row.get(0),
    )?;
    if has_expiry == 0 {
        conn.execute_batch("ALTER TABLE user_settings ADD COLUMN expires_at TEXT;")?;
    }

    Ok(())
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, GlossaError> {
        let conn = self.lock()?;
        match self.tier {
            Tier::Primary => Ok(conn
                .query_row(
                    "SELECT value FROM app_settings WHERE key = ?1",
                    [key],
                    |row| row.get(0),
                )
                .optional()?),
            Tier::Legacy => {
                let row: Option<(String, Option<String>)> = conn
                    .query_row(
                        "SELECT value, expires_at FROM user_settings WHERE key = ?1",
                        [key],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                match row {
                    Some((_, expires_at)) if Self::is_expired(expires_at.as_deref()) => {
                        debug!("Legacy entry {} expired, removing", key);
                        conn.execute("DELETE FROM user_settings WHERE key = ?1", [key])?;
                        Ok(None)
                    }
                    Some((value, _)) => Ok(Some(value)),
                    None => Ok(None),
                }
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), GlossaError> {
        if let Some(capacity) = self.capacity {
            if value.len() > capacity {
                return Err(GlossaError::Storage(format!(
                    "Value of {} bytes exceeds {} capacity of {} bytes",
                    value.len(),
                    self.tier.table(),
                    capacity
                )));
            }
        }

        let conn = self.lock()?;
        match self.tier {
            Tier::Primary => {
                conn.execute(
                    "INSERT OR REPLACE INTO app_settings (key, value) VALUES (?1, ?2)",
                    rusqlite::params![key, value],
                )?;
            }
            Tier::Legacy => {
                let expires_at = self.expiry.map(|d| (Utc::now() + d).to_rfc3339());
                conn.execute(
                    "INSERT OR REPLACE INTO user_settings (key, value, expires_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![key, value, expires_at],
                )?;
            }
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), GlossaError> {
        let conn = self.lock()?;
        conn.execute(
            &format!("DELETE FROM {} WHERE key = ?1", self.tier.table()),
            [key],
        )?;
        Ok(())
    }
}

/// In-memory tier. Can be switched to unavailable to exercise fallbacks.
#[derive(Debug)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn values(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, GlossaError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(GlossaError::Storage("Storage unavailable".to_string()));
        }
        self.values
            .lock()
            .map_err(|_| GlossaError::Storage("Failed to acquire storage lock".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, GlossaError> {
        Ok(self.values()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), GlossaError> {
        self.values()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), GlossaError> {
        self.values()?.remove(key);
        Ok(())
    }
}
