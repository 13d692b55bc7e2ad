//! Persisted client state - a small SQLite key-value table.
//!
//! Holds the access token, refresh token, cached user profile (JSON) and the
//! theme preference. No logic lives here; `SessionManager` decides what to
//! write and when.

use std::path::Path;
use std::sync::Mutex;

use clouddeploy_protocol::{Theme, User};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

pub const KEY_AUTH_TOKEN: &str = "auth_token";
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";
pub const KEY_USER_DATA: &str = "user_data";
pub const KEY_THEME: &str = "theme";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create store directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cached value for {key}: {source}")]
    Corrupt {
        key: &'static str,
        source: serde_json::Error,
    },
}

pub struct TokenStore {
    conn: Mutex<Connection>,
}

impl TokenStore {
    /// Open (or create) the store at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )?;
        Self::init(conn)
    }

    /// Throwaway store (tests, `--ephemeral` sessions)
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(f(&conn)?)
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
        })
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![key, value],
            )
            .map(|_| ())
        })
    }

    /// Remove several keys in one transaction
    pub fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            for key in keys {
                tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            }
            tx.commit()
        })
    }

    pub fn access_token(&self) -> Result<Option<String>, StoreError> {
        self.get(KEY_AUTH_TOKEN)
    }

    pub fn refresh_token(&self) -> Result<Option<String>, StoreError> {
        self.get(KEY_REFRESH_TOKEN)
    }

    pub fn cached_user(&self) -> Result<Option<User>, StoreError> {
        match self.get(KEY_USER_DATA)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StoreError::Corrupt {
                    key: KEY_USER_DATA,
                    source,
                }),
            None => Ok(None),
        }
    }

    pub fn set_cached_user(&self, user: &User) -> Result<(), StoreError> {
        let raw = serde_json::to_string(user).map_err(|source| StoreError::Corrupt {
            key: KEY_USER_DATA,
            source,
        })?;
        self.set(KEY_USER_DATA, &raw)
    }

    /// Drop tokens and the cached profile; the theme survives logout
    pub fn clear_auth(&self) -> Result<(), StoreError> {
        self.remove_all(&[KEY_AUTH_TOKEN, KEY_REFRESH_TOKEN, KEY_USER_DATA])
    }

    pub fn theme(&self) -> Result<Option<Theme>, StoreError> {
        Ok(self.get(KEY_THEME)?.and_then(|raw| raw.parse().ok()))
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), StoreError> {
        self.set(KEY_THEME, theme.as_str())
    }
}
