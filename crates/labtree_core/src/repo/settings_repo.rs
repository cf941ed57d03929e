//! Settings repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist string settings addressed by `(group, key)`.
//! - Validate that the connection carries the migrated `settings` table.
//!
//! # Invariants
//! - One row per `(group, key)`; writes replace the previous value.
//! - Values are stored as text; typed interpretation belongs to the service.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SettingsRepoResult<T> = Result<T, SettingsRepoError>;

/// Errors from settings persistence.
#[derive(Debug)]
pub enum SettingsRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
}

impl Display for SettingsRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "settings repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "settings repository requires table `{table}`")
            }
        }
    }
}

impl Error for SettingsRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
        }
    }
}

impl From<DbError> for SettingsRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SettingsRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Key-value settings storage.
pub trait SettingsRepository {
    /// Stored value, `None` when never written or removed.
    fn get(&self, group: &str, key: &str) -> SettingsRepoResult<Option<String>>;
    /// Inserts or replaces one value.
    fn set(&self, group: &str, key: &str, value: &str) -> SettingsRepoResult<()>;
    /// Removes one value. Returns `false` when nothing was stored.
    fn remove(&self, group: &str, key: &str) -> SettingsRepoResult<bool>;
    /// All stored `(key, value)` pairs of one group, sorted by key.
    fn list_group(&self, group: &str) -> SettingsRepoResult<Vec<(String, String)>>;
}

/// SQLite-backed settings repository.
pub struct SqliteSettingsRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSettingsRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> SettingsRepoResult<Self> {
        ensure_settings_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn get(&self, group: &str, key: &str) -> SettingsRepoResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value
                 FROM settings
                 WHERE setting_group = ?1 AND setting_key = ?2;",
                params![group, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, group: &str, key: &str, value: &str) -> SettingsRepoResult<()> {
        self.conn.execute(
            "INSERT INTO settings (setting_group, setting_key, value)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(setting_group, setting_key) DO UPDATE SET
                value = excluded.value,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![group, key, value],
        )?;
        Ok(())
    }

    fn remove(&self, group: &str, key: &str) -> SettingsRepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM settings WHERE setting_group = ?1 AND setting_key = ?2;",
            params![group, key],
        )?;
        Ok(changed > 0)
    }

    fn list_group(&self, group: &str) -> SettingsRepoResult<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT setting_key, value
             FROM settings
             WHERE setting_group = ?1
             ORDER BY setting_key ASC;",
        )?;
        let rows = stmt.query_map([group], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut values = Vec::new();
        for row in rows {
            values.push(row?);
        }
        Ok(values)
    }
}

fn ensure_settings_connection_ready(conn: &Connection) -> SettingsRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(SettingsRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = 'settings'
        );",
        [],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(SettingsRepoError::MissingRequiredTable("settings"));
    }
    Ok(())
}
