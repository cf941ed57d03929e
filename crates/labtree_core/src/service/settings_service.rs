//! Settings use-case service.
//!
//! # Responsibility
//! - Layer compiled-in defaults under persisted values.
//! - Convert stored text into typed values.
//!
//! # Invariants
//! - A key without a stored value falls back to its compiled-in default.
//! - A stored value that does not parse is reported, never silently
//!   replaced by the default.

use crate::config::{KEY_CAPTION_SPEC, KEY_UNDO_ENABLED, KEY_UNDO_LIMIT, PROJECT_GROUP};
use crate::model::node::DEFAULT_CAPTION_SPEC;
use crate::repo::settings_repo::{SettingsRepoError, SettingsRepository};
use log::warn;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Errors from settings reads and writes.
#[derive(Debug)]
pub enum SettingsError {
    /// Key has neither a stored value nor a compiled-in default.
    UnknownKey { group: String, key: String },
    /// Stored value cannot be read as the requested type.
    InvalidValue {
        group: String,
        key: String,
        value: String,
    },
    /// Repository-level failure.
    Repo(SettingsRepoError),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownKey { group, key } => write!(f, "unknown setting {group}/{key}"),
            Self::InvalidValue { group, key, value } => {
                write!(f, "invalid value `{value}` for setting {group}/{key}")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SettingsRepoError> for SettingsError {
    fn from(value: SettingsRepoError) -> Self {
        Self::Repo(value)
    }
}

/// Keys that carry a compiled-in default.
const DEFAULT_KEYS: [(&str, &str); 3] = [
    (PROJECT_GROUP, KEY_UNDO_ENABLED),
    (PROJECT_GROUP, KEY_UNDO_LIMIT),
    (PROJECT_GROUP, KEY_CAPTION_SPEC),
];

static DEFAULT_UNDO_LIMIT_VALUE: Lazy<String> =
    Lazy::new(|| crate::config::DEFAULT_UNDO_LIMIT.to_string());

/// Compiled-in default for one key.
pub fn default_value(group: &str, key: &str) -> Option<&'static str> {
    if group != PROJECT_GROUP {
        return None;
    }
    match key {
        KEY_UNDO_ENABLED => Some("true"),
        KEY_UNDO_LIMIT => Some(DEFAULT_UNDO_LIMIT_VALUE.as_str()),
        KEY_CAPTION_SPEC => Some(DEFAULT_CAPTION_SPEC),
        _ => None,
    }
}

/// Settings service facade.
pub struct SettingsService<R: SettingsRepository> {
    repo: R,
}

impl<R: SettingsRepository> SettingsService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Stored value, else the compiled-in default.
    pub fn string_value(&self, group: &str, key: &str) -> SettingsResult<String> {
        if let Some(value) = self.repo.get(group, key)? {
            return Ok(value);
        }
        default_value(group, key)
            .map(str::to_string)
            .ok_or_else(|| SettingsError::UnknownKey {
                group: group.to_string(),
                key: key.to_string(),
            })
    }

    pub fn bool_value(&self, group: &str, key: &str) -> SettingsResult<bool> {
        let value = self.string_value(group, key)?;
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(invalid_value(group, key, value)),
        }
    }

    pub fn usize_value(&self, group: &str, key: &str) -> SettingsResult<usize> {
        let value = self.string_value(group, key)?;
        value
            .trim()
            .parse()
            .map_err(|_| invalid_value(group, key, value))
    }

    /// Persists one value.
    pub fn set_value(&self, group: &str, key: &str, value: impl ToString) -> SettingsResult<()> {
        self.repo.set(group, key, &value.to_string())?;
        Ok(())
    }

    /// Drops the stored value so the default applies again.
    pub fn reset(&self, group: &str, key: &str) -> SettingsResult<bool> {
        Ok(self.repo.remove(group, key)?)
    }

    /// Stored values of one group merged over its defaults, sorted by key.
    pub fn group_values(&self, group: &str) -> SettingsResult<Vec<(String, String)>> {
        let mut merged: HashMap<String, String> = DEFAULT_KEYS
            .iter()
            .filter(|(default_group, _)| *default_group == group)
            .filter_map(|(_, key)| {
                default_value(group, key).map(|value| (key.to_string(), value.to_string()))
            })
            .collect();
        merged.extend(self.repo.list_group(group)?);
        let mut values: Vec<_> = merged.into_iter().collect();
        values.sort();
        Ok(values)
    }
}

fn invalid_value(group: &str, key: &str, value: String) -> SettingsError {
    warn!(
        "event=settings_read module=settings status=invalid group={} key={}",
        group, key
    );
    SettingsError::InvalidValue {
        group: group.to_string(),
        key: key.to_string(),
        value,
    }
}
