use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_URI: &str = "mongodb://localhost:27017";
pub const DEFAULT_DATABASE: &str = "todos";
pub const DEFAULT_COLLECTION: &str = "todos";
pub const DEFAULT_APP_NAME: &str = "todo-store";
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a positive number of milliseconds, got {value:?}")]
    InvalidTimeout { key: &'static str, value: String },
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Where the store lives and how long a single round trip may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub app_name: String,
    pub operation_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl StoreConfig {
    /// Reads `MONGODB_URI`, `TODOS_DATABASE`, `TODOS_COLLECTION`, `TODOS_APP_NAME` and
    /// `TODOS_OPERATION_TIMEOUT_MS`, loading a `.env` file first if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let text = |key: &'static str, default: String| match lookup(key) {
            None => Ok(default),
            Some(v) if v.trim().is_empty() => Err(ConfigError::Empty(key)),
            Some(v) => Ok(v.trim().to_string()),
        };

        let operation_timeout = match lookup("TODOS_OPERATION_TIMEOUT_MS") {
            None => defaults.operation_timeout,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => return Err(ConfigError::InvalidTimeout { key: "TODOS_OPERATION_TIMEOUT_MS", value: raw }),
            },
        };

        Ok(Self {
            uri: text("MONGODB_URI", defaults.uri)?,
            database: text("TODOS_DATABASE", defaults.database)?,
            collection: text("TODOS_COLLECTION", defaults.collection)?,
            app_name: text("TODOS_APP_NAME", defaults.app_name)?,
            operation_timeout,
        })
    }
}
