//! Runtime configuration from the environment.
//!
//! `main` loads `.env` with dotenvy first, so every key below can live there.

use std::path::PathBuf;
use std::time::Duration;

use crate::drafts::AUTO_SAVE_INTERVAL;
use crate::error::ConfigError;
use crate::queue::DEFAULT_RETENTION_DAYS;
use crate::sync::SYNC_INTERVAL;

pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_base_url: String,
    pub db_path: PathBuf,
    pub access_token: Option<String>,
    pub sync_interval: Duration,
    pub auto_save_interval: Duration,
    pub retention_days: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let sync_interval = match get("FIELDSYNC_SYNC_INTERVAL_SECS") {
            Some(v) => Duration::from_secs(parse_positive("FIELDSYNC_SYNC_INTERVAL_SECS", &v)?),
            None => SYNC_INTERVAL,
        };
        let auto_save_interval = match get("FIELDSYNC_AUTOSAVE_INTERVAL_MS") {
            Some(v) => Duration::from_millis(parse_positive("FIELDSYNC_AUTOSAVE_INTERVAL_MS", &v)?),
            None => AUTO_SAVE_INTERVAL,
        };
        let retention_days = match get("FIELDSYNC_RETENTION_DAYS") {
            Some(v) => parse_number("FIELDSYNC_RETENTION_DAYS", &v)?,
            None => DEFAULT_RETENTION_DAYS,
        };

        Ok(Self {
            api_base_url: get("FIELDSYNC_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            db_path: get("FIELDSYNC_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_db_path),
            access_token: get("FIELDSYNC_ACCESS_TOKEN"),
            sync_interval,
            auto_save_interval,
            retention_days,
        })
    }
}

/// `<data dir>/fieldsync/offline.db`, or the working directory when the
/// platform has no data dir.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("fieldsync").join("offline.db"))
        .unwrap_or_else(|| PathBuf::from("fieldsync-offline.db"))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Interval settings: tokio timers reject a zero period.
fn parse_positive(key: &str, value: &str) -> Result<u64, ConfigError> {
    match parse_number(key, value)? {
        0 => Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
        }),
        n => Ok(n),
    }
}
