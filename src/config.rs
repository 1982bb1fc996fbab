// SPDX-License-Identifier: Apache-2.0

//! Application settings
//!
//! Loaded from a JSON file, then overridden from `DBKIT_*` environment
//! variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::connection_url::parse_connection_url;
use crate::engine::reconnect::ReconnectPolicy;
use dbkit_core::{ConnectionParameters, EngineError, EngineResult};

pub const ENV_DATABASE_URL: &str = "DBKIT_DATABASE_URL";
pub const ENV_DEBUG: &str = "DBKIT_DEBUG";
pub const ENV_AUTO_RECONNECT: &str = "DBKIT_AUTO_RECONNECT";
pub const ENV_LOG_DIR: &str = "DBKIT_LOG_DIR";
pub const ENV_LOG_FILTER: &str = "DBKIT_LOG";

const DEFAULT_LOG_RETENTION_DAYS: u64 = 14;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Log directory; `~/.dbkit/logs` when unset.
    pub dir: Option<PathBuf>,
    /// `EnvFilter` directives, used when `RUST_LOG` is not set.
    pub filter: String,
    pub retention_days: u64,
    /// Also log to stderr in human-readable form.
    pub stderr: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: None,
            filter: "dbkit=info".to_string(),
            retention_days: DEFAULT_LOG_RETENTION_DAYS,
            stderr: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Trace every statement and its parameters.
    pub debug: bool,
    pub auto_reconnect: bool,
    pub reconnect: ReconnectPolicy,
    pub database: ConnectionParameters,
    /// When set, takes precedence over `database`.
    pub database_url: Option<String>,
    pub log: LogSettings,
}

impl Settings {
    /// Reads settings from a JSON file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            debug!("No settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::configuration(format!("Failed to read settings {:?}: {}", path, e))
        })?;

        let settings: Settings = serde_json::from_str(&content).map_err(|e| {
            EngineError::configuration(format!("Failed to parse settings {:?}: {}", path, e))
        })?;

        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Applies `DBKIT_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> EngineResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from any key lookup; `apply_env` with the process
    /// environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> EngineResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_DATABASE_URL).filter(|v| !v.trim().is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(value) = lookup(ENV_DEBUG) {
            self.debug = parse_bool(ENV_DEBUG, &value)?;
        }
        if let Some(value) = lookup(ENV_AUTO_RECONNECT) {
            self.auto_reconnect = parse_bool(ENV_AUTO_RECONNECT, &value)?;
        }
        if let Some(dir) = lookup(ENV_LOG_DIR).filter(|v| !v.trim().is_empty()) {
            self.log.dir = Some(PathBuf::from(dir));
        }
        if let Some(filter) = lookup(ENV_LOG_FILTER).filter(|v| !v.trim().is_empty()) {
            self.log.filter = filter;
        }
        Ok(())
    }

    /// Connection parameters, from `database_url` when present.
    pub fn connection_parameters(&self) -> EngineResult<ConnectionParameters> {
        match self.database_url.as_deref() {
            Some(url) => parse_connection_url(url),
            None => Ok(self.database.clone()),
        }
    }
}

fn parse_bool(key: &str, value: &str) -> EngineResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" | "" => Ok(false),
        _ => Err(EngineError::configuration(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}
