// SPDX-License-Identifier: Apache-2.0

//! Connection parameters
//!
//! An immutable descriptor of how to reach one database. No validation is
//! performed here: an unknown driver or an unreachable port surfaces later as
//! a connection failure.

use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EngineError;

/// Session idle timeout applied when none is configured: 30 days.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 2_592_000;

/// Transaction isolation level applied to the session at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    #[serde(rename = "REPEATABLE READ")]
    RepeatableRead,
    #[serde(rename = "READ COMMITTED")]
    ReadCommitted,
    #[serde(rename = "READ UNCOMMITTED")]
    ReadUncommitted,
    #[serde(rename = "SERIALIZABLE")]
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl Display for IsolationLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for IsolationLevel {
    type Err = EngineError;

    /// Accepts the SQL spelling with spaces, underscores or dashes, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace(['_', '-'], " ").to_ascii_uppercase();
        match normalized.as_str() {
            "REPEATABLE READ" => Ok(IsolationLevel::RepeatableRead),
            "READ COMMITTED" => Ok(IsolationLevel::ReadCommitted),
            "READ UNCOMMITTED" => Ok(IsolationLevel::ReadUncommitted),
            "SERIALIZABLE" => Ok(IsolationLevel::Serializable),
            _ => Err(EngineError::configuration(format!(
                "unknown isolation level '{}'",
                s
            ))),
        }
    }
}

/// Database password. Redacted in `Debug`/`Display` and never serialized.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The clear-text password, for handing to the driver only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Debug for Password {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Display for Password {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Serialize for Password {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("***")
    }
}

impl<'de> Deserialize<'de> for Password {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Password)
    }
}

/// How to reach a database.
///
/// Immutable once built; the `with_*` builders return a new value. Shared
/// read-only between connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParameters {
    driver: String,
    host: String,
    port: u16,
    user: String,
    /// Never written out; a redacted placeholder would load back as the
    /// password.
    #[serde(skip_serializing)]
    password: Password,
    database: String,
    charset: String,
    unix_socket: String,
    isolation_level: Option<IsolationLevel>,
    /// Seconds; 0 keeps [`DEFAULT_IDLE_TIMEOUT_SECS`].
    idle_timeout: u64,
}

impl Default for ConnectionParameters {
    fn default() -> Self {
        Self {
            driver: "mysql".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: Password::default(),
            database: "test".to_string(),
            charset: "utf8".to_string(),
            unix_socket: String::new(),
            isolation_level: None,
            idle_timeout: 0,
        }
    }
}

impl ConnectionParameters {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        driver: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
        charset: impl Into<String>,
        unix_socket: impl Into<String>,
    ) -> Self {
        Self {
            driver: driver.into(),
            host: host.into(),
            port,
            user: user.into(),
            password: Password::new(password),
            database: database.into(),
            charset: charset.into(),
            unix_socket: unix_socket.into(),
            isolation_level: None,
            idle_timeout: 0,
        }
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = Password::new(password);
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn with_unix_socket(mut self, path: impl Into<String>) -> Self {
        self.unix_socket = path.into();
        self
    }

    pub fn with_isolation_level(mut self, level: Option<IsolationLevel>) -> Self {
        self.isolation_level = level;
        self
    }

    pub fn with_idle_timeout(mut self, seconds: u64) -> Self {
        self.idle_timeout = seconds;
        self
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &Password {
        &self.password
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn unix_socket(&self) -> Option<&str> {
        self.has_unix_socket().then_some(self.unix_socket.as_str())
    }

    pub fn has_unix_socket(&self) -> bool {
        !self.unix_socket.is_empty()
    }

    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation_level
    }

    pub fn has_isolation_level(&self) -> bool {
        self.isolation_level.is_some()
    }

    pub fn idle_timeout(&self) -> u64 {
        self.idle_timeout
    }

    /// Idle timeout to apply to the session, falling back to 30 days.
    pub fn effective_idle_timeout(&self) -> u64 {
        if self.idle_timeout > 0 {
            self.idle_timeout
        } else {
            DEFAULT_IDLE_TIMEOUT_SECS
        }
    }

    /// Data-source string. The socket form wins over host/port when a socket
    /// path is set.
    pub fn dsn(&self) -> String {
        match self.unix_socket() {
            Some(socket) => format!(
                "{}:dbname={};unix_socket={}",
                self.driver, self.database, socket
            ),
            None => format!(
                "{}:dbname={};host={};port={}",
                self.driver, self.database, self.host, self.port
            ),
        }
    }
}
