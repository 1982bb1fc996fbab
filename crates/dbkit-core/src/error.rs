// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for dbkit
//!
//! Driver-specific failures are mapped to these unified error types so the
//! connection layer can classify them (transient or not) and attach the
//! offending statement before handing them to the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message fragments that identify a dropped connection.
///
/// Matching is case-insensitive; a hit makes the failure eligible for the
/// reconnect-and-retry path.
pub const TRANSIENT_SIGNATURES: [&str; 5] = [
    "server has gone away",
    "no connection to the server",
    "lost connection",
    "is dead or not enabled",
    "error while sending",
];

/// Returns true if `message` matches one of the [`TRANSIENT_SIGNATURES`].
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_SIGNATURES
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Unified error type for all dbkit operations
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum EngineError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Raw failure reported by a driver handle, not yet tied to a statement.
    #[error("Driver error: {message}")]
    Driver {
        message: String,
        code: Option<String>,
    },

    #[error("{message} ([SQL]: {sql})")]
    Sql {
        message: String,
        sql: String,
        code: Option<String>,
    },

    #[error("Not implemented: {message}")]
    NotImplemented { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Driver not found: {driver_id}")]
    DriverNotFound { driver_id: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: msg.into() }
    }

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthenticationFailed { message: msg.into() }
    }

    pub fn driver(msg: impl Into<String>, code: Option<String>) -> Self {
        Self::Driver {
            message: msg.into(),
            code,
        }
    }

    pub fn sql(msg: impl Into<String>, sql: impl Into<String>, code: Option<String>) -> Self {
        Self::Sql {
            message: msg.into(),
            sql: sql.into(),
            code,
        }
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented { message: msg.into() }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration { message: msg.into() }
    }

    pub fn driver_not_found(id: impl Into<String>) -> Self {
        Self::DriverNotFound { driver_id: id.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }

    /// True for failures raised while establishing the physical connection.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::AuthenticationFailed { .. }
        )
    }

    /// True for execution failures whose message looks like a dropped link.
    ///
    /// Connection-establishment errors are never transient: the reconnect
    /// policy only covers connections that were open and failed mid-use.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Driver { message, .. } | Self::Sql { message, .. } => {
                is_transient_message(message)
            }
            _ => false,
        }
    }

    /// Attaches the offending statement to a driver failure.
    ///
    /// Errors that already carry a statement, and errors of other kinds, are
    /// returned unchanged.
    pub fn into_sql(self, sql: &str) -> Self {
        match self {
            Self::Driver { message, code } => Self::Sql {
                message,
                sql: sql.to_string(),
                code,
            },
            other => other,
        }
    }

    /// The driver/server error code, when one was reported.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Driver { code, .. } | Self::Sql { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Result type alias for dbkit operations
pub type EngineResult<T> = Result<T, EngineError>;
