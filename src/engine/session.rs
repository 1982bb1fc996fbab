// SPDX-License-Identifier: Apache-2.0

//! Session options
//!
//! Everything a driver needs to configure a new physical connection is
//! passed explicitly through [`SessionOptions`]; nothing is read from
//! process-wide driver state.

use serde::{Deserialize, Serialize};

use dbkit_core::ConnectionParameters;

/// Casing applied to column names in fetched rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnCase {
    /// As reported by the server
    #[default]
    Natural,
    Lower,
    Upper,
}

impl ColumnCase {
    pub fn apply(self, name: &str) -> String {
        match self {
            ColumnCase::Natural => name.to_string(),
            ColumnCase::Lower => name.to_lowercase(),
            ColumnCase::Upper => name.to_uppercase(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnCase::Natural => "natural",
            ColumnCase::Lower => "lower",
            ColumnCase::Upper => "upper",
        }
    }
}

/// Properties of a freshly opened session.
///
/// Errors are always reported as `Err` values, connections are never
/// persistent or shared, and prepared statements are real server-side
/// statements; those are not options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Explicit autocommit mode sent right after the handshake.
    pub autocommit: bool,
    /// Decode values into their native types instead of text.
    pub native_types: bool,
    pub column_case: ColumnCase,
    /// Command run on connect to select the character set.
    pub init_command: Option<String>,
    /// Read whole result sets before yielding rows from `each`.
    pub buffered: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            autocommit: true,
            native_types: true,
            column_case: ColumnCase::Natural,
            init_command: None,
            buffered: false,
        }
    }
}

impl SessionOptions {
    /// Defaults for `params`, with the charset init command filled in.
    pub fn for_parameters(params: &ConnectionParameters) -> Self {
        Self {
            init_command: set_names_sql(params.charset()),
            ..Self::default()
        }
    }
}

/// `SET NAMES` command for a charset, if one is configured.
pub fn set_names_sql(charset: &str) -> Option<String> {
    let charset = charset.trim();
    (!charset.is_empty()).then(|| format!("SET NAMES {}", quote_identifier(charset)))
}

/// Statement run once per new session: the optional isolation level followed
/// by the idle/interactive timeouts.
pub fn session_setup_sql(params: &ConnectionParameters) -> String {
    let timeout = params.effective_idle_timeout();
    let mut sql = String::new();

    if let Some(level) = params.isolation_level() {
        sql.push_str(&format!("SET SESSION TRANSACTION ISOLATION LEVEL {};", level));
    }

    sql.push_str(&format!(
        "SET SESSION wait_timeout = {}, interactive_timeout = {};",
        timeout, timeout
    ));
    sql
}

/// Backtick-quotes an identifier, doubling embedded backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
