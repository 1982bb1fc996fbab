// SPDX-License-Identifier: Apache-2.0

//! dbkit core
//!
//! Types, connection parameters, and error handling shared by the connection
//! layer and the driver implementations.

pub mod error;
pub mod params;
pub mod types;

pub use error::{is_transient_message, EngineError, EngineResult, TRANSIENT_SIGNATURES};
pub use params::{ConnectionParameters, IsolationLevel, Password, DEFAULT_IDLE_TIMEOUT_SECS};
pub use types::{
    ExecOutcome, IntoParam, Param, ParamType, ResultMode, Row, StatementResult, Statements, Value,
};
