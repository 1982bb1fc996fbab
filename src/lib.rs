// SPDX-License-Identifier: Apache-2.0

// dbkit - MySQL access layer
// Core library

pub mod config;
pub mod engine;
pub mod metrics;
pub mod observability;
pub mod schema;

pub use dbkit_core::{
    params, ConnectionParameters, EngineError, EngineResult, ExecOutcome, IntoParam,
    IsolationLevel, Param, ParamType, Password, ResultMode, Row, StatementResult, Statements,
    Value,
};
pub use engine::{Connection, ReconnectPolicy, RowStream, SessionOptions};
