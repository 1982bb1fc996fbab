// SPDX-License-Identifier: Apache-2.0

//! Driver traits
//!
//! A [`Connector`] opens one physical connection; the returned
//! [`PhysicalConnection`] is owned exclusively by a
//! [`Connection`](crate::engine::Connection), which adds transaction nesting
//! and the reconnect policy on top. Handles report failures as
//! [`EngineError::Driver`](dbkit_core::EngineError::Driver); attaching the
//! statement text is the caller's job.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::engine::session::SessionOptions;
use dbkit_core::{ConnectionParameters, EngineResult, Param, ParamType, Row, StatementResult, Value};

/// Opens physical connections for one driver id.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the unique identifier for this driver (e.g. "mysql")
    fn driver_id(&self) -> &'static str;

    /// Returns a human-readable name for this driver
    fn driver_name(&self) -> &'static str;

    /// Establishes a new physical connection with the given session options.
    ///
    /// Fails with `ConnectionFailed` or `AuthenticationFailed`.
    async fn open(
        &self,
        params: &ConnectionParameters,
        options: &SessionOptions,
    ) -> EngineResult<Box<dyn PhysicalConnection>>;
}

/// One live connection to the server.
#[async_trait]
pub trait PhysicalConnection: Send {
    /// Runs one or more `;`-separated statements through the text protocol
    /// and returns the affected-row count.
    async fn execute_batch(&mut self, sql: &str) -> EngineResult<u64>;

    /// Prepares, binds and executes a statement that does not return rows.
    async fn execute(&mut self, sql: &str, params: &[Param]) -> EngineResult<StatementResult>;

    /// Prepares, binds and executes a query, returning its first row.
    async fn fetch_optional(&mut self, sql: &str, params: &[Param]) -> EngineResult<Option<Row>>;

    /// Prepares, binds and executes a query, returning every row.
    async fn fetch_all(&mut self, sql: &str, params: &[Param]) -> EngineResult<Vec<Row>>;

    /// Opens a forward-only cursor over a query.
    ///
    /// Dropping the stream closes the cursor, whether or not it was drained.
    fn fetch_stream<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [Param],
    ) -> BoxStream<'a, EngineResult<Row>>;

    async fn begin(&mut self) -> EngineResult<()>;

    async fn commit(&mut self) -> EngineResult<()>;

    async fn rollback(&mut self) -> EngineResult<()>;

    /// Escapes and quotes a literal for inclusion in SQL text.
    fn quote(&self, value: &Value, kind: ParamType) -> EngineResult<String>;

    /// Fixed set of driver-level attributes.
    async fn attributes(&mut self) -> EngineResult<DriverAttributes>;

    /// Closes the connection gracefully.
    fn close(self: Box<Self>) -> BoxFuture<'static, EngineResult<()>>;
}

/// Driver attributes reported by [`PhysicalConnection::attributes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverAttributes {
    pub autocommit: bool,
    pub error_mode: String,
    pub column_case: String,
    pub client_version: String,
    pub connection_status: String,
    pub persistent: bool,
    pub server_version: String,
    /// Session idle timeout in seconds
    pub timeout: u64,
}
