// SPDX-License-Identifier: Apache-2.0

//! Connection
//!
//! Owns at most one physical connection, established lazily on first use.
//!
//! ## Transaction Handling
//!
//! `begin`/`commit`/`rollback` nest through a depth counter: only the
//! outermost pair reaches the server. There are no savepoints; a rollback
//! at any depth rolls back the whole transaction once the depth returns to
//! zero.
//!
//! ## Reconnect
//!
//! When auto-reconnect is on, a statement that fails with a dropped-link
//! error (see [`TRANSIENT_SIGNATURES`](dbkit_core::TRANSIENT_SIGNATURES)) is
//! retried on a fresh connection, up to the [`ReconnectPolicy`] bound. The
//! old session is discarded with its transaction; nothing is replayed.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::config::Settings;
use crate::engine::reconnect::ReconnectPolicy;
use crate::engine::registry::DriverRegistry;
use crate::engine::session::{quote_identifier, session_setup_sql, SessionOptions};
use crate::engine::stream::RowStream;
use crate::engine::traits::{Connector, DriverAttributes, PhysicalConnection};
use crate::metrics;
use dbkit_core::{
    ConnectionParameters, EngineError, EngineResult, ExecOutcome, Param, ParamType, ResultMode,
    Row, Statements, Value,
};

const CONNECTION_ID_SQL: &str = "SELECT CONNECTION_ID()";

/// Driver attributes plus the server-side connection id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusInfo {
    #[serde(flatten)]
    pub attributes: DriverAttributes,
    pub connection_id: u64,
}

#[derive(Debug, Clone, Copy)]
enum Request<'a> {
    Exec(&'a str),
    Execute {
        sql: &'a str,
        params: &'a [Param],
        mode: ResultMode,
    },
}

impl<'a> Request<'a> {
    fn sql(&self) -> &'a str {
        match *self {
            Request::Exec(sql) => sql,
            Request::Execute { sql, .. } => sql,
        }
    }

    fn params(&self) -> &'a [Param] {
        match *self {
            Request::Exec(_) => &[],
            Request::Execute { params, .. } => params,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TransactionEnd {
    Commit,
    Rollback,
}

impl TransactionEnd {
    fn as_sql(self) -> &'static str {
        match self {
            TransactionEnd::Commit => "COMMIT",
            TransactionEnd::Rollback => "ROLLBACK",
        }
    }
}

/// A single database connection with nested transactions and auto-reconnect.
///
/// Not a pool and not shareable: every operation takes `&mut self`, so at
/// most one statement is in flight at a time.
pub struct Connection {
    params: Arc<ConnectionParameters>,
    connector: Option<Arc<dyn Connector>>,
    options: SessionOptions,
    handle: Option<Box<dyn PhysicalConnection>>,
    auto_reconnect: bool,
    policy: ReconnectPolicy,
    depth: u32,
    reconnect_count: u64,
    trace_sql: bool,
}

impl Connection {
    /// Creates a disconnected connection using the built-in drivers.
    pub fn new(params: impl Into<Arc<ConnectionParameters>>) -> Self {
        Self::with_registry(params, DriverRegistry::builtin())
    }

    /// Creates a disconnected connection resolving its driver in `registry`.
    ///
    /// An unknown driver id is not an error until the first connect.
    pub fn with_registry(
        params: impl Into<Arc<ConnectionParameters>>,
        registry: &DriverRegistry,
    ) -> Self {
        let params = params.into();
        let connector = registry.get(params.driver());
        Self::build(params, connector)
    }

    /// Creates a disconnected connection that opens sessions with `connector`.
    pub fn with_connector(
        params: impl Into<Arc<ConnectionParameters>>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self::build(params.into(), Some(connector))
    }

    /// Creates a connection configured from application settings.
    pub fn from_settings(settings: &Settings) -> EngineResult<Self> {
        let params = settings.connection_parameters()?;
        let mut connection = Self::new(params);
        connection
            .set_auto_reconnect(settings.auto_reconnect)
            .set_reconnect_policy(settings.reconnect)
            .set_trace_sql(settings.debug);
        Ok(connection)
    }

    fn build(params: Arc<ConnectionParameters>, connector: Option<Arc<dyn Connector>>) -> Self {
        let options = SessionOptions::for_parameters(&params);
        Self {
            params,
            connector,
            options,
            handle: None,
            auto_reconnect: false,
            policy: ReconnectPolicy::default(),
            depth: 0,
            reconnect_count: 0,
            trace_sql: false,
        }
    }

    /// Replaces the session options used by the next connect.
    pub fn with_session_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn parameters(&self) -> &ConnectionParameters {
        &self.params
    }

    pub fn session_options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    pub fn set_auto_reconnect(&mut self, enabled: bool) -> &mut Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    pub fn set_reconnect_policy(&mut self, policy: ReconnectPolicy) -> &mut Self {
        self.policy = policy;
        self
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Emits every statement (and its parameters) at trace level.
    pub fn set_trace_sql(&mut self, enabled: bool) -> &mut Self {
        self.trace_sql = enabled;
        self
    }

    pub fn transaction_depth(&self) -> u32 {
        self.depth
    }

    /// How many times a lost connection was replaced.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count
    }

    // ==================== Lifecycle ====================

    /// Opens the physical connection if there is none. Idempotent.
    pub async fn connect(&mut self) -> EngineResult<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        let connector = self.connector.clone().ok_or_else(|| {
            EngineError::connection_failed(
                EngineError::driver_not_found(self.params.driver()).to_string(),
            )
        })?;

        let mut handle = connector
            .open(&self.params, &self.options)
            .await
            .map_err(|e| {
                if e.is_connection_error() {
                    e
                } else {
                    EngineError::connection_failed(e.to_string())
                }
            })?;

        let setup = session_setup_sql(&self.params);
        self.trace_statement(&setup, &[]);
        if let Err(err) = handle.execute_batch(&setup).await {
            if let Err(close_err) = handle.close().await {
                warn!(error = %close_err, "Failed to close connection after session setup error");
            }
            return Err(EngineError::connection_failed(format!(
                "session setup failed: {}",
                err
            )));
        }

        debug!(
            dsn = %self.params.dsn(),
            driver = connector.driver_id(),
            timeout_secs = self.params.effective_idle_timeout(),
            "Connected to database host"
        );

        self.handle = Some(handle);
        Ok(())
    }

    /// Closes the physical connection and forgets any open transaction.
    /// Idempotent.
    pub async fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.close().await {
                warn!(error = %err, "Error while closing database connection");
            }
            debug!(dsn = %self.params.dsn(), "Database connection closed");
        }
        self.depth = 0;
    }

    /// Drops a broken handle without the close handshake.
    fn discard(&mut self) {
        self.handle = None;
        self.depth = 0;
    }

    fn handle_mut(&mut self) -> EngineResult<&mut dyn PhysicalConnection> {
        match self.handle.as_deref_mut() {
            Some(handle) => Ok(handle),
            None => Err(EngineError::internal("no live database connection")),
        }
    }

    /// Switches the default database of the session.
    pub async fn use_database(&mut self, name: &str) -> EngineResult<()> {
        self.connect().await?;
        let sql = format!("USE {}", quote_identifier(name));
        self.trace_statement(&sql, &[]);
        self.handle_mut()?
            .execute_batch(&sql)
            .await
            .map(|_| ())
            .map_err(|e| e.into_sql(&sql))
    }

    // ==================== Transactions ====================

    /// Opens a transaction, or joins the one already open.
    ///
    /// Always `Ok(true)` unless the server rejects the physical BEGIN.
    pub async fn begin(&mut self) -> EngineResult<bool> {
        self.connect().await?;

        if self.depth == 0 {
            self.trace_statement("START TRANSACTION", &[]);
            self.handle_mut()?
                .begin()
                .await
                .map_err(|e| e.into_sql("START TRANSACTION"))?;
        }

        self.depth += 1;
        Ok(true)
    }

    /// Leaves one nesting level; commits when the outermost level is left.
    pub async fn commit(&mut self) -> EngineResult<bool> {
        self.end_transaction(TransactionEnd::Commit).await
    }

    /// Leaves one nesting level; rolls back when the outermost level is left.
    pub async fn rollback(&mut self) -> EngineResult<bool> {
        self.end_transaction(TransactionEnd::Rollback).await
    }

    async fn end_transaction(&mut self, end: TransactionEnd) -> EngineResult<bool> {
        if self.depth == 0 {
            debug!(
                operation = end.as_sql(),
                "No open transaction; ignoring unbalanced transaction end"
            );
            return Ok(true);
        }

        self.depth -= 1;
        if self.depth == 0 {
            self.trace_statement(end.as_sql(), &[]);
            let handle = self.handle_mut()?;
            let result = match end {
                TransactionEnd::Commit => handle.commit().await,
                TransactionEnd::Rollback => handle.rollback().await,
            };
            result.map_err(|e| e.into_sql(end.as_sql()))?;
        }

        Ok(true)
    }

    // ==================== Statements ====================

    /// Runs one statement, or each non-empty statement of a batch in order,
    /// and returns the total affected-row count.
    pub async fn exec<'s>(&mut self, statements: impl Into<Statements<'s>>) -> EngineResult<u64> {
        let statements = statements.into();
        self.connect().await?;

        let mut affected = 0;
        for sql in statements.iter() {
            if let ExecOutcome::Affected(count) = self.run(Request::Exec(sql)).await? {
                affected += count;
            }
        }
        Ok(affected)
    }

    /// Prepares `sql`, binds `params` positionally, executes it and projects
    /// the result according to `mode`.
    pub async fn execute(
        &mut self,
        sql: &str,
        params: &[Param],
        mode: ResultMode,
    ) -> EngineResult<ExecOutcome> {
        self.run(Request::Execute { sql, params, mode }).await
    }

    /// First row of a query.
    pub async fn fetch(&mut self, sql: &str, params: &[Param]) -> EngineResult<Option<Row>> {
        match self.execute(sql, params, ResultMode::Fetch).await? {
            ExecOutcome::Row(row) => Ok(row),
            other => Err(unexpected_outcome(ResultMode::Fetch, &other)),
        }
    }

    /// Every row of a query.
    pub async fn fetch_all(&mut self, sql: &str, params: &[Param]) -> EngineResult<Vec<Row>> {
        match self.execute(sql, params, ResultMode::FetchAll).await? {
            ExecOutcome::Rows(rows) => Ok(rows),
            other => Err(unexpected_outcome(ResultMode::FetchAll, &other)),
        }
    }

    /// First column of the first row; `Value::Null` when there is no row.
    pub async fn scalar(&mut self, sql: &str, params: &[Param]) -> EngineResult<Value> {
        match self.execute(sql, params, ResultMode::Scalar).await? {
            ExecOutcome::Scalar(value) => Ok(value),
            other => Err(unexpected_outcome(ResultMode::Scalar, &other)),
        }
    }

    /// Runs an INSERT and returns the last inserted id.
    pub async fn insert(&mut self, sql: &str, params: &[Param]) -> EngineResult<u64> {
        match self.execute(sql, params, ResultMode::Insert).await? {
            ExecOutcome::LastInsertId(id) => Ok(id),
            other => Err(unexpected_outcome(ResultMode::Insert, &other)),
        }
    }

    /// Runs an UPDATE/DELETE and returns the affected-row count.
    pub async fn affected(&mut self, sql: &str, params: &[Param]) -> EngineResult<u64> {
        match self.execute(sql, params, ResultMode::Update).await? {
            ExecOutcome::Affected(count) => Ok(count),
            other => Err(unexpected_outcome(ResultMode::Update, &other)),
        }
    }

    /// Streams the rows of a query through a live cursor.
    ///
    /// The query is prepared when `params` is non-empty and sent as plain
    /// text otherwise. Failures to open the cursor are not retried.
    pub async fn each<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [Param],
    ) -> EngineResult<RowStream<'a>> {
        self.connect().await?;
        self.trace_statement(sql, params);
        let handle = self.handle_mut()?;
        Ok(RowStream::new(handle.fetch_stream(sql, params), sql))
    }

    /// Escapes and quotes `value` as a SQL literal.
    ///
    /// Prefer bound parameters; quoting is not supported by every driver.
    pub async fn quote(&mut self, value: &Value, kind: ParamType) -> EngineResult<String> {
        self.connect().await?;
        self.handle_mut()?.quote(value, kind)
    }

    /// Server-side id of the current session.
    pub async fn connection_id(&mut self) -> EngineResult<u64> {
        let value = self.scalar(CONNECTION_ID_SQL, &[]).await?;
        value.as_u64().ok_or_else(|| {
            EngineError::internal(format!("unexpected CONNECTION_ID() result: {}", value))
        })
    }

    /// Driver attributes of the live session plus its connection id.
    pub async fn status_info(&mut self) -> EngineResult<StatusInfo> {
        self.connect().await?;
        let attributes = self.handle_mut()?.attributes().await?;
        let connection_id = self.connection_id().await?;
        Ok(StatusInfo {
            attributes,
            connection_id,
        })
    }

    // ==================== Execution core ====================

    /// Runs a request, replacing the connection and retrying on transient
    /// failures while the reconnect policy allows it.
    async fn run(&mut self, request: Request<'_>) -> EngineResult<ExecOutcome> {
        let mut attempt = 0u32;

        loop {
            self.connect().await?;

            let start = Instant::now();
            let result = self.run_once(request).await;
            metrics::record_statement(
                start.elapsed().as_micros() as f64 / 1000.0,
                result.is_ok(),
            );

            let err = match result {
                Ok(outcome) => return Ok(outcome),
                Err(err) => err,
            };

            if !(self.auto_reconnect && err.is_transient()) {
                return Err(err.into_sql(request.sql()));
            }

            attempt += 1;
            if !self.policy.allows(attempt) {
                warn!(
                    sql = request.sql(),
                    attempts = attempt - 1,
                    error = %err,
                    "Database connection still failing; giving up"
                );
                return Err(err.into_sql(request.sql()));
            }

            warn!(
                sql = request.sql(),
                attempt,
                transaction_depth = self.depth,
                error = %err,
                "Database connection lost; reconnecting and retrying the statement"
            );

            self.reconnect_count += 1;
            metrics::record_reconnect();
            self.discard();

            let delay = self.policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn run_once(&mut self, request: Request<'_>) -> EngineResult<ExecOutcome> {
        self.trace_statement(request.sql(), request.params());
        let handle = self.handle_mut()?;

        match request {
            Request::Exec(sql) => handle.execute_batch(sql).await.map(ExecOutcome::Affected),
            Request::Execute { sql, params, mode } => match mode {
                ResultMode::Insert => handle
                    .execute(sql, params)
                    .await
                    .map(|r| ExecOutcome::LastInsertId(r.last_insert_id)),
                ResultMode::Update | ResultMode::Delete => handle
                    .execute(sql, params)
                    .await
                    .map(|r| ExecOutcome::Affected(r.rows_affected)),
                ResultMode::Fetch => handle
                    .fetch_optional(sql, params)
                    .await
                    .map(ExecOutcome::Row),
                ResultMode::FetchAll => handle.fetch_all(sql, params).await.map(ExecOutcome::Rows),
                ResultMode::Scalar => handle.fetch_optional(sql, params).await.map(|row| {
                    let first = row.and_then(|r| r.into_values().into_iter().next());
                    ExecOutcome::Scalar(first.unwrap_or(Value::Null))
                }),
            },
        }
    }

    fn trace_statement(&self, sql: &str, params: &[Param]) {
        if !self.trace_sql {
            return;
        }

        if params.is_empty() {
            trace!(target: "dbkit::sql", "[SQL] {}", sql);
        } else {
            let encoded = serde_json::to_string(params).unwrap_or_default();
            trace!(target: "dbkit::sql", parameters = %encoded, "[SQL] {}", sql);
        }
    }
}

fn unexpected_outcome(mode: ResultMode, outcome: &ExecOutcome) -> EngineError {
    EngineError::internal(format!(
        "result mode {:?} produced unexpected outcome {:?}",
        mode, outcome
    ))
}
