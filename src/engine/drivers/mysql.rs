// SPDX-License-Identifier: Apache-2.0

//! MySQL Driver
//!
//! Implements [`Connector`] for MySQL/MariaDB on top of a single SQLx
//! connection (no pool).

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow,
};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions as _, Connection as _, Row as _, TypeInfo};

use crate::engine::session::SessionOptions;
use crate::engine::traits::{Connector, DriverAttributes, PhysicalConnection};
use dbkit_core::{
    ConnectionParameters, EngineError, EngineResult, Param, ParamType, Row, StatementResult,
    Value,
};

/// Prefix given to I/O failures so they read like the client library's own
/// dropped-link messages.
const LOST_CONNECTION: &str = "Lost connection to MySQL server";

const CLIENT_VERSION: &str = "sqlx-mysql 0.8";

/// `ER_CLIENT_INTERACTION_TIMEOUT`: the server closed an idle session.
const ER_CLIENT_INTERACTION_TIMEOUT: u16 = 4031;

/// MySQL connector
pub struct MySqlConnector;

impl MySqlConnector {
    pub fn new() -> Self {
        Self
    }

    /// Builds SQLx connect options; a socket path takes precedence over
    /// host/port.
    ///
    /// SQLx's own session tweaks are switched off: `sql_mode` and `time_zone`
    /// stay at the server defaults, and statements are traced by
    /// [`Connection`](crate::engine::Connection) only.
    fn connect_options(params: &ConnectionParameters) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .username(params.user())
            .pipes_as_concat(false)
            .no_engine_substitution(false)
            .timezone(None::<String>)
            .disable_statement_logging();

        if !params.database().is_empty() {
            options = options.database(params.database());
        }

        options = match params.unix_socket() {
            Some(socket) => options.socket(socket),
            None => options.host(params.host()).port(params.port()),
        };

        if !params.password().is_empty() {
            options = options.password(params.password().expose());
        }

        let charset = params.charset().trim();
        if !charset.is_empty() {
            options = options.charset(charset);
        }

        options
    }

    fn connection_status(params: &ConnectionParameters) -> String {
        match params.unix_socket() {
            Some(_) => "Localhost via UNIX socket".to_string(),
            None => format!("{} via TCP/IP", params.host()),
        }
    }
}

impl Default for MySqlConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    fn driver_id(&self) -> &'static str {
        "mysql"
    }

    fn driver_name(&self) -> &'static str {
        "MySQL / MariaDB"
    }

    async fn open(
        &self,
        params: &ConnectionParameters,
        options: &SessionOptions,
    ) -> EngineResult<Box<dyn PhysicalConnection>> {
        let connect_options = Self::connect_options(params);

        let conn = MySqlConnection::connect_with(&connect_options)
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("Access denied") {
                    EngineError::auth_failed(msg)
                } else {
                    EngineError::connection_failed(msg)
                }
            })?;

        let mut handle = MySqlHandle {
            conn,
            options: options.clone(),
            connection_status: Self::connection_status(params),
            timeout: params.effective_idle_timeout(),
        };

        if let Some(init) = options.init_command.as_deref() {
            handle.execute_batch(init).await?;
        }
        let autocommit = format!("SET autocommit = {}", u8::from(options.autocommit));
        handle.execute_batch(&autocommit).await?;

        Ok(Box::new(handle))
    }
}

/// One open MySQL session.
struct MySqlHandle {
    conn: MySqlConnection,
    options: SessionOptions,
    connection_status: String,
    timeout: u64,
}

impl MySqlHandle {
    fn convert_row(&self, row: &MySqlRow) -> Row {
        convert_row(row, &self.options)
    }
}

#[async_trait]
impl PhysicalConnection for MySqlHandle {
    async fn execute_batch(&mut self, sql: &str) -> EngineResult<u64> {
        let result = sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(sql))
            .await
            .map_err(map_error)?;
        Ok(result.rows_affected())
    }

    async fn execute(&mut self, sql: &str, params: &[Param]) -> EngineResult<StatementResult> {
        let result = prepared(sql, params)
            .execute(&mut self.conn)
            .await
            .map_err(map_error)?;

        Ok(StatementResult {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_id(),
        })
    }

    async fn fetch_optional(&mut self, sql: &str, params: &[Param]) -> EngineResult<Option<Row>> {
        let row = prepared(sql, params)
            .fetch_optional(&mut self.conn)
            .await
            .map_err(map_error)?;
        Ok(row.map(|r| self.convert_row(&r)))
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Param]) -> EngineResult<Vec<Row>> {
        let rows = prepared(sql, params)
            .fetch_all(&mut self.conn)
            .await
            .map_err(map_error)?;
        Ok(rows.iter().map(|r| self.convert_row(r)).collect())
    }

    fn fetch_stream<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [Param],
    ) -> BoxStream<'a, EngineResult<Row>> {
        let options = self.options.clone();
        let conn = &mut self.conn;

        if options.buffered {
            let rows = async move {
                prepared(sql, params)
                    .fetch_all(conn)
                    .await
                    .map_err(map_error)
            };
            return stream::once(rows)
                .flat_map(move |result| {
                    let rows: Vec<EngineResult<Row>> = match result {
                        Ok(rows) => rows.iter().map(|r| Ok(convert_row(r, &options))).collect(),
                        Err(err) => vec![Err(err)],
                    };
                    stream::iter(rows)
                })
                .boxed();
        }

        let rows = if params.is_empty() {
            sqlx::raw_sql(sql).fetch(conn)
        } else {
            prepared(sql, params).fetch(conn)
        };

        rows.map(move |result| {
            result
                .map(|row| convert_row(&row, &options))
                .map_err(map_error)
        })
        .boxed()
    }

    async fn begin(&mut self) -> EngineResult<()> {
        self.execute_batch("START TRANSACTION").await.map(|_| ())
    }

    async fn commit(&mut self) -> EngineResult<()> {
        self.execute_batch("COMMIT").await.map(|_| ())
    }

    async fn rollback(&mut self) -> EngineResult<()> {
        self.execute_batch("ROLLBACK").await.map(|_| ())
    }

    fn quote(&self, value: &Value, kind: ParamType) -> EngineResult<String> {
        Ok(quote_literal(value, kind))
    }

    async fn attributes(&mut self) -> EngineResult<DriverAttributes> {
        let row = sqlx::query("SELECT CAST(VERSION() AS CHAR), CAST(@@autocommit AS SIGNED)")
            .fetch_one(&mut self.conn)
            .await
            .map_err(map_error)?;

        let server_version: String = row.try_get(0).map_err(map_error)?;
        let autocommit: i64 = row.try_get(1).map_err(map_error)?;

        Ok(DriverAttributes {
            autocommit: autocommit != 0,
            error_mode: "error".to_string(),
            column_case: self.options.column_case.as_str().to_string(),
            client_version: CLIENT_VERSION.to_string(),
            connection_status: self.connection_status.clone(),
            persistent: false,
            server_version,
            timeout: self.timeout,
        })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, EngineResult<()>> {
        let conn = self.conn;
        Box::pin(async move { conn.close().await.map_err(map_error) })
    }
}

/// One-shot prepared statement: closed on the server after its single use.
fn prepared<'q>(sql: &'q str, params: &[Param]) -> Query<'q, MySql, MySqlArguments> {
    bind_params(sqlx::query(sql).persistent(false), params)
}

/// Binds positional parameters after applying their type hints.
fn bind_params<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[Param],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param.coerced() {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(b),
            Value::Int(i) => query.bind(i),
            Value::Float(f) => query.bind(f),
            Value::Text(s) => query.bind(s),
            Value::Bytes(b) => query.bind(b),
            Value::Json(j) => query.bind(sqlx::types::Json(j)),
        };
    }
    query
}

/// Maps SQLx errors to driver errors. I/O and protocol failures mean the
/// link is gone.
fn map_error(err: sqlx::Error) -> EngineError {
    match err {
        sqlx::Error::Database(db) => database_error(
            db.message(),
            db.code().map(|code| code.into_owned()),
            db.try_downcast_ref::<MySqlDatabaseError>()
                .map(MySqlDatabaseError::number),
        ),
        sqlx::Error::Io(io) => EngineError::driver(format!("{}: {}", LOST_CONNECTION, io), None),
        sqlx::Error::Protocol(msg) => {
            EngineError::driver(format!("{}: {}", LOST_CONNECTION, msg), None)
        }
        other => EngineError::driver(other.to_string(), None),
    }
}

fn database_error(message: &str, code: Option<String>, number: Option<u16>) -> EngineError {
    match number {
        Some(ER_CLIENT_INTERACTION_TIMEOUT) => {
            EngineError::driver(format!("{}: {}", LOST_CONNECTION, message), code)
        }
        _ => EngineError::driver(message.to_string(), code),
    }
}

fn convert_row(row: &MySqlRow, options: &SessionOptions) -> Row {
    let mut columns = Vec::with_capacity(row.columns().len());
    let mut values = Vec::with_capacity(row.columns().len());

    for col in row.columns() {
        columns.push(options.column_case.apply(col.name()));
        let value = extract_value(row, col.ordinal());
        values.push(match value {
            Value::Null | Value::Bytes(_) | Value::Text(_) => value,
            other if options.native_types => other,
            other => other.to_text().map(Value::Text).unwrap_or(Value::Null),
        });
    }

    Row::new(columns, values)
}

/// Extracts a value from a MySqlRow at the given index
fn extract_value(row: &MySqlRow, idx: usize) -> Value {
    // Unsigned BIGINT first; values above i64::MAX are kept exact as text
    if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
        return match v {
            Some(u) => i64::try_from(u)
                .map(Value::Int)
                .unwrap_or_else(|_| Value::Text(u.to_string())),
            None => Value::Null,
        };
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::Int).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<u32>, _>(idx) {
        return v.map(|u| Value::Int(u as i64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
        return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<u16>, _>(idx) {
        return v.map(|u| Value::Int(u as i64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i8>, _>(idx) {
        return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<u8>, _>(idx) {
        return v.map(|u| Value::Int(u as i64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(Value::Float).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v.map(|f| Value::Float(f as f64)).unwrap_or(Value::Null);
    }
    // DECIMAL keeps its exact textual form
    if let Ok(v) = row.try_get::<Option<rust_decimal::Decimal>, _>(idx) {
        return v.map(|d| Value::Text(d.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::Text).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return v
            .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v
            .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return v
            .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
        return v
            .map(|t| Value::Text(t.format("%H:%M:%S").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return v.map(Value::Json).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return match v {
            Some(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Value::Text(text),
                Err(e) => Value::Bytes(e.into_bytes()),
            },
            None => Value::Null,
        };
    }

    tracing::debug!(
        column = idx,
        type_name = row.columns()[idx].type_info().name(),
        "Unsupported MySQL column type; returning NULL"
    );
    Value::Null
}

/// Renders `value` as a MySQL string literal.
///
/// NULL renders bare. Binary values that are not valid UTF-8 render as a
/// hex literal.
pub(crate) fn quote_literal(value: &Value, kind: ParamType) -> String {
    let coerced = Param::typed(value.clone(), kind).coerced();
    match coerced {
        Value::Null => "NULL".to_string(),
        Value::Bytes(bytes) => match std::str::from_utf8(&bytes) {
            Ok(text) => escape_string(text),
            Err(_) => format!("X'{}'", hex(&bytes)),
        },
        other => escape_string(&other.to_text().unwrap_or_default()),
    }
}

fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for ch in text.chars() {
        match ch {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\x1a' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_quote_escapes_specials() {
        assert_eq!(
            quote_literal(&Value::from("it's"), ParamType::Str),
            "'it\\'s'"
        );
        assert_eq!(
            quote_literal(&Value::from("a\nb\\c\0\"\x1a"), ParamType::Str),
            "'a\\nb\\\\c\\0\\\"\\Z'"
        );
        assert_eq!(quote_literal(&Value::Null, ParamType::Str), "NULL");
        assert_eq!(quote_literal(&Value::Int(42), ParamType::Int), "'42'");
        assert_eq!(
            quote_literal(&Value::Bytes(vec![0xff, 0x00]), ParamType::Lob),
            "X'FF00'"
        );
    }

    #[test]
    fn test_connect_options_prefer_socket() {
        let params = ConnectionParameters::default().with_unix_socket("/tmp/mysql.sock");
        assert_eq!(
            MySqlConnector::connection_status(&params),
            "Localhost via UNIX socket"
        );

        let params = ConnectionParameters::default().with_host("db.internal", 3307);
        assert_eq!(
            MySqlConnector::connection_status(&params),
            "db.internal via TCP/IP"
        );
    }

    #[test]
    fn test_io_errors_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe");
        let err = map_error(sqlx::Error::Io(io));
        assert!(err.is_transient());
        assert!(err.to_string().contains(LOST_CONNECTION));

        let err = map_error(sqlx::Error::RowNotFound);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_dropped_links_are_transient() {
        let err = map_error(sqlx::Error::Protocol("unexpected end of packet".into()));
        assert!(err.is_transient());

        let err = database_error(
            "The client was disconnected by the server because of inactivity.",
            Some("HY000".to_string()),
            Some(ER_CLIENT_INTERACTION_TIMEOUT),
        );
        assert!(err.is_transient());
        assert_eq!(err.code(), Some("HY000"));

        let err = database_error("Table 'shop.t' doesn't exist", Some("42S02".into()), Some(1146));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_connect_options_keep_server_session_defaults() {
        let rendered = format!(
            "{:?}",
            MySqlConnector::connect_options(&ConnectionParameters::default())
        );
        assert!(rendered.contains("pipes_as_concat: false"), "{rendered}");
        assert!(rendered.contains("no_engine_substitution: false"), "{rendered}");
        assert!(rendered.contains("timezone: None"), "{rendered}");
        assert!(rendered.contains("statements_level: Off"), "{rendered}");
    }

    proptest! {
        #[test]
        fn quoted_literals_never_leak_bare_quotes(s in ".*") {
            let quoted = quote_literal(&Value::Text(s), ParamType::Str);
            let inner = &quoted[1..quoted.len() - 1];
            let mut escaped = false;
            for ch in inner.chars() {
                if escaped {
                    escaped = false;
                    continue;
                }
                match ch {
                    '\\' => escaped = true,
                    '\'' | '\0' | '\n' | '\r' => prop_assert!(false, "unescaped {:?}", ch),
                    _ => {}
                }
            }
            prop_assert!(!escaped);
        }
    }
}
