// SPDX-License-Identifier: Apache-2.0

//! Schema introspection against scripted catalog rows.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};

use dbkit::engine::{Connection, Connector, DriverAttributes, PhysicalConnection, SessionOptions};
use dbkit::schema::{SchemaIntrospector, TableListOptions};
use dbkit::{
    ConnectionParameters, EngineError, EngineResult, Param, ParamType, Row, StatementResult, Value,
};

#[derive(Default)]
struct Catalog {
    schemata: Vec<Row>,
    tables: Vec<Row>,
    columns: Vec<Row>,
    /// Bound parameters seen per query
    bound: Vec<Vec<Param>>,
    fail_columns: bool,
}

type Shared = Arc<Mutex<Catalog>>;

struct CatalogConnector(Shared);

#[async_trait]
impl Connector for CatalogConnector {
    fn driver_id(&self) -> &'static str {
        "catalog"
    }

    fn driver_name(&self) -> &'static str {
        "Catalog mock"
    }

    async fn open(
        &self,
        _params: &ConnectionParameters,
        _options: &SessionOptions,
    ) -> EngineResult<Box<dyn PhysicalConnection>> {
        Ok(Box::new(CatalogHandle(Arc::clone(&self.0))))
    }
}

struct CatalogHandle(Shared);

impl CatalogHandle {
    fn query(&self, sql: &str, params: &[Param]) -> EngineResult<Vec<Row>> {
        let mut catalog = self.0.lock().unwrap();
        catalog.bound.push(params.to_vec());

        if sql.contains("`SCHEMATA`") {
            Ok(catalog.schemata.clone())
        } else if sql.contains("`TABLES`") {
            Ok(catalog.tables.clone())
        } else if sql.contains("`COLUMNS`") {
            if catalog.fail_columns {
                return Err(EngineError::driver("SELECT command denied", Some("42000".into())));
            }
            Ok(catalog.columns.clone())
        } else {
            Ok(Vec::new())
        }
    }
}

#[async_trait]
impl PhysicalConnection for CatalogHandle {
    async fn execute_batch(&mut self, _sql: &str) -> EngineResult<u64> {
        Ok(0)
    }

    async fn execute(&mut self, _sql: &str, _params: &[Param]) -> EngineResult<StatementResult> {
        Ok(StatementResult::default())
    }

    async fn fetch_optional(&mut self, sql: &str, params: &[Param]) -> EngineResult<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Param]) -> EngineResult<Vec<Row>> {
        self.query(sql, params)
    }

    fn fetch_stream<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [Param],
    ) -> BoxStream<'a, EngineResult<Row>> {
        let items: Vec<EngineResult<Row>> = match self.query(sql, params) {
            Ok(rows) => rows.into_iter().map(Ok).collect(),
            Err(err) => vec![Err(err)],
        };
        stream::iter(items).boxed()
    }

    async fn begin(&mut self) -> EngineResult<()> {
        Ok(())
    }

    async fn commit(&mut self) -> EngineResult<()> {
        Ok(())
    }

    async fn rollback(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn quote(&self, _value: &Value, _kind: ParamType) -> EngineResult<String> {
        Err(EngineError::not_implemented("quote"))
    }

    async fn attributes(&mut self) -> EngineResult<DriverAttributes> {
        Err(EngineError::not_implemented("attributes"))
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, EngineResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

fn schema_row(name: &str) -> Row {
    Row::from_pairs([
        ("SCHEMA_NAME", Value::from(name)),
        ("DEFAULT_CHARACTER_SET_NAME", Value::from("utf8mb4")),
        ("DEFAULT_COLLATION_NAME", Value::from("utf8mb4_general_ci")),
    ])
}

fn table_row(name: &str, rows: i64, auto_increment: Option<i64>) -> Row {
    Row::from_pairs([
        ("TABLE_NAME", Value::from(name)),
        ("ENGINE", Value::from("InnoDB")),
        ("ROW_FORMAT", Value::from("Dynamic")),
        ("TABLE_ROWS", Value::Int(rows)),
        ("AUTO_INCREMENT", Value::from(auto_increment)),
        ("TABLE_COLLATION", Value::from("utf8mb4_general_ci")),
        ("TABLE_COMMENT", Value::from("")),
    ])
}

fn column_row(table: &str, name: &str, position: i64, key: &str, nullable: bool) -> Row {
    Row::from_pairs([
        ("TABLE_NAME", Value::from(table)),
        ("COLUMN_NAME", Value::from(name)),
        ("ORDINAL_POSITION", Value::Int(position)),
        ("COLUMN_DEFAULT", Value::Null),
        ("IS_NULLABLE", Value::from(if nullable { "YES" } else { "NO" })),
        ("DATA_TYPE", Value::from("int")),
        ("CHARACTER_SET_NAME", Value::Null),
        ("COLLATION_NAME", Value::Null),
        ("COLUMN_TYPE", Value::from("int(10) unsigned")),
        ("COLUMN_KEY", Value::from(key)),
        ("EXTRA", Value::from(if key == "PRI" { "auto_increment" } else { "" })),
        ("COLUMN_COMMENT", Value::from("")),
    ])
}

fn setup(catalog: Catalog) -> (Connection, Shared) {
    let state = Arc::new(Mutex::new(catalog));
    let connector = Arc::new(CatalogConnector(Arc::clone(&state)));
    (
        Connection::with_connector(ConnectionParameters::default(), connector),
        state,
    )
}

fn shop_catalog() -> Catalog {
    Catalog {
        tables: vec![
            table_row("t_order_item", 120, None),
            table_row("users", 3, Some(4)),
        ],
        columns: vec![
            column_row("ghost", "id", 1, "PRI", false),
            column_row("t_order_item", "order_id", 1, "MUL", false),
            column_row("t_order_item", "sku", 2, "", true),
            column_row("users", "id", 1, "PRI", false),
            column_row("users", "email", 2, "UNI", true),
        ],
        ..Catalog::default()
    }
}

#[tokio::test]
async fn list_databases_hides_system_schemas() {
    let catalog = Catalog {
        schemata: ["information_schema", "mysql", "performance_schema", "shop", "sys", "wiki"]
            .into_iter()
            .map(schema_row)
            .collect(),
        ..Catalog::default()
    };
    let (mut conn, _state) = setup(catalog);

    let databases = SchemaIntrospector::new(&mut conn).list_databases().await.unwrap();

    let names: Vec<&str> = databases.iter().map(|db| db.name.as_str()).collect();
    assert_eq!(names, vec!["shop", "wiki"]);
    assert_eq!(databases[0].default_character_set, "utf8mb4");
    assert_eq!(databases[0].default_collation, "utf8mb4_general_ci");
}

#[tokio::test]
async fn list_tables_assembles_columns_and_primary_keys() {
    let (mut conn, state) = setup(shop_catalog());

    let tables = SchemaIntrospector::new(&mut conn)
        .list_tables("shop", TableListOptions::default())
        .await
        .unwrap();

    let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["t_order_item", "users"]);

    let users = &tables[1];
    assert_eq!(users.primary_key_name.as_deref(), Some("id"));
    assert_eq!(users.table_rows, Some(3));
    assert_eq!(users.auto_increment, Some(4));
    assert_eq!(users.engine.as_deref(), Some("InnoDB"));
    assert_eq!(users.camel_name, "users");
    assert_eq!(users.pascal_name, "Users");

    let positions: Vec<u32> = users.columns.iter().map(|c| c.ordinal_position).collect();
    assert_eq!(positions, vec![1, 2]);
    assert!(users.columns[0].is_primary);
    assert!(!users.columns[0].nullable);
    assert!(users.columns[1].nullable);
    assert_eq!(users.columns[1].column_key, "UNI");
    assert_eq!(users.columns[0].extra, "auto_increment");

    let items = &tables[0];
    assert_eq!(items.primary_key_name, None);
    assert_eq!(items.auto_increment, None);
    assert_eq!(items.columns.len(), 2);
    assert_eq!(items.camel_name, "tOrderItem");
    assert_eq!(items.pascal_name, "TOrderItem");

    // Orphan "ghost" columns were dropped; the schema name was bound, not inlined
    let catalog = state.lock().unwrap();
    assert_eq!(catalog.bound.len(), 2);
    for params in &catalog.bound {
        assert_eq!(params, &vec![Param::new("shop")]);
    }
}

#[tokio::test]
async fn ignore_first_underline_strips_prefix_from_pascal_name() {
    let (mut conn, _state) = setup(shop_catalog());

    let tables = SchemaIntrospector::new(&mut conn)
        .list_tables(
            "shop",
            TableListOptions {
                ignore_first_underline: true,
            },
        )
        .await
        .unwrap();

    assert_eq!(tables[0].pascal_name, "OrderItem");
    assert_eq!(tables[0].camel_name, "tOrderItem");
    assert_eq!(tables[1].pascal_name, "Users");
}

#[tokio::test]
async fn empty_database_yields_no_tables() {
    let (mut conn, _state) = setup(Catalog::default());

    let tables = SchemaIntrospector::new(&mut conn)
        .list_tables("empty", TableListOptions::default())
        .await
        .unwrap();

    assert!(tables.is_empty());
}

#[tokio::test]
async fn catalog_failures_propagate() {
    let mut catalog = shop_catalog();
    catalog.fail_columns = true;
    let (mut conn, _state) = setup(catalog);

    let err = SchemaIntrospector::new(&mut conn)
        .list_tables("shop", TableListOptions::default())
        .await
        .unwrap_err();

    match err {
        EngineError::Sql { code, sql, .. } => {
            assert_eq!(code.as_deref(), Some("42000"));
            assert!(sql.contains("information_schema"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn snapshots_serialize_to_json() {
    let (mut conn, _state) = setup(shop_catalog());

    let tables = SchemaIntrospector::new(&mut conn)
        .list_tables("shop", TableListOptions::default())
        .await
        .unwrap();

    let json = serde_json::to_value(&tables).unwrap();
    assert_eq!(json[1]["name"], "users");
    assert_eq!(json[1]["primary_key_name"], "id");
    assert_eq!(json[1]["columns"][0]["name"], "id");
    assert_eq!(json[1]["columns"][0]["is_primary"], true);
}
