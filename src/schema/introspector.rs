// SPDX-License-Identifier: Apache-2.0

//! Catalog introspection
//!
//! Reads `information_schema` through a [`Connection`] and assembles
//! [`SchemaDatabase`] / [`SchemaTable`] snapshots.

use std::collections::HashMap;

use tracing::debug;

use super::types::{SchemaColumn, SchemaDatabase, SchemaTable, TableListOptions};
use crate::engine::Connection;
use dbkit_core::{EngineResult, Param, Row};

/// Server-internal databases never listed.
pub const SYSTEM_DATABASES: &[&str] = &["information_schema", "mysql", "performance_schema", "sys"];

const DATABASES_SQL: &str = r#"
    SELECT SCHEMA_NAME, DEFAULT_CHARACTER_SET_NAME, DEFAULT_COLLATION_NAME
    FROM `information_schema`.`SCHEMATA`
    ORDER BY `SCHEMA_NAME` ASC
"#;

const TABLES_SQL: &str = r#"
    SELECT TABLE_NAME, ENGINE, ROW_FORMAT, TABLE_ROWS, AUTO_INCREMENT,
           TABLE_COLLATION, TABLE_COMMENT
    FROM `information_schema`.`TABLES`
    WHERE TABLE_SCHEMA = ?
    ORDER BY `TABLE_NAME` ASC
"#;

const COLUMNS_SQL: &str = r#"
    SELECT TABLE_NAME, COLUMN_NAME, ORDINAL_POSITION, COLUMN_DEFAULT, IS_NULLABLE,
           DATA_TYPE, CHARACTER_SET_NAME, COLLATION_NAME, COLUMN_TYPE, COLUMN_KEY,
           EXTRA, COLUMN_COMMENT
    FROM `information_schema`.`COLUMNS`
    WHERE TABLE_SCHEMA = ?
    ORDER BY `TABLE_NAME` ASC, `ORDINAL_POSITION` ASC
"#;

/// Read-only catalog reader borrowing a connection.
pub struct SchemaIntrospector<'c> {
    conn: &'c mut Connection,
}

impl<'c> SchemaIntrospector<'c> {
    pub fn new(conn: &'c mut Connection) -> Self {
        Self { conn }
    }

    /// User databases, ordered by name.
    pub async fn list_databases(&mut self) -> EngineResult<Vec<SchemaDatabase>> {
        let rows = self.conn.fetch_all(DATABASES_SQL, &[]).await?;

        Ok(rows
            .iter()
            .map(|row| SchemaDatabase {
                name: row.text("SCHEMA_NAME"),
                default_character_set: row.text("DEFAULT_CHARACTER_SET_NAME"),
                default_collation: row.text("DEFAULT_COLLATION_NAME"),
            })
            .filter(|db| !SYSTEM_DATABASES.contains(&db.name.as_str()))
            .collect())
    }

    /// Tables of `database` ordered by name, each with its columns in
    /// ordinal order.
    pub async fn list_tables(
        &mut self,
        database: &str,
        options: TableListOptions,
    ) -> EngineResult<Vec<SchemaTable>> {
        let schema = [Param::new(database)];

        let table_rows = self.conn.fetch_all(TABLES_SQL, &schema).await?;
        let mut tables: Vec<SchemaTable> = Vec::with_capacity(table_rows.len());
        let mut by_name: HashMap<String, usize> = HashMap::with_capacity(table_rows.len());

        for row in &table_rows {
            let table = table_from_row(row, options);
            by_name.insert(table.name.clone(), tables.len());
            tables.push(table);
        }

        let column_rows = self.conn.fetch_all(COLUMNS_SQL, &schema).await?;
        let mut orphans = 0usize;

        for row in &column_rows {
            match by_name.get(row.text("TABLE_NAME").as_str()) {
                Some(&idx) => tables[idx].add_column(column_from_row(row)),
                None => orphans += 1,
            }
        }

        if orphans > 0 {
            debug!(
                database,
                orphans, "Dropped columns of tables missing from the table listing"
            );
        }

        Ok(tables)
    }
}

fn table_from_row(row: &Row, options: TableListOptions) -> SchemaTable {
    let mut table = SchemaTable::new(row.text("TABLE_NAME"), options);
    table.engine = row.opt_text("ENGINE");
    table.row_format = row.opt_text("ROW_FORMAT");
    table.table_rows = row.u64("TABLE_ROWS");
    table.auto_increment = row.u64("AUTO_INCREMENT");
    table.collation = row.opt_text("TABLE_COLLATION");
    table.comment = row.text("TABLE_COMMENT");
    table
}

fn column_from_row(row: &Row) -> SchemaColumn {
    let column_key = row.text("COLUMN_KEY");
    SchemaColumn {
        ordinal_position: row
            .u64("ORDINAL_POSITION")
            .and_then(|p| u32::try_from(p).ok())
            .unwrap_or_default(),
        name: row.text("COLUMN_NAME"),
        default_value: row.opt_text("COLUMN_DEFAULT"),
        nullable: row.text("IS_NULLABLE").eq_ignore_ascii_case("YES"),
        data_type: row.text("DATA_TYPE"),
        character_set: row.opt_text("CHARACTER_SET_NAME"),
        collation: row.opt_text("COLLATION_NAME"),
        column_type: row.text("COLUMN_TYPE"),
        is_primary: column_key == "PRI",
        column_key,
        extra: row.text("EXTRA"),
        comment: row.text("COLUMN_COMMENT"),
    }
}
