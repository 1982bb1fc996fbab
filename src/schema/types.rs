// SPDX-License-Identifier: Apache-2.0

//! Schema snapshot records
//!
//! Built once per introspection call; nothing updates them afterwards.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Options for [`SchemaIntrospector::list_tables`](super::SchemaIntrospector::list_tables)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableListOptions {
    /// Drop a leading `word_` prefix before building the Pascal-case name
    /// (`t_user_log` → `UserLog`).
    pub ignore_first_underline: bool,
}

/// A user database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDatabase {
    pub name: String,
    pub default_character_set: String,
    pub default_collation: String,
}

/// A table (or view) with its columns in ordinal order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaTable {
    pub name: String,
    pub engine: Option<String>,
    pub row_format: Option<String>,
    /// Server estimate; not an exact count for InnoDB
    pub table_rows: Option<u64>,
    pub auto_increment: Option<u64>,
    pub collation: Option<String>,
    pub comment: String,
    pub camel_name: String,
    pub pascal_name: String,
    /// Name of the primary-key column; the last one seen for composite keys
    pub primary_key_name: Option<String>,
    pub columns: Vec<SchemaColumn>,
}

impl SchemaTable {
    /// Creates a table without columns; the casing variants are derived from
    /// `name`.
    pub fn new(name: impl Into<String>, options: TableListOptions) -> Self {
        let name = name.into();
        let camel_name = to_camel_case(&name, false);
        let pascal_name = if options.ignore_first_underline {
            to_camel_case(&strip_first_word(&name), true)
        } else {
            to_camel_case(&name, true)
        };

        Self {
            name,
            engine: None,
            row_format: None,
            table_rows: None,
            auto_increment: None,
            collation: None,
            comment: String::new(),
            camel_name,
            pascal_name,
            primary_key_name: None,
            columns: Vec::new(),
        }
    }

    /// Appends a column; a primary column also names the table's key.
    pub(crate) fn add_column(&mut self, column: SchemaColumn) {
        if column.is_primary {
            self.primary_key_name = Some(column.name.clone());
        }
        self.columns.push(column);
    }

    pub fn column(&self, name: &str) -> Option<&SchemaColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A column of a [`SchemaTable`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub ordinal_position: u32,
    pub name: String,
    pub default_value: Option<String>,
    pub nullable: bool,
    pub data_type: String,
    pub character_set: Option<String>,
    pub collation: Option<String>,
    /// Full type, e.g. `int(10) unsigned`
    pub column_type: String,
    /// `PRI`, `UNI`, `MUL` or empty
    pub column_key: String,
    pub extra: String,
    pub comment: String,
    pub is_primary: bool,
}

fn word_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[_-]([a-z])").expect("valid separator regex"))
}

fn first_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^[a-z]+_").expect("valid prefix regex"))
}

/// `user_log` → `userLog` (or `UserLog` with `first_upper`).
///
/// Only a separator followed by a lowercase ASCII letter is collapsed;
/// `a__b` keeps one underscore and `a_1` is unchanged.
pub fn to_camel_case(name: &str, first_upper: bool) -> String {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };

    let mut head = String::with_capacity(name.len());
    if first_upper {
        head.extend(first.to_uppercase());
    } else {
        head.extend(first.to_lowercase());
    }
    head.push_str(chars.as_str());

    word_separator()
        .replace_all(&head, |caps: &Captures| caps[1].to_ascii_uppercase())
        .into_owned()
}

fn strip_first_word(name: &str) -> String {
    first_word().replace(name, "").into_owned()
}
