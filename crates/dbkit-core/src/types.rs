// SPDX-License-Identifier: Apache-2.0

//! Value model shared by the connection layer and the drivers
//!
//! Rows are associative: every value is addressable by its column name, in
//! the natural casing reported by the server.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{EngineError, EngineResult};

/// Universal value representation
///
/// Serialize-only: bytes render as base64 text, which untagged JSON cannot
/// tell apart from [`Value::Text`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(#[serde(serialize_with = "base64_bytes::serialize")] Vec<u8>),
    Json(serde_json::Value),
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::Serializer;

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of the value. Text is parsed; floats are truncated.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Float(f) => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Text(s) => s.trim().parse().ok(),
            other => other.as_i64().and_then(|i| u64::try_from(i).ok()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text rendering used when native typing is disabled and for logging.
    /// Returns `None` for SQL NULL.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Value::Json(j) => Some(j.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A single associative row.
///
/// Column order follows the result set; lookups by name return the first
/// column with that name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Builds a row from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (columns, values) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a column by name. An exact match wins; otherwise the first
    /// ASCII case-insensitive match is used.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(column)))
            .and_then(|idx| self.values.get(idx))
    }

    pub fn get_index(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Text of a column, with NULL and missing columns mapped to `""`.
    pub fn text(&self, column: &str) -> String {
        self.get(column)
            .and_then(Value::to_text)
            .unwrap_or_default()
    }

    /// Nullable text of a column.
    pub fn opt_text(&self, column: &str) -> Option<String> {
        self.get(column).and_then(Value::to_text)
    }

    pub fn u64(&self, column: &str) -> Option<u64> {
        self.get(column).and_then(Value::as_u64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl Serialize for Row {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Explicit type hint for a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Null,
    Bool,
    Int,
    Str,
    Lob,
}

/// A positional statement parameter: a bare value or a `(value, type)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ParamType>,
}

impl Param {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            kind: None,
        }
    }

    pub fn typed(value: impl Into<Value>, kind: ParamType) -> Self {
        Self {
            value: value.into(),
            kind: Some(kind),
        }
    }

    /// The value to bind after applying the explicit type hint.
    ///
    /// Values that cannot be converted to the hinted type are bound as-is.
    pub fn coerced(&self) -> Value {
        let Some(kind) = self.kind else {
            return self.value.clone();
        };

        match (kind, &self.value) {
            (ParamType::Null, _) => Value::Null,
            (_, Value::Null) => Value::Null,
            (ParamType::Int, value) => value
                .as_i64()
                .map(Value::Int)
                .unwrap_or_else(|| value.clone()),
            (ParamType::Bool, Value::Text(s)) => {
                Value::Bool(!matches!(s.trim(), "" | "0"))
            }
            (ParamType::Bool, value) => value
                .as_i64()
                .map(|i| Value::Bool(i != 0))
                .unwrap_or_else(|| value.clone()),
            (ParamType::Str, Value::Text(_)) => self.value.clone(),
            (ParamType::Str, value) => value.to_text().map(Value::Text).unwrap_or(Value::Null),
            (ParamType::Lob, Value::Bytes(_)) => self.value.clone(),
            (ParamType::Lob, value) => value
                .to_text()
                .map(|s| Value::Bytes(s.into_bytes()))
                .unwrap_or(Value::Null),
        }
    }
}

/// Builds a positional parameter list: `params![1, "a", (2, ParamType::Str)]`.
#[macro_export]
macro_rules! params {
    () => { ::std::vec::Vec::<$crate::Param>::new() };
    ($($p:expr),+ $(,)?) => { ::std::vec![$($crate::IntoParam::into_param($p)),+] };
}

/// Conversion used by [`params!`] so that `(value, ParamType)` tuples bind
/// with an explicit type and anything else binds bare.
pub trait IntoParam {
    fn into_param(self) -> Param;
}

impl IntoParam for Param {
    fn into_param(self) -> Param {
        self
    }
}

macro_rules! impl_into_param {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl IntoParam for $ty {
                fn into_param(self) -> Param {
                    Param::new(self)
                }
            }

            impl IntoParam for ($ty, ParamType) {
                fn into_param(self) -> Param {
                    Param::typed(self.0, self.1)
                }
            }
        )+
    };
}

impl_into_param!(Value, i64, i32, u32, f64, bool, &str, String, Vec<u8>);

/// How the raw result of a prepared statement is projected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultMode {
    /// Last inserted identifier
    Insert,
    /// Affected-row count
    Update,
    /// Affected-row count
    Delete,
    /// First row, if any
    Fetch,
    /// Every row
    FetchAll,
    /// First column of the first row
    Scalar,
}

impl ResultMode {
    /// Stable numeric code of the mode.
    pub fn code(self) -> i32 {
        match self {
            ResultMode::Insert => 1,
            ResultMode::Update => 2,
            ResultMode::Delete => 3,
            ResultMode::Fetch => 11,
            ResultMode::FetchAll => 12,
            ResultMode::Scalar => 13,
        }
    }

    pub fn returns_rows(self) -> bool {
        matches!(
            self,
            ResultMode::Fetch | ResultMode::FetchAll | ResultMode::Scalar
        )
    }
}

impl TryFrom<i32> for ResultMode {
    type Error = EngineError;

    fn try_from(code: i32) -> EngineResult<Self> {
        match code {
            1 => Ok(ResultMode::Insert),
            2 => Ok(ResultMode::Update),
            3 => Ok(ResultMode::Delete),
            11 => Ok(ResultMode::Fetch),
            12 => Ok(ResultMode::FetchAll),
            13 => Ok(ResultMode::Scalar),
            other => Err(EngineError::not_implemented(format!(
                "invalid result mode code {}",
                other
            ))),
        }
    }
}

/// Projection of an executed statement, shaped by its [`ResultMode`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExecOutcome {
    LastInsertId(u64),
    Affected(u64),
    Row(Option<Row>),
    Rows(Vec<Row>),
    Scalar(Value),
}

/// Raw outcome of a statement that does not return rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatementResult {
    pub rows_affected: u64,
    pub last_insert_id: u64,
}

/// One statement or an ordered batch of statements for `exec`.
///
/// Empty entries of a batch are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statements<'a>(Vec<&'a str>);

impl<'a> Statements<'a> {
    pub fn iter(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn batch<I: IntoIterator<Item = &'a str>>(items: I) -> Self {
        Self(items.into_iter().filter(|s| !s.trim().is_empty()).collect())
    }
}

impl<'a> From<&'a str> for Statements<'a> {
    fn from(sql: &'a str) -> Self {
        Self(vec![sql])
    }
}

impl<'a> From<&'a String> for Statements<'a> {
    fn from(sql: &'a String) -> Self {
        Self(vec![sql.as_str()])
    }
}

impl<'a> From<&'a [&'a str]> for Statements<'a> {
    fn from(items: &'a [&'a str]) -> Self {
        Self::batch(items.iter().copied())
    }
}

impl<'a, const N: usize> From<&'a [&'a str; N]> for Statements<'a> {
    fn from(items: &'a [&'a str; N]) -> Self {
        Self::batch(items.iter().copied())
    }
}

impl<'a> From<&'a [String]> for Statements<'a> {
    fn from(items: &'a [String]) -> Self {
        Self::batch(items.iter().map(String::as_str))
    }
}

impl<'a> From<&'a Vec<String>> for Statements<'a> {
    fn from(items: &'a Vec<String>) -> Self {
        Self::batch(items.iter().map(String::as_str))
    }
}
