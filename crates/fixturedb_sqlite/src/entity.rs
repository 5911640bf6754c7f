//! Entity mapping between `serde` values and SQLite rows.
//!
//! An entity serializes to a JSON object whose field names match the
//! declared columns. Values are converted per column kind; anything else is a
//! mapping error rather than a silent coercion.

use fixturedb_provider::{Column, ColumnKind, EntityType, ProviderError, ProviderResult};
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};

/// An application type stored in its own table.
///
/// # Example
///
/// ```rust
/// use fixturedb_provider::{Column, EntityType};
/// use fixturedb_sqlite::Entity;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Note {
///     id: Option<i64>,
///     body: String,
/// }
///
/// impl Entity for Note {
///     fn entity_type() -> EntityType {
///         EntityType::entity::<Self>()
///             .column(Column::id("id"))
///             .column(Column::text("body"))
///     }
/// }
///
/// assert_eq!(Note::entity_type().storage_name().as_deref(), Some("Note"));
/// ```
pub trait Entity: Serialize + DeserializeOwned {
    /// Metadata describing the table.
    fn entity_type() -> EntityType;
}

/// Table name of `ty`, or a mapping error for embeddables.
pub(crate) fn table_of(ty: &EntityType) -> ProviderResult<String> {
    ty.storage_name()
        .ok_or_else(|| ProviderError::mapping(ty.type_name(), "type has no table"))
}

/// Serializes an entity into its JSON object form.
pub(crate) fn to_object<E: Serialize>(table: &str, entity: &E) -> ProviderResult<Map<String, Value>> {
    match serde_json::to_value(entity) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ProviderError::mapping(
            table,
            format!("entity must serialize to an object, got {other}"),
        )),
        Err(e) => Err(ProviderError::mapping(table, e.to_string())),
    }
}

/// Deserializes an entity from its JSON object form.
pub(crate) fn from_object<E: DeserializeOwned>(table: &str, map: Map<String, Value>) -> ProviderResult<E> {
    serde_json::from_value(Value::Object(map)).map_err(|e| ProviderError::mapping(table, e.to_string()))
}

/// Converts a field value to a column parameter.
pub(crate) fn to_sql(table: &str, column: &Column, value: &Value) -> ProviderResult<SqlValue> {
    let mismatch = || {
        ProviderError::mapping(
            table,
            format!("column '{}' expects {:?}, got {value}", column.name, column.kind),
        )
    };

    Ok(match (column.kind, value) {
        (_, Value::Null) => SqlValue::Null,
        (ColumnKind::Json, v) => SqlValue::Text(v.to_string()),
        (ColumnKind::Boolean, Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        (ColumnKind::Integer, Value::Number(n)) => SqlValue::Integer(n.as_i64().ok_or_else(mismatch)?),
        (ColumnKind::Real, Value::Number(n)) => SqlValue::Real(n.as_f64().ok_or_else(mismatch)?),
        (ColumnKind::Text, Value::String(s)) => SqlValue::Text(s.clone()),
        _ => return Err(mismatch()),
    })
}

/// Converts a typed column value back to JSON.
pub(crate) fn from_sql(table: &str, column: &Column, value: ValueRef<'_>) -> ProviderResult<Value> {
    let mismatch = |found: &str| {
        ProviderError::mapping(
            table,
            format!("column '{}' expects {:?}, found {found}", column.name, column.kind),
        )
    };

    Ok(match (column.kind, value) {
        (_, ValueRef::Null) => Value::Null,
        (ColumnKind::Integer, ValueRef::Integer(i)) => Value::from(i),
        (ColumnKind::Boolean, ValueRef::Integer(i)) => Value::Bool(i != 0),
        (ColumnKind::Real, ValueRef::Real(f)) => float(f),
        (ColumnKind::Real, ValueRef::Integer(i)) => float(i as f64),
        (ColumnKind::Text, ValueRef::Text(bytes)) => Value::String(utf8(table, column, bytes)?),
        (ColumnKind::Json, ValueRef::Text(bytes)) => serde_json::from_slice(bytes)
            .map_err(|e| ProviderError::mapping(table, format!("column '{}': {e}", column.name)))?,
        (_, other) => return Err(mismatch(&format!("{:?}", other.data_type()))),
    })
}

/// Converts an untyped column value to JSON, for ad-hoc queries.
pub(crate) fn untyped_from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => float(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn utf8(table: &str, column: &Column, bytes: &[u8]) -> ProviderResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ProviderError::mapping(table, format!("column '{}': {e}", column.name)))
}
