//! Result-row mapping for projections and scalar columns.

use super::session::ResultTable;
use crate::query::sql::snake_to_camel;
use crate::repo::error::{RepoError, RepoResult};
use rusqlite::types::{FromSql, Value, ValueRef};
use serde::de::DeserializeOwned;
use serde_json::{Map, Number};

/// Flat result shape populated from a subset of columns.
///
/// A column feeds a field when its label equals a declared field name, or
/// equals it after snake_case → camelCase conversion. Other columns are
/// ignored; missing `Option` fields deserialize as `None`.
pub trait Projection: DeserializeOwned {
    /// Property names the projection reads, in camelCase.
    const FIELDS: &'static [&'static str];
}

pub(crate) fn map_projections<P: Projection>(table: ResultTable) -> RepoResult<Vec<P>> {
    let fields: Vec<Option<&'static str>> = table
        .columns
        .iter()
        .map(|column| field_for::<P>(column))
        .collect();

    table
        .rows
        .into_iter()
        .map(|row| {
            let mut object = Map::new();
            for (field, value) in fields.iter().zip(row) {
                if let Some(field) = field {
                    object.insert((*field).to_string(), to_json(value));
                }
            }
            serde_json::from_value(serde_json::Value::Object(object))
                .map_err(|err| RepoError::Mapping(err.to_string()))
        })
        .collect()
}

/// First column of every row, converted to `V`.
pub(crate) fn map_scalars<V: FromSql>(table: ResultTable) -> RepoResult<Vec<V>> {
    table
        .rows
        .into_iter()
        .map(|row| {
            let value = row.into_iter().next().unwrap_or(Value::Null);
            V::column_result(ValueRef::from(&value))
                .map_err(|err| RepoError::Mapping(err.to_string()))
        })
        .collect()
}

pub(crate) fn single_integer(table: &ResultTable) -> RepoResult<i64> {
    match table.rows.first().and_then(|row| row.first()) {
        Some(Value::Integer(number)) => Ok(*number),
        other => Err(RepoError::Mapping(format!(
            "expected one integer, got {other:?}"
        ))),
    }
}

fn field_for<P: Projection>(column: &str) -> Option<&'static str> {
    let camel = snake_to_camel(column);
    P::FIELDS
        .iter()
        .copied()
        .find(|field| *field == column)
        .or_else(|| P::FIELDS.iter().copied().find(|field| *field == camel))
}

fn to_json(value: Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(number) => serde_json::Value::Number(number.into()),
        Value::Real(number) => Number::from_f64(number)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Text(text) => serde_json::Value::String(text),
        Value::Blob(bytes) => {
            serde_json::Value::Array(bytes.into_iter().map(serde_json::Value::from).collect())
        }
    }
}
