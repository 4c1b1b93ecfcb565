//! Static entity-to-table mapping metadata.
//!
//! # Responsibility
//! - Describe how entity properties map to table columns.
//! - Convert between entity structs and ordered column values.
//!
//! # Invariants
//! - Column values are always ordered as `[id, fields...]`.
//! - Reference fields store the target's primary key in their column.

use crate::repo::error::{ConfigError, RepoError, RepoResult};
use rusqlite::types::Value;

/// Storage type of a scalar property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Real,
    Text,
    Boolean,
}

/// Property category.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Scalar(ValueKind),
    /// Many-to-one reference; the column holds the target key.
    Reference { target: fn() -> &'static EntitySchema },
}

/// One property → column mapping.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub property: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

impl FieldMapping {
    pub fn is_reference(&self) -> bool {
        matches!(self.kind, FieldKind::Reference { .. })
    }

    pub fn value_kind(&self) -> Option<ValueKind> {
        match self.kind {
            FieldKind::Scalar(kind) => Some(kind),
            FieldKind::Reference { .. } => None,
        }
    }

    pub fn reference_target(&self) -> Option<&'static EntitySchema> {
        match self.kind {
            FieldKind::Reference { target } => Some(target()),
            FieldKind::Scalar(_) => None,
        }
    }
}

/// Table mapping for one entity type.
#[derive(Debug)]
pub struct EntitySchema {
    /// Entity name used in diagnostics.
    pub entity: &'static str,
    pub table: &'static str,
    pub id: FieldMapping,
    /// Non-id properties in column order.
    pub fields: &'static [FieldMapping],
    /// Whether the store assigns the key on insert.
    pub id_generated: bool,
}

impl EntitySchema {
    /// Number of mapped columns including the id.
    pub fn column_count(&self) -> usize {
        self.fields.len() + 1
    }

    /// All mappings in value order (`id` first).
    pub fn mappings(&self) -> impl Iterator<Item = &FieldMapping> {
        std::iter::once(&self.id).chain(self.fields.iter())
    }

    /// Looks up a property and its value index.
    pub fn property(&self, property: &str) -> Option<(usize, &FieldMapping)> {
        self.mappings()
            .enumerate()
            .find(|(_, mapping)| mapping.property == property)
    }

    /// Like [`EntitySchema::property`] but reports unknown names as configuration errors.
    pub fn require_property(&self, property: &str) -> Result<(usize, &FieldMapping), ConfigError> {
        self.property(property)
            .ok_or_else(|| ConfigError::UnknownProperty {
                entity: self.entity,
                property: property.to_string(),
            })
    }

    /// Comma-separated, alias-qualified column list in value order.
    pub fn select_list(&self, alias: &str) -> String {
        self.mappings()
            .map(|mapping| format!("{alias}.{}", mapping.column))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A type persisted through an [`EntitySchema`].
pub trait Entity: Sized {
    fn schema() -> &'static EntitySchema;

    /// Primary key, or `Value::Null` when not yet assigned.
    fn id_value(&self) -> Value;

    /// Stores a key assigned by the store.
    fn assign_id(&mut self, id: Value) -> RepoResult<()>;

    /// Column values in schema order.
    fn to_values(&self) -> RepoResult<Vec<Value>>;

    /// Builds an entity from column values in schema order.
    fn from_values(values: Vec<Value>) -> RepoResult<Self>;

    /// Replaces an unloaded reference with the loaded target row.
    fn attach_reference(&mut self, property: &str, _values: Vec<Value>) -> RepoResult<()> {
        Err(RepoError::Mapping(format!(
            "entity `{}` has no reference `{property}`",
            Self::schema().entity
        )))
    }
}

/// Many-to-one relation state. Loading never happens implicitly.
#[derive(Debug, Clone)]
pub enum Relation<T> {
    Absent,
    /// Key known, target row not loaded.
    Unloaded(Value),
    Loaded(Box<T>),
}

impl<T> Default for Relation<T> {
    fn default() -> Self {
        Self::Absent
    }
}

impl<T: Entity> Relation<T> {
    pub fn from_key(key: Value) -> Self {
        match key {
            Value::Null => Self::Absent,
            other => Self::Unloaded(other),
        }
    }

    /// Referenced key, `Value::Null` when absent or transient.
    pub fn key(&self) -> Value {
        match self {
            Self::Absent => Value::Null,
            Self::Unloaded(key) => key.clone(),
            Self::Loaded(target) => target.id_value(),
        }
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Loaded(target) => Some(target),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl<T: Entity> PartialEq for Relation<T> {
    fn eq(&self, other: &Self) -> bool {
        self.is_absent() == other.is_absent() && self.key() == other.key()
    }
}

pub(crate) fn expect_len(entity: &str, values: &[Value], expected: usize) -> RepoResult<()> {
    if values.len() != expected {
        return Err(RepoError::InvalidData(format!(
            "{entity} row has {} columns, expected {expected}",
            values.len()
        )));
    }
    Ok(())
}

pub(crate) fn optional_i64(value: &Value, column: &str) -> RepoResult<Option<i64>> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(number) => Ok(Some(*number)),
        other => Err(RepoError::InvalidData(format!(
            "expected integer in `{column}`, got {other:?}"
        ))),
    }
}

pub(crate) fn required_i64(value: &Value, column: &str) -> RepoResult<i64> {
    optional_i64(value, column)?
        .ok_or_else(|| RepoError::InvalidData(format!("`{column}` must not be null")))
}

pub(crate) fn required_text(value: Value, column: &str) -> RepoResult<String> {
    match value {
        Value::Text(text) => Ok(text),
        other => Err(RepoError::InvalidData(format!(
            "expected text in `{column}`, got {other:?}"
        ))),
    }
}

pub(crate) fn key_or_null(id: Option<i64>) -> Value {
    id.map_or(Value::Null, Value::Integer)
}
