//! Item entity with a caller-assigned key.
//!
//! # Invariants
//! - `id` is assigned before the first save; the store never generates it.
//! - Saving an existing `id` overwrites the row instead of failing.

use super::schema::{expect_len, required_text, Entity, EntitySchema, FieldKind, FieldMapping, ValueKind};
use crate::repo::error::{RepoError, RepoResult};
use rusqlite::types::Value;
use uuid::Uuid;

pub static ITEM_SCHEMA: EntitySchema = EntitySchema {
    entity: "Item",
    table: "item",
    id: FieldMapping {
        property: "id",
        column: "id",
        kind: FieldKind::Scalar(ValueKind::Text),
    },
    fields: &[],
    id_generated: false,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: String,
}

impl Item {
    /// Creates an item with a fresh random key.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl Default for Item {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity for Item {
    fn schema() -> &'static EntitySchema {
        &ITEM_SCHEMA
    }

    fn id_value(&self) -> Value {
        Value::Text(self.id.clone())
    }

    fn assign_id(&mut self, id: Value) -> RepoResult<()> {
        match id {
            Value::Text(text) => {
                self.id = text;
                Ok(())
            }
            other => Err(RepoError::InvalidData(format!(
                "item key must be text, got {other:?}"
            ))),
        }
    }

    fn to_values(&self) -> RepoResult<Vec<Value>> {
        if self.id.trim().is_empty() {
            return Err(RepoError::InvalidData("item key must not be empty".to_string()));
        }
        Ok(vec![self.id_value()])
    }

    fn from_values(values: Vec<Value>) -> RepoResult<Self> {
        expect_len("item", &values, ITEM_SCHEMA.column_count())?;
        let id = required_text(values.into_iter().next().unwrap_or(Value::Null), "item.id")?;
        Ok(Self { id })
    }
}
