//! Team entity.

use super::schema::{
    expect_len, key_or_null, optional_i64, required_text, Entity, EntitySchema, FieldKind,
    FieldMapping, ValueKind,
};
use crate::repo::error::RepoResult;
use rusqlite::types::Value;

pub static TEAM_SCHEMA: EntitySchema = EntitySchema {
    entity: "Team",
    table: "team",
    id: FieldMapping {
        property: "id",
        column: "team_id",
        kind: FieldKind::Scalar(ValueKind::Integer),
    },
    fields: &[FieldMapping {
        property: "name",
        column: "name",
        kind: FieldKind::Scalar(ValueKind::Text),
    }],
    id_generated: true,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    /// Assigned by the store on first save.
    pub id: Option<i64>,
    pub name: String,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

impl Entity for Team {
    fn schema() -> &'static EntitySchema {
        &TEAM_SCHEMA
    }

    fn id_value(&self) -> Value {
        key_or_null(self.id)
    }

    fn assign_id(&mut self, id: Value) -> RepoResult<()> {
        self.id = optional_i64(&id, "team.team_id")?;
        Ok(())
    }

    fn to_values(&self) -> RepoResult<Vec<Value>> {
        Ok(vec![self.id_value(), Value::Text(self.name.clone())])
    }

    fn from_values(values: Vec<Value>) -> RepoResult<Self> {
        expect_len("team", &values, TEAM_SCHEMA.column_count())?;
        let mut values = values.into_iter();
        let id = optional_i64(&values.next().unwrap_or(Value::Null), "team.team_id")?;
        let name = required_text(values.next().unwrap_or(Value::Null), "team.name")?;
        Ok(Self { id, name })
    }
}
