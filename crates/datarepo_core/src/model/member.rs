//! Member entity and its many-to-one team reference.
//!
//! # Invariants
//! - `team` is never loaded implicitly; see `Session::load_references`.
//! - Equality compares the team by key only, loaded or not.

use super::schema::{
    expect_len, key_or_null, optional_i64, required_i64, required_text, Entity, EntitySchema,
    FieldKind, FieldMapping, Relation, ValueKind,
};
use super::team::{Team, TEAM_SCHEMA};
use crate::repo::error::{RepoError, RepoResult};
use rusqlite::types::Value;

fn team_schema() -> &'static EntitySchema {
    &TEAM_SCHEMA
}

pub static MEMBER_SCHEMA: EntitySchema = EntitySchema {
    entity: "Member",
    table: "member",
    id: FieldMapping {
        property: "id",
        column: "member_id",
        kind: FieldKind::Scalar(ValueKind::Integer),
    },
    fields: &[
        FieldMapping {
            property: "username",
            column: "username",
            kind: FieldKind::Scalar(ValueKind::Text),
        },
        FieldMapping {
            property: "age",
            column: "age",
            kind: FieldKind::Scalar(ValueKind::Integer),
        },
        FieldMapping {
            property: "team",
            column: "team_id",
            kind: FieldKind::Reference {
                target: team_schema,
            },
        },
    ],
    id_generated: true,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    /// Assigned by the store on first save.
    pub id: Option<i64>,
    pub username: String,
    pub age: i32,
    pub team: Relation<Team>,
}

impl Member {
    pub fn new(username: impl Into<String>) -> Self {
        Self::with_age(username, 0)
    }

    pub fn with_age(username: impl Into<String>, age: i32) -> Self {
        Self {
            id: None,
            username: username.into(),
            age,
            team: Relation::Absent,
        }
    }

    pub fn with_team(username: impl Into<String>, age: i32, team: &Team) -> Self {
        let mut member = Self::with_age(username, age);
        member.change_team(team);
        member
    }

    /// Points this member at `team`.
    pub fn change_team(&mut self, team: &Team) {
        self.team = Relation::Loaded(Box::new(team.clone()));
    }

    /// Loaded team, `None` when absent or not fetched.
    pub fn team(&self) -> Option<&Team> {
        self.team.get()
    }
}

impl Entity for Member {
    fn schema() -> &'static EntitySchema {
        &MEMBER_SCHEMA
    }

    fn id_value(&self) -> Value {
        key_or_null(self.id)
    }

    fn assign_id(&mut self, id: Value) -> RepoResult<()> {
        self.id = optional_i64(&id, "member.member_id")?;
        Ok(())
    }

    fn to_values(&self) -> RepoResult<Vec<Value>> {
        let team_key = self.team.key();
        if self.team.is_loaded() && team_key == Value::Null {
            return Err(RepoError::TransientReference {
                entity: "Member",
                property: "team",
            });
        }
        Ok(vec![
            self.id_value(),
            Value::Text(self.username.clone()),
            Value::Integer(i64::from(self.age)),
            team_key,
        ])
    }

    fn from_values(values: Vec<Value>) -> RepoResult<Self> {
        expect_len("member", &values, MEMBER_SCHEMA.column_count())?;
        let mut values = values.into_iter();
        let id = optional_i64(&values.next().unwrap_or(Value::Null), "member.member_id")?;
        let username = required_text(values.next().unwrap_or(Value::Null), "member.username")?;
        let age = required_i64(&values.next().unwrap_or(Value::Null), "member.age")?;
        let age = i32::try_from(age)
            .map_err(|_| RepoError::InvalidData(format!("member.age `{age}` out of range")))?;
        let team = Relation::from_key(values.next().unwrap_or(Value::Null));
        Ok(Self {
            id,
            username,
            age,
            team,
        })
    }

    fn attach_reference(&mut self, property: &str, values: Vec<Value>) -> RepoResult<()> {
        match property {
            "team" => {
                self.team = Relation::Loaded(Box::new(Team::from_values(values)?));
                Ok(())
            }
            other => Err(RepoError::Mapping(format!(
                "entity `Member` has no reference `{other}`"
            ))),
        }
    }
}
