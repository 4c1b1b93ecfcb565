//! Composable criteria over entity properties.

use super::sql::{escape_like, placeholders, resolve_property, Joins};
use crate::model::schema::Entity;
use crate::repo::error::ConfigError;
use rusqlite::types::Value;
use std::marker::PhantomData;
use std::ops::Not;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Criterion {
    All,
    Compare {
        path: String,
        comparison: Comparison,
        value: Value,
    },
    Like {
        path: String,
        pattern: String,
    },
    IsNull(String),
    InList {
        path: String,
        values: Vec<Value>,
    },
    And(Box<Criterion>, Box<Criterion>),
    Or(Box<Criterion>, Box<Criterion>),
    Not(Box<Criterion>),
}

/// Predicate over `E`, rendered against `E`'s schema when executed.
///
/// Paths are property names, or `reference.property` for a joined entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Specification<E> {
    criterion: Criterion,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Specification<E> {
    fn from_criterion(criterion: Criterion) -> Self {
        Self {
            criterion,
            _entity: PhantomData,
        }
    }

    fn compare(path: &str, comparison: Comparison, value: impl Into<Value>) -> Self {
        Self::from_criterion(Criterion::Compare {
            path: path.to_string(),
            comparison,
            value: value.into(),
        })
    }

    /// Matches every row.
    pub fn all() -> Self {
        Self::from_criterion(Criterion::All)
    }

    /// Equality; a `NULL` value matches null columns.
    pub fn eq(path: &str, value: impl Into<Value>) -> Self {
        Self::compare(path, Comparison::Eq, value)
    }

    pub fn ne(path: &str, value: impl Into<Value>) -> Self {
        Self::compare(path, Comparison::Ne, value)
    }

    pub fn gt(path: &str, value: impl Into<Value>) -> Self {
        Self::compare(path, Comparison::Gt, value)
    }

    pub fn ge(path: &str, value: impl Into<Value>) -> Self {
        Self::compare(path, Comparison::Ge, value)
    }

    pub fn lt(path: &str, value: impl Into<Value>) -> Self {
        Self::compare(path, Comparison::Lt, value)
    }

    pub fn le(path: &str, value: impl Into<Value>) -> Self {
        Self::compare(path, Comparison::Le, value)
    }

    /// SQL `LIKE` with a caller-supplied pattern (`%`, `_` keep their meaning).
    pub fn like(path: &str, pattern: &str) -> Self {
        Self::from_criterion(Criterion::Like {
            path: path.to_string(),
            pattern: pattern.to_string(),
        })
    }

    /// `LIKE` matching `fragment` literally anywhere in the value.
    pub fn contains(path: &str, fragment: &str) -> Self {
        Self::like(path, &format!("%{}%", escape_like(fragment)))
    }

    pub fn is_null(path: &str) -> Self {
        Self::from_criterion(Criterion::IsNull(path.to_string()))
    }

    pub fn in_list<I, V>(path: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::from_criterion(Criterion::InList {
            path: path.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn and(self, other: Self) -> Self {
        match (self.criterion, other.criterion) {
            (Criterion::All, criterion) | (criterion, Criterion::All) => {
                Self::from_criterion(criterion)
            }
            (left, right) => Self::from_criterion(Criterion::And(Box::new(left), Box::new(right))),
        }
    }

    pub fn or(self, other: Self) -> Self {
        match (self.criterion, other.criterion) {
            (Criterion::All, _) | (_, Criterion::All) => Self::all(),
            (left, right) => Self::from_criterion(Criterion::Or(Box::new(left), Box::new(right))),
        }
    }

    /// Whether the specification restricts nothing.
    pub fn is_unrestricted(&self) -> bool {
        self.criterion == Criterion::All
    }

    /// Renders the ` WHERE ...` clause, or an empty string when unrestricted.
    pub(crate) fn render_where(
        &self,
        joins: &mut Joins,
        binds: &mut Vec<Value>,
    ) -> Result<String, ConfigError> {
        if self.is_unrestricted() {
            return Ok(String::new());
        }
        Ok(format!(" WHERE {}", render::<E>(&self.criterion, joins, binds)?))
    }
}

impl<E: Entity> Not for Specification<E> {
    type Output = Self;

    fn not(self) -> Self {
        Self::from_criterion(Criterion::Not(Box::new(self.criterion)))
    }
}

fn render<E: Entity>(
    criterion: &Criterion,
    joins: &mut Joins,
    binds: &mut Vec<Value>,
) -> Result<String, ConfigError> {
    let column = |path: &str, joins: &mut Joins| -> Result<String, ConfigError> {
        Ok(joins.column(&resolve_property(E::schema(), path)?))
    };

    Ok(match criterion {
        Criterion::All => "1 = 1".to_string(),
        Criterion::Compare {
            path,
            comparison,
            value,
        } => {
            let column = column(path, joins)?;
            match (comparison, value) {
                (Comparison::Eq, Value::Null) => format!("{column} IS NULL"),
                (Comparison::Ne, Value::Null) => format!("{column} IS NOT NULL"),
                _ => {
                    binds.push(value.clone());
                    format!("{column} {} ?", comparison.as_sql())
                }
            }
        }
        Criterion::Like { path, pattern } => {
            let column = column(path, joins)?;
            binds.push(Value::Text(pattern.clone()));
            format!("{column} LIKE ? ESCAPE '\\'")
        }
        Criterion::IsNull(path) => format!("{} IS NULL", column(path, joins)?),
        Criterion::InList { path, values } => {
            let column = column(path, joins)?;
            binds.extend(values.iter().cloned());
            format!("{column} IN ({})", placeholders(values.len()))
        }
        Criterion::And(left, right) => format!(
            "({} AND {})",
            render::<E>(left, joins, binds)?,
            render::<E>(right, joins, binds)?
        ),
        Criterion::Or(left, right) => format!(
            "({} OR {})",
            render::<E>(left, joins, binds)?,
            render::<E>(right, joins, binds)?
        ),
        Criterion::Not(inner) => format!("NOT ({})", render::<E>(inner, joins, binds)?),
    })
}
