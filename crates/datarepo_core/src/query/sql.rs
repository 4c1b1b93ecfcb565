//! Shared SQL assembly helpers.
//!
//! # Invariants
//! - Caller-provided values only ever reach SQL through `?` placeholders.
//! - Identifiers interpolated into SQL come from static schemas, or pass
//!   `is_plain_identifier`.

use crate::model::schema::{EntitySchema, FieldMapping};
use crate::page::Sort;
use crate::repo::error::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;

/// Alias of the root entity table in generated SQL.
pub const ROOT_ALIAS: &str = "t0";

static PLAIN_IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Final SQL text and its positional bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, binds: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            binds,
        }
    }
}

/// Property resolved against an entity schema, possibly through one reference.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedProperty {
    /// Reference on the root entity that must be joined first.
    pub via: Option<&'static FieldMapping>,
    pub field: &'static FieldMapping,
    /// Value index on the root entity; `None` for joined properties.
    pub index: Option<usize>,
}

impl ResolvedProperty {
    /// Dotted property path, e.g. `team.name`.
    pub fn path(&self) -> String {
        match self.via {
            Some(reference) => format!("{}.{}", reference.property, self.field.property),
            None => self.field.property.to_string(),
        }
    }

    /// Whether this property is a scalar text column.
    pub fn is_text(&self) -> bool {
        self.field.value_kind() == Some(crate::model::schema::ValueKind::Text)
    }
}

/// Resolves `name` or dotted `reference.name` against `schema`.
pub fn resolve_property(
    schema: &'static EntitySchema,
    path: &str,
) -> Result<ResolvedProperty, ConfigError> {
    let unknown = || ConfigError::UnknownProperty {
        entity: schema.entity,
        property: path.to_string(),
    };

    match path.split_once('.') {
        None => {
            let (index, field) = schema.property(path).ok_or_else(unknown)?;
            Ok(ResolvedProperty {
                via: None,
                field,
                index: Some(index),
            })
        }
        Some((head, tail)) => {
            let (_, reference) = schema.property(head).ok_or_else(unknown)?;
            let target = reference.reference_target().ok_or_else(unknown)?;
            let (_, field) = target.property(tail).ok_or_else(unknown)?;
            if field.is_reference() {
                return Err(unknown());
            }
            Ok(ResolvedProperty {
                via: Some(reference),
                field,
                index: None,
            })
        }
    }
}

/// Resolves a capitalized method-name token such as `Username`, `TeamName`
/// or `Team_Name`.
pub fn resolve_token(
    schema: &'static EntitySchema,
    token: &str,
) -> Result<ResolvedProperty, ConfigError> {
    if let Some((head, tail)) = token.split_once('_') {
        return resolve_property(
            schema,
            &format!("{}.{}", uncapitalize(head), uncapitalize(tail)),
        );
    }

    let direct = uncapitalize(token);
    if let Ok(resolved) = resolve_property(schema, &direct) {
        return Ok(resolved);
    }

    for (split, _) in token.char_indices().skip(1).filter(|(_, c)| c.is_ascii_uppercase()) {
        let nested = format!(
            "{}.{}",
            uncapitalize(&token[..split]),
            uncapitalize(&token[split..])
        );
        if let Ok(resolved) = resolve_property(schema, &nested) {
            return Ok(resolved);
        }
    }

    Err(ConfigError::UnknownProperty {
        entity: schema.entity,
        property: direct,
    })
}

pub fn uncapitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// `team_name` → `teamName`.
pub fn snake_to_camel(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut upper_next = false;
    for c in value.chars() {
        if c == '_' {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

pub fn is_plain_identifier(value: &str) -> bool {
    PLAIN_IDENTIFIER_RE.is_match(value)
}

/// LEFT JOINs needed by resolved properties, one alias per reference.
#[derive(Debug, Default)]
pub struct Joins {
    joined: Vec<&'static FieldMapping>,
}

impl Joins {
    /// Qualified column for `property`, registering its join if needed.
    pub fn column(&mut self, property: &ResolvedProperty) -> String {
        match property.via {
            None => format!("{ROOT_ALIAS}.{}", property.field.column),
            Some(reference) => {
                let position = match self
                    .joined
                    .iter()
                    .position(|joined| joined.property == reference.property)
                {
                    Some(position) => position,
                    None => {
                        self.joined.push(reference);
                        self.joined.len() - 1
                    }
                };
                format!("t{}.{}", position + 1, property.field.column)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.joined.is_empty()
    }

    /// ` LEFT JOIN ...` clauses in registration order.
    pub fn render(&self) -> String {
        let mut sql = String::new();
        for (position, reference) in self.joined.iter().enumerate() {
            let Some(target) = reference.reference_target() else {
                continue;
            };
            let alias = format!("t{}", position + 1);
            sql.push_str(&format!(
                " LEFT JOIN {table} {alias} ON {alias}.{target_id} = {ROOT_ALIAS}.{fk}",
                table = target.table,
                target_id = target.id.column,
                fk = reference.column,
            ));
        }
        sql
    }
}

/// Renders ` ORDER BY ...` for schema-resolved orders followed by `sort`.
pub fn order_by_clause(
    schema: &'static EntitySchema,
    fixed: &[(ResolvedProperty, crate::page::Direction)],
    sort: &Sort,
    joins: &mut Joins,
) -> Result<String, ConfigError> {
    let mut terms = Vec::new();
    for (property, direction) in fixed {
        terms.push(format!("{} {}", joins.column(property), direction.as_sql()));
    }
    for order in sort.orders() {
        let property = resolve_property(schema, &order.property)
            .map_err(|_| ConfigError::InvalidSortProperty(order.property.clone()))?;
        terms.push(format!(
            "{} {}",
            joins.column(&property),
            order.direction.as_sql()
        ));
    }
    if terms.is_empty() {
        return Ok(String::new());
    }
    Ok(format!(" ORDER BY {}", terms.join(", ")))
}

/// `?, ?, ?` for `count` values; `NULL` for an empty list so `IN (NULL)` matches nothing.
pub fn placeholders(count: usize) -> String {
    if count == 0 {
        return "NULL".to_string();
    }
    vec!["?"; count].join(", ")
}

/// Escapes `LIKE` wildcards so the value matches literally under `ESCAPE '\'`.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Text form of a bind value used for `LIKE` patterns.
pub fn value_to_pattern_text(value: &Value) -> Option<String> {
    match value {
        Value::Text(text) => Some(text.clone()),
        Value::Integer(number) => Some(number.to_string()),
        Value::Real(number) => Some(number.to_string()),
        Value::Null | Value::Blob(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        escape_like, is_plain_identifier, resolve_property, resolve_token, snake_to_camel, Joins,
    };
    use crate::model::member::MEMBER_SCHEMA;

    #[test]
    fn tokens_resolve_direct_and_nested_properties() {
        let username = resolve_token(&MEMBER_SCHEMA, "Username").unwrap();
        assert_eq!(username.path(), "username");
        assert_eq!(username.index, Some(1));

        let team_name = resolve_token(&MEMBER_SCHEMA, "TeamName").unwrap();
        assert_eq!(team_name.path(), "team.name");

        let explicit = resolve_token(&MEMBER_SCHEMA, "Team_Name").unwrap();
        assert_eq!(explicit.path(), "team.name");

        assert!(resolve_token(&MEMBER_SCHEMA, "Nickname").is_err());
    }

    #[test]
    fn joins_share_one_alias_per_reference() {
        let mut joins = Joins::default();
        let name = resolve_property(&MEMBER_SCHEMA, "team.name").unwrap();
        let id = resolve_property(&MEMBER_SCHEMA, "team.id").unwrap();
        assert_eq!(joins.column(&name), "t1.name");
        assert_eq!(joins.column(&id), "t1.team_id");
        assert_eq!(
            joins.render(),
            " LEFT JOIN team t1 ON t1.team_id = t0.team_id"
        );
    }

    #[test]
    fn helpers_escape_and_convert() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(snake_to_camel("team_name"), "teamName");
        assert_eq!(snake_to_camel("id"), "id");
        assert!(is_plain_identifier("teamName"));
        assert!(!is_plain_identifier("name; DROP TABLE member"));
    }
}
