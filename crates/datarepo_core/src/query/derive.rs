//! Query derivation from repository method names.
//!
//! A method name is `verb [subject] By predicate [OrderBy orders]`, e.g.
//! `findTop3ByUsernameAndAgeGreaterThanOrderByAgeDesc`.
//!
//! # Invariants
//! - Parsing validates every property against the entity schema, so a
//!   parsed `DerivedQuery` only fails at call time on bad arguments.
//! - Arguments bind positionally, clause by clause, in predicate order.
//! - `And` binds tighter than `Or`.

use super::args::Arg;
use super::sql::{
    escape_like, order_by_clause, resolve_token, value_to_pattern_text, Joins, ResolvedProperty,
    Statement, ROOT_ALIAS,
};
use crate::model::schema::{EntitySchema, ValueKind};
use crate::page::{Direction, PageRequest, Sort};
use crate::repo::error::{ConfigError, RepoError, RepoResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;

static VERB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(find|read|get|query|search|stream|count|exists|delete|remove)(.*)$")
        .expect("valid verb regex")
});
static LIMIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(First|Top)(\d*)(?:[A-Z]|$)").expect("valid limit regex"));
static ORDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z][A-Za-z0-9_]*?)(Asc|Desc)").expect("valid order regex"));

/// What the derived query produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Find,
    Count,
    Exists,
    Delete,
}

/// Comparison applied by one predicate clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanEqual,
    LessThan,
    LessThanEqual,
    Between,
    In,
    NotIn,
    Like,
    NotLike,
    StartingWith,
    EndingWith,
    Containing,
    NotContaining,
    IsNull,
    IsNotNull,
    True,
    False,
}

impl Operator {
    /// Number of arguments the clause consumes.
    pub fn arity(self) -> usize {
        match self {
            Self::IsNull | Self::IsNotNull | Self::True | Self::False => 0,
            Self::Between => 2,
            _ => 1,
        }
    }
}

// Longer keywords first so `NotIn` wins over `In`.
const KEYWORDS: &[(&str, Operator)] = &[
    ("NotNull", Operator::IsNotNull),
    ("Null", Operator::IsNull),
    ("GreaterThanEqual", Operator::GreaterThanEqual),
    ("GreaterThan", Operator::GreaterThan),
    ("LessThanEqual", Operator::LessThanEqual),
    ("LessThan", Operator::LessThan),
    ("After", Operator::GreaterThan),
    ("Before", Operator::LessThan),
    ("Between", Operator::Between),
    ("NotIn", Operator::NotIn),
    ("In", Operator::In),
    ("NotLike", Operator::NotLike),
    ("Like", Operator::Like),
    ("StartingWith", Operator::StartingWith),
    ("StartsWith", Operator::StartingWith),
    ("EndingWith", Operator::EndingWith),
    ("EndsWith", Operator::EndingWith),
    ("NotContaining", Operator::NotContaining),
    ("Containing", Operator::Containing),
    ("Contains", Operator::Containing),
    ("True", Operator::True),
    ("False", Operator::False),
    ("Not", Operator::NotEquals),
    ("Equals", Operator::Equals),
    ("Is", Operator::Equals),
];

/// One `property operator` predicate term.
#[derive(Debug, Clone, Copy)]
pub struct Clause {
    pub property: ResolvedProperty,
    pub operator: Operator,
    pub ignore_case: bool,
}

/// Columns a derived select returns.
#[derive(Debug, Clone, Copy)]
pub enum Selection<'a> {
    /// All entity columns in schema order.
    Entity,
    /// Listed properties, each aliased to its own name.
    Properties(&'a [&'a str]),
}

/// Query parsed from a method name and validated against a schema.
#[derive(Debug, Clone)]
pub struct DerivedQuery {
    method: String,
    schema: &'static EntitySchema,
    subject: Subject,
    distinct: bool,
    limit: Option<u32>,
    /// OR of AND-groups.
    groups: Vec<Vec<Clause>>,
    orders: Vec<(ResolvedProperty, Direction)>,
}

impl DerivedQuery {
    /// Parses `method` against `schema`.
    ///
    /// # Errors
    /// - `UnknownVerb` when the name does not start with a query verb.
    /// - `UnknownProperty` when a clause names a property the entity lacks.
    /// - `MalformedPredicate` for empty clauses, bad limits or orderings.
    pub fn parse(method: &str, schema: &'static EntitySchema) -> Result<Self, ConfigError> {
        let captures = VERB_RE
            .captures(method)
            .ok_or_else(|| ConfigError::UnknownVerb(method.to_string()))?;
        let verb = captures.get(1).map_or("", |m| m.as_str());
        let rest = captures.get(2).map_or("", |m| m.as_str());
        if rest.chars().next().is_some_and(|c| !c.is_ascii_uppercase()) {
            return Err(ConfigError::UnknownVerb(method.to_string()));
        }

        let subject = match verb {
            "count" => Subject::Count,
            "exists" => Subject::Exists,
            "delete" | "remove" => Subject::Delete,
            _ => Subject::Find,
        };

        let (subject_part, predicate_part) = split_subject(rest);
        let distinct = subject_part.contains("Distinct");
        let limit = parse_limit(method, subject_part)?;

        let (predicate_part, orders) = match predicate_part.split_once("OrderBy") {
            Some((predicate, orders)) => (predicate, parse_orders(method, schema, orders)?),
            None => (predicate_part, Vec::new()),
        };

        let (predicate_part, all_ignore_case) =
            strip_any_suffix(predicate_part, &["AllIgnoreCase", "AllIgnoringCase"]);

        let mut groups = Vec::new();
        if !predicate_part.is_empty() {
            for or_part in split_keyword(predicate_part, "Or") {
                let mut group = Vec::new();
                for and_part in split_keyword(or_part, "And") {
                    group.push(parse_clause(method, schema, and_part, all_ignore_case)?);
                }
                groups.push(group);
            }
        }

        if subject != Subject::Find && (limit.is_some() || !orders.is_empty()) {
            return Err(ConfigError::MalformedPredicate {
                method: method.to_string(),
                detail: "limits and orderings apply to find queries only".to_string(),
            });
        }

        Ok(Self {
            method: method.to_string(),
            schema,
            subject,
            distinct,
            limit,
            groups,
            orders,
        })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn subject(&self) -> Subject {
        self.subject
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn clauses(&self) -> impl Iterator<Item = &Clause> {
        self.groups.iter().flatten()
    }

    /// Number of arguments a call must supply.
    pub fn arity(&self) -> usize {
        self.clauses().map(|clause| clause.operator.arity()).sum()
    }

    /// Whether rows are limited without any declared ordering.
    pub fn has_unordered_limit(&self) -> bool {
        self.limit.is_some() && self.orders.is_empty()
    }

    /// Renders the select for `find` queries.
    pub fn render_select(
        &self,
        args: &[Arg],
        selection: Selection<'_>,
        sort: &Sort,
        page: Option<&PageRequest>,
    ) -> RepoResult<Statement> {
        self.check_arity(args)?;
        let mut joins = Joins::default();
        let mut binds = Vec::new();

        let columns = match selection {
            Selection::Entity => self.schema.select_list(ROOT_ALIAS),
            Selection::Properties(fields) => {
                let mut columns = Vec::with_capacity(fields.len());
                for field in fields {
                    let property = resolve_token(self.schema, field)?;
                    columns.push(format!("{} AS \"{field}\"", joins.column(&property)));
                }
                columns.join(", ")
            }
        };
        let predicate = self.render_predicate(args, &mut joins, &mut binds)?;
        let order = order_by_clause(self.schema, &self.orders, sort, &mut joins)?;

        let mut sql = format!(
            "SELECT {distinct}{columns} FROM {table} {ROOT_ALIAS}{joins}{predicate}{order}",
            distinct = if self.distinct { "DISTINCT " } else { "" },
            table = self.schema.table,
            joins = joins.render(),
        );

        match (self.limit, page) {
            (None, None) => {}
            (Some(limit), None) => {
                sql.push_str(" LIMIT ?");
                binds.push(Value::Integer(i64::from(limit)));
            }
            (None, Some(page)) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                binds.push(Value::Integer(i64::from(page.size())));
                binds.push(Value::Integer(to_i64(page.offset())));
            }
            (Some(limit), Some(page)) => {
                let remaining = u64::from(limit).saturating_sub(page.offset());
                sql.push_str(" LIMIT ? OFFSET ?");
                binds.push(Value::Integer(to_i64(remaining.min(u64::from(page.size())))));
                binds.push(Value::Integer(to_i64(page.offset())));
            }
        }

        Ok(Statement::new(sql, binds))
    }

    /// Renders `SELECT COUNT(*)` over the predicate.
    pub fn render_count(&self, args: &[Arg]) -> RepoResult<Statement> {
        self.check_arity(args)?;
        let mut joins = Joins::default();
        let mut binds = Vec::new();
        let predicate = self.render_predicate(args, &mut joins, &mut binds)?;
        let counted = if self.distinct {
            format!("DISTINCT {ROOT_ALIAS}.{}", self.schema.id.column)
        } else {
            "*".to_string()
        };
        let sql = format!(
            "SELECT COUNT({counted}) FROM {table} {ROOT_ALIAS}{joins}{predicate}",
            table = self.schema.table,
            joins = joins.render(),
        );
        Ok(Statement::new(sql, binds))
    }

    /// Renders `SELECT EXISTS(...)` over the predicate.
    pub fn render_exists(&self, args: &[Arg]) -> RepoResult<Statement> {
        let inner = self.render_key_select(args)?;
        Ok(Statement::new(
            format!("SELECT EXISTS({} LIMIT 1)", inner.sql),
            inner.binds,
        ))
    }

    /// Renders a select of matching primary keys.
    pub fn render_key_select(&self, args: &[Arg]) -> RepoResult<Statement> {
        self.check_arity(args)?;
        let mut joins = Joins::default();
        let mut binds = Vec::new();
        let predicate = self.render_predicate(args, &mut joins, &mut binds)?;
        let sql = format!(
            "SELECT {ROOT_ALIAS}.{id} FROM {table} {ROOT_ALIAS}{joins}{predicate}",
            id = self.schema.id.column,
            table = self.schema.table,
            joins = joins.render(),
        );
        Ok(Statement::new(sql, binds))
    }

    /// Renders a single-statement delete of all matching rows.
    pub fn render_delete(&self, args: &[Arg]) -> RepoResult<Statement> {
        let keys = self.render_key_select(args)?;
        Ok(Statement::new(
            format!(
                "DELETE FROM {table} WHERE {id} IN ({keys})",
                table = self.schema.table,
                id = self.schema.id.column,
                keys = keys.sql,
            ),
            keys.binds,
        ))
    }

    fn check_arity(&self, args: &[Arg]) -> RepoResult<()> {
        let expected = self.arity();
        if args.len() != expected {
            return Err(RepoError::ArgumentCount {
                method: self.method.clone(),
                expected,
                actual: args.len(),
            });
        }
        Ok(())
    }

    fn render_predicate(
        &self,
        args: &[Arg],
        joins: &mut Joins,
        binds: &mut Vec<Value>,
    ) -> RepoResult<String> {
        if self.groups.is_empty() {
            return Ok(String::new());
        }

        let mut cursor = 0;
        let mut or_terms = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            let mut and_terms = Vec::with_capacity(group.len());
            for clause in group {
                let arity = clause.operator.arity();
                let clause_args = &args[cursor..cursor + arity];
                cursor += arity;
                and_terms.push(self.render_clause(clause, clause_args, joins, binds)?);
            }
            or_terms.push(format!("({})", and_terms.join(" AND ")));
        }
        Ok(format!(" WHERE {}", or_terms.join(" OR ")))
    }

    fn render_clause(
        &self,
        clause: &Clause,
        args: &[Arg],
        joins: &mut Joins,
        binds: &mut Vec<Value>,
    ) -> RepoResult<String> {
        let column = joins.column(&clause.property);
        let (lhs, rhs) = if clause.ignore_case {
            (format!("LOWER({column})"), "LOWER(?)")
        } else {
            (column.clone(), "?")
        };

        let sql = match clause.operator {
            Operator::Equals => match self.scalar(args, 0)? {
                Value::Null => format!("{column} IS NULL"),
                value => {
                    binds.push(value);
                    format!("{lhs} = {rhs}")
                }
            },
            Operator::NotEquals => match self.scalar(args, 0)? {
                Value::Null => format!("{column} IS NOT NULL"),
                value => {
                    binds.push(value);
                    format!("{lhs} <> {rhs}")
                }
            },
            Operator::GreaterThan
            | Operator::GreaterThanEqual
            | Operator::LessThan
            | Operator::LessThanEqual => {
                binds.push(self.scalar(args, 0)?);
                let op = match clause.operator {
                    Operator::GreaterThan => ">",
                    Operator::GreaterThanEqual => ">=",
                    Operator::LessThan => "<",
                    _ => "<=",
                };
                format!("{lhs} {op} {rhs}")
            }
            Operator::Between => {
                binds.push(self.scalar(args, 0)?);
                binds.push(self.scalar(args, 1)?);
                format!("{lhs} BETWEEN {rhs} AND {rhs}")
            }
            Operator::In | Operator::NotIn => {
                let values = args.first().map(Arg::as_list).unwrap_or_default();
                let negated = clause.operator == Operator::NotIn;
                if values.is_empty() {
                    return Ok(if negated { "1 = 1" } else { "1 = 0" }.to_string());
                }
                let placeholders = vec![rhs; values.len()].join(", ");
                binds.extend(values);
                let keyword = if negated { "NOT IN" } else { "IN" };
                format!("{lhs} {keyword} ({placeholders})")
            }
            Operator::Like | Operator::NotLike => {
                binds.push(Value::Text(self.pattern_text(args)?));
                let keyword = if clause.operator == Operator::NotLike {
                    "NOT LIKE"
                } else {
                    "LIKE"
                };
                format!("{lhs} {keyword} {rhs}")
            }
            Operator::StartingWith
            | Operator::EndingWith
            | Operator::Containing
            | Operator::NotContaining => {
                let escaped = escape_like(&self.pattern_text(args)?);
                let pattern = match clause.operator {
                    Operator::StartingWith => format!("{escaped}%"),
                    Operator::EndingWith => format!("%{escaped}"),
                    _ => format!("%{escaped}%"),
                };
                binds.push(Value::Text(pattern));
                let keyword = if clause.operator == Operator::NotContaining {
                    "NOT LIKE"
                } else {
                    "LIKE"
                };
                format!("{lhs} {keyword} {rhs} ESCAPE '\\'")
            }
            Operator::IsNull => format!("{column} IS NULL"),
            Operator::IsNotNull => format!("{column} IS NOT NULL"),
            Operator::True => format!("{column} = 1"),
            Operator::False => format!("{column} = 0"),
        };
        Ok(sql)
    }

    fn scalar(&self, args: &[Arg], index: usize) -> RepoResult<Value> {
        match args.get(index) {
            Some(Arg::Value(value)) => Ok(value.clone()),
            Some(Arg::List(_)) => Err(RepoError::InvalidArgument {
                method: self.method.clone(),
                detail: format!("argument {} must be a single value", index + 1),
            }),
            None => Err(RepoError::ArgumentCount {
                method: self.method.clone(),
                expected: self.arity(),
                actual: args.len(),
            }),
        }
    }

    fn pattern_text(&self, args: &[Arg]) -> RepoResult<String> {
        let value = self.scalar(args, 0)?;
        value_to_pattern_text(&value).ok_or_else(|| RepoError::InvalidArgument {
            method: self.method.clone(),
            detail: "pattern argument must be text or a number".to_string(),
        })
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Splits `rest` at the first `By` that starts a predicate.
fn split_subject(rest: &str) -> (&str, &str) {
    for (index, _) in rest.match_indices("By") {
        let after = &rest[index + 2..];
        if after.is_empty() || after.starts_with(|c: char| c.is_ascii_uppercase()) {
            return (&rest[..index], after);
        }
    }
    (rest, "")
}

fn parse_limit(method: &str, subject: &str) -> Result<Option<u32>, ConfigError> {
    let Some(captures) = LIMIT_RE.captures(subject) else {
        return Ok(None);
    };
    let digits = captures.get(2).map_or("", |m| m.as_str());
    if digits.is_empty() {
        return Ok(Some(1));
    }
    match digits.parse::<u32>() {
        Ok(0) | Err(_) => Err(ConfigError::MalformedPredicate {
            method: method.to_string(),
            detail: format!("invalid result limit `{digits}`"),
        }),
        Ok(limit) => Ok(Some(limit)),
    }
}

fn parse_orders(
    method: &str,
    schema: &'static EntitySchema,
    part: &str,
) -> Result<Vec<(ResolvedProperty, Direction)>, ConfigError> {
    let malformed = || ConfigError::MalformedPredicate {
        method: method.to_string(),
        detail: format!("cannot parse ordering `{part}`"),
    };

    let mut orders = Vec::new();
    let mut consumed = 0;
    for captures in ORDER_RE.captures_iter(part) {
        let (Some(whole), Some(property), Some(direction)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            return Err(malformed());
        };
        if whole.start() != consumed {
            return Err(malformed());
        }
        let direction = if direction.as_str() == "Desc" {
            Direction::Desc
        } else {
            Direction::Asc
        };
        orders.push((resolve_token(schema, property.as_str())?, direction));
        consumed = whole.end();
    }

    let trailing = &part[consumed..];
    if !trailing.is_empty() {
        orders.push((resolve_token(schema, trailing)?, Direction::Asc));
    }
    if orders.is_empty() {
        return Err(malformed());
    }
    Ok(orders)
}

fn parse_clause(
    method: &str,
    schema: &'static EntitySchema,
    part: &str,
    all_ignore_case: bool,
) -> Result<Clause, ConfigError> {
    let (part, explicit_ignore_case) = strip_any_suffix(part, &["IgnoreCase", "IgnoringCase"]);
    if part.is_empty() {
        return Err(ConfigError::MalformedPredicate {
            method: method.to_string(),
            detail: "empty predicate clause".to_string(),
        });
    }

    let (property, operator) = match_operator(schema, part)?;
    if explicit_ignore_case && !property.is_text() {
        return Err(ConfigError::IgnoreCaseOnNonText {
            method: method.to_string(),
            property: property.path(),
        });
    }
    if matches!(operator, Operator::True | Operator::False)
        && property.field.value_kind() != Some(ValueKind::Boolean)
    {
        return Err(ConfigError::MalformedPredicate {
            method: method.to_string(),
            detail: format!("`{}` is not a boolean property", property.path()),
        });
    }

    Ok(Clause {
        property,
        operator,
        ignore_case: explicit_ignore_case || (all_ignore_case && property.is_text()),
    })
}

fn match_operator(
    schema: &'static EntitySchema,
    part: &str,
) -> Result<(ResolvedProperty, Operator), ConfigError> {
    for (keyword, operator) in KEYWORDS {
        let Some(head) = part.strip_suffix(keyword) else {
            continue;
        };
        if head.is_empty() {
            continue;
        }
        if let Some(stripped) = head.strip_suffix("Is").filter(|value| !value.is_empty()) {
            if let Ok(property) = resolve_token(schema, stripped) {
                return Ok((property, *operator));
            }
        }
        if let Ok(property) = resolve_token(schema, head) {
            return Ok((property, *operator));
        }
    }
    resolve_token(schema, part).map(|property| (property, Operator::Equals))
}

/// Splits at `keyword` occurrences followed by an uppercase letter.
fn split_keyword<'a>(value: &'a str, keyword: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (index, _) in value.match_indices(keyword) {
        if index < start {
            continue;
        }
        let after = &value[index + keyword.len()..];
        if after.starts_with(|c: char| c.is_ascii_uppercase()) {
            parts.push(&value[start..index]);
            start = index + keyword.len();
        }
    }
    parts.push(&value[start..]);
    parts
}

fn strip_any_suffix<'a>(value: &'a str, suffixes: &[&str]) -> (&'a str, bool) {
    for suffix in suffixes {
        if let Some(stripped) = value.strip_suffix(suffix) {
            return (stripped, true);
        }
    }
    (value, false)
}
