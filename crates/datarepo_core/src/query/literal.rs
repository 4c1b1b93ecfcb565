//! Literal query text with `:name`, `?` and `?N` placeholders.
//!
//! # Invariants
//! - Placeholders inside quoted strings, quoted identifiers and comments are
//!   never treated as parameters.
//! - Rendered SQL only contains anonymous `?` placeholders, in bind order.

use super::args::{Arg, Args};
use super::sql::{is_plain_identifier, placeholders, resolve_property, Statement};
use crate::model::schema::EntitySchema;
use crate::page::{PageRequest, Sort};
use crate::repo::error::{ConfigError, RepoError, RepoResult};
use rusqlite::types::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Named(String),
    /// Zero-based argument index.
    Positional(usize),
}

/// Query text parsed once at registration.
#[derive(Debug, Clone)]
pub struct LiteralQuery {
    method: String,
    sql: String,
    segments: Vec<Segment>,
    /// Highest positional index referenced, i.e. the required argument count.
    positional_count: usize,
    names: Vec<String>,
}

impl LiteralQuery {
    /// Scans `sql` for placeholders.
    ///
    /// # Errors
    /// - `MixedPlaceholders` when named and positional placeholders are combined.
    pub fn parse(method: &str, sql: &str) -> Result<Self, ConfigError> {
        let segments = scan(sql);
        let mut names: Vec<String> = Vec::new();
        let mut positional_count = 0;
        for segment in &segments {
            match segment {
                Segment::Named(name) => {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
                Segment::Positional(index) => positional_count = positional_count.max(index + 1),
                Segment::Text(_) => {}
            }
        }
        if !names.is_empty() && positional_count > 0 {
            return Err(ConfigError::MixedPlaceholders {
                method: method.to_string(),
            });
        }

        Ok(Self {
            method: method.to_string(),
            sql: sql.to_string(),
            segments,
            positional_count,
            names,
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Distinct `:name` parameters in order of first appearance.
    pub fn parameter_names(&self) -> &[String] {
        &self.names
    }

    pub fn positional_count(&self) -> usize {
        self.positional_count
    }

    /// Binds `args` and returns the executable statement.
    ///
    /// Positional queries require exactly as many arguments as the highest
    /// placeholder index.
    pub fn render(&self, args: &Args) -> RepoResult<Statement> {
        self.render_with(args, true)
    }

    /// Like [`LiteralQuery::render`] but tolerates surplus arguments. Used for
    /// count queries that share the arguments of their content query.
    pub fn render_lenient(&self, args: &Args) -> RepoResult<Statement> {
        self.render_with(args, false)
    }

    fn render_with(&self, args: &Args, exact: bool) -> RepoResult<Statement> {
        let supplied = args.positional().len();
        let count_mismatch = if exact {
            supplied != self.positional_count
        } else {
            supplied < self.positional_count
        };
        if count_mismatch {
            return Err(RepoError::ArgumentCount {
                method: self.method.clone(),
                expected: self.positional_count,
                actual: supplied,
            });
        }

        let mut sql = String::with_capacity(self.sql.len());
        let mut binds = Vec::new();
        for segment in &self.segments {
            let arg = match segment {
                Segment::Text(text) => {
                    sql.push_str(text);
                    continue;
                }
                Segment::Named(name) => {
                    args.named(name)
                        .ok_or_else(|| RepoError::UnboundParameter {
                            method: self.method.clone(),
                            parameter: name.clone(),
                        })?
                }
                Segment::Positional(index) => &args.positional()[*index],
            };
            match arg {
                Arg::Value(value) => {
                    sql.push('?');
                    binds.push(value.clone());
                }
                Arg::List(values) => {
                    sql.push_str(&placeholders(values.len()));
                    binds.extend(values.iter().cloned());
                }
            }
        }
        Ok(Statement::new(sql, binds))
    }
}

/// Wraps `base` so `order` and paging apply to its result set.
pub fn wrap_paged(base: Statement, order: &str, page: Option<&PageRequest>) -> Statement {
    if order.is_empty() && page.is_none() {
        return base;
    }
    let mut sql = format!("SELECT * FROM ({}) AS q{order}", base.sql);
    let mut binds = base.binds;
    if let Some(page) = page {
        sql.push_str(" LIMIT ? OFFSET ?");
        binds.push(Value::Integer(i64::from(page.size())));
        binds.push(Value::Integer(i64::try_from(page.offset()).unwrap_or(i64::MAX)));
    }
    Statement::new(sql, binds)
}

/// `SELECT COUNT(*)` over the rows of `base`.
pub fn wrap_count(base: Statement) -> Statement {
    Statement::new(
        format!("SELECT COUNT(*) FROM ({}) AS q", base.sql),
        base.binds,
    )
}

/// Renders ` ORDER BY` for a wrapped literal query.
///
/// Native queries sort by result-column alias. Other queries sort by entity
/// property, translated to the mapped column name.
pub fn wrapped_order_clause(
    schema: &'static EntitySchema,
    sort: &Sort,
    native: bool,
) -> Result<String, ConfigError> {
    let mut terms = Vec::new();
    for order in sort.orders() {
        let column = if native {
            if !is_plain_identifier(&order.property) {
                return Err(ConfigError::InvalidSortProperty(order.property.clone()));
            }
            order.property.clone()
        } else {
            let property = resolve_property(schema, &order.property)
                .map_err(|_| ConfigError::InvalidSortProperty(order.property.clone()))?;
            if property.via.is_some() {
                return Err(ConfigError::InvalidSortProperty(order.property.clone()));
            }
            property.field.column.to_string()
        };
        terms.push(format!("q.\"{column}\" {}", order.direction.as_sql()));
    }
    if terms.is_empty() {
        return Ok(String::new());
    }
    Ok(format!(" ORDER BY {}", terms.join(", ")))
}

fn scan(sql: &str) -> Vec<Segment> {
    let chars: Vec<char> = sql.chars().collect();
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut next_anonymous = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                let end = skip_quoted(&chars, i, c);
                text.extend(&chars[i..end]);
                i = end;
            }
            '[' => {
                let end = skip_quoted(&chars, i, ']');
                text.extend(&chars[i..end]);
                i = end;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                let end = chars[i..]
                    .iter()
                    .position(|&c| c == '\n')
                    .map_or(chars.len(), |offset| i + offset);
                text.extend(&chars[i..end]);
                i = end;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let mut end = i + 2;
                while end < chars.len() && !(chars[end] == '*' && chars.get(end + 1) == Some(&'/')) {
                    end += 1;
                }
                end = (end + 2).min(chars.len());
                text.extend(&chars[i..end]);
                i = end;
            }
            ':' if chars.get(i + 1).is_some_and(|c| c.is_ascii_alphabetic() || *c == '_')
                && (i == 0 || chars[i - 1] != ':') =>
            {
                let mut end = i + 1;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                flush_text(&mut segments, &mut text);
                segments.push(Segment::Named(chars[i + 1..end].iter().collect()));
                i = end;
            }
            '?' => {
                let mut end = i + 1;
                while end < chars.len() && chars[end].is_ascii_digit() {
                    end += 1;
                }
                let digits: String = chars[i + 1..end].iter().collect();
                let index = match digits.parse::<usize>() {
                    Ok(number) if number > 0 => number - 1,
                    _ => next_anonymous,
                };
                next_anonymous = next_anonymous.max(index + 1);
                flush_text(&mut segments, &mut text);
                segments.push(Segment::Positional(index));
                i = end;
            }
            _ => {
                text.push(c);
                i += 1;
            }
        }
    }
    flush_text(&mut segments, &mut text);
    segments
}

/// Index just past the closing `close` of a quoted run starting at `start`.
fn skip_quoted(chars: &[char], start: usize, close: char) -> usize {
    let mut end = start + 1;
    while end < chars.len() {
        if chars[end] == close {
            // Doubled quote is an escaped quote.
            if close != ']' && chars.get(end + 1) == Some(&close) {
                end += 2;
                continue;
            }
            return end + 1;
        }
        end += 1;
    }
    chars.len()
}

fn flush_text(segments: &mut Vec<Segment>, text: &mut String) {
    if !text.is_empty() {
        segments.push(Segment::Text(std::mem::take(text)));
    }
}

#[cfg(test)]
mod tests {
    use super::{wrap_count, wrap_paged, wrapped_order_clause, LiteralQuery};
    use crate::model::member::MEMBER_SCHEMA;
    use crate::page::{Direction, PageRequest, Sort};
    use crate::query::args::{Arg, Args};
    use crate::repo::error::{ConfigError, RepoError};
    use rusqlite::types::Value;

    #[test]
    fn named_parameters_bind_by_name() {
        let query = LiteralQuery::parse(
            "findUser",
            "SELECT m.* FROM member m WHERE m.username = :username AND m.age = :age",
        )
        .unwrap();
        assert_eq!(query.parameter_names(), &["username", "age"]);

        let statement = query
            .render(&Args::new().bind("age", Arg::value(10)).bind("username", Arg::text("AAA")))
            .unwrap();
        assert_eq!(
            statement.sql,
            "SELECT m.* FROM member m WHERE m.username = ? AND m.age = ?"
        );
        assert_eq!(
            statement.binds,
            vec![Value::Text("AAA".to_string()), Value::Integer(10)]
        );
    }

    #[test]
    fn quoted_text_and_comments_are_not_parameters() {
        let query = LiteralQuery::parse(
            "quoted",
            "SELECT ':skip', \"a?b\" FROM member -- :comment ?\n WHERE username = :name /* ?1 */",
        )
        .unwrap();
        assert_eq!(query.parameter_names(), &["name"]);
        assert_eq!(query.positional_count(), 0);
    }

    #[test]
    fn list_arguments_expand_in_place() {
        let query =
            LiteralQuery::parse("findByNames", "SELECT m.* FROM member m WHERE m.username IN (:names)")
                .unwrap();
        let statement = query
            .render(&Args::new().bind("names", Arg::list(vec!["AAA".to_string(), "BBB".to_string()])))
            .unwrap();
        assert!(statement.sql.ends_with("IN (?, ?)"));
        assert_eq!(statement.binds.len(), 2);

        let empty = query
            .render(&Args::new().bind("names", Arg::List(Vec::new())))
            .unwrap();
        assert!(empty.sql.ends_with("IN (NULL)"));
    }

    #[test]
    fn numbered_positional_parameters_can_repeat() {
        let query =
            LiteralQuery::parse("repeat", "SELECT * FROM member WHERE age > ?1 OR team_id = ?1")
                .unwrap();
        assert_eq!(query.positional_count(), 1);
        let statement = query.render(&Args::new().value(5)).unwrap();
        assert_eq!(statement.binds, vec![Value::Integer(5), Value::Integer(5)]);
    }

    #[test]
    fn argument_errors_are_reported() {
        let named = LiteralQuery::parse("named", "SELECT * FROM member WHERE age = :age").unwrap();
        assert!(matches!(
            named.render(&Args::new()),
            Err(RepoError::UnboundParameter { ref parameter, .. }) if parameter == "age"
        ));

        let positional =
            LiteralQuery::parse("positional", "SELECT * FROM member WHERE username = ?").unwrap();
        assert!(matches!(
            positional.render(&Args::new()),
            Err(RepoError::ArgumentCount {
                expected: 1,
                actual: 0,
                ..
            })
        ));
        assert!(positional
            .render_lenient(&Args::new().text("a").text("b"))
            .is_ok());
    }

    #[test]
    fn mixing_named_and_positional_is_rejected() {
        assert!(matches!(
            LiteralQuery::parse("mixed", "SELECT * FROM member WHERE username = :name AND age = ?"),
            Err(ConfigError::MixedPlaceholders { .. })
        ));
    }

    #[test]
    fn wrapping_applies_order_paging_and_count() {
        let query = LiteralQuery::parse("page", "SELECT * FROM member").unwrap();
        let order =
            wrapped_order_clause(&MEMBER_SCHEMA, &Sort::by(Direction::Desc, &["id"]), false).unwrap();
        let request = PageRequest::of(2, 10, Sort::unsorted()).unwrap();
        let statement = wrap_paged(query.render(&Args::new()).unwrap(), &order, Some(&request));
        assert_eq!(
            statement.sql,
            "SELECT * FROM (SELECT * FROM member) AS q ORDER BY q.\"member_id\" DESC LIMIT ? OFFSET ?"
        );
        assert_eq!(statement.binds, vec![Value::Integer(10), Value::Integer(20)]);

        let count = wrap_count(query.render(&Args::new()).unwrap());
        assert_eq!(count.sql, "SELECT COUNT(*) FROM (SELECT * FROM member) AS q");
    }

    #[test]
    fn native_sort_uses_aliases_and_rejects_expressions() {
        let alias =
            wrapped_order_clause(&MEMBER_SCHEMA, &Sort::by(Direction::Asc, &["teamName"]), true)
                .unwrap();
        assert_eq!(alias, " ORDER BY q.\"teamName\" ASC");
        assert!(wrapped_order_clause(
            &MEMBER_SCHEMA,
            &Sort::by(Direction::Asc, &["age; DROP TABLE member"]),
            true
        )
        .is_err());
        assert!(wrapped_order_clause(
            &MEMBER_SCHEMA,
            &Sort::by(Direction::Asc, &["teamName"]),
            false
        )
        .is_err());
    }
}
