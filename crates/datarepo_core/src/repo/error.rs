//! Repository error types.
//!
//! # Invariants
//! - `ConfigError` is raised while a registry is built, never by a query call,
//!   except for shape mismatches between a call and its declaration.
//! - Database failures are propagated unchanged inside `RepoError::Db`.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Invalid query declaration detected while building a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Method name does not start with a supported verb.
    UnknownVerb(String),
    /// Property does not exist on the entity (or its reference target).
    UnknownProperty { entity: &'static str, property: String },
    /// Clause or order segment could not be parsed.
    MalformedPredicate { method: String, detail: String },
    /// `IgnoreCase` used on a non-text property.
    IgnoreCaseOnNonText { method: String, property: String },
    /// Named and positional placeholders in one query.
    MixedPlaceholders { method: String },
    /// Fetch path is not a reference property, or is used on a native query.
    InvalidFetchPath { method: String, path: String },
    /// Declared result shape is incompatible with the query source.
    InvalidShape { method: String, detail: String },
    /// Same method registered twice.
    DuplicateMethod(String),
    /// Method was invoked but never registered.
    UnknownMethod(String),
    /// Method was invoked with a shape different from its declaration.
    ShapeMismatch {
        method: String,
        declared: &'static str,
        requested: &'static str,
    },
    /// Sort key is neither a mapped property nor a plain identifier.
    InvalidSortProperty(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownVerb(method) => write!(f, "`{method}` does not start with a query verb"),
            Self::UnknownProperty { entity, property } => {
                write!(f, "no property `{property}` found on entity `{entity}`")
            }
            Self::MalformedPredicate { method, detail } => {
                write!(f, "cannot derive query for `{method}`: {detail}")
            }
            Self::IgnoreCaseOnNonText { method, property } => write!(
                f,
                "`{method}` applies IgnoreCase to non-text property `{property}`"
            ),
            Self::MixedPlaceholders { method } => write!(
                f,
                "`{method}` mixes named and positional parameters"
            ),
            Self::InvalidFetchPath { method, path } => {
                write!(f, "`{method}` cannot fetch `{path}`")
            }
            Self::InvalidShape { method, detail } => {
                write!(f, "`{method}` has an invalid result shape: {detail}")
            }
            Self::DuplicateMethod(method) => write!(f, "`{method}` is registered twice"),
            Self::UnknownMethod(method) => write!(f, "`{method}` is not registered"),
            Self::ShapeMismatch {
                method,
                declared,
                requested,
            } => write!(
                f,
                "`{method}` is declared as {declared} but was invoked as {requested}"
            ),
            Self::InvalidSortProperty(property) => {
                write!(f, "cannot sort by `{property}`")
            }
        }
    }
}

impl Error for ConfigError {}

/// Error surfaced by repository and session operations.
#[derive(Debug)]
pub enum RepoError {
    Configuration(ConfigError),
    Db(DbError),
    /// Required single result, zero rows.
    NotFound { method: String },
    /// At most one row expected, more returned.
    TooManyRows { method: String, actual: usize },
    ArgumentCount {
        method: String,
        expected: usize,
        actual: usize,
    },
    UnboundParameter { method: String, parameter: String },
    /// Argument value does not fit its clause (e.g. a list for `GreaterThan`).
    InvalidArgument { method: String, detail: String },
    /// Lock directive executed outside a transaction.
    TransactionRequired { method: String },
    /// Reference points to an entity without a persisted key.
    TransientReference {
        entity: &'static str,
        property: &'static str,
    },
    /// Persisted row cannot be converted into the entity.
    InvalidData(String),
    /// Row cannot be converted into the requested projection.
    Mapping(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { method } => write!(f, "`{method}` returned no result"),
            Self::TooManyRows { method, actual } => write!(
                f,
                "`{method}` expected at most one row but returned {actual}"
            ),
            Self::ArgumentCount {
                method,
                expected,
                actual,
            } => write!(
                f,
                "`{method}` expects {expected} arguments, got {actual}"
            ),
            Self::UnboundParameter { method, parameter } => {
                write!(f, "`{method}` has no value for parameter `{parameter}`")
            }
            Self::InvalidArgument { method, detail } => {
                write!(f, "invalid argument for `{method}`: {detail}")
            }
            Self::TransactionRequired { method } => {
                write!(f, "`{method}` requests a lock outside a transaction")
            }
            Self::TransientReference { entity, property } => write!(
                f,
                "`{entity}.{property}` references an unsaved entity"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Mapping(message) => write!(f, "cannot map result row: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Configuration(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for RepoError {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
