//! Per-repository registry of declared query methods.
//!
//! # Responsibility
//! - Compile every declaration (derived name or literal text) once.
//! - Reject invalid declarations before any query runs.
//! - Resolve a method name plus requested result shape at call time.
//!
//! # Invariants
//! - A built registry is immutable and only holds validated methods.
//! - A method is invoked only with the shape it was declared with.

use super::derive::{DerivedQuery, Subject};
use super::literal::LiteralQuery;
use crate::model::schema::EntitySchema;
use crate::repo::error::ConfigError;
use log::{debug, info};
use std::collections::BTreeMap;
use std::time::Instant;

/// Row lock requested for the rows a query reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockKind {
    #[default]
    None,
    PessimisticRead,
    PessimisticWrite,
}

impl LockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::PessimisticRead => "pessimistic_read",
            Self::PessimisticWrite => "pessimistic_write",
        }
    }
}

/// Execution hints attached to a declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryHints {
    /// Reference properties loaded in one batch after the base query.
    pub fetch: Vec<String>,
    /// Loaded entities are never written back by flush.
    pub read_only: bool,
    pub lock: LockKind,
    /// Separate count query for paged literal queries.
    pub count_query: Option<String>,
    /// Query text is written against result-column aliases.
    pub native: bool,
}

/// Options of a mutating literal query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifying {
    pub flush_automatically: bool,
    pub clear_automatically: bool,
}

/// Declared return type of a query method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    EntityList,
    EntityOne,
    EntityOptional,
    EntityPage,
    ProjectionList,
    ProjectionPage,
    ScalarList,
    Count,
    Exists,
    AffectedRows,
}

impl ResultShape {
    pub fn name(self) -> &'static str {
        match self {
            Self::EntityList => "entity list",
            Self::EntityOne => "single entity",
            Self::EntityOptional => "optional entity",
            Self::EntityPage => "entity page",
            Self::ProjectionList => "projection list",
            Self::ProjectionPage => "projection page",
            Self::ScalarList => "scalar list",
            Self::Count => "count",
            Self::Exists => "exists",
            Self::AffectedRows => "affected rows",
        }
    }

    pub fn is_entity(self) -> bool {
        matches!(
            self,
            Self::EntityList | Self::EntityOne | Self::EntityOptional | Self::EntityPage
        )
    }

    pub fn is_page(self) -> bool {
        matches!(self, Self::EntityPage | Self::ProjectionPage)
    }
}

/// Unvalidated query method declaration.
#[derive(Debug, Clone)]
pub struct QueryDeclaration {
    name: String,
    sql: Option<String>,
    shape: ResultShape,
    hints: QueryHints,
    modifying: Option<Modifying>,
}

impl QueryDeclaration {
    /// Query derived from `name`.
    pub fn derived(name: &str, shape: ResultShape) -> Self {
        Self {
            name: name.to_string(),
            sql: None,
            shape,
            hints: QueryHints::default(),
            modifying: None,
        }
    }

    /// Query given as SQL text; `name` is only an identifier.
    pub fn literal(name: &str, sql: &str, shape: ResultShape) -> Self {
        Self {
            sql: Some(sql.to_string()),
            ..Self::derived(name, shape)
        }
    }

    pub fn fetch(mut self, property: &str) -> Self {
        self.hints.fetch.push(property.to_string());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.hints.read_only = true;
        self
    }

    pub fn lock(mut self, lock: LockKind) -> Self {
        self.hints.lock = lock;
        self
    }

    pub fn count_query(mut self, sql: &str) -> Self {
        self.hints.count_query = Some(sql.to_string());
        self
    }

    pub fn native(mut self) -> Self {
        self.hints.native = true;
        self
    }

    pub fn modifying(mut self, modifying: Modifying) -> Self {
        self.modifying = Some(modifying);
        self
    }
}

/// Compiled query source.
#[derive(Debug, Clone)]
pub enum QuerySource {
    Derived(DerivedQuery),
    Literal {
        query: LiteralQuery,
        count: Option<LiteralQuery>,
    },
}

/// Validated, executable query method.
#[derive(Debug, Clone)]
pub struct QueryMethod {
    pub name: String,
    pub source: QuerySource,
    pub shape: ResultShape,
    pub hints: QueryHints,
    pub modifying: Modifying,
}

/// Immutable method table for one entity.
#[derive(Debug)]
pub struct QueryRegistry {
    schema: &'static EntitySchema,
    methods: BTreeMap<String, QueryMethod>,
}

impl QueryRegistry {
    pub fn builder(schema: &'static EntitySchema) -> QueryRegistryBuilder {
        QueryRegistryBuilder {
            schema,
            declarations: Vec::new(),
        }
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Looks up `name` and checks it was declared with `shape`.
    pub fn get(&self, name: &str, shape: ResultShape) -> Result<&QueryMethod, ConfigError> {
        let method = self
            .methods
            .get(name)
            .ok_or_else(|| ConfigError::UnknownMethod(name.to_string()))?;
        if method.shape != shape {
            return Err(ConfigError::ShapeMismatch {
                method: name.to_string(),
                declared: method.shape.name(),
                requested: shape.name(),
            });
        }
        Ok(method)
    }
}

/// Collects declarations; [`QueryRegistryBuilder::build`] validates them all.
#[derive(Debug)]
pub struct QueryRegistryBuilder {
    schema: &'static EntitySchema,
    declarations: Vec<QueryDeclaration>,
}

impl QueryRegistryBuilder {
    pub fn register(mut self, declaration: QueryDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    /// Compiles every declaration.
    ///
    /// # Errors
    /// - The first invalid declaration, in registration order.
    pub fn build(self) -> Result<QueryRegistry, ConfigError> {
        let started_at = Instant::now();
        let mut methods = BTreeMap::new();
        for declaration in self.declarations {
            if methods.contains_key(&declaration.name) {
                return Err(ConfigError::DuplicateMethod(declaration.name));
            }
            let method = compile(self.schema, declaration)?;
            methods.insert(method.name.clone(), method);
        }

        info!(
            "event=registry_build module=query status=ok entity={} methods={} duration_ms={}",
            self.schema.entity,
            methods.len(),
            started_at.elapsed().as_millis()
        );
        Ok(QueryRegistry {
            schema: self.schema,
            methods,
        })
    }
}

fn compile(
    schema: &'static EntitySchema,
    declaration: QueryDeclaration,
) -> Result<QueryMethod, ConfigError> {
    let QueryDeclaration {
        name,
        sql,
        shape,
        hints,
        modifying,
    } = declaration;
    let invalid_shape = |detail: &str| ConfigError::InvalidShape {
        method: name.clone(),
        detail: detail.to_string(),
    };

    let source = match sql {
        None => {
            let derived = DerivedQuery::parse(&name, schema)?;
            let compatible = match derived.subject() {
                Subject::Find => shape.is_entity()
                    || matches!(shape, ResultShape::ProjectionList | ResultShape::ProjectionPage),
                Subject::Count => shape == ResultShape::Count,
                Subject::Exists => shape == ResultShape::Exists,
                Subject::Delete => shape == ResultShape::AffectedRows,
            };
            if !compatible {
                return Err(invalid_shape("derived subject does not produce this shape"));
            }
            if hints.native || hints.count_query.is_some() || modifying.is_some() {
                return Err(invalid_shape(
                    "native, count query and modifying apply to literal queries only",
                ));
            }
            if derived.has_unordered_limit() {
                debug!(
                    "event=registry_build module=query status=warn method={} detail=limit_without_order",
                    name
                );
            }
            QuerySource::Derived(derived)
        }
        Some(sql) => {
            let query = LiteralQuery::parse(&name, &sql)?;
            let count = hints
                .count_query
                .as_deref()
                .map(|count_sql| LiteralQuery::parse(&name, count_sql))
                .transpose()?;
            if count.is_some() && !shape.is_page() {
                return Err(invalid_shape("count query requires a page shape"));
            }
            if modifying.is_some() != (shape == ResultShape::AffectedRows) {
                return Err(invalid_shape(
                    "modifying queries and affected-row results go together",
                ));
            }
            QuerySource::Literal { query, count }
        }
    };

    if (hints.read_only || hints.lock != LockKind::None || !hints.fetch.is_empty())
        && !shape.is_entity()
    {
        return Err(invalid_shape("fetch, read-only and lock hints need entity results"));
    }
    for path in &hints.fetch {
        let is_reference = schema
            .property(path)
            .is_some_and(|(_, mapping)| mapping.is_reference());
        if hints.native || !is_reference {
            return Err(ConfigError::InvalidFetchPath {
                method: name.clone(),
                path: path.clone(),
            });
        }
    }

    Ok(QueryMethod {
        name,
        source,
        shape,
        hints,
        modifying: modifying.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::{LockKind, Modifying, QueryDeclaration, QueryRegistry, ResultShape};
    use crate::model::member::MEMBER_SCHEMA;
    use crate::repo::error::ConfigError;

    fn build(declaration: QueryDeclaration) -> Result<QueryRegistry, ConfigError> {
        QueryRegistry::builder(&MEMBER_SCHEMA)
            .register(declaration)
            .build()
    }

    #[test]
    fn valid_declarations_resolve_by_name_and_shape() {
        let registry = QueryRegistry::builder(&MEMBER_SCHEMA)
            .register(QueryDeclaration::derived("findByUsername", ResultShape::EntityList))
            .register(
                QueryDeclaration::derived("findLockByUsername", ResultShape::EntityList)
                    .lock(LockKind::PessimisticWrite),
            )
            .register(
                QueryDeclaration::literal(
                    "bulkAgePlus",
                    "UPDATE member SET age = age + 1 WHERE age >= :age",
                    ResultShape::AffectedRows,
                )
                .modifying(Modifying {
                    clear_automatically: true,
                    ..Modifying::default()
                }),
            )
            .build()
            .unwrap();

        assert_eq!(registry.len(), 3);
        assert!(registry.get("findByUsername", ResultShape::EntityList).is_ok());
        assert!(matches!(
            registry.get("findByUsername", ResultShape::EntityOne),
            Err(ConfigError::ShapeMismatch {
                declared: "entity list",
                requested: "single entity",
                ..
            })
        ));
        assert!(matches!(
            registry.get("findByNickname", ResultShape::EntityList),
            Err(ConfigError::UnknownMethod(_))
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = QueryRegistry::builder(&MEMBER_SCHEMA)
            .register(QueryDeclaration::derived("findByAge", ResultShape::EntityList))
            .register(QueryDeclaration::derived("findByAge", ResultShape::EntityPage))
            .build();
        assert!(matches!(result, Err(ConfigError::DuplicateMethod(_))));
    }

    #[test]
    fn fetch_paths_must_be_references_on_non_native_queries() {
        assert!(matches!(
            build(QueryDeclaration::derived("findByAge", ResultShape::EntityList).fetch("username")),
            Err(ConfigError::InvalidFetchPath { .. })
        ));
        assert!(matches!(
            build(
                QueryDeclaration::literal("native", "SELECT * FROM member", ResultShape::EntityList)
                    .native()
                    .fetch("team")
            ),
            Err(ConfigError::InvalidFetchPath { .. })
        ));
        assert!(build(QueryDeclaration::derived("findByAge", ResultShape::EntityList).fetch("team")).is_ok());
    }

    #[test]
    fn subject_and_shape_must_agree() {
        assert!(matches!(
            build(QueryDeclaration::derived("countByAge", ResultShape::EntityList)),
            Err(ConfigError::InvalidShape { .. })
        ));
        assert!(matches!(
            build(QueryDeclaration::literal(
                "update",
                "UPDATE member SET age = 0",
                ResultShape::AffectedRows
            )),
            Err(ConfigError::InvalidShape { .. })
        ));
        assert!(matches!(
            build(
                QueryDeclaration::literal("list", "SELECT * FROM member", ResultShape::EntityList)
                    .count_query("SELECT COUNT(*) FROM member")
            ),
            Err(ConfigError::InvalidShape { .. })
        ));
    }

    #[test]
    fn derivation_errors_surface_at_build() {
        assert!(matches!(
            build(QueryDeclaration::derived("findByNickname", ResultShape::EntityList)),
            Err(ConfigError::UnknownProperty { .. })
        ));
    }
}
