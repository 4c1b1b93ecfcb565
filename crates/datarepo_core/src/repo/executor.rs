//! Runs registered query methods and maps their results.
//!
//! # Invariants
//! - Every call resolves its method through the registry with the shape the
//!   caller asks for; a mismatch never reaches the database.
//! - Lock hints are applied before the read they guard.
//! - Fetch hints cost one extra statement per reference property.

use super::mapping::{map_projections, map_scalars, single_integer, Projection};
use super::session::{RowLayout, Session};
use crate::model::schema::Entity;
use crate::page::{Page, PageRequest, Sort};
use crate::query::args::Args;
use crate::query::derive::Selection;
use crate::query::literal::{wrap_count, wrap_paged, wrapped_order_clause};
use crate::query::registry::{QueryMethod, QueryRegistry, QuerySource, ResultShape};
use crate::query::sql::Statement;
use crate::repo::error::{RepoError, RepoResult};
use log::info;
use rusqlite::types::FromSql;
use std::time::Instant;

/// Executes methods of one registry against one session.
#[derive(Clone, Copy)]
pub struct QueryExecutor<'s> {
    session: &'s Session<'s>,
    registry: &'static QueryRegistry,
}

impl<'s> QueryExecutor<'s> {
    pub fn new(session: &'s Session<'s>, registry: &'static QueryRegistry) -> Self {
        Self { session, registry }
    }

    pub fn session(&self) -> &'s Session<'s> {
        self.session
    }

    pub fn registry(&self) -> &'static QueryRegistry {
        self.registry
    }

    /// Zero or more entities.
    pub fn list<E: Entity>(&self, name: &str, args: &Args) -> RepoResult<Vec<E>> {
        let method = self.method(name, ResultShape::EntityList)?;
        self.load_entities(method, args, &Sort::unsorted(), None)
    }

    /// Exactly one entity.
    ///
    /// # Errors
    /// - `NotFound` for zero rows, `TooManyRows` for more than one.
    pub fn one<E: Entity>(&self, name: &str, args: &Args) -> RepoResult<E> {
        let method = self.method(name, ResultShape::EntityOne)?;
        let entities = self.load_entities(method, args, &Sort::unsorted(), None)?;
        at_most_one(name, entities)?.ok_or_else(|| RepoError::NotFound {
            method: name.to_string(),
        })
    }

    /// At most one entity.
    pub fn optional<E: Entity>(&self, name: &str, args: &Args) -> RepoResult<Option<E>> {
        let method = self.method(name, ResultShape::EntityOptional)?;
        let entities = self.load_entities(method, args, &Sort::unsorted(), None)?;
        at_most_one(name, entities)
    }

    pub fn page<E: Entity>(
        &self,
        name: &str,
        args: &Args,
        request: &PageRequest,
    ) -> RepoResult<Page<E>> {
        let method = self.method(name, ResultShape::EntityPage)?;
        let content = self.load_entities(method, args, request.sort(), Some(request))?;
        let total = self.page_total(method, args, request, content.len())?;
        Ok(Page::new(content, request, total))
    }

    /// Rows mapped to `P`; derived queries select only `P::FIELDS`.
    pub fn projections<P: Projection>(&self, name: &str, args: &Args) -> RepoResult<Vec<P>> {
        let method = self.method(name, ResultShape::ProjectionList)?;
        let statement = self.select(
            method,
            args,
            Selection::Properties(P::FIELDS),
            &Sort::unsorted(),
            None,
        )?;
        map_projections(self.session.query_table(&statement.sql, &statement.binds)?)
    }

    pub fn projection_page<P: Projection>(
        &self,
        name: &str,
        args: &Args,
        request: &PageRequest,
    ) -> RepoResult<Page<P>> {
        let method = self.method(name, ResultShape::ProjectionPage)?;
        let statement = self.select(
            method,
            args,
            Selection::Properties(P::FIELDS),
            request.sort(),
            Some(request),
        )?;
        let content: Vec<P> =
            map_projections(self.session.query_table(&statement.sql, &statement.binds)?)?;
        let total = self.page_total(method, args, request, content.len())?;
        Ok(Page::new(content, request, total))
    }

    /// First column of every row.
    pub fn scalars<V: FromSql>(&self, name: &str, args: &Args) -> RepoResult<Vec<V>> {
        let method = self.method(name, ResultShape::ScalarList)?;
        let statement = self.select(method, args, Selection::Entity, &Sort::unsorted(), None)?;
        map_scalars(self.session.query_table(&statement.sql, &statement.binds)?)
    }

    pub fn count(&self, name: &str, args: &Args) -> RepoResult<i64> {
        let method = self.method(name, ResultShape::Count)?;
        let statement = match &method.source {
            QuerySource::Derived(derived) => derived.render_count(args.positional())?,
            QuerySource::Literal { query, .. } => query.render(args)?,
        };
        single_integer(&self.session.query_table(&statement.sql, &statement.binds)?)
    }

    pub fn exists(&self, name: &str, args: &Args) -> RepoResult<bool> {
        let method = self.method(name, ResultShape::Exists)?;
        let statement = match &method.source {
            QuerySource::Derived(derived) => derived.render_exists(args.positional())?,
            QuerySource::Literal { query, .. } => {
                let inner = query.render(args)?;
                Statement::new(format!("SELECT EXISTS({})", inner.sql), inner.binds)
            }
        };
        Ok(single_integer(&self.session.query_table(&statement.sql, &statement.binds)?)? != 0)
    }

    /// Runs a mutating method and returns the affected-row count.
    ///
    /// Derived deletes detach the deleted rows. Literal statements flush
    /// and clear the session as their `Modifying` options say.
    pub fn update(&self, name: &str, args: &Args) -> RepoResult<usize> {
        let method = self.method(name, ResultShape::AffectedRows)?;
        let schema = self.registry.schema();
        let started_at = Instant::now();

        let affected = match &method.source {
            QuerySource::Derived(derived) => {
                let keys = derived.render_key_select(args.positional())?;
                let deleted = self.session.query_table(&keys.sql, &keys.binds)?;
                let statement = derived.render_delete(args.positional())?;
                let affected = self.session.execute(&statement.sql, &statement.binds)?;
                for row in &deleted.rows {
                    if let Some(id) = row.first() {
                        self.session.detach_key(schema, id);
                    }
                }
                affected
            }
            QuerySource::Literal { query, .. } => {
                if method.modifying.flush_automatically {
                    self.session.flush()?;
                }
                let statement = query.render(args)?;
                let affected = self.session.execute(&statement.sql, &statement.binds)?;
                if method.modifying.clear_automatically {
                    self.session.clear();
                }
                affected
            }
        };

        info!(
            "event=bulk_update module=repo status=ok entity={} method={} rows={} duration_ms={}",
            schema.entity,
            name,
            affected,
            started_at.elapsed().as_millis()
        );
        Ok(affected)
    }

    fn method(&self, name: &str, shape: ResultShape) -> RepoResult<&'static QueryMethod> {
        Ok(self.registry.get(name, shape)?)
    }

    fn select(
        &self,
        method: &QueryMethod,
        args: &Args,
        selection: Selection<'_>,
        sort: &Sort,
        page: Option<&PageRequest>,
    ) -> RepoResult<Statement> {
        match &method.source {
            QuerySource::Derived(derived) => {
                derived.render_select(args.positional(), selection, sort, page)
            }
            QuerySource::Literal { query, .. } => {
                let order = wrapped_order_clause(self.registry.schema(), sort, method.hints.native)?;
                Ok(wrap_paged(query.render(args)?, &order, page))
            }
        }
    }

    fn load_entities<E: Entity>(
        &self,
        method: &QueryMethod,
        args: &Args,
        sort: &Sort,
        page: Option<&PageRequest>,
    ) -> RepoResult<Vec<E>> {
        if !std::ptr::eq(E::schema(), self.registry.schema()) {
            return Err(RepoError::Mapping(format!(
                "`{}` is registered for {}, not {}",
                method.name,
                self.registry.schema().entity,
                E::schema().entity
            )));
        }

        let statement = self.select(method, args, Selection::Entity, sort, page)?;
        self.session
            .acquire_lock(&method.name, E::schema(), method.hints.lock)?;
        let table = self.session.query_table(&statement.sql, &statement.binds)?;
        let layout = match method.source {
            QuerySource::Derived(_) => RowLayout::Leading,
            QuerySource::Literal { .. } => RowLayout::Named,
        };
        let mut entities = self
            .session
            .materialize(&table, layout, method.hints.read_only)?;
        for property in &method.hints.fetch {
            self.session
                .load_references_with(&mut entities, property, method.hints.read_only)?;
        }
        Ok(entities)
    }

    /// Total element count for a page whose content has `fetched` rows.
    ///
    /// The count query is skipped when the content alone determines the total.
    fn page_total(
        &self,
        method: &QueryMethod,
        args: &Args,
        request: &PageRequest,
        fetched: usize,
    ) -> RepoResult<u64> {
        let fetched = fetched as u64;
        if fetched < u64::from(request.size()) && (fetched > 0 || request.offset() == 0) {
            return Ok(request.offset() + fetched);
        }

        let statement = match &method.source {
            QuerySource::Derived(derived) => derived.render_count(args.positional())?,
            QuerySource::Literal { query, count } => match count {
                Some(count) => count.render_lenient(args)?,
                None => wrap_count(query.render(args)?),
            },
        };
        let mut total =
            single_integer(&self.session.query_table(&statement.sql, &statement.binds)?)?;
        if let QuerySource::Derived(derived) = &method.source {
            if let Some(limit) = derived.limit() {
                total = total.min(i64::from(limit));
            }
        }
        Ok(u64::try_from(total).unwrap_or(0))
    }
}

fn at_most_one<E>(name: &str, entities: Vec<E>) -> RepoResult<Option<E>> {
    if entities.len() > 1 {
        return Err(RepoError::TooManyRows {
            method: name.to_string(),
            actual: entities.len(),
        });
    }
    Ok(entities.into_iter().next())
}

