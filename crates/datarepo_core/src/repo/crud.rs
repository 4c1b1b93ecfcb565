//! Generic CRUD repository and specification execution.
//!
//! # Responsibility
//! - Persist any `Entity` through its static schema.
//! - Keep the session identity map in step with every write.
//!
//! # Invariants
//! - `save` of a new entity with a generated key inserts immediately and
//!   assigns the key in place.
//! - `save` of a managed entity only stages its values; `flush` writes them.
//! - `save` of an unmanaged entity with a key is an upsert.
//! - Deletes detach the deleted rows from the session.

use super::session::{RowLayout, Session};
use crate::model::schema::Entity;
use crate::page::{Page, PageRequest, Sort};
use crate::query::criteria::Specification;
use crate::query::sql::{order_by_clause, placeholders, Joins, Statement, ROOT_ALIAS};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::mapping::single_integer;
use log::debug;
use rusqlite::types::Value;
use std::marker::PhantomData;

/// Basic persistence operations for one entity type.
pub trait CrudRepository<E: Entity> {
    /// Inserts, upserts or stages `entity`; a generated key is written back.
    fn save(&self, entity: &mut E) -> RepoResult<()>;

    fn save_all(&self, entities: &mut [E]) -> RepoResult<()> {
        for entity in entities {
            self.save(entity)?;
        }
        Ok(())
    }

    /// Returns the managed state when present, otherwise reads the row.
    fn find_by_id(&self, id: impl Into<Value>) -> RepoResult<Option<E>>;

    fn exists_by_id(&self, id: impl Into<Value>) -> RepoResult<bool>;

    fn find_all(&self) -> RepoResult<Vec<E>>;

    fn find_all_sorted(&self, sort: &Sort) -> RepoResult<Vec<E>>;

    fn find_all_paged(&self, request: &PageRequest) -> RepoResult<Page<E>>;

    fn count(&self) -> RepoResult<i64>;

    /// Deletes the entity's row. Entities without a key are ignored.
    fn delete(&self, entity: &E) -> RepoResult<()>;

    fn delete_by_id(&self, id: impl Into<Value>) -> RepoResult<()>;

    fn delete_all(&self) -> RepoResult<()>;
}

/// Queries driven by composable [`Specification`]s.
pub trait SpecificationExecutor<E: Entity> {
    fn find_all_matching(&self, spec: &Specification<E>) -> RepoResult<Vec<E>>;

    /// At most one match; more is `TooManyRows`.
    fn find_one_matching(&self, spec: &Specification<E>) -> RepoResult<Option<E>>;

    fn count_matching(&self, spec: &Specification<E>) -> RepoResult<i64>;

    fn find_page_matching(
        &self,
        spec: &Specification<E>,
        request: &PageRequest,
    ) -> RepoResult<Page<E>>;
}

/// Session-backed CRUD repository.
pub struct SqliteCrudRepository<'s, E> {
    session: &'s Session<'s>,
    _entity: PhantomData<fn() -> E>,
}

impl<'s, E: Entity> SqliteCrudRepository<'s, E> {
    pub fn new(session: &'s Session<'s>) -> Self {
        Self {
            session,
            _entity: PhantomData,
        }
    }

    pub fn session(&self) -> &'s Session<'s> {
        self.session
    }

    fn select(
        &self,
        spec: &Specification<E>,
        sort: &Sort,
        page: Option<&PageRequest>,
    ) -> RepoResult<Statement> {
        let schema = E::schema();
        let mut joins = Joins::default();
        let mut binds = Vec::new();
        let predicate = spec.render_where(&mut joins, &mut binds)?;
        let order = order_by_clause(schema, &[], sort, &mut joins)?;
        let mut sql = format!(
            "SELECT {columns} FROM {table} {ROOT_ALIAS}{joins}{predicate}{order}",
            columns = schema.select_list(ROOT_ALIAS),
            table = schema.table,
            joins = joins.render(),
        );
        if let Some(page) = page {
            sql.push_str(" LIMIT ? OFFSET ?");
            binds.push(Value::Integer(i64::from(page.size())));
            binds.push(Value::Integer(i64::try_from(page.offset()).unwrap_or(i64::MAX)));
        }
        Ok(Statement::new(sql, binds))
    }

    fn load(&self, statement: &Statement) -> RepoResult<Vec<E>> {
        let table = self.session.query_table(&statement.sql, &statement.binds)?;
        self.session.materialize(&table, RowLayout::Leading, false)
    }

    fn insert_generated(&self, entity: &mut E) -> RepoResult<()> {
        let schema = E::schema();
        let values = entity.to_values()?;
        let sql = if schema.fields.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", schema.table)
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                schema.table,
                schema
                    .fields
                    .iter()
                    .map(|field| field.column)
                    .collect::<Vec<_>>()
                    .join(", "),
                placeholders(schema.fields.len())
            )
        };
        let key = self.session.insert(&sql, &values[1..])?;
        entity.assign_id(Value::Integer(key))?;
        self.session.register_clean(schema, entity.to_values()?)?;
        debug!(
            "event=entity_insert module=repo status=ok entity={} id={}",
            schema.entity, key
        );
        Ok(())
    }

    fn upsert(&self, values: Vec<Value>) -> RepoResult<()> {
        let schema = E::schema();
        let columns: Vec<&str> = schema.mappings().map(|mapping| mapping.column).collect();
        let conflict = if schema.fields.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!(
                "DO UPDATE SET {}",
                schema
                    .fields
                    .iter()
                    .map(|field| format!("{0} = excluded.{0}", field.column))
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };
        let sql = format!(
            "INSERT INTO {table} ({columns}) VALUES ({values}) ON CONFLICT({id}) {conflict}",
            table = schema.table,
            columns = columns.join(", "),
            values = placeholders(columns.len()),
            id = schema.id.column,
        );
        self.session.execute(&sql, &values)?;
        self.session.register_clean(schema, values)
    }

    fn delete_key(&self, id: &Value) -> RepoResult<()> {
        if *id == Value::Null {
            return Ok(());
        }
        let schema = E::schema();
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            schema.table, schema.id.column
        );
        self.session.execute(&sql, std::slice::from_ref(id))?;
        self.session.detach_key(schema, id);
        Ok(())
    }
}

impl<E: Entity> CrudRepository<E> for SqliteCrudRepository<'_, E> {
    fn save(&self, entity: &mut E) -> RepoResult<()> {
        let schema = E::schema();
        if entity.id_value() == Value::Null {
            if !schema.id_generated {
                return Err(RepoError::InvalidData(format!(
                    "{} requires an assigned key",
                    schema.entity
                )));
            }
            return self.insert_generated(entity);
        }

        let values = entity.to_values()?;
        if self.session.stage_values(schema, values.clone()) {
            return Ok(());
        }
        self.upsert(values)
    }

    fn find_by_id(&self, id: impl Into<Value>) -> RepoResult<Option<E>> {
        let schema = E::schema();
        let id = id.into();
        if let Some(values) = self.session.managed_values(schema, &id) {
            return E::from_values(values).map(Some);
        }
        let statement = Statement::new(
            format!(
                "SELECT {} FROM {table} {ROOT_ALIAS} WHERE {ROOT_ALIAS}.{id_column} = ?",
                schema.select_list(ROOT_ALIAS),
                table = schema.table,
                id_column = schema.id.column,
            ),
            vec![id],
        );
        Ok(self.load(&statement)?.into_iter().next())
    }

    fn exists_by_id(&self, id: impl Into<Value>) -> RepoResult<bool> {
        let schema = E::schema();
        let id = id.into();
        if self.session.managed_values(schema, &id).is_some() {
            return Ok(true);
        }
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?)",
            schema.table, schema.id.column
        );
        Ok(single_integer(&self.session.query_table(&sql, &[id])?)? != 0)
    }

    fn find_all(&self) -> RepoResult<Vec<E>> {
        self.find_all_matching(&Specification::all())
    }

    fn find_all_sorted(&self, sort: &Sort) -> RepoResult<Vec<E>> {
        self.load(&self.select(&Specification::all(), sort, None)?)
    }

    fn find_all_paged(&self, request: &PageRequest) -> RepoResult<Page<E>> {
        self.find_page_matching(&Specification::all(), request)
    }

    fn count(&self) -> RepoResult<i64> {
        self.count_matching(&Specification::all())
    }

    fn delete(&self, entity: &E) -> RepoResult<()> {
        self.delete_key(&entity.id_value())
    }

    fn delete_by_id(&self, id: impl Into<Value>) -> RepoResult<()> {
        self.delete_key(&id.into())
    }

    fn delete_all(&self) -> RepoResult<()> {
        let schema = E::schema();
        let deleted = self
            .session
            .execute(&format!("DELETE FROM {}", schema.table), &[])?;
        self.session.detach_all(schema);
        debug!(
            "event=entity_delete_all module=repo status=ok entity={} rows={}",
            schema.entity, deleted
        );
        Ok(())
    }
}

impl<E: Entity> SpecificationExecutor<E> for SqliteCrudRepository<'_, E> {
    fn find_all_matching(&self, spec: &Specification<E>) -> RepoResult<Vec<E>> {
        self.load(&self.select(spec, &Sort::unsorted(), None)?)
    }

    fn find_one_matching(&self, spec: &Specification<E>) -> RepoResult<Option<E>> {
        let mut matches = self.find_all_matching(spec)?;
        if matches.len() > 1 {
            return Err(RepoError::TooManyRows {
                method: "find_one_matching".to_string(),
                actual: matches.len(),
            });
        }
        Ok(matches.pop())
    }

    fn count_matching(&self, spec: &Specification<E>) -> RepoResult<i64> {
        let schema = E::schema();
        let mut joins = Joins::default();
        let mut binds = Vec::new();
        let predicate = spec.render_where(&mut joins, &mut binds)?;
        let sql = format!(
            "SELECT COUNT(*) FROM {table} {ROOT_ALIAS}{joins}{predicate}",
            table = schema.table,
            joins = joins.render(),
        );
        single_integer(&self.session.query_table(&sql, &binds)?)
    }

    fn find_page_matching(
        &self,
        spec: &Specification<E>,
        request: &PageRequest,
    ) -> RepoResult<Page<E>> {
        let content = self.load(&self.select(spec, request.sort(), Some(request))?)?;
        let total = u64::try_from(self.count_matching(spec)?).unwrap_or(0);
        Ok(Page::new(content, request, total))
    }
}
