//! Session: identity map and unit of work over one SQLite connection.
//!
//! # Responsibility
//! - Track the state of every entity row read or written through it.
//! - Write staged changes back on `flush`.
//! - Count and log every executed statement.
//!
//! # Invariants
//! - At most one managed state exists per `(table, primary key)`.
//! - A row already managed resolves to the managed state, not the fresh row.
//! - Read-only entries carry no snapshot and are never written by `flush`.
//! - Pending changes are flushed before every query (auto flush).

use crate::model::schema::{Entity, EntitySchema};
use crate::query::registry::LockKind;
use crate::repo::error::{RepoError, RepoResult};
use log::{debug, info, warn};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::time::Instant;

/// Primary key usable as a map key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum KeyValue {
    Integer(i64),
    Text(String),
}

impl KeyValue {
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(number) => Some(Self::Integer(*number)),
            Value::Text(text) => Some(Self::Text(text.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct EntityKey {
    table: &'static str,
    id: KeyValue,
}

impl EntityKey {
    fn of(schema: &EntitySchema, id: &Value) -> Option<Self> {
        KeyValue::from_value(id).map(|id| Self {
            table: schema.table,
            id,
        })
    }
}

#[derive(Debug)]
struct ManagedEntry {
    schema: &'static EntitySchema,
    values: Vec<Value>,
    /// Last state known to match the database; `None` for read-only entries.
    snapshot: Option<Vec<Value>>,
}

#[derive(Debug, Default)]
struct PersistenceContext {
    entries: BTreeMap<EntityKey, ManagedEntry>,
}

/// Result rows with their column labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Where entity columns sit in a result row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLayout {
    /// First `column_count` columns in schema order.
    Leading,
    /// Looked up by mapped column name.
    Named,
}

/// Unit of work bound to one connection. Not thread-safe.
pub struct Session<'conn> {
    conn: &'conn Connection,
    context: RefCell<PersistenceContext>,
    statements: Cell<u64>,
}

impl<'conn> Session<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            context: RefCell::new(PersistenceContext::default()),
            statements: Cell::new(0),
        }
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    /// Statements executed through this session so far, flushes included.
    pub fn statement_count(&self) -> u64 {
        self.statements.get()
    }

    pub fn reset_statement_count(&self) {
        self.statements.set(0);
    }

    pub fn is_in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Number of managed entity states.
    pub fn managed_count(&self) -> usize {
        self.context.borrow().entries.len()
    }

    /// Runs `work` in a deferred transaction.
    ///
    /// Commits after a final flush when `work` succeeds and rolls back
    /// otherwise. The session is cleared either way.
    pub fn transaction<T>(&self, work: impl FnOnce(&Self) -> RepoResult<T>) -> RepoResult<T> {
        let tx = self.conn.unchecked_transaction()?;
        let outcome = work(self).and_then(|value| self.flush().map(|_| value));
        let result = match outcome {
            Ok(value) => tx.commit().map(|()| value).map_err(RepoError::from),
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(
                        "event=session_tx module=session status=error error_code=rollback_failed error={}",
                        rollback_err
                    );
                }
                Err(err)
            }
        };
        self.clear();
        result
    }

    /// Writes changed columns of every non-read-only managed entity.
    ///
    /// Returns the number of rows updated.
    pub fn flush(&self) -> RepoResult<usize> {
        let pending: Vec<(EntityKey, &'static EntitySchema, Vec<Value>, Vec<usize>)> = {
            let context = self.context.borrow();
            context
                .entries
                .iter()
                .filter_map(|(key, entry)| {
                    let snapshot = entry.snapshot.as_ref()?;
                    let changed: Vec<usize> = (1..entry.values.len())
                        .filter(|&index| entry.values.get(index) != snapshot.get(index))
                        .collect();
                    (!changed.is_empty())
                        .then(|| (key.clone(), entry.schema, entry.values.clone(), changed))
                })
                .collect()
        };
        if pending.is_empty() {
            return Ok(0);
        }

        let started_at = Instant::now();
        for (key, schema, values, changed) in &pending {
            let mut assignments = Vec::with_capacity(changed.len());
            let mut binds = Vec::with_capacity(changed.len() + 1);
            for (index, mapping) in schema.mappings().enumerate() {
                if changed.contains(&index) {
                    assignments.push(format!("{} = ?", mapping.column));
                    binds.push(values[index].clone());
                }
            }
            binds.push(values[0].clone());
            let sql = format!(
                "UPDATE {} SET {} WHERE {} = ?",
                schema.table,
                assignments.join(", "),
                schema.id.column
            );
            self.run_execute("flush", &sql, &binds)?;

            if let Some(entry) = self.context.borrow_mut().entries.get_mut(key) {
                entry.snapshot = Some(values.clone());
            }
        }

        info!(
            "event=session_flush module=session status=ok updated={} duration_ms={}",
            pending.len(),
            started_at.elapsed().as_millis()
        );
        Ok(pending.len())
    }

    /// Forgets every managed state without writing it.
    pub fn clear(&self) {
        let mut context = self.context.borrow_mut();
        let cleared = context.entries.len();
        context.entries.clear();
        debug!("event=session_clear module=session status=ok cleared={cleared}");
    }

    /// Stops tracking `entity`. Returns whether it was managed.
    pub fn detach<E: Entity>(&self, entity: &E) -> bool {
        self.detach_key(E::schema(), &entity.id_value())
    }

    pub fn contains<E: Entity>(&self, entity: &E) -> bool {
        self.managed_values(E::schema(), &entity.id_value()).is_some()
    }

    /// Stages `entity`'s current field values for the next flush.
    ///
    /// Returns `false` when the entity is not managed by this session.
    pub fn stage<E: Entity>(&self, entity: &E) -> RepoResult<bool> {
        Ok(self.stage_values(E::schema(), entity.to_values()?))
    }

    /// Runs a hand-written query whose columns carry the mapped column names.
    pub fn query_entities<E: Entity>(&self, sql: &str, binds: &[Value]) -> RepoResult<Vec<E>> {
        let table = self.query_table(sql, binds)?;
        self.materialize(&table, RowLayout::Named, false)
    }

    pub(crate) fn detach_key(&self, schema: &EntitySchema, id: &Value) -> bool {
        let Some(key) = EntityKey::of(schema, id) else {
            return false;
        };
        self.context.borrow_mut().entries.remove(&key).is_some()
    }

    pub(crate) fn detach_all(&self, schema: &EntitySchema) {
        self.context
            .borrow_mut()
            .entries
            .retain(|key, _| key.table != schema.table);
    }

    pub(crate) fn managed_values(&self, schema: &EntitySchema, id: &Value) -> Option<Vec<Value>> {
        let key = EntityKey::of(schema, id)?;
        self.context
            .borrow()
            .entries
            .get(&key)
            .map(|entry| entry.values.clone())
    }

    /// Returns the managed state for the row, registering `values` when new.
    pub(crate) fn manage(
        &self,
        schema: &'static EntitySchema,
        values: Vec<Value>,
        read_only: bool,
    ) -> RepoResult<Vec<Value>> {
        let key = values
            .first()
            .and_then(|id| EntityKey::of(schema, id))
            .ok_or_else(|| {
                RepoError::InvalidData(format!("{} row has no usable primary key", schema.entity))
            })?;

        let mut context = self.context.borrow_mut();
        if let Some(entry) = context.entries.get(&key) {
            return Ok(entry.values.clone());
        }
        let snapshot = if read_only { None } else { Some(values.clone()) };
        context.entries.insert(
            key,
            ManagedEntry {
                schema,
                values: values.clone(),
                snapshot,
            },
        );
        Ok(values)
    }

    /// Registers `values` as the clean state just written to the database.
    pub(crate) fn register_clean(
        &self,
        schema: &'static EntitySchema,
        values: Vec<Value>,
    ) -> RepoResult<()> {
        let key = values
            .first()
            .and_then(|id| EntityKey::of(schema, id))
            .ok_or_else(|| {
                RepoError::InvalidData(format!("{} row has no usable primary key", schema.entity))
            })?;
        self.context.borrow_mut().entries.insert(
            key,
            ManagedEntry {
                schema,
                values: values.clone(),
                snapshot: Some(values),
            },
        );
        Ok(())
    }

    pub(crate) fn stage_values(&self, schema: &EntitySchema, values: Vec<Value>) -> bool {
        let Some(key) = values.first().and_then(|id| EntityKey::of(schema, id)) else {
            return false;
        };
        match self.context.borrow_mut().entries.get_mut(&key) {
            Some(entry) => {
                entry.values = values;
                true
            }
            None => false,
        }
    }

    /// Executes a read after flushing pending changes.
    pub(crate) fn query_table(&self, sql: &str, binds: &[Value]) -> RepoResult<ResultTable> {
        self.flush()?;

        let started_at = Instant::now();
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let width = columns.len();
        let mut rows = stmt.query(params_from_iter(binds.iter()))?;
        let mut table = ResultTable {
            columns,
            rows: Vec::new(),
        };
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for index in 0..width {
                values.push(row.get::<_, Value>(index)?);
            }
            table.rows.push(values);
        }

        self.record("query", sql, table.rows.len(), started_at);
        Ok(table)
    }

    /// Executes a write without flushing first.
    pub(crate) fn execute(&self, sql: &str, binds: &[Value]) -> RepoResult<usize> {
        self.run_execute("execute", sql, binds)
    }

    /// Executes an insert and returns the new rowid.
    pub(crate) fn insert(&self, sql: &str, binds: &[Value]) -> RepoResult<i64> {
        self.run_execute("insert", sql, binds)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Maps `table` rows to entities through the identity map.
    pub(crate) fn materialize<E: Entity>(
        &self,
        table: &ResultTable,
        layout: RowLayout,
        read_only: bool,
    ) -> RepoResult<Vec<E>> {
        let schema = E::schema();
        let positions: Vec<usize> = match layout {
            RowLayout::Leading => {
                if table.columns.len() < schema.column_count() {
                    return Err(RepoError::Mapping(format!(
                        "{} needs {} columns, result has {}",
                        schema.entity,
                        schema.column_count(),
                        table.columns.len()
                    )));
                }
                (0..schema.column_count()).collect()
            }
            RowLayout::Named => schema
                .mappings()
                .map(|mapping| {
                    table
                        .columns
                        .iter()
                        .position(|column| column.eq_ignore_ascii_case(mapping.column))
                        .ok_or_else(|| {
                            RepoError::Mapping(format!(
                                "column `{}` of {} is missing from the result",
                                mapping.column, schema.entity
                            ))
                        })
                })
                .collect::<RepoResult<_>>()?,
        };

        let mut entities = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let values = positions.iter().map(|&index| row[index].clone()).collect();
            let state = self.manage(schema, values, read_only)?;
            entities.push(E::from_values(state)?);
        }
        Ok(entities)
    }

    /// Applies `lock` for `method` before its read runs.
    ///
    /// A pessimistic write takes SQLite's RESERVED lock, held until the
    /// enclosing transaction ends.
    pub(crate) fn acquire_lock(
        &self,
        method: &str,
        schema: &EntitySchema,
        lock: LockKind,
    ) -> RepoResult<()> {
        if lock == LockKind::None {
            return Ok(());
        }
        if !self.is_in_transaction() {
            return Err(RepoError::TransactionRequired {
                method: method.to_string(),
            });
        }
        if lock == LockKind::PessimisticWrite {
            let sql = format!(
                "UPDATE {table} SET {id} = {id} WHERE 0",
                table = schema.table,
                id = schema.id.column
            );
            self.run_execute("lock", &sql, &[])?;
        }
        info!(
            "event=lock_acquire module=session status=ok method={} lock={} table={}",
            method,
            lock.as_str(),
            schema.table
        );
        Ok(())
    }

    fn run_execute(&self, kind: &'static str, sql: &str, binds: &[Value]) -> RepoResult<usize> {
        let started_at = Instant::now();
        let changed = self.conn.execute(sql, params_from_iter(binds.iter()))?;
        self.record(kind, sql, changed, started_at);
        Ok(changed)
    }

    fn record(&self, kind: &'static str, sql: &str, rows: usize, started_at: Instant) {
        self.statements.set(self.statements.get() + 1);
        debug!(
            "event=query_exec module=session status=ok kind={} rows={} duration_ms={} sql={}",
            kind,
            rows,
            started_at.elapsed().as_millis(),
            sql
        );
    }
}
