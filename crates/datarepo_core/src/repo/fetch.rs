//! Batch loading of many-to-one references.
//!
//! One `IN (...)` query per reference property, skipping targets the session
//! already manages, so loading N entities with their references costs a
//! constant number of statements.

use super::session::{KeyValue, Session};
use crate::model::schema::Entity;
use crate::query::sql::{placeholders, ROOT_ALIAS};
use crate::repo::error::{ConfigError, RepoResult};
use log::debug;
use rusqlite::types::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

const FETCH_BATCH_SIZE: usize = 500;

impl Session<'_> {
    /// Loads the `property` reference of every entity in `entities`.
    pub fn load_references<E: Entity>(&self, entities: &mut [E], property: &str) -> RepoResult<()> {
        self.load_references_with(entities, property, false)
    }

    pub(crate) fn load_references_with<E: Entity>(
        &self,
        entities: &mut [E],
        property: &str,
        read_only: bool,
    ) -> RepoResult<()> {
        let schema = E::schema();
        let (index, mapping) = schema.require_property(property)?;
        let target = mapping
            .reference_target()
            .ok_or_else(|| ConfigError::InvalidFetchPath {
                method: "load_references".to_string(),
                path: property.to_string(),
            })?;
        let started_at = Instant::now();

        let mut keys = Vec::with_capacity(entities.len());
        for entity in entities.iter() {
            let values = entity.to_values()?;
            keys.push(values.get(index).cloned().unwrap_or(Value::Null));
        }

        let mut loaded: BTreeMap<KeyValue, Vec<Value>> = BTreeMap::new();
        let mut queued: BTreeSet<KeyValue> = BTreeSet::new();
        let mut missing: Vec<Value> = Vec::new();
        for key in &keys {
            let Some(map_key) = KeyValue::from_value(key) else {
                continue;
            };
            if loaded.contains_key(&map_key) || queued.contains(&map_key) {
                continue;
            }
            match self.managed_values(target, key) {
                Some(values) => {
                    loaded.insert(map_key, values);
                }
                None => {
                    queued.insert(map_key);
                    missing.push(key.clone());
                }
            }
        }

        for chunk in missing.chunks(FETCH_BATCH_SIZE) {
            let sql = format!(
                "SELECT {columns} FROM {table} {ROOT_ALIAS} WHERE {ROOT_ALIAS}.{id} IN ({keys})",
                columns = target.select_list(ROOT_ALIAS),
                table = target.table,
                id = target.id.column,
                keys = placeholders(chunk.len()),
            );
            let table = self.query_table(&sql, chunk)?;
            for row in table.rows {
                let state = self.manage(target, row, read_only)?;
                if let Some(map_key) = state.first().and_then(KeyValue::from_value) {
                    loaded.insert(map_key, state);
                }
            }
        }

        for (entity, key) in entities.iter_mut().zip(&keys) {
            let Some(values) = KeyValue::from_value(key).and_then(|key| loaded.get(&key)) else {
                continue;
            };
            entity.attach_reference(property, values.clone())?;
        }

        debug!(
            "event=fetch_batch module=session status=ok entity={} property={} entities={} queried={} duration_ms={}",
            schema.entity,
            property,
            entities.len(),
            missing.len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }
}
