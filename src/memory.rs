//! # In-Memory Adapter
//!
//! [`MemoryAdapter`] keeps rows in process memory, one table per
//! [`Model::table_name`]. A single adapter can be shared by several model
//! types (clones share storage), which is what relation lookups need: a
//! many-to-many read walks the join table and the related table together.
//!
//! - Missing primary keys are assigned from a per-table counter starting at 1.
//! - Queries match by equality per key; `{ "$in": [...] }` matches any listed
//!   value. `offset` and `limit` paginate `find_all`, which pages by
//!   [`DEFAULT_LIMIT`] when the query names no limit.
//! - Bulk relation writes (`related_add`, `related_create`,
//!   `related_remove`) are left to the core's per-item path.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::adapter::Adapter;
use crate::error::ModelError;
use crate::instance::Instance;
use crate::model::Model;
use crate::relation::Relation;
use crate::value::{is_truthy, Attributes, Query, RawCollection, DEFAULT_LIMIT};

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Attributes>,
    next_id: u64,
}

/// Shared in-process storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    tables: Arc<Mutex<HashMap<String, Table>>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows stored under `table`.
    pub fn len(&self, table: &str) -> usize {
        self.tables
            .lock()
            .get(table)
            .map_or(0, |table| table.rows.len())
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    /// Copy of every row stored under `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Attributes> {
        self.tables
            .lock()
            .get(table)
            .map(|table| table.rows.clone())
            .unwrap_or_default()
    }

    /// Rows of `related`'s type linked to `owner`, filtered by `query`.
    fn scoped_rows(
        &self,
        relation: &Relation,
        owner: &Instance,
        query: &Query,
    ) -> Result<Vec<Attributes>, ModelError> {
        let other = relation.other();
        let other_key = primary_key_of(other)?;
        let foreign_key = relation.foreign_key();

        let through = relation.through().zip(relation.through_key());
        let anchor = if through.is_none() && relation.kind().key_on_owner() {
            owner.get(foreign_key).unwrap_or(Value::Null)
        } else {
            owner.primary()?
        };
        if anchor.is_null() {
            return Ok(Vec::new());
        }

        let tables = self.tables.lock();
        let mut scope = query.clone();
        match through {
            Some((join, through_key)) => {
                let ids: Vec<Value> = tables
                    .get(&join.table_name())
                    .map(|table| {
                        table
                            .rows
                            .iter()
                            .filter(|row| row.get(foreign_key) == Some(&anchor))
                            .filter_map(|row| row.get(through_key).cloned())
                            .collect()
                    })
                    .unwrap_or_default();
                scope.insert(other_key, json!({ "$in": ids }));
            }
            None if relation.kind().key_on_owner() => {
                scope.insert(other_key, anchor);
            }
            None => {
                scope.insert(foreign_key.to_owned(), anchor);
            }
        }

        let rows = select(tables.get(&other.table_name()), &scope);
        debug!(
            model = %other.type_name(),
            relation = %relation.role(),
            count = rows.len(),
            "Related rows selected"
        );
        Ok(rows)
    }
}

fn primary_key_of(model: &Model) -> Result<String, ModelError> {
    model
        .primary_key()
        .ok_or_else(|| ModelError::UndefinedPrimaryKey {
            model: model.type_name().to_owned(),
        })
}

fn matches(row: &Attributes, query: &Query) -> bool {
    query.iter().all(|(key, condition)| {
        if key == "offset" || key == "limit" {
            return true;
        }
        let actual = row.get(key).unwrap_or(&Value::Null);
        match condition.get("$in") {
            Some(Value::Array(values)) => values.contains(actual),
            _ => actual == condition,
        }
    })
}

fn select(table: Option<&Table>, query: &Query) -> Vec<Attributes> {
    table
        .map(|table| {
            table
                .rows
                .iter()
                .filter(|row| matches(row, query))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn paginate(rows: Vec<Attributes>, offset: u64, limit: Option<u64>) -> Vec<Attributes> {
    let limit = limit.map_or(usize::MAX, |limit| limit as usize);
    rows.into_iter().skip(offset as usize).take(limit).collect()
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn find(&self, model: &Model, query: &Query) -> Result<Option<Attributes>, ModelError> {
        let tables = self.tables.lock();
        let row = tables
            .get(&model.table_name())
            .and_then(|table| table.rows.iter().find(|row| matches(row, query)))
            .cloned();
        debug!(model = %model.type_name(), found = row.is_some(), "Find");
        Ok(row)
    }

    async fn find_all(&self, model: &Model, query: &Query) -> Result<RawCollection, ModelError> {
        let matched = select(self.tables.lock().get(&model.table_name()), query);
        let total = matched.len() as u64;
        let offset = query.offset().unwrap_or(0);
        let limit = query.limit().unwrap_or(DEFAULT_LIMIT);
        debug!(model = %model.type_name(), total, offset, limit, "Find all");
        Ok(RawCollection {
            rows: paginate(matched, offset, Some(limit)),
            total: Some(total),
            offset: Some(offset),
            limit: Some(limit),
        })
    }

    async fn count(&self, model: &Model, query: &Query) -> Result<u64, ModelError> {
        let count = select(self.tables.lock().get(&model.table_name()), query).len() as u64;
        debug!(model = %model.type_name(), count, "Count");
        Ok(count)
    }

    async fn remove_all(&self, model: &Model, query: &Query) -> Result<(), ModelError> {
        let mut tables = self.tables.lock();
        if let Some(table) = tables.get_mut(&model.table_name()) {
            let before = table.rows.len();
            table.rows.retain(|row| !matches(row, query));
            info!(
                model = %model.type_name(),
                removed = before - table.rows.len(),
                size = table.rows.len(),
                "Removed all"
            );
        }
        Ok(())
    }

    async fn save(
        &self,
        instance: &Instance,
        changed: &Attributes,
    ) -> Result<Option<Attributes>, ModelError> {
        let model = instance.model();
        let snapshot = instance.attributes();
        let key = model.primary_key();
        let id = match &key {
            Some(_) => instance.primary()?,
            None => Value::Null,
        };

        let mut tables = self.tables.lock();
        let table = tables.entry(model.table_name()).or_default();

        let Some(key) = key else {
            table.rows.push(snapshot);
            info!(model = %model.type_name(), size = table.rows.len(), "Inserted");
            return Ok(None);
        };

        if is_truthy(&id) {
            if let Some(row) = table.rows.iter_mut().find(|row| row.get(&key) == Some(&id)) {
                for (name, value) in changed {
                    row.insert(name.clone(), value.clone());
                }
                info!(model = %model.type_name(), %id, "Updated");
                return Ok(Some(row.clone()));
            }
            if let Some(n) = id.as_u64() {
                table.next_id = table.next_id.max(n);
            }
            table.rows.push(snapshot.clone());
            info!(model = %model.type_name(), %id, size = table.rows.len(), "Inserted");
            return Ok(Some(snapshot));
        }

        table.next_id += 1;
        let id = Value::from(table.next_id);
        let mut row = snapshot;
        row.insert(key, id.clone());
        table.rows.push(row.clone());
        info!(model = %model.type_name(), %id, size = table.rows.len(), "Inserted");
        Ok(Some(row))
    }

    async fn remove(&self, instance: &Instance) -> Result<(), ModelError> {
        let model = instance.model();
        let key = primary_key_of(model)?;
        let id = instance.primary()?;

        let mut tables = self.tables.lock();
        if let Some(table) = tables.get_mut(&model.table_name()) {
            table.rows.retain(|row| row.get(&key) != Some(&id));
            info!(model = %model.type_name(), %id, size = table.rows.len(), "Deleted");
        }
        Ok(())
    }

    async fn related_find_all(
        &self,
        relation: &Relation,
        owner: &Instance,
        query: &Query,
    ) -> Result<Vec<Attributes>, ModelError> {
        let rows = self.scoped_rows(relation, owner, query)?;
        Ok(paginate(rows, query.offset().unwrap_or(0), query.limit()))
    }

    async fn related_find(
        &self,
        relation: &Relation,
        owner: &Instance,
        query: &Query,
    ) -> Result<Option<Attributes>, ModelError> {
        Ok(self.scoped_rows(relation, owner, query)?.into_iter().next())
    }

    async fn related_count(
        &self,
        relation: &Relation,
        owner: &Instance,
        query: &Query,
    ) -> Result<u64, ModelError> {
        Ok(self.scoped_rows(relation, owner, query)?.len() as u64)
    }

    async fn related_has(
        &self,
        relation: &Relation,
        owner: &Instance,
        candidate: &Instance,
    ) -> Result<bool, ModelError> {
        let id = candidate.primary()?;
        if id.is_null() {
            return Ok(false);
        }
        let key = primary_key_of(relation.other())?;
        let rows = self.scoped_rows(relation, owner, &Query::new())?;
        Ok(rows.iter().any(|row| row.get(&key) == Some(&id)))
    }
}
