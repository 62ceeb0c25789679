//! # Lifecycle Controller
//!
//! Persistence operations on instances (`save`, `remove`) and on model types
//! (`find`, `find_all`, `count`, `remove_all`). Each one emits its
//! `before ...` event, delegates to the type's adapter and emits its
//! `after ...` event once the adapter succeeded.
//!
//! Instance events are emitted at type level first, then at instance level.
//! A missing adapter capability is not an error here: `save` and `remove`
//! complete locally, lookups return nothing.

use tracing::{debug, info, warn};

use crate::adapter::Capability;
use crate::error::ModelError;
use crate::events::Event;
use crate::instance::Instance;
use crate::model::Model;
use crate::value::{is_truthy, Attributes, Collection, Query, DEFAULT_LIMIT};

impl Instance {
    /// Persists the instance.
    ///
    /// An instance with a truthy primary key and no dirty attributes returns
    /// right after `before save` without touching the adapter. Otherwise the
    /// validators run; on failure a [`ModelError::Validation`] is returned and
    /// nothing is persisted.
    pub async fn save(&self) -> Result<(), ModelError> {
        let model = self.model().clone();
        let changed = self.changed();

        self.broadcast(&Event::BeforeSave {
            instance: self.clone(),
            changed: changed.clone(),
        });

        let persisted = self.primary().is_ok_and(|value| is_truthy(&value));
        if persisted && !self.is_dirty() {
            debug!(model = %model.type_name(), "Nothing to save");
            return Ok(());
        }

        if !self.is_valid() {
            let errors = self.errors();
            warn!(model = %model.type_name(), errors = errors.len(), "Validation failed");
            return Err(ModelError::Validation {
                instance: self.clone(),
                errors,
            });
        }

        debug!(model = %model.type_name(), changed = changed.len(), "Saving");
        let returned = match model.adapter().save(self, &changed).await {
            Ok(returned) => returned,
            Err(e) if e.is_unsupported(Capability::Save) => None,
            Err(e) => {
                warn!(model = %model.type_name(), error = %e, "Save failed");
                return Err(e);
            }
        };

        if let Some(attributes) = returned {
            self.merge_stored(attributes);
        }
        self.clear_dirty();
        info!(model = %model.type_name(), "Instance saved");

        self.broadcast(&Event::AfterSave {
            instance: self.clone(),
        });
        Ok(())
    }

    /// Removes the instance from storage and clears its primary key.
    pub async fn remove(&self) -> Result<(), ModelError> {
        let model = self.model().clone();

        self.broadcast(&Event::BeforeRemove {
            instance: self.clone(),
        });

        match model.adapter().remove(self).await {
            Ok(()) => {}
            Err(e) if e.is_unsupported(Capability::Remove) => {}
            Err(e) => {
                warn!(model = %model.type_name(), error = %e, "Remove failed");
                return Err(e);
            }
        }

        self.clear_primary();
        info!(model = %model.type_name(), "Instance removed");

        self.broadcast(&Event::AfterRemove {
            instance: self.clone(),
        });
        Ok(())
    }
}

impl Model {
    /// First instance matching `query`, hydrated.
    ///
    /// Numbers are shorthand for `{ "id": n }`.
    pub async fn find(&self, query: impl Into<Query>) -> Result<Option<Instance>, ModelError> {
        let query = query.into();
        debug!(model = %self.type_name(), op = "find", "Querying");
        self.emit(&Event::BeforeFind {
            query: query.clone(),
        });

        let row = match self.adapter().find(self, &query).await {
            Ok(row) => row,
            Err(e) if e.is_unsupported(Capability::Find) => None,
            Err(e) => {
                warn!(model = %self.type_name(), op = "find", error = %e, "Query failed");
                return Err(e);
            }
        };
        let instance = row.map(|attributes| self.create(attributes));

        self.emit(&Event::AfterFind {
            instance: instance.clone(),
        });
        Ok(instance)
    }

    /// Alias of [`find`](Self::find).
    pub async fn get(&self, query: impl Into<Query>) -> Result<Option<Instance>, ModelError> {
        self.find(query).await
    }

    /// Alias of [`find`](Self::find).
    pub async fn find_one(&self, query: impl Into<Query>) -> Result<Option<Instance>, ModelError> {
        self.find(query).await
    }

    /// Every instance matching `query`, hydrated, with pagination metadata.
    ///
    /// Missing metadata defaults to the row count, the query's `offset` (or 0)
    /// and the query's `limit` (or 50).
    pub async fn find_all(&self, query: impl Into<Query>) -> Result<Collection, ModelError> {
        let query = query.into();
        debug!(model = %self.type_name(), op = "findAll", "Querying");
        self.emit(&Event::BeforeFindAll {
            query: query.clone(),
        });

        let raw = match self.adapter().find_all(self, &query).await {
            Ok(raw) => raw,
            Err(e) if e.is_unsupported(Capability::FindAll) => Default::default(),
            Err(e) => {
                warn!(model = %self.type_name(), op = "findAll", error = %e, "Query failed");
                return Err(e);
            }
        };

        let total = raw.total.unwrap_or(raw.rows.len() as u64);
        let collection = Collection {
            items: raw.rows.into_iter().map(|row| self.create(row)).collect(),
            total,
            offset: raw.offset.or(query.offset()).unwrap_or(0),
            limit: raw.limit.or(query.limit()).unwrap_or(DEFAULT_LIMIT),
        };

        self.emit(&Event::AfterFindAll {
            collection: collection.clone(),
        });
        Ok(collection)
    }

    /// Alias of [`find_all`](Self::find_all).
    pub async fn all(&self, query: impl Into<Query>) -> Result<Collection, ModelError> {
        self.find_all(query).await
    }

    pub async fn count(&self, query: impl Into<Query>) -> Result<u64, ModelError> {
        let query = query.into();
        debug!(model = %self.type_name(), op = "count", "Querying");
        self.emit(&Event::BeforeCount {
            query: query.clone(),
        });

        let count = match self.adapter().count(self, &query).await {
            Ok(count) => count,
            Err(e) if e.is_unsupported(Capability::Count) => 0,
            Err(e) => {
                warn!(model = %self.type_name(), op = "count", error = %e, "Query failed");
                return Err(e);
            }
        };

        self.emit(&Event::AfterCount { count });
        Ok(count)
    }

    pub async fn remove_all(&self, query: impl Into<Query>) -> Result<(), ModelError> {
        let query = query.into();
        self.emit(&Event::BeforeRemoveAll {
            query: query.clone(),
        });

        match self.adapter().remove_all(self, &query).await {
            Ok(()) => {}
            Err(e) if e.is_unsupported(Capability::RemoveAll) => {}
            Err(e) => {
                warn!(model = %self.type_name(), op = "removeAll", error = %e, "Remove failed");
                return Err(e);
            }
        }
        info!(model = %self.type_name(), "Instances removed");

        self.emit(&Event::AfterRemoveAll);
        Ok(())
    }

    /// Builds an instance from `attributes` and saves it.
    pub async fn create_and_save(&self, attributes: Attributes) -> Result<Instance, ModelError> {
        let instance = self.build(attributes);
        instance.save().await?;
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attribute;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => Attributes::new(),
        }
    }

    fn record_events(model: &Model, names: &[&'static str]) -> Arc<Mutex<Vec<&'static str>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for &name in names {
            let seen = seen.clone();
            model.on(name, move |_| seen.lock().push(name));
        }
        seen
    }

    #[tokio::test]
    async fn test_save_without_adapter_completes_locally() {
        let post = Model::new("post");
        post.attr("id", Attribute::primary())
            .unwrap()
            .attr("title", Attribute::new())
            .unwrap();
        let seen = record_events(&post, &["before save", "after save"]);

        let draft = post.build(attrs(json!({ "title": "hello" })));
        draft.save().await.unwrap();

        assert!(!draft.is_dirty());
        assert_eq!(*seen.lock(), vec!["before save", "after save"]);
    }

    #[tokio::test]
    async fn test_clean_persisted_instance_skips_save() {
        let post = Model::new("post");
        post.attr("id", Attribute::primary()).unwrap();
        let seen = record_events(&post, &["before save", "after save"]);

        let stored = post.build(attrs(json!({ "id": 1 })));
        stored.clear_dirty();
        stored.save().await.unwrap();

        assert_eq!(*seen.lock(), vec!["before save"]);
    }

    #[tokio::test]
    async fn test_invalid_instance_is_not_saved() {
        let post = Model::new("post");
        post.attr("id", Attribute::primary())
            .unwrap()
            .attr("title", Attribute::new().required())
            .unwrap();

        let draft = post.create_empty();
        let err = draft.save().await.unwrap_err();

        assert_eq!(err.to_string(), "Validations failed.");
        assert_eq!(err.validation_errors().unwrap().len(), 1);
        assert!(!err.is_structural());
    }

    #[tokio::test]
    async fn test_remove_clears_primary_key() {
        let post = Model::new("post");
        post.attr("id", Attribute::primary()).unwrap();
        let seen = record_events(&post, &["before remove", "after remove"]);

        let stored = post.build(attrs(json!({ "id": 3 })));
        stored.remove().await.unwrap();

        assert_eq!(stored.primary().unwrap(), Value::Null);
        assert_eq!(*seen.lock(), vec!["before remove", "after remove"]);
    }

    #[tokio::test]
    async fn test_static_ops_without_adapter() {
        let post = Model::new("post");
        post.attr("id", Attribute::primary()).unwrap();

        assert!(post.find(1).await.unwrap().is_none());
        let all = post.find_all(Query::new().with("limit", 10)).await.unwrap();
        assert!(all.is_empty());
        assert_eq!(all.limit, 10);
        assert_eq!(all.offset, 0);
        assert_eq!(post.count(Query::new()).await.unwrap(), 0);
        post.remove_all(Query::new()).await.unwrap();
    }
}
