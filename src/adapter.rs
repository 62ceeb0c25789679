//! # Storage Adapters
//!
//! An [`Adapter`] is the pluggable storage backend of a model type. Every
//! method is optional: the provided implementations return
//! [`ModelError::NoAdapterSupport`], which the core reads as "capability
//! absent".
//!
//! How the core reacts to an absent capability depends on the operation:
//!
//! | Operation | Absent capability |
//! |---|---|
//! | `find`, `find_all`, `count`, `remove_all` | no-op result (`None`, empty, `0`) |
//! | `save`, `remove` | the lifecycle completes locally |
//! | `related_add`, `related_create`, `related_remove` | per-item fallback through the core |
//! | `related_find_all`, `related_find`, `related_count`, `related_has` | error is returned |
//!
//! `save` and `remove` go to the instance's own type. `related_add`,
//! `related_remove` and `related_has` go to the owning type of the relation;
//! `related_find_all`, `related_find`, `related_count` and `related_create`
//! go to the related type.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ModelError;
use crate::instance::Instance;
use crate::model::Model;
use crate::relation::Relation;
use crate::value::{Attributes, Query, RawCollection};

/// Adapter methods, used to name the missing one in
/// [`ModelError::NoAdapterSupport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Capability {
    Find,
    FindAll,
    Count,
    Save,
    Remove,
    RemoveAll,
    RelatedAdd,
    RelatedFindAll,
    RelatedFind,
    RelatedCount,
    RelatedCreate,
    RelatedHas,
    RelatedRemove,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Find => "find",
            Capability::FindAll => "findAll",
            Capability::Count => "count",
            Capability::Save => "save",
            Capability::Remove => "remove",
            Capability::RemoveAll => "removeAll",
            Capability::RelatedAdd => "related.add",
            Capability::RelatedFindAll => "related.findAll",
            Capability::RelatedFind => "related.find",
            Capability::RelatedCount => "related.count",
            Capability::RelatedCreate => "related.create",
            Capability::RelatedHas => "related.has",
            Capability::RelatedRemove => "related.remove",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn unsupported<T>(capability: Capability) -> Result<T, ModelError> {
    Err(ModelError::NoAdapterSupport(capability))
}

/// Storage backend of a model type.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    async fn find(&self, _model: &Model, _query: &Query) -> Result<Option<Attributes>, ModelError> {
        unsupported(Capability::Find)
    }

    async fn find_all(&self, _model: &Model, _query: &Query) -> Result<RawCollection, ModelError> {
        unsupported(Capability::FindAll)
    }

    async fn count(&self, _model: &Model, _query: &Query) -> Result<u64, ModelError> {
        unsupported(Capability::Count)
    }

    async fn remove_all(&self, _model: &Model, _query: &Query) -> Result<(), ModelError> {
        unsupported(Capability::RemoveAll)
    }

    /// Persists `changed`. Returned attributes are merged into the instance,
    /// which is how generated primary keys reach it.
    async fn save(
        &self,
        _instance: &Instance,
        _changed: &Attributes,
    ) -> Result<Option<Attributes>, ModelError> {
        unsupported(Capability::Save)
    }

    async fn remove(&self, _instance: &Instance) -> Result<(), ModelError> {
        unsupported(Capability::Remove)
    }

    /// Links every instance in `related` to `owner`.
    async fn related_add(
        &self,
        _relation: &Relation,
        _owner: &Instance,
        _related: &[Instance],
    ) -> Result<(), ModelError> {
        unsupported(Capability::RelatedAdd)
    }

    async fn related_find_all(
        &self,
        _relation: &Relation,
        _owner: &Instance,
        _query: &Query,
    ) -> Result<Vec<Attributes>, ModelError> {
        unsupported(Capability::RelatedFindAll)
    }

    async fn related_find(
        &self,
        _relation: &Relation,
        _owner: &Instance,
        _query: &Query,
    ) -> Result<Option<Attributes>, ModelError> {
        unsupported(Capability::RelatedFind)
    }

    async fn related_count(
        &self,
        _relation: &Relation,
        _owner: &Instance,
        _query: &Query,
    ) -> Result<u64, ModelError> {
        unsupported(Capability::RelatedCount)
    }

    /// Persists and links new related rows. Returned rows are hydrated.
    async fn related_create(
        &self,
        _relation: &Relation,
        _owner: &Instance,
        _rows: &[Attributes],
    ) -> Result<Vec<Attributes>, ModelError> {
        unsupported(Capability::RelatedCreate)
    }

    async fn related_has(
        &self,
        _relation: &Relation,
        _owner: &Instance,
        _candidate: &Instance,
    ) -> Result<bool, ModelError> {
        unsupported(Capability::RelatedHas)
    }

    async fn related_remove(
        &self,
        _relation: &Relation,
        _owner: &Instance,
        _related: &[Instance],
    ) -> Result<(), ModelError> {
        unsupported(Capability::RelatedRemove)
    }
}

/// Adapter every new model type starts with. Supports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAdapter;

impl Adapter for NoAdapter {}
