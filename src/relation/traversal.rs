//! Operations bound to one owner instance and one of its relations.
//!
//! Reads (`find_all`, `find`, `count`) go to the related type's adapter and
//! fail with [`ModelError::NoAdapterSupport`] when it lacks the capability.
//! `has` asks the owner type's adapter.
//!
//! Writes (`create`, `add`, `remove`) first offer the whole batch to the
//! adapter's bulk method. Without one, items are processed one at a time in
//! input order and the first error stops the loop. Items handled before the
//! failure stay committed.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::adapter::Capability;
use crate::error::ModelError;
use crate::instance::Instance;
use crate::relation::{Relation, RelationKind};
use crate::value::{Attributes, Query, Record, Related};

/// A relation bound to its owner instance.
#[derive(Debug, Clone)]
pub struct RelationHandle {
    owner: Instance,
    relation: Arc<Relation>,
}

impl Instance {
    /// Operations for the relation this instance's type owns under `name`.
    pub fn relation(&self, name: &str) -> Result<RelationHandle, ModelError> {
        let relation = self
            .model()
            .relation(name)
            .ok_or_else(|| ModelError::UnknownRelation {
                model: self.model().type_name().to_owned(),
                name: name.to_owned(),
            })?;
        Ok(RelationHandle {
            owner: self.clone(),
            relation,
        })
    }
}

impl RelationHandle {
    /// Instance the relation is bound to.
    pub fn owner(&self) -> &Instance {
        &self.owner
    }

    /// The declared relation.
    pub fn descriptor(&self) -> &Relation {
        &self.relation
    }

    // --- Reads ---

    /// Related instances matching `query`.
    #[instrument(skip_all, fields(relation = %self.relation.role()))]
    pub async fn find_all(&self, query: impl Into<Query>) -> Result<Vec<Instance>, ModelError> {
        let query = query.into();
        let other = self.relation.other();
        let rows = other
            .adapter()
            .related_find_all(&self.relation, &self.owner, &query)
            .await?;
        debug!(count = rows.len(), "Related rows loaded");
        Ok(rows.into_iter().map(|row| other.create(row)).collect())
    }

    /// Alias of [`find_all`](Self::find_all).
    pub async fn all(&self, query: impl Into<Query>) -> Result<Vec<Instance>, ModelError> {
        self.find_all(query).await
    }

    /// First related instance matching `query`.
    #[instrument(skip_all, fields(relation = %self.relation.role()))]
    pub async fn find(&self, query: impl Into<Query>) -> Result<Option<Instance>, ModelError> {
        let query = query.into();
        let other = self.relation.other();
        let row = other
            .adapter()
            .related_find(&self.relation, &self.owner, &query)
            .await?;
        Ok(row.map(|row| other.create(row)))
    }

    /// Alias of [`find`](Self::find).
    pub async fn get(&self, query: impl Into<Query>) -> Result<Option<Instance>, ModelError> {
        self.find(query).await
    }

    /// Alias of [`find`](Self::find).
    pub async fn find_one(&self, query: impl Into<Query>) -> Result<Option<Instance>, ModelError> {
        self.find(query).await
    }

    /// Number of related instances matching `query`.
    #[instrument(skip_all, fields(relation = %self.relation.role()))]
    pub async fn count(&self, query: impl Into<Query>) -> Result<u64, ModelError> {
        let query = query.into();
        self.relation
            .other()
            .adapter()
            .related_count(&self.relation, &self.owner, &query)
            .await
    }

    /// Whether `candidate` is related to the owner.
    #[instrument(skip_all, fields(relation = %self.relation.role()))]
    pub async fn has(&self, candidate: &Instance) -> Result<bool, ModelError> {
        self.owner
            .model()
            .adapter()
            .related_has(&self.relation, &self.owner, candidate)
            .await
    }

    // --- Writes ---

    /// Creates related instances and links them to the owner.
    ///
    /// Returns the created instances in input order.
    #[instrument(skip_all, fields(relation = %self.relation.role(), items = items.len()))]
    pub async fn create<R>(&self, items: Vec<R>) -> Result<Vec<Instance>, ModelError>
    where
        R: Into<Record>,
    {
        let other = self.relation.other();
        let records: Vec<Record> = items.into_iter().map(Into::into).collect();
        let rows: Vec<Attributes> = records
            .iter()
            .map(|record| match record {
                Record::Attributes(attributes) => attributes.clone(),
                Record::Instance(instance) => instance.attributes(),
            })
            .collect();

        match other
            .adapter()
            .related_create(&self.relation, &self.owner, &rows)
            .await
        {
            Ok(created) => {
                info!(count = created.len(), "Related instances created");
                return Ok(created.into_iter().map(|row| other.create(row)).collect());
            }
            Err(e) if e.is_unsupported(Capability::RelatedCreate) => {}
            Err(e) => return Err(e),
        }

        let mut created = Vec::with_capacity(records.len());
        for record in records {
            let related = other.create(record);
            self.create_one_local(&related).await?;
            created.push(related);
        }
        info!(count = created.len(), "Related instances created");
        Ok(created)
    }

    /// Single-item form of [`create`](Self::create).
    pub async fn create_one(&self, item: impl Into<Record>) -> Result<Instance, ModelError> {
        let mut created = self.create(vec![item.into()]).await?;
        created.pop().ok_or_else(|| {
            ModelError::adapter("related.create returned no instance")
        })
    }

    async fn create_one_local(&self, related: &Instance) -> Result<(), ModelError> {
        if self.relation.through().is_some() {
            related.save().await?;
            self.add(vec![related.clone()]).await?;
            return Ok(());
        }

        if self.relation.kind() == RelationKind::HasMany {
            related.set(self.relation.foreign_key(), self.owner.primary()?);
        }
        related.save().await?;
        if self.relation.kind().key_on_owner() {
            self.owner
                .set(self.relation.foreign_key(), related.primary()?);
            self.owner.save().await?;
        }
        Ok(())
    }

    /// Links instances (or bare primary keys) to the owner.
    ///
    /// Ids are resolved with one `find_all` on the related type; ids with no
    /// matching row are skipped. Returns the linked instances.
    #[instrument(skip_all, fields(relation = %self.relation.role(), items = items.len()))]
    pub async fn add<R>(&self, items: Vec<R>) -> Result<Vec<Instance>, ModelError>
    where
        R: Into<Related>,
    {
        let related = self.resolve(items).await?;

        match self
            .owner
            .model()
            .adapter()
            .related_add(&self.relation, &self.owner, &related)
            .await
        {
            Ok(()) => {
                info!(count = related.len(), "Related instances added");
                return Ok(related);
            }
            Err(e) if e.is_unsupported(Capability::RelatedAdd) => {}
            Err(e) => return Err(e),
        }

        for instance in &related {
            self.link(instance).await?;
        }
        info!(count = related.len(), "Related instances added");
        Ok(related)
    }

    /// Single-item form of [`add`](Self::add).
    pub async fn add_one(&self, item: impl Into<Related>) -> Result<Vec<Instance>, ModelError> {
        self.add(vec![item.into()]).await
    }

    async fn link(&self, related: &Instance) -> Result<(), ModelError> {
        if let (Some(through), Some(through_key)) =
            (self.relation.through(), self.relation.through_key())
        {
            let mut row = Attributes::new();
            row.insert(self.relation.foreign_key().to_owned(), self.owner.primary()?);
            row.insert(through_key.to_owned(), related.primary()?);
            through.build(row).save().await?;
            return Ok(());
        }

        if self.relation.kind() == RelationKind::HasMany {
            related.set(self.relation.foreign_key(), self.owner.primary()?);
        }
        related.save().await?;
        if self.relation.kind().key_on_owner() {
            self.owner
                .set(self.relation.foreign_key(), related.primary()?);
            self.owner.save().await?;
        }
        Ok(())
    }

    /// Unlinks instances (or bare primary keys) from the owner.
    ///
    /// Many-to-many removes the join rows. Other kinds null the foreign key
    /// and save the related instance, then the owner when it stores the key.
    #[instrument(skip_all, fields(relation = %self.relation.role(), items = items.len()))]
    pub async fn remove<R>(&self, items: Vec<R>) -> Result<Vec<Instance>, ModelError>
    where
        R: Into<Related>,
    {
        let related = self.resolve(items).await?;

        match self
            .owner
            .model()
            .adapter()
            .related_remove(&self.relation, &self.owner, &related)
            .await
        {
            Ok(()) => {
                info!(count = related.len(), "Related instances removed");
                return Ok(related);
            }
            Err(e) if e.is_unsupported(Capability::RelatedRemove) => {}
            Err(e) => return Err(e),
        }

        for instance in &related {
            self.unlink(instance).await?;
        }
        info!(count = related.len(), "Related instances removed");
        Ok(related)
    }

    /// Single-item form of [`remove`](Self::remove).
    pub async fn remove_one(&self, item: impl Into<Related>) -> Result<Vec<Instance>, ModelError> {
        self.remove(vec![item.into()]).await
    }

    async fn unlink(&self, related: &Instance) -> Result<(), ModelError> {
        if let (Some(through), Some(through_key)) =
            (self.relation.through(), self.relation.through_key())
        {
            let query = Query::new()
                .with(self.relation.foreign_key(), self.owner.primary()?)
                .with(through_key, related.primary()?);
            if let Some(join) = through.find(query).await? {
                join.remove().await?;
            }
            return Ok(());
        }

        if self.relation.kind() == RelationKind::HasMany {
            related.set(self.relation.foreign_key(), Value::Null);
        }
        related.save().await?;
        if self.relation.kind().key_on_owner() {
            self.owner.set(self.relation.foreign_key(), Value::Null);
            self.owner.save().await?;
        }
        Ok(())
    }

    /// Replaces bare ids with instances loaded from the related type,
    /// keeping input order.
    async fn resolve<R>(&self, items: Vec<R>) -> Result<Vec<Instance>, ModelError>
    where
        R: Into<Related>,
    {
        let items: Vec<Related> = items.into_iter().map(Into::into).collect();
        let ids: Vec<Value> = items
            .iter()
            .filter_map(|item| match item {
                Related::Id(id) => Some(id.clone()),
                Related::Instance(_) => None,
            })
            .collect();

        if ids.is_empty() {
            return Ok(items
                .into_iter()
                .filter_map(|item| match item {
                    Related::Instance(instance) => Some(instance),
                    Related::Id(_) => None,
                })
                .collect());
        }

        let other = self.relation.other();
        let key = other
            .primary_key()
            .ok_or_else(|| ModelError::UndefinedPrimaryKey {
                model: other.type_name().to_owned(),
            })?;
        let limit = ids.len();
        let found = other
            .find_all(Query::any_of(key.clone(), ids).with("limit", limit))
            .await?;

        let mut resolved = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Related::Instance(instance) => resolved.push(instance),
                Related::Id(id) => {
                    let hit = found
                        .iter()
                        .find(|candidate| candidate.get(&key).as_ref() == Some(&id));
                    match hit {
                        Some(instance) => resolved.push(instance.clone()),
                        None => warn!(id = %id, "Related id not found, skipping"),
                    }
                }
            }
        }
        Ok(resolved)
    }
}
