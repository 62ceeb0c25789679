//! # Relations
//!
//! A [`Relation`] describes how an owning type reaches another type under a
//! role name. Declarations register the descriptor under the owner, the other
//! type and (for many-to-many) the join type, so every participant can see
//! it. Lookups by role only consider relations the type owns.
//!
//! | Kind | Foreign key lives on | Default key |
//! |---|---|---|
//! | has many | other type | `<owner>_id` |
//! | belongs to | owner | `<other>_id` |
//! | has one | owner | `<other>_id` |
//! | has and belongs to many | join type | `<owner>_id` / `<other>_id` |
//!
//! A has many or has one with a `through_key` (and any relation with an
//! explicit `through`) keeps its keys on the join type, like many-to-many.
//!
//! Many-to-many relations go through a join type. Unless one is supplied, a
//! join type is synthesized once per unordered pair of types: named after both
//! types in sorted order, with an `id` primary key, both foreign keys, and a
//! `belongs to` relation back to each participant. The two join keys, and the
//! join roles derived from them, must differ, so a type joined to itself
//! needs explicit keys.
//!
//! Bound operations (`find_all`, `add`, ...) live in [`traversal`].

pub mod traversal;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::attribute::Attribute;
use crate::error::ModelError;
use crate::model::{create_model, Model, ModelOptions};

pub use traversal::RelationHandle;

/// Shape of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RelationKind {
    HasMany,
    BelongsTo,
    HasOne,
    HasAndBelongsToMany,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::HasMany => "has many",
            RelationKind::BelongsTo => "belongs to",
            RelationKind::HasOne => "has one",
            RelationKind::HasAndBelongsToMany => "has and belongs to many",
        }
    }

    /// Whether the foreign key is stored on the owner.
    pub fn key_on_owner(&self) -> bool {
        matches!(self, RelationKind::BelongsTo | RelationKind::HasOne)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry key: owning type id plus role name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct RelationKey {
    owner: u64,
    role: String,
}

impl RelationKey {
    fn new(owner: &Model, role: &str) -> Self {
        Self {
            owner: owner.id(),
            role: role.to_owned(),
        }
    }
}

/// Options for a relation declaration.
///
/// `from_key`/`to_key` are the many-to-many spellings of
/// `foreign_key`/`through_key`.
#[derive(Debug, Clone, Default)]
pub struct RelationOptions {
    role: Option<String>,
    foreign_key: Option<String>,
    through: Option<Model>,
    through_key: Option<String>,
}

impl RelationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Role name (`as`).
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Column holding the link.
    pub fn foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    pub fn from_key(self, key: impl Into<String>) -> Self {
        self.foreign_key(key)
    }

    /// Explicit join type.
    pub fn through(mut self, model: &Model) -> Self {
        self.through = Some(model.clone());
        self
    }

    /// Join-type column holding the other type's key.
    pub fn through_key(mut self, key: impl Into<String>) -> Self {
        self.through_key = Some(key.into());
        self
    }

    pub fn to_key(self, key: impl Into<String>) -> Self {
        self.through_key(key)
    }
}

/// A declared relation.
#[derive(Debug)]
pub struct Relation {
    role: String,
    kind: RelationKind,
    owner: Model,
    other: Model,
    foreign_key: String,
    through: Option<Model>,
    through_key: Option<String>,
}

impl Relation {
    /// Role name the owner reaches the other type under.
    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Declaring type.
    pub fn owner(&self) -> &Model {
        &self.owner
    }

    /// Related type.
    pub fn other(&self) -> &Model {
        &self.other
    }

    /// Column holding the link: on the other type, the owner or the join type.
    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    /// Join type, for relations that go through one.
    pub fn through(&self) -> Option<&Model> {
        self.through.as_ref()
    }

    pub fn through_key(&self) -> Option<&str> {
        self.through_key.as_deref()
    }
}

/// Lower-cased, pluralized type name: `Category` → `categories`.
pub fn default_role(type_name: &str) -> String {
    let name = type_name.to_lowercase();
    if let Some(stem) = name.strip_suffix('y') {
        let before_y = stem.chars().last();
        if before_y.is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{stem}ies");
        }
    }
    if ["s", "x", "ch", "sh"].iter().any(|suffix| name.ends_with(suffix)) {
        return format!("{name}es");
    }
    format!("{name}s")
}

fn key_for(model: &Model) -> String {
    format!("{}_id", model.type_name().to_lowercase())
}

fn role_for_key(key: &str) -> String {
    key.strip_suffix("_id").unwrap_or(key).to_owned()
}

impl Model {
    /// `owner.has_many(other)`: each owner has any number of `other`, keyed
    /// by a foreign key on `other`. A `through_key` without `through` makes
    /// it many-to-many.
    pub fn has_many(&self, other: &Model, options: RelationOptions) -> Result<&Self, ModelError> {
        self.declare(other, RelationKind::HasMany, options)
    }

    /// `owner.belongs_to(other)`: the owner stores `other`'s key.
    pub fn belongs_to(&self, other: &Model, options: RelationOptions) -> Result<&Self, ModelError> {
        self.declare(other, RelationKind::BelongsTo, options)
    }

    /// `owner.has_one(other)`: the owner stores `other`'s key. A
    /// `through_key` without `through` routes it through a join type.
    pub fn has_one(&self, other: &Model, options: RelationOptions) -> Result<&Self, ModelError> {
        self.declare(other, RelationKind::HasOne, options)
    }

    /// Many-to-many through a join type, synthesized unless given.
    pub fn has_and_belongs_to_many(
        &self,
        other: &Model,
        options: RelationOptions,
    ) -> Result<&Self, ModelError> {
        self.declare(other, RelationKind::HasAndBelongsToMany, options)
    }

    /// Every relation this type participates in, in registration order.
    pub fn relations(&self) -> Vec<Arc<Relation>> {
        self.schema().read().relations.values().cloned().collect()
    }

    /// Relation owned by this type under `role`.
    pub fn relation(&self, role: &str) -> Option<Arc<Relation>> {
        self.schema()
            .read()
            .relations
            .get(&RelationKey::new(self, role))
            .cloned()
    }

    fn declare(
        &self,
        other: &Model,
        kind: RelationKind,
        options: RelationOptions,
    ) -> Result<&Self, ModelError> {
        let role = options
            .role
            .unwrap_or_else(|| default_role(other.type_name()));
        if self.relation(&role).is_some() {
            return Err(ModelError::DuplicateRelation {
                model: self.type_name().to_owned(),
                name: role,
            });
        }

        let goes_through = match kind {
            RelationKind::HasAndBelongsToMany => true,
            RelationKind::HasMany | RelationKind::HasOne => {
                options.through.is_some() || options.through_key.is_some()
            }
            RelationKind::BelongsTo => options.through.is_some(),
        };

        // Through a join type the join row stores the owner's key.
        let foreign_key = options.foreign_key.unwrap_or_else(|| {
            if kind.key_on_owner() && !goes_through {
                key_for(other)
            } else {
                key_for(self)
            }
        });

        let through_key = goes_through
            .then(|| options.through_key.unwrap_or_else(|| key_for(other)));
        if let Some(through_key) = &through_key {
            let same_column = *through_key == foreign_key;
            let same_role = options.through.is_none()
                && role_for_key(through_key) == role_for_key(&foreign_key);
            if same_column || same_role {
                return Err(ModelError::ConflictingJoinKeys {
                    model: self.type_name().to_owned(),
                    name: role,
                    key: through_key.clone(),
                });
            }
        }

        let mut synthesized = false;
        let (through, through_key) = if let Some(through_key) = through_key {
            let through = match options.through {
                Some(model) => model,
                None => {
                    let (join, created) = self.join_model(other)?;
                    synthesized = created;
                    join
                }
            };
            through.attr(&through_key, Attribute::new())?;
            through.attr(&foreign_key, Attribute::new())?;
            (Some(through), Some(through_key))
        } else {
            (None, None)
        };

        let relation = Arc::new(Relation {
            role: role.clone(),
            kind,
            owner: self.clone(),
            other: other.clone(),
            foreign_key,
            through,
            through_key,
        });

        let key = RelationKey::new(self, &role);
        self.register(&key, &relation);
        other.register(&key, &relation);
        if let Some(through) = &relation.through {
            through.register(&key, &relation);
        }

        debug!(
            model = %self.type_name(),
            relation = %role,
            kind = %kind,
            other = %other.type_name(),
            "Relation declared"
        );

        if synthesized {
            if let (Some(join), Some(through_key)) = (&relation.through, &relation.through_key) {
                join.belongs_to(
                    self,
                    RelationOptions::new()
                        .role(role_for_key(&relation.foreign_key))
                        .foreign_key(relation.foreign_key.clone()),
                )?;
                join.belongs_to(
                    other,
                    RelationOptions::new()
                        .role(role_for_key(through_key))
                        .foreign_key(through_key.clone()),
                )?;
            }
        }
        Ok(self)
    }

    fn register(&self, key: &RelationKey, relation: &Arc<Relation>) {
        self.schema()
            .write()
            .relations
            .insert(key.clone(), relation.clone());
    }

    /// Join type for the pair `(self, other)`. Returns an existing one if a
    /// previous declaration already synthesized it.
    fn join_model(&self, other: &Model) -> Result<(Model, bool), ModelError> {
        let existing = self.relations().into_iter().find_map(|relation| {
            let pair = (relation.owner.ptr_eq(self) && relation.other.ptr_eq(other))
                || (relation.owner.ptr_eq(other) && relation.other.ptr_eq(self));
            if !pair {
                return None;
            }
            relation.through.clone()
        });
        if let Some(join) = existing {
            return Ok((join, false));
        }

        let (first, second) = if self.type_name() <= other.type_name() {
            (self, other)
        } else {
            (other, self)
        };
        let name = format!("{}{}", first.type_name(), second.type_name());
        let table = format!(
            "{}_{}",
            first.type_name().to_lowercase(),
            second.type_name().to_lowercase()
        );
        let join = create_model(&name, ModelOptions::default().table_name(table));
        join.attr("id", Attribute::primary())?;
        debug!(model = %join.type_name(), "Join model synthesized");
        Ok((join, true))
    }
}
