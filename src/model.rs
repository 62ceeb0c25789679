//! # Model Types
//!
//! A [`Model`] is a schema value: a type name plus the registries that make up
//! the type (attributes, relations, validators, format table, adapter) and a
//! type-level event emitter. [`create_model`] builds a fresh, independent model
//! on every call, so two types never share registries.
//!
//! `Model` is a cheap-clone handle. Clones refer to the same type, which is how
//! relations, join types and instances point back at their type.
//!
//! Declaration calls (`attr`, `has_many`, `use_plugin`, ...) are synchronous
//! and are expected to run before instances are created.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapter::{Adapter, NoAdapter};
use crate::attribute::Attribute;
use crate::error::ModelError;
use crate::events::{Emitter, Event};
use crate::instance::Instance;
use crate::relation::{Relation, RelationKey};
use crate::validation::{builtin_formats, builtin_validators, Validator};
use crate::value::{Attributes, Record};

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

/// Options accepted by the factory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOptions {
    /// Storage name adapters should use. Defaults to the lower-cased type name.
    #[serde(default)]
    pub table_name: Option<String>,
}

impl ModelOptions {
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }
}

pub(crate) struct Schema {
    pub(crate) primary_key: Option<String>,
    pub(crate) attributes: IndexMap<String, Attribute>,
    pub(crate) relations: IndexMap<RelationKey, Arc<Relation>>,
    pub(crate) validators: Vec<Arc<dyn Validator>>,
    pub(crate) formats: IndexMap<String, Regex>,
    pub(crate) adapter: Arc<dyn Adapter>,
}

struct ModelInner {
    id: u64,
    type_name: String,
    options: RwLock<ModelOptions>,
    schema: RwLock<Schema>,
    events: Emitter,
}

/// Handle to a model type.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

/// Creates a model type named after `type_name` (first letter capitalized).
///
/// ```
/// use modelkit::{create_model, Attribute, ModelOptions};
///
/// let user = create_model("user", ModelOptions::default());
/// user.attr("id", Attribute::primary()).unwrap();
/// assert_eq!(user.type_name(), "User");
/// assert_eq!(user.primary_key().as_deref(), Some("id"));
/// ```
pub fn create_model(type_name: &str, options: ModelOptions) -> Model {
    let id = NEXT_MODEL_ID.fetch_add(1, Ordering::SeqCst);
    let type_name = capitalize(type_name);
    debug!(model = %type_name, id, "Model created");

    Model {
        inner: Arc::new(ModelInner {
            id,
            type_name,
            options: RwLock::new(options),
            schema: RwLock::new(Schema {
                primary_key: None,
                attributes: IndexMap::new(),
                relations: IndexMap::new(),
                validators: builtin_validators(),
                formats: builtin_formats(),
                adapter: Arc::new(NoAdapter),
            }),
            events: Emitter::new(),
        }),
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl Model {
    /// Same as [`create_model`] with default options.
    pub fn new(type_name: &str) -> Self {
        create_model(type_name, ModelOptions::default())
    }

    /// Process-unique identity of this type.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Capitalized type name, as given to [`create_model`].
    pub fn type_name(&self) -> &str {
        &self.inner.type_name
    }

    /// True if both handles refer to the same type.
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Snapshot of the type's options.
    pub fn options(&self) -> ModelOptions {
        self.inner.options.read().clone()
    }

    /// Replaces the type's options.
    pub fn set_options(&self, options: ModelOptions) -> &Self {
        *self.inner.options.write() = options;
        self
    }

    /// Storage name: the `table_name` option, else the lower-cased type name.
    pub fn table_name(&self) -> String {
        self.inner
            .options
            .read()
            .table_name
            .clone()
            .unwrap_or_else(|| self.type_name().to_lowercase())
    }

    pub(crate) fn schema(&self) -> &RwLock<Schema> {
        &self.inner.schema
    }

    // --- Attribute Registry ---

    /// Declares an attribute. Re-declaring a name is a no-op.
    ///
    /// Fails with [`ModelError::DuplicatePrimaryKey`] if `attribute` is primary
    /// and the type already has a primary key, even under the same name.
    pub fn attr(&self, name: &str, attribute: Attribute) -> Result<&Self, ModelError> {
        {
            let mut schema = self.inner.schema.write();
            if attribute.is_primary() {
                if let Some(existing) = &schema.primary_key {
                    return Err(ModelError::DuplicatePrimaryKey {
                        existing: existing.clone(),
                        attempted: name.to_owned(),
                    });
                }
            }
            if schema.attributes.contains_key(name) {
                return Ok(self);
            }
            if attribute.is_primary() {
                schema.primary_key = Some(name.to_owned());
            }
            schema.attributes.insert(name.to_owned(), attribute.clone());
        }

        debug!(model = %self.type_name(), attribute = name, "Attribute declared");
        self.emit(&Event::Attribute {
            name: name.to_owned(),
            attribute,
        });
        Ok(self)
    }

    /// Name of the primary-key attribute, if one was declared.
    pub fn primary_key(&self) -> Option<String> {
        self.inner.schema.read().primary_key.clone()
    }

    /// Declared attributes, in declaration order.
    pub fn attributes(&self) -> Vec<(String, Attribute)> {
        self.inner
            .schema
            .read()
            .attributes
            .iter()
            .map(|(name, attr)| (name.clone(), attr.clone()))
            .collect()
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.inner.schema.read().attributes.keys().cloned().collect()
    }

    pub fn attribute(&self, name: &str) -> Option<Attribute> {
        self.inner.schema.read().attributes.get(name).cloned()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.inner.schema.read().attributes.contains_key(name)
    }

    // --- Validators & formats ---

    pub fn validators(&self) -> Vec<Arc<dyn Validator>> {
        self.inner.schema.read().validators.clone()
    }

    /// Appends a validator to the end of the pipeline.
    pub fn add_validator<V>(&self, validator: V) -> &Self
    where
        V: Validator + 'static,
    {
        self.inner.schema.write().validators.push(Arc::new(validator));
        self
    }

    /// Replaces the whole pipeline, built-ins included.
    pub fn set_validators(&self, validators: Vec<Arc<dyn Validator>>) -> &Self {
        self.inner.schema.write().validators = validators;
        self
    }

    /// Registers (or replaces) a named format for the `format` validator.
    pub fn add_format(&self, name: impl Into<String>, pattern: Regex) -> &Self {
        self.inner.schema.write().formats.insert(name.into(), pattern);
        self
    }

    pub fn format(&self, name: &str) -> Option<Regex> {
        self.inner.schema.read().formats.get(name).cloned()
    }

    // --- Adapter ---

    pub fn set_adapter<A>(&self, adapter: A) -> &Self
    where
        A: Adapter,
    {
        self.set_shared_adapter(Arc::new(adapter))
    }

    pub fn set_shared_adapter(&self, adapter: Arc<dyn Adapter>) -> &Self {
        self.inner.schema.write().adapter = adapter;
        self
    }

    pub fn adapter(&self) -> Arc<dyn Adapter> {
        self.inner.schema.read().adapter.clone()
    }

    // --- Events ---

    pub fn on<F>(&self, name: impl Into<String>, listener: F) -> &Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.events.on(name, listener);
        self
    }

    pub fn off(&self, name: &str) -> &Self {
        self.inner.events.off(name);
        self
    }

    pub fn emit(&self, event: &Event) {
        self.inner.events.emit(event);
    }

    pub(crate) fn emit_as(&self, name: &str, event: &Event) {
        self.inner.events.emit_as(name, event);
    }

    // --- Instances ---

    /// Constructs a new instance from raw attributes.
    pub fn build(&self, attributes: Attributes) -> Instance {
        Instance::new(self, attributes)
    }

    /// Hydrates a record. An instance of this type is returned unchanged;
    /// anything else is passed to the constructor.
    pub fn create(&self, record: impl Into<Record>) -> Instance {
        match record.into() {
            Record::Instance(instance) if instance.model().ptr_eq(self) => instance,
            Record::Instance(instance) => self.build(instance.attributes()),
            Record::Attributes(attributes) => self.build(attributes),
        }
    }

    /// Instance with no attributes supplied.
    pub fn create_empty(&self) -> Instance {
        self.build(Attributes::new())
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Model {}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("id", &self.inner.id)
            .field("type_name", &self.inner.type_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_type_name_is_capitalized() {
        assert_eq!(Model::new("user").type_name(), "User");
        assert_eq!(Model::new("blogPost").type_name(), "BlogPost");
        assert_eq!(Model::new("user").table_name(), "user");
    }

    #[test]
    fn test_each_factory_call_is_independent() {
        let a = Model::new("user");
        let b = Model::new("user");
        a.attr("id", Attribute::primary()).unwrap();
        assert!(!a.ptr_eq(&b));
        assert_ne!(a.id(), b.id());
        assert!(b.attributes().is_empty());
        assert!(b.primary_key().is_none());
    }

    #[test]
    fn test_second_primary_key_fails() {
        let model = Model::new("post");
        model.attr("id", Attribute::primary()).unwrap();
        let err = model.attr("_id", Attribute::primary()).unwrap_err();
        assert!(matches!(
            err,
            ModelError::DuplicatePrimaryKey { ref existing, .. } if existing == "id"
        ));
    }

    #[test]
    fn test_redeclaring_an_attribute_keeps_the_first() {
        let model = Model::new("post");
        model
            .attr("id", Attribute::primary())
            .unwrap()
            .attr("title", Attribute::new().required())
            .unwrap()
            .attr("title", Attribute::new())
            .unwrap();
        assert_eq!(model.attribute_names(), vec!["id", "title"]);
        assert!(model.attribute("title").unwrap().is_required());

        let err = model.attr("id", Attribute::primary()).unwrap_err();
        assert_eq!(err.to_string(), "Primary attribute already exists: id");
    }

    #[test]
    fn test_attribute_event() {
        let model = Model::new("user");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        model.on("attribute", move |event| {
            if let Event::Attribute { name, attribute } = event {
                assert_eq!(name, "id");
                assert!(attribute.is_primary());
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        model.attr("id", Attribute::primary()).unwrap();
        model.attr("id", Attribute::new()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_builtin_registries() {
        let model = Model::new("user");
        assert_eq!(model.validators().len(), 3);
        assert!(model.format("email").is_some());
        model.add_format("slug", Regex::new("^[a-z-]+$").unwrap());
        assert!(model.format("slug").unwrap().is_match("hello-world"));
    }

    #[test]
    fn test_table_name_option() {
        let model = create_model("user", ModelOptions::default().table_name("people"));
        assert_eq!(model.table_name(), "people");
    }
}
