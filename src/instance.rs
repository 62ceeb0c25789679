//! # Model Instances
//!
//! An [`Instance`] is one record of a model type: attribute storage, the set of
//! dirty attribute names, accumulated errors, a free-form `extras` side map
//! and an instance-level event emitter.
//!
//! `Instance` is a cheap-clone handle, so a relation operation that mutates a
//! related instance is visible through every clone the caller holds.
//!
//! ## States
//!
//! - **New**: the primary key is falsy.
//! - **Clean / Dirty**: whether any attribute changed since the last
//!   successful save.
//! - **Invalid**: the last `is_valid` run recorded errors.
//!
//! Saving and removing live in [`crate::lifecycle`].

use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use tracing::trace;

use crate::error::ModelError;
use crate::events::{Emitter, Event};
use crate::model::Model;
use crate::validation::{run_all, AttributeError};
use crate::value::{is_truthy, Attributes};

#[derive(Default)]
struct InstanceState {
    values: IndexMap<String, Value>,
    dirty: IndexSet<String>,
    errors: Vec<AttributeError>,
    extras: Attributes,
}

struct InstanceInner {
    model: Model,
    state: Mutex<InstanceState>,
    events: Emitter,
}

/// Handle to one record of a model type.
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

impl Instance {
    /// Runs the constructor: `initializing`, attribute initialization from
    /// `attributes` then defaults, `initialized`.
    ///
    /// Keys that are not declared attributes are ignored. Every supplied
    /// attribute and every applied non-null default is marked dirty.
    pub fn new(model: &Model, attributes: Attributes) -> Self {
        let declared = model.attributes();
        let values = declared
            .iter()
            .map(|(name, _)| (name.clone(), Value::Null))
            .collect();

        let instance = Self {
            inner: Arc::new(InstanceInner {
                model: model.clone(),
                state: Mutex::new(InstanceState {
                    values,
                    ..InstanceState::default()
                }),
                events: Emitter::new(),
            }),
        };

        model.emit(&Event::Initializing {
            instance: instance.clone(),
            attributes: attributes.clone(),
        });

        {
            let mut state = instance.inner.state.lock();
            for (name, _) in &declared {
                if let Some(value) = attributes.get(name) {
                    state.values.insert(name.clone(), value.clone());
                    state.dirty.insert(name.clone());
                }
            }
        }

        // Defaults run after supplied values so computed defaults can read them.
        for (name, attribute) in &declared {
            if attributes.contains_key(name) {
                continue;
            }
            let Some(default) = attribute.default_spec() else {
                continue;
            };
            let value = default.resolve(&instance);
            if value.is_null() {
                continue;
            }
            let mut state = instance.inner.state.lock();
            state.values.insert(name.clone(), value);
            state.dirty.insert(name.clone());
        }

        model.emit(&Event::Initialized {
            instance: instance.clone(),
        });
        instance
    }

    /// The type this instance was built from.
    pub fn model(&self) -> &Model {
        &self.inner.model
    }

    /// True if both handles refer to the same instance.
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // --- Attribute access ---

    /// Reads a declared attribute, through its custom getter if it has one.
    pub fn get(&self, name: &str) -> Option<Value> {
        let attribute = self.model().attribute(name)?;
        match attribute.custom_getter() {
            Some(getter) => Some(getter(self)),
            None => self.stored(name),
        }
    }

    /// Raw stored value, bypassing getters.
    pub(crate) fn stored(&self, name: &str) -> Option<Value> {
        self.inner.state.lock().values.get(name).cloned()
    }

    /// Writes a declared attribute.
    ///
    /// Returns `true` when the value changed. A change marks the attribute
    /// dirty and emits `change` and `change:<name>` at type and instance
    /// level. Undeclared names are ignored.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        let previous = {
            let mut state = self.inner.state.lock();
            let Some(slot) = state.values.get_mut(name) else {
                return false;
            };
            if *slot == value {
                return false;
            }
            let previous = std::mem::replace(slot, value.clone());
            state.dirty.insert(name.to_owned());
            previous
        };

        trace!(model = %self.model().type_name(), attribute = name, "Attribute changed");
        let event = Event::Change {
            instance: self.clone(),
            name: name.to_owned(),
            value,
            previous,
        };
        let scoped = format!("change:{name}");
        let model = self.model();
        model.emit(&event);
        model.emit_as(&scoped, &event);
        self.inner.events.emit(&event);
        self.inner.events.emit_as(&scoped, &event);
        true
    }

    /// Map form of [`set`](Self::set). Emits `setting` first.
    pub fn set_all(&self, attributes: Attributes) -> &Self {
        let event = Event::Setting {
            instance: self.clone(),
            attributes: attributes.clone(),
        };
        self.model().emit(&event);
        self.inner.events.emit(&event);

        for (name, value) in attributes {
            self.set(&name, value);
        }
        self
    }

    /// Snapshot of every declared attribute, read through getters.
    pub fn attributes(&self) -> Attributes {
        self.model()
            .attribute_names()
            .into_iter()
            .filter_map(|name| self.get(&name).map(|value| (name, value)))
            .collect()
    }

    /// Dirty attributes and their current values.
    pub fn changed(&self) -> Attributes {
        self.dirty_attributes()
            .into_iter()
            .filter_map(|name| self.get(&name).map(|value| (name, value)))
            .collect()
    }

    /// Names of attributes changed since the last save, in the order they first changed.
    pub fn dirty_attributes(&self) -> Vec<String> {
        self.inner.state.lock().dirty.iter().cloned().collect()
    }

    /// Whether the type declares `name`.
    pub fn has(&self, name: &str) -> bool {
        self.model().has_attribute(name)
    }

    /// True if any attribute changed since the last save.
    pub fn is_dirty(&self) -> bool {
        !self.inner.state.lock().dirty.is_empty()
    }

    pub(crate) fn clear_dirty(&self) {
        self.inner.state.lock().dirty.clear();
    }

    /// Merges adapter-returned attributes into storage without change tracking.
    pub(crate) fn merge_stored(&self, attributes: Attributes) {
        let mut state = self.inner.state.lock();
        for (name, value) in attributes {
            if let Some(slot) = state.values.get_mut(&name) {
                *slot = value;
            }
        }
    }

    // --- Primary key ---

    fn primary_key_name(&self) -> Result<String, ModelError> {
        self.model()
            .primary_key()
            .ok_or_else(|| ModelError::UndefinedPrimaryKey {
                model: self.model().type_name().to_owned(),
            })
    }

    /// Value of the primary-key attribute.
    pub fn primary(&self) -> Result<Value, ModelError> {
        let key = self.primary_key_name()?;
        Ok(self.get(&key).unwrap_or(Value::Null))
    }

    /// Writes the primary-key attribute. Same return value as [`set`](Self::set).
    pub fn set_primary(&self, value: impl Into<Value>) -> Result<bool, ModelError> {
        let key = self.primary_key_name()?;
        Ok(self.set(&key, value))
    }

    /// Clears the primary key after a removal, without change tracking.
    pub(crate) fn clear_primary(&self) {
        if let Some(key) = self.model().primary_key() {
            if let Some(slot) = self.inner.state.lock().values.get_mut(&key) {
                *slot = Value::Null;
            }
        }
    }

    /// Whether the primary key is falsy.
    pub fn is_new(&self) -> Result<bool, ModelError> {
        Ok(!is_truthy(&self.primary()?))
    }

    // --- Validation & errors ---

    /// Runs the type's validator pipeline, replacing previous errors.
    ///
    /// Each failure is recorded through [`error`](Self::error), so `error`
    /// events fire once per failure.
    pub fn is_valid(&self) -> bool {
        self.inner.state.lock().errors.clear();
        let failures = run_all(&self.model().validators(), self);
        let valid = failures.is_empty();
        for failure in failures {
            self.push_error(failure);
        }
        valid
    }

    /// Errors recorded by the last validation run and by [`error`](Self::error).
    pub fn errors(&self) -> Vec<AttributeError> {
        self.inner.state.lock().errors.clone()
    }

    /// Records an error on the instance and emits `error`.
    pub fn error(&self, message: impl Into<String>, attribute: Option<&str>) -> AttributeError {
        let error = AttributeError::new(attribute, message);
        self.push_error(error.clone());
        error
    }

    fn push_error(&self, error: AttributeError) {
        self.inner.state.lock().errors.push(error.clone());
        let event = Event::Error {
            instance: self.clone(),
            error,
        };
        self.model().emit(&event);
        self.inner.events.emit(&event);
    }

    // --- Extras ---

    /// Free-form side data. Not an attribute: never serialized or tracked.
    pub fn extras(&self) -> Attributes {
        self.inner.state.lock().extras.clone()
    }

    pub fn extra(&self, key: &str) -> Option<Value> {
        self.inner.state.lock().extras.get(key).cloned()
    }

    pub fn set_extra(&self, key: impl Into<String>, value: impl Into<Value>) -> &Self {
        self.inner
            .state
            .lock()
            .extras
            .insert(key.into(), value.into());
        self
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

    /// Emits at instance level only.
    pub fn emit(&self, event: &Event) {
        self.inner.events.emit(event);
    }

    /// Emits at type level, then instance level.
    pub(crate) fn broadcast(&self, event: &Event) {
        self.model().emit(event);
        self.inner.events.emit(event);
    }
}

impl Serialize for Instance {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let visible: Vec<(String, Value)> = self
            .model()
            .attributes()
            .into_iter()
            .filter(|(_, attribute)| attribute.is_enumerable())
            .filter_map(|(name, _)| self.get(&name).map(|value| (name, value)))
            .collect();

        let mut map = serializer.serialize_map(Some(visible.len()))?;
        for (name, value) in &visible {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Instance")
            .field("model", &self.model().type_name())
            .field("values", &state.values)
            .field("dirty", &state.dirty)
            .finish()
    }
}
