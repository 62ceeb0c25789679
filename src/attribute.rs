//! # Attribute Registry
//!
//! Each model type owns an ordered map of attribute name to [`Attribute`]
//! descriptor. Descriptors drive instance initialization (defaults), reads
//! (custom getters), validation (`required`, `kind`, `format`) and primary-key
//! resolution.
//!
//! Declaring an attribute is idempotent: the first definition of a name wins,
//! later declarations of the same name are ignored.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::instance::Instance;
use crate::value::AttrType;

/// Computes a value in the context of an instance.
pub type ValueFn = Arc<dyn Fn(&Instance) -> Value + Send + Sync>;

/// Default applied to an attribute the constructor did not supply.
#[derive(Clone)]
pub enum DefaultValue {
    Literal(Value),
    /// Evaluated once per instance, at construction.
    Computed(ValueFn),
}

impl DefaultValue {
    pub(crate) fn resolve(&self, instance: &Instance) -> Value {
        match self {
            DefaultValue::Literal(value) => value.clone(),
            DefaultValue::Computed(f) => f(instance),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            DefaultValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Descriptor of one declared attribute.
///
/// ```
/// use modelkit::{AttrType, Attribute};
///
/// let id = Attribute::primary();
/// let email = Attribute::new()
///     .required()
///     .kind(AttrType::String)
///     .format("email");
/// assert!(id.is_primary());
/// assert!(email.is_required());
/// ```
#[derive(Clone)]
pub struct Attribute {
    default: Option<DefaultValue>,
    required: bool,
    kind: Option<AttrType>,
    format: Option<String>,
    primary: bool,
    enumerable: bool,
    getter: Option<ValueFn>,
}

impl Default for Attribute {
    fn default() -> Self {
        Self {
            default: None,
            required: false,
            kind: None,
            format: None,
            primary: false,
            enumerable: true,
            getter: None,
        }
    }
}

impl Attribute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for `Attribute::new().primary_key()`.
    pub fn primary() -> Self {
        Self::new().primary_key()
    }

    pub fn primary_key(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn kind(mut self, kind: AttrType) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Names an entry of the model's format table.
    pub fn format(mut self, name: impl Into<String>) -> Self {
        self.format = Some(name.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    pub fn default_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Instance) -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Computed(Arc::new(f)));
        self
    }

    /// Excludes the attribute from serialization.
    pub fn hidden(mut self) -> Self {
        self.enumerable = false;
        self
    }

    /// Reads of this attribute return `f(instance)` instead of the stored value.
    pub fn getter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Instance) -> Value + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(f));
        self
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_enumerable(&self) -> bool {
        self.enumerable
    }

    pub fn attr_type(&self) -> Option<AttrType> {
        self.kind
    }

    pub fn format_name(&self) -> Option<&str> {
        self.format.as_deref()
    }

    pub fn default_spec(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub(crate) fn custom_getter(&self) -> Option<&ValueFn> {
        self.getter.as_ref()
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("default", &self.default)
            .field("required", &self.required)
            .field("kind", &self.kind)
            .field("format", &self.format)
            .field("primary", &self.primary)
            .field("enumerable", &self.enumerable)
            .field("getter", &self.getter.as_ref().map(|_| ".."))
            .finish()
    }
}
