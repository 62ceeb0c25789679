//! Value, query and collection types exchanged between models and adapters.

use std::fmt;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::instance::Instance;

/// Ordered attribute map. Raw rows, change sets and queries all use it.
pub type Attributes = serde_json::Map<String, Value>;

/// Converts a JSON object into [`Attributes`]. Anything else yields an empty map.
///
/// ```
/// use modelkit::value::to_attributes;
/// use serde_json::json;
///
/// assert_eq!(to_attributes(json!({ "id": 1 })).len(), 1);
/// assert!(to_attributes(json!(1)).is_empty());
/// ```
pub fn to_attributes(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        _ => Attributes::new(),
    }
}

/// Default page size reported for collections without pagination metadata.
pub const DEFAULT_LIMIT: u64 = 50;

/// Runtime tag of an attribute value, checked by the `type` validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl AttrType {
    /// Tag of a value, `None` for null.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(AttrType::Boolean),
            Value::Number(_) => Some(AttrType::Number),
            Value::String(_) => Some(AttrType::String),
            Value::Array(_) => Some(AttrType::Array),
            Value::Object(_) => Some(AttrType::Object),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttrType::String => "string",
            AttrType::Number => "number",
            AttrType::Boolean => "boolean",
            AttrType::Array => "array",
            AttrType::Object => "object",
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Truthiness of a stored value: null, false, 0 and "" are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Query passed through to adapters.
///
/// Numbers convert to `{ "id": n }`; an empty query is `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(Attributes);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// `{ key: { "$in": values } }`
    pub fn any_of(key: impl Into<String>, values: Vec<Value>) -> Self {
        let mut condition = Attributes::new();
        condition.insert("$in".into(), Value::Array(values));
        Self::new().with(key, Value::Object(condition))
    }

    pub fn offset(&self) -> Option<u64> {
        self.0.get("offset").and_then(Value::as_u64)
    }

    pub fn limit(&self) -> Option<u64> {
        self.0.get("limit").and_then(Value::as_u64)
    }

    pub fn into_inner(self) -> Attributes {
        self.0
    }
}

impl Deref for Query {
    type Target = Attributes;

    fn deref(&self) -> &Attributes {
        &self.0
    }
}

impl DerefMut for Query {
    fn deref_mut(&mut self) -> &mut Attributes {
        &mut self.0
    }
}

impl From<Attributes> for Query {
    fn from(attrs: Attributes) -> Self {
        Self(attrs)
    }
}

impl From<i64> for Query {
    fn from(id: i64) -> Self {
        Self::new().with("id", id)
    }
}

impl From<u64> for Query {
    fn from(id: u64) -> Self {
        Self::new().with("id", id)
    }
}

impl From<i32> for Query {
    fn from(id: i32) -> Self {
        Self::new().with("id", id)
    }
}

/// Rows returned by an adapter's `find_all`, with optional pagination data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCollection {
    pub rows: Vec<Attributes>,
    pub total: Option<u64>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl RawCollection {
    pub fn new(rows: Vec<Attributes>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }
}

impl From<Vec<Attributes>> for RawCollection {
    fn from(rows: Vec<Attributes>) -> Self {
        Self::new(rows)
    }
}

/// Hydrated instances plus pagination metadata.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub items: Vec<Instance>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

impl Collection {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instance> {
        self.items.iter()
    }
}

impl IntoIterator for Collection {
    type Item = Instance;
    type IntoIter = std::vec::IntoIter<Instance>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Input to hydration: raw attributes, or an instance that is kept as-is.
#[derive(Debug, Clone)]
pub enum Record {
    Attributes(Attributes),
    Instance(Instance),
}

impl From<Attributes> for Record {
    fn from(attrs: Attributes) -> Self {
        Record::Attributes(attrs)
    }
}

impl From<Instance> for Record {
    fn from(instance: Instance) -> Self {
        Record::Instance(instance)
    }
}

impl From<&Instance> for Record {
    fn from(instance: &Instance) -> Self {
        Record::Instance(instance.clone())
    }
}

/// Target of a relation `add`/`remove`: an instance or a bare primary key.
#[derive(Debug, Clone)]
pub enum Related {
    Instance(Instance),
    Id(Value),
}

impl From<Instance> for Related {
    fn from(instance: Instance) -> Self {
        Related::Instance(instance)
    }
}

impl From<&Instance> for Related {
    fn from(instance: &Instance) -> Self {
        Related::Instance(instance.clone())
    }
}

impl From<i64> for Related {
    fn from(id: i64) -> Self {
        Related::Id(id.into())
    }
}

impl From<i32> for Related {
    fn from(id: i32) -> Self {
        Related::Id(id.into())
    }
}

impl From<u64> for Related {
    fn from(id: u64) -> Self {
        Related::Id(id.into())
    }
}
