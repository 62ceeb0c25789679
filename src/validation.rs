//! # Validation Pipeline
//!
//! Every model type carries an ordered list of [`Validator`]s, seeded with the
//! built-ins [`Required`], [`TypeCheck`] and [`FormatCheck`] (in that order).
//! [`Instance::is_valid`](crate::Instance::is_valid) runs them all against an
//! instance with an explicit [`ValidationErrors`] accumulator.
//!
//! Plugins extend the pipeline with [`Model::add_validator`](crate::Model::add_validator);
//! any `Fn(&Instance, &mut ValidationErrors)` closure is a validator.

use std::fmt;
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::instance::Instance;
use crate::value::AttrType;

/// One validation or runtime failure recorded on an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeError {
    pub attribute: Option<String>,
    pub message: String,
}

impl AttributeError {
    pub fn new(attribute: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            attribute: attribute.map(str::to_owned),
            message: message.into(),
        }
    }
}

impl fmt::Display for AttributeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Accumulator shared by all validators of one `is_valid` run.
#[derive(Debug, Default)]
pub struct ValidationErrors {
    errors: Vec<AttributeError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, attribute: &str, message: impl Into<String>) {
        self.errors.push(AttributeError::new(Some(attribute), message));
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_vec(self) -> Vec<AttributeError> {
        self.errors
    }
}

/// A step of the validation pipeline.
pub trait Validator: Send + Sync {
    fn validate(&self, instance: &Instance, errors: &mut ValidationErrors);
}

impl<F> Validator for F
where
    F: Fn(&Instance, &mut ValidationErrors) + Send + Sync,
{
    fn validate(&self, instance: &Instance, errors: &mut ValidationErrors) {
        self(instance, errors)
    }
}

/// Runs every validator in order, collecting their failures.
pub fn run_all(validators: &[Arc<dyn Validator>], instance: &Instance) -> Vec<AttributeError> {
    let mut errors = ValidationErrors::new();
    for validator in validators {
        validator.validate(instance, &mut errors);
    }
    errors.into_vec()
}

/// The built-in validators, in pipeline order.
pub fn builtin_validators() -> Vec<Arc<dyn Validator>> {
    vec![Arc::new(Required), Arc::new(TypeCheck), Arc::new(FormatCheck)]
}

/// Fails required attributes holding null or the empty string.
pub struct Required;

impl Validator for Required {
    fn validate(&self, instance: &Instance, errors: &mut ValidationErrors) {
        for (name, attribute) in instance.model().attributes() {
            if !attribute.is_required() {
                continue;
            }
            match instance.get(&name) {
                None | Some(Value::Null) => errors.add(&name, format!("{name} is required.")),
                Some(Value::String(s)) if s.is_empty() => {
                    errors.add(&name, format!("{name} is required."))
                }
                Some(_) => {}
            }
        }
    }
}

/// Fails values whose runtime tag differs from the declared type.
pub struct TypeCheck;

impl Validator for TypeCheck {
    fn validate(&self, instance: &Instance, errors: &mut ValidationErrors) {
        for (name, attribute) in instance.model().attributes() {
            let Some(expected) = attribute.attr_type() else {
                continue;
            };
            let Some(value) = instance.get(&name) else {
                continue;
            };
            match AttrType::of(&value) {
                None => {}
                Some(actual) if actual == expected => {}
                Some(_) => errors.add(&name, format!("{name} is not of type {expected}.")),
            }
        }
    }
}

/// Fails values that do not match their named format.
///
/// Only attributes that also declare a type are checked.
pub struct FormatCheck;

impl Validator for FormatCheck {
    fn validate(&self, instance: &Instance, errors: &mut ValidationErrors) {
        let model = instance.model();
        for (name, attribute) in model.attributes() {
            if attribute.attr_type().is_none() {
                continue;
            }
            let Some(format) = attribute.format_name() else {
                continue;
            };
            let value = match instance.get(&name) {
                None | Some(Value::Null) => continue,
                Some(value) => value,
            };
            let Some(pattern) = model.format(format) else {
                continue;
            };
            let text = match &value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !pattern.is_match(&text) {
                errors.add(&name, format!("{name} is not a valid {format}"));
            }
        }
    }
}

static BUILTIN_FORMATS: LazyLock<IndexMap<String, Regex>> = LazyLock::new(|| {
    let patterns = [
        (
            "email",
            r"^[\w!#$%&'*+/=?^`{|}~-]+(?:\.[\w!#$%&'*+/=?^`{|}~-]+)*@(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?$",
        ),
        (
            "url",
            r"(?i)^(?:(?:https?|ftps?)://)?(?:\w+:\w+@)?(?:(?:[-\w]+\.)+[a-z]{2,}|\d{1,3}(?:\.\d{1,3}){3}|localhost)(?::\d{1,5})?(?:/[^\s?#]*)?(?:\?[^\s#]*)?(?:#\S*)?$",
        ),
        (
            "card",
            r"^(?:4[0-9]{12}(?:[0-9]{3})?|5[1-5][0-9]{14}|6(?:011|5[0-9][0-9])[0-9]{12}|3[47][0-9]{13}|3(?:0[0-5]|[68][0-9])[0-9]{11}|(?:2131|1800|35\d{3})\d{11})$",
        ),
        (
            "phone",
            r"^(?:(?:\+?1\s*(?:[.-]\s*)?)?(?:\(\s*[2-9]\d{2}\s*\)|[2-9]\d{2})\s*(?:[.-]\s*)?)?[2-9]\d{2}\s*(?:[.-]\s*)?\d{4}(?:\s*(?:#|x\.?|ext\.?|extension)\s*\d+)?$",
        ),
    ];
    patterns
        .into_iter()
        .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|re| (name.to_owned(), re)))
        .collect()
});

/// Format table every model type starts with: `email`, `url`, `card`, `phone`.
pub fn builtin_formats() -> IndexMap<String, Regex> {
    BUILTIN_FORMATS.clone()
}
