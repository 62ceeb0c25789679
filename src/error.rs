//! # Model Errors
//!
//! This module defines the error type shared by every model, instance and
//! relation operation. Centralizing it keeps error handling uniform whether a
//! failure comes from a misdeclared schema, a failed validation or a storage
//! adapter.
//!
//! Errors fall in two groups:
//!
//! - **Structural** errors describe a misconfiguration (a second primary key,
//!   an undeclared relation, an adapter that lacks a capability). They are
//!   returned before any state is touched.
//! - **Runtime** errors ([`ModelError::Validation`], [`ModelError::Adapter`])
//!   describe data or storage conditions the caller is expected to handle.

use crate::adapter::Capability;
use crate::instance::Instance;
use crate::validation::AttributeError;

/// Boxed error produced by a storage adapter. Passed through unchanged.
pub type AdapterError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while declaring or operating on models.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A second attribute was declared with `primary`.
    #[error("Primary attribute already exists: {existing}")]
    DuplicatePrimaryKey { existing: String, attempted: String },

    /// The primary key was accessed on a type that never declared one.
    #[error("Primary key has not been defined for {model}.")]
    UndefinedPrimaryKey { model: String },

    /// `save` was attempted on an instance that failed validation.
    #[error("Validations failed.")]
    Validation {
        instance: Instance,
        errors: Vec<AttributeError>,
    },

    /// A relation role name was used that the type never declared.
    #[error("Relation \"{name}\" not defined.")]
    UnknownRelation { model: String, name: String },

    /// A relation role name was declared twice on the same owning type.
    #[error("Relation \"{name}\" already defined on {model}.")]
    DuplicateRelation { model: String, name: String },

    /// A join-backed relation would store both sides under the same join
    /// column or the same join role.
    #[error("Relation \"{name}\" on {model} needs distinct join keys, both resolve to \"{key}\".")]
    ConflictingJoinKeys {
        model: String,
        name: String,
        key: String,
    },

    /// An operation needs an adapter capability the model's adapter lacks.
    #[error("No storage adapter support for this method: {0}")]
    NoAdapterSupport(Capability),

    /// An error surfaced by a storage adapter.
    #[error("{0}")]
    Adapter(AdapterError),
}

impl ModelError {
    /// Wraps any adapter-side error.
    pub fn adapter<E>(error: E) -> Self
    where
        E: Into<AdapterError>,
    {
        ModelError::Adapter(error.into())
    }

    /// True for errors that indicate a misdeclared schema or adapter rather
    /// than a data or storage condition.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ModelError::DuplicatePrimaryKey { .. }
                | ModelError::UndefinedPrimaryKey { .. }
                | ModelError::UnknownRelation { .. }
                | ModelError::DuplicateRelation { .. }
                | ModelError::ConflictingJoinKeys { .. }
                | ModelError::NoAdapterSupport(_)
        )
    }

    /// Accumulated validation failures, if this is a validation error.
    pub fn validation_errors(&self) -> Option<&[AttributeError]> {
        match self {
            ModelError::Validation { errors, .. } => Some(errors),
            _ => None,
        }
    }

    /// True if this is the "unsupported" signal for the given capability.
    pub(crate) fn is_unsupported(&self, capability: Capability) -> bool {
        matches!(self, ModelError::NoAdapterSupport(c) if *c == capability)
    }
}
