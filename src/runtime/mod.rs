//! Process plumbing: logging setup and environment configuration.
//!
//! - [`setup_tracing`] installs the log subscriber
//! - [`RuntimeConfig`] resolves the [`Environment`] used by scoped plugins

pub mod config;
pub mod tracing;

pub use self::config::{Environment, RuntimeConfig, UnknownEnvironment, ENV_VAR};
pub use self::tracing::setup_tracing;
