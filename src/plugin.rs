//! # Plugins
//!
//! A [`Plugin`] configures a model type after it has been created: it can
//! declare attributes and relations, add validators or formats, set the
//! adapter or register listeners. Closures taking `&Model` are plugins, so
//! extra arguments are simply captured.
//!
//! ```
//! use modelkit::{Attribute, Model, ModelError};
//!
//! fn timestamps(model: &Model) -> Result<(), ModelError> {
//!     model.attr("created_at", Attribute::new())?;
//!     Ok(())
//! }
//!
//! let post = Model::new("post");
//! post.use_plugin(timestamps).unwrap();
//! assert!(post.has_attribute("created_at"));
//! ```

use tracing::debug;

use crate::error::ModelError;
use crate::model::Model;
use crate::runtime::{Environment, RuntimeConfig};

/// Extension applied to a model type.
pub trait Plugin {
    fn build(&self, model: &Model) -> Result<(), ModelError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> Plugin for F
where
    F: Fn(&Model) -> Result<(), ModelError>,
{
    fn build(&self, model: &Model) -> Result<(), ModelError> {
        self(model)
    }
}

impl Model {
    /// Applies `plugin` to this type.
    pub fn use_plugin<P>(&self, plugin: P) -> Result<&Self, ModelError>
    where
        P: Plugin,
    {
        debug!(model = %self.type_name(), plugin = plugin.name(), "Applying plugin");
        plugin.build(self)?;
        Ok(self)
    }

    /// Applies `plugin` only when the process runs in `environment`.
    pub fn use_in<P>(&self, environment: Environment, plugin: P) -> Result<&Self, ModelError>
    where
        P: Plugin,
    {
        self.use_in_config(&RuntimeConfig::current(), environment, plugin)
    }

    /// [`use_in`](Self::use_in) against an explicit configuration.
    pub fn use_in_config<P>(
        &self,
        config: &RuntimeConfig,
        environment: Environment,
        plugin: P,
    ) -> Result<&Self, ModelError>
    where
        P: Plugin,
    {
        if config.environment != environment {
            debug!(
                model = %self.type_name(),
                plugin = plugin.name(),
                environment = %environment,
                "Skipping plugin for other environment"
            );
            return Ok(self);
        }
        self.use_plugin(plugin)
    }

    pub fn browser<P>(&self, plugin: P) -> Result<&Self, ModelError>
    where
        P: Plugin,
    {
        self.use_in(Environment::Browser, plugin)
    }

    pub fn server<P>(&self, plugin: P) -> Result<&Self, ModelError>
    where
        P: Plugin,
    {
        self.use_in(Environment::Server, plugin)
    }
}
