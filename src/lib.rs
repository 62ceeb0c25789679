//! # modelkit
//!
//! > **An event-driven model layer over pluggable storage.**
//!
//! This crate lets you declare model types at runtime (attributes, defaults,
//! validation, relations) and work with their instances through a uniform
//! lifecycle (`save`, `remove`, `find`, `find_all`, `count`) while a storage
//! [`Adapter`] does the actual persistence. The core never stores anything
//! itself: it tracks state, runs validation, emits events and coordinates
//! adapters.
//!
//! ## 🏗️ Design Philosophy
//!
//! - **Schema as data**: a [`Model`] is a value built by [`create_model`], not a
//!   Rust type. Plugins receive it and extend it like any other caller.
//! - **Adapters do I/O, the core does bookkeeping**: dirty tracking, validation,
//!   hydration, relation traversal and events work the same whatever the
//!   backend. Every adapter method is optional.
//! - **Observable, not interceptable**: listeners see `before ...`/`after ...`
//!   events at type and instance level but cannot veto an operation.
//!
//! ## 🚀 Core Concepts
//!
//! ### Models and instances
//! [`Model`] and [`Instance`] are cheap-clone handles. A mutation through one
//! clone is visible through all of them, which is how relation operations
//! update the instances you pass in.
//!
//! ### Relations
//! `has_many`, `belongs_to`, `has_one` and `has_and_belongs_to_many` register a
//! [`Relation`] under both participants. Many-to-many relations synthesize a
//! join model type once per pair. `instance.relation("tags")` returns a
//! [`RelationHandle`] with `find_all`, `find`, `count`, `has`, `create`, `add`
//! and `remove`.
//!
//! ### Testing
//! [`MemoryAdapter`] is a complete in-process backend; [`MockAdapter`] scripts
//! adapter responses with `expect_*().return_ok(..)` and checks them with
//! `verify()`.
//!
//! ## 👩‍💻 Example
//!
//! ```
//! use modelkit::{to_attributes, Attribute, MemoryAdapter, Model, Query, RelationOptions};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), modelkit::ModelError> {
//! let storage = MemoryAdapter::new();
//! let user = Model::new("user");
//! let post = Model::new("post");
//! user.attr("id", Attribute::primary())?
//!     .attr("name", Attribute::new().required())?
//!     .set_adapter(storage.clone());
//! post.attr("id", Attribute::primary())?
//!     .attr("title", Attribute::new())?
//!     .attr("user_id", Attribute::new())?
//!     .set_adapter(storage.clone());
//! user.has_many(&post, RelationOptions::new())?;
//!
//! let alex = user.build(to_attributes(json!({ "name": "alex" })));
//! alex.save().await?;
//! alex.relation("posts")?
//!     .create(vec![to_attributes(json!({ "title": "hello" }))])
//!     .await?;
//!
//! assert_eq!(alex.relation("posts")?.count(Query::new()).await?, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## 🗺️ Module Tour
//!
//! - [`model`]: the factory and a type's registries
//! - [`instance`]: attribute access, dirty tracking, validation state
//! - [`lifecycle`]: `save`/`remove` and the static queries
//! - [`relation`]: declarations, join types, bound traversal
//! - [`adapter`], [`memory`], [`mock`]: the storage contract and two backends
//! - [`validation`], [`events`], [`plugin`], [`runtime`]: the extension points
//!
//! ### Running the Demo
//!
//! ```bash
//! RUST_LOG=info cargo run --bin modelkit-demo
//! ```

pub mod adapter;
pub mod attribute;
pub mod error;
pub mod events;
pub mod instance;
pub mod lifecycle;
pub mod memory;
pub mod mock;
pub mod model;
pub mod plugin;
pub mod relation;
pub mod runtime;
pub mod validation;
pub mod value;

pub use adapter::{Adapter, Capability, NoAdapter};
pub use attribute::{Attribute, DefaultValue, ValueFn};
pub use error::{AdapterError, ModelError};
pub use events::{Emitter, Event, Listener};
pub use instance::Instance;
pub use memory::MemoryAdapter;
pub use mock::{Call, ExpectationBuilder, MockAdapter};
pub use model::{create_model, Model, ModelOptions};
pub use plugin::Plugin;
pub use relation::{default_role, Relation, RelationHandle, RelationKind, RelationOptions};
pub use runtime::{setup_tracing, Environment, RuntimeConfig};
pub use validation::{AttributeError, ValidationErrors, Validator};
pub use value::{to_attributes, AttrType, Attributes, Collection, Query, RawCollection, Record, Related};
