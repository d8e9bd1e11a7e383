//! # bastion-core
//!
//! The directive execution engine for the bastion runtime.
//!
//! This crate provides:
//! - The schema declaration model and the `SchemaBuilder` that compiles it
//! - The `DirectiveVisitor`/`Rule` seams directive families implement
//! - The enforcement wrappers installed around object fields and arguments
//! - `RequestContext`, the per-request predicate cache and strategy holder
//! - A sequential reference `execute` function
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bastion_core::{execute, RequestContext, SchemaBuilder};
//!
//! let schema = SchemaBuilder::new(declarations)
//!     .resolvers(resolvers)
//!     .directive(Arc::new(HasPermissions::new()))
//!     .build()?;
//! let result = execute(&schema, &query, &root, &RequestContext::default(), &variables);
//! ```

pub mod builder;
pub mod context;
pub mod enforce;
pub mod executor;
pub mod inputs;
pub mod policy;
pub mod resolver;
pub mod schema;
pub mod settings;
pub mod visitor;

pub use builder::SchemaBuilder;
pub use context::{ContextConfig, RequestContext, Verbosity};
pub use enforce::{FieldMiddleware, Next};
pub use executor::{execute, FieldSelection, Query};
pub use resolver::{from_fn, Arguments, ResolveInfo, Resolver, ResolverMap};
pub use schema::Schema;
pub use settings::Settings;
pub use visitor::{DirectiveVisitor, InheritanceMode, Instance, Rule, Subject};
