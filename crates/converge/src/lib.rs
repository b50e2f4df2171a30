//! # Converge
//!
//! The engine side of a single deployment run.
//!
//! ## Core Concepts
//!
//! - **RunContext**: the node, its attributes, the recipes loaded so far,
//!   the seen set and the application currently being loaded
//! - **Engine**: builds the context, includes recipes, converges
//! - **CommandEngine**: an engine that delegates to an external client
//! - **RecordingEngine**: an in-memory engine for tests
//!
//! ## Example
//!
//! ```ignore
//! use converge::{CommandEngine, Engine, Settings};
//!
//! let mut engine = CommandEngine::new("chef-client", vec!["-z".into()]);
//! let mut ctx = engine.build_context(&Settings::default())?;
//! engine.include_recipe(&mut ctx, "application::nginx")?;
//! let summary = engine.converge(&ctx)?;
//! ```
//!
//! Inclusion honours the seen set: a recipe already loaded in this run is
//! skipped unless the caller removes it from `seen_recipes` first.

pub mod attributes;
pub mod context;
pub mod executor;
pub mod mock;
pub mod types;

// Re-export main types at crate root
pub use attributes::deep_merge;
pub use context::{
    DEFAULT_ENVIRONMENT, Engine, LoadedRecipe, Node, PayloadError, RunContext, SeenRecipes,
    Settings,
};
pub use executor::CommandEngine;
pub use mock::RecordingEngine;
pub use types::{
    ApplicationRecord, CommandOutput, ConvergeSummary, ExitRequest, InvalidRunListItem,
    RunListItem,
};
