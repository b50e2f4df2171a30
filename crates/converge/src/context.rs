//! Run context and the engine boundary
//!
//! The [`Engine`] trait lets the orchestrator drive a convergence pass
//! without depending on how nodes are inspected or recipes executed.

use crate::attributes::deep_merge;
use crate::types::{ApplicationRecord, ConvergeSummary, InvalidRunListItem, RunListItem};
use anyhow::Result;
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;

/// Environment used when none is configured
pub const DEFAULT_ENVIRONMENT: &str = "_default";

/// Settings consumed by the engine when it builds a run context
#[derive(Debug, Clone)]
pub struct Settings {
    /// Node name; engines fall back to the host name
    pub node_name: Option<String>,
    pub environment: Option<String>,
    /// Run list assigned to the node
    pub run_list: Vec<RunListItem>,
    /// Fully local run with no managed server
    pub solo: bool,
    /// Where run files and diagnostics are written
    pub file_cache_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            node_name: None,
            environment: None,
            run_list: Vec::new(),
            solo: false,
            file_cache_path: PathBuf::from("/var/cache/deploy-app"),
        }
    }
}

/// The node being converged
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub name: String,
    pub environment: String,
    pub run_list: Vec<RunListItem>,
    pub attributes: Map<String, Value>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            ..Default::default()
        }
    }

    /// Role names from the run list, in run list order
    pub fn roles(&self) -> Vec<String> {
        self.run_list
            .iter()
            .filter(|item| item.is_role())
            .map(|item| item.name().to_string())
            .collect()
    }
}

/// Recipes already loaded in this run, in load order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenRecipes(Vec<String>);

impl SeenRecipes {
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|r| r == name)
    }

    /// Mark a recipe as seen. Returns false if it already was.
    pub fn insert(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.0.push(name.to_string());
        true
    }

    /// Forget a recipe. Returns true if it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|r| r != name);
        self.0.len() < before
    }

}

/// An attribute payload that cannot be applied to the node
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("please set the node's run list using the 'run_list' attribute only.")]
    AmbiguousRunList,

    #[error(transparent)]
    InvalidRunList(#[from] InvalidRunListItem),
}

/// A recipe queued for convergence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedRecipe {
    pub name: String,
    /// Application that was current when the recipe was loaded
    pub application: Option<String>,
}

/// Per-run state handed between the orchestrator and the engine
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub node: Node,
    pub seen_recipes: SeenRecipes,
    /// Application whose recipes are being loaded right now
    pub current_app: Option<ApplicationRecord>,
    loaded: Vec<LoadedRecipe>,
}

impl RunContext {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            ..Default::default()
        }
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.node.attributes
    }

    /// Recipes loaded so far, in order
    pub fn recipes(&self) -> &[LoadedRecipe] {
        &self.loaded
    }

    /// Merge an attribute payload into the node
    ///
    /// A `recipes` or `run_list` key replaces the node run list and is not
    /// kept as an attribute. The two are aliases; giving both is an error.
    pub fn consume_attributes(
        &mut self,
        mut payload: Map<String, Value>,
    ) -> Result<(), PayloadError> {
        let run_list = match (payload.remove("recipes"), payload.remove("run_list")) {
            (Some(_), Some(_)) => return Err(PayloadError::AmbiguousRunList),
            (recipes, run_list) => recipes.or(run_list),
        };

        if let Some(run_list) = run_list {
            self.node.run_list = parse_run_list(run_list)?;
            log::debug!(
                "Run list replaced by attributes: [{}]",
                self.node
                    .run_list
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        deep_merge(&mut self.node.attributes, payload);
        Ok(())
    }

    /// Load a recipe unless it has been seen in this run
    ///
    /// Returns true if the recipe was queued.
    pub fn load_recipe(&mut self, name: &str) -> bool {
        if !self.seen_recipes.insert(name) {
            log::debug!("Recipe {name} already loaded, skipping");
            return false;
        }
        self.loaded.push(LoadedRecipe {
            name: name.to_string(),
            application: self.current_app.as_ref().map(|app| app.id.clone()),
        });
        true
    }
}

fn parse_run_list(value: Value) -> Result<Vec<RunListItem>, InvalidRunListItem> {
    let Value::Array(items) = value else {
        return Err(InvalidRunListItem(value.to_string()));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => s.parse(),
            other => Err(InvalidRunListItem(other.to_string())),
        })
        .collect()
}

/// Capability interface of the convergence engine
pub trait Engine {
    /// Inspect the node, synchronize what the run needs and expand the run list
    fn build_context(&mut self, settings: &Settings) -> Result<RunContext>;

    /// Include a recipe in the run
    ///
    /// The default honours the seen set: a recipe already seen is not
    /// loaded again.
    fn include_recipe(&mut self, ctx: &mut RunContext, name: &str) -> Result<()> {
        ctx.load_recipe(name);
        Ok(())
    }

    /// Converge the node against the accumulated context
    fn converge(&mut self, ctx: &RunContext) -> Result<ConvergeSummary>;
}
