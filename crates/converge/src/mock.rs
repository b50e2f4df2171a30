//! Recording engine for tests
//!
//! Builds an in-memory context and records every call so tests can
//! assert on what the orchestrator asked for.

use crate::context::{Engine, Node, RunContext, Settings};
use crate::types::{ConvergeSummary, RunListItem};
use anyhow::{Result, anyhow};

/// Engine that records calls and never touches the system
#[derive(Debug, Default)]
pub struct RecordingEngine {
    node_name: String,
    run_list: Vec<RunListItem>,
    fail_build: Option<String>,
    fail_include: Option<String>,
    fail_converge: Option<String>,

    pub build_calls: usize,
    pub converge_calls: usize,
    /// Every include request, in order, including ones the context skipped
    pub included: Vec<String>,
    /// Settings passed to the last `build_context`
    pub last_settings: Option<Settings>,
    /// Recipes present in the context at converge time
    pub converged: Vec<String>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            node_name: "test-node".into(),
            ..Default::default()
        }
    }

    /// Give the node these roles, ignoring the settings' run list
    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.run_list = roles
            .iter()
            .map(|r| RunListItem::Role((*r).to_string()))
            .collect();
        self
    }

    pub fn failing_build(mut self, message: &str) -> Self {
        self.fail_build = Some(message.to_string());
        self
    }

    pub fn failing_include(mut self, message: &str) -> Self {
        self.fail_include = Some(message.to_string());
        self
    }

    pub fn failing_converge(mut self, message: &str) -> Self {
        self.fail_converge = Some(message.to_string());
        self
    }

    /// Total calls of any kind
    pub fn calls(&self) -> usize {
        self.build_calls + self.converge_calls + self.included.len()
    }
}

impl Engine for RecordingEngine {
    fn build_context(&mut self, settings: &Settings) -> Result<RunContext> {
        self.build_calls += 1;
        self.last_settings = Some(settings.clone());
        if let Some(message) = &self.fail_build {
            return Err(anyhow!("{message}"));
        }

        let mut node = Node::new(self.node_name.clone());
        node.run_list = if self.run_list.is_empty() {
            settings.run_list.clone()
        } else {
            self.run_list.clone()
        };
        Ok(RunContext::new(node))
    }

    fn include_recipe(&mut self, ctx: &mut RunContext, name: &str) -> Result<()> {
        self.included.push(name.to_string());
        if let Some(message) = &self.fail_include {
            return Err(anyhow!("{message}"));
        }
        ctx.load_recipe(name);
        Ok(())
    }

    fn converge(&mut self, ctx: &RunContext) -> Result<ConvergeSummary> {
        self.converge_calls += 1;
        if let Some(message) = &self.fail_converge {
            return Err(anyhow!("{message}"));
        }
        self.converged = ctx.recipes().iter().map(|r| r.name.clone()).collect();
        Ok(ConvergeSummary {
            recipes: self.converged.clone(),
        })
    }
}
