//! Core types shared between the orchestrator and the engine

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::process::Output;
use std::str::FromStr;
use thiserror::Error;

/// An application record as stored in the `apps` collection
///
/// `server_roles` lists the roles the application is deployed to, and
/// `types` maps each role to the things that make up that part of the
/// application. Each thing becomes an `application::<thing>` recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: String,
    #[serde(default)]
    pub server_roles: Vec<String>,
    #[serde(rename = "type", default)]
    pub types: BTreeMap<String, Vec<String>>,
    /// Everything else in the record, visible to recipes via `current_app`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApplicationRecord {
    /// Things declared for a role, in declared order
    pub fn things_for(&self, role: &str) -> Option<&[String]> {
        self.types.get(role).map(Vec::as_slice)
    }
}

/// A single run list entry: `role[name]` or `recipe[name]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RunListItem {
    Role(String),
    Recipe(String),
}

impl RunListItem {
    pub fn name(&self) -> &str {
        match self {
            Self::Role(name) | Self::Recipe(name) => name,
        }
    }

    pub fn is_role(&self) -> bool {
        matches!(self, Self::Role(_))
    }
}

impl fmt::Display for RunListItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role(name) => write!(f, "role[{name}]"),
            Self::Recipe(name) => write!(f, "recipe[{name}]"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid run list item: {0:?}")]
pub struct InvalidRunListItem(pub String);

impl FromStr for RunListItem {
    type Err = InvalidRunListItem;

    /// Bare names are recipes, as in `"nginx"` == `"recipe[nginx]"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bracketed = |prefix: &str| {
            s.strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(']'))
                .map(str::to_string)
        };

        if let Some(name) = bracketed("role[") {
            return non_empty(name, s).map(Self::Role);
        }
        if let Some(name) = bracketed("recipe[") {
            return non_empty(name, s).map(Self::Recipe);
        }
        if s.is_empty() || s.contains(['[', ']']) {
            return Err(InvalidRunListItem(s.to_string()));
        }
        Ok(Self::Recipe(s.to_string()))
    }
}

fn non_empty(name: String, raw: &str) -> Result<String, InvalidRunListItem> {
    if name.is_empty() {
        Err(InvalidRunListItem(raw.to_string()))
    } else {
        Ok(name)
    }
}

/// A deliberate request to end the process with a given code
///
/// Engines return this (through `anyhow`) when the process must exit with
/// exactly this code; callers pass it on without reclassifying it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("exit requested with code {code}")]
pub struct ExitRequest {
    pub code: u8,
    pub message: Option<String>,
}

/// Output from an engine command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
        }
    }
}

impl CommandOutput {
    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// Summary of a convergence pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvergeSummary {
    /// Recipes handed to the engine, in run order
    pub recipes: Vec<String>,
}

impl ConvergeSummary {
    pub fn total(&self) -> usize {
        self.recipes.len()
    }
}
