//! Command-backed engine
//!
//! Hands the converged run list and attributes to an external client
//! as a JSON run file (`<command> <args> -j <file>`).

use crate::context::{DEFAULT_ENVIRONMENT, Engine, Node, RunContext, Settings};
use crate::types::{CommandOutput, ConvergeSummary, ExitRequest, RunListItem};
use anyhow::{Context, Result, bail};
use serde_json::{Map, Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Name of the run file written into the cache directory
pub const RUN_FILE: &str = "deploy-app-run.json";

/// Client exit codes that ask for a reboot rather than report a failure
pub const REBOOT_SCHEDULED: i32 = 35;
pub const REBOOT_NEEDED: i32 = 37;

/// Engine that shells out to a configuration-management client
#[derive(Debug, Clone)]
pub struct CommandEngine {
    command: String,
    args: Vec<String>,
    cache_path: PathBuf,
}

impl CommandEngine {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            cache_path: Settings::default().file_cache_path,
        }
    }

    /// Path of the run file for the current cache directory
    pub fn run_file(&self) -> PathBuf {
        self.cache_path.join(RUN_FILE)
    }

    /// Write the run file the client consumes
    pub fn write_run_file(&self, ctx: &RunContext) -> Result<PathBuf> {
        let path = self.run_file();
        let content = serde_json::to_string_pretty(&run_document(ctx))?;
        fs::write(&path, content)
            .with_context(|| format!("Could not write run file {}", path.display()))?;
        Ok(path)
    }
}

impl Engine for CommandEngine {
    fn build_context(&mut self, settings: &Settings) -> Result<RunContext> {
        let name = match &settings.node_name {
            Some(name) => name.clone(),
            None => detect_node_name()?,
        };

        self.cache_path = settings.file_cache_path.clone();
        prepare_cache(&self.cache_path)?;

        let mut node = Node::new(name);
        node.environment = settings
            .environment
            .clone()
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
        node.run_list = settings.run_list.clone();

        log::info!(
            "Building node {} in environment {} ({})",
            node.name,
            node.environment,
            if settings.solo { "solo" } else { "managed" }
        );
        Ok(RunContext::new(node))
    }

    fn converge(&mut self, ctx: &RunContext) -> Result<ConvergeSummary> {
        let summary = ConvergeSummary {
            recipes: ctx.recipes().iter().map(|r| r.name.clone()).collect(),
        };
        if summary.recipes.is_empty() {
            log::info!("No recipes to converge");
            return Ok(summary);
        }

        let run_file = self.write_run_file(ctx)?;
        log::info!(
            "Converging {} recipes with {}",
            summary.total(),
            self.command
        );

        let status = Command::new(&self.command)
            .args(&self.args)
            .arg("-j")
            .arg(&run_file)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("Failed to execute: {}", self.command))?;

        match status.code() {
            Some(0) => Ok(summary),
            Some(code @ REBOOT_SCHEDULED) => Err(reboot(code, "Reboot scheduled").into()),
            Some(code @ REBOOT_NEEDED) => Err(reboot(code, "Reboot needed").into()),
            _ => bail!("{} failed with {}", self.command, status),
        }
    }
}

/// Attributes plus the run list and per-recipe application ids
fn run_document(ctx: &RunContext) -> Value {
    let mut doc: Map<String, Value> = ctx.attributes().clone();

    let run_list: Vec<String> = ctx
        .recipes()
        .iter()
        .map(|r| RunListItem::Recipe(r.name.clone()).to_string())
        .collect();
    let applications: Map<String, Value> = ctx
        .recipes()
        .iter()
        .filter_map(|r| {
            r.application
                .as_ref()
                .map(|app| (r.name.clone(), Value::String(app.clone())))
        })
        .collect();

    doc.insert("run_list".into(), json!(run_list));
    doc.insert(
        "deploy_app".into(),
        json!({
            "node_name": ctx.node.name,
            "environment": ctx.node.environment,
            "applications": applications,
        }),
    );
    Value::Object(doc)
}

fn reboot(code: i32, message: &str) -> ExitRequest {
    log::warn!("{message}, exiting with {code}");
    ExitRequest {
        code: code as u8,
        message: Some(message.to_string()),
    }
}

fn prepare_cache(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("Could not create cache directory {}", path.display()))
}

fn detect_node_name() -> Result<String> {
    let output: CommandOutput = Command::new("hostname")
        .output()
        .context("Failed to execute: hostname")?
        .into();

    if !output.success {
        bail!("Could not determine node name: {}", output.stderr_str().trim());
    }
    let name = output.stdout_str().trim().to_string();
    if name.is_empty() {
        bail!("Could not determine node name: hostname printed nothing");
    }
    Ok(name)
}
