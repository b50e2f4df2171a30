use anyhow::{Context, Result};
use converge::{RunListItem, Settings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::{Cli, DEFAULT_CONFIG};

/// Default cache directory for run files and stacktraces
pub const DEFAULT_FILE_CACHE_PATH: &str = "/var/cache/deploy-app";

/// Default data bag directory when no server is configured
pub const DEFAULT_DATA_BAG_PATH: &str = "/etc/deploy-app/data_bags";

// ============================================================================
// Client Config
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub node_name: Option<String>,
    pub server_url: Option<String>,
    pub environment: Option<String>,
    /// Attribute source: a local path or an http(s) URL
    pub json_attribs: Option<String>,
    pub log_level: Option<String>,
    pub log_location: Option<String>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub file_cache_path: Option<String>,
    /// Directory of `<collection>/<id>.json` records, used without a server
    pub data_bag_path: Option<String>,
    /// Run list assigned to this node, e.g. `["role[frontend]"]`
    pub run_list: Vec<String>,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: "chef-client".to_string(),
            args: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Load the config file
    ///
    /// A missing file at the default location is not an error: `None` is
    /// returned and the run continues with command line options only.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content)
            .map(Some)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply command line overrides
    pub fn merge_cli(&mut self, cli: &Cli) {
        let overrides = [
            (&mut self.node_name, &cli.node_name),
            (&mut self.server_url, &cli.server_url),
            (&mut self.environment, &cli.environment),
            (&mut self.json_attribs, &cli.json_attribs),
            (&mut self.log_level, &cli.log_level),
            (&mut self.log_location, &cli.log_location),
            (&mut self.user, &cli.user),
            (&mut self.group, &cli.group),
        ];
        for (slot, value) in overrides {
            if let Some(value) = value {
                *slot = Some(value.clone());
            }
        }
    }

    pub fn file_cache_path(&self) -> PathBuf {
        expand(
            self.file_cache_path
                .as_deref()
                .unwrap_or(DEFAULT_FILE_CACHE_PATH),
        )
    }

    pub fn data_bag_path(&self) -> PathBuf {
        expand(self.data_bag_path.as_deref().unwrap_or(DEFAULT_DATA_BAG_PATH))
    }

    /// Engine settings derived from this config
    pub fn settings(&self) -> Result<Settings> {
        let run_list = self
            .run_list
            .iter()
            .map(|item| item.parse::<RunListItem>())
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid run_list in config")?;

        Ok(Settings {
            node_name: self.node_name.clone(),
            environment: self.environment.clone(),
            run_list,
            solo: false,
            file_cache_path: self.file_cache_path(),
        })
    }
}

/// Expand a leading `~` in a path
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path);
    PathBuf::from(expanded.as_ref())
}
