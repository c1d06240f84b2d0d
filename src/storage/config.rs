//! Configuration handling for cloudforge
//!
//! Configuration is stored in `cloudforge.toml` (project, found by walking up
//! from the current directory) and `config.toml` in the platform config
//! directory (global).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::IgnoreRules;
use crate::migrate::{FailurePolicy, DEFAULT_CONTROL_TABLE};

use super::scripts::DEFAULT_INITIAL_SETUP;

/// Project configuration file name
pub const CONFIG_FILE: &str = "cloudforge.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Settings for Synapse workspace deployments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynapseConfig {
    /// Target workspace name for ARM resource names
    pub workspace_name: Option<String>,

    /// Reference types skipped during ordering (case-insensitive substrings)
    pub ignore_type_markers: Vec<String>,

    /// Reference names skipped during ordering (case-sensitive substrings)
    pub ignore_name_markers: Vec<String>,
}

impl Default for SynapseConfig {
    fn default() -> Self {
        let rules = IgnoreRules::default();
        Self {
            workspace_name: None,
            ignore_type_markers: rules.type_markers,
            ignore_name_markers: rules.name_markers,
        }
    }
}

impl SynapseConfig {
    pub fn ignore_rules(&self) -> IgnoreRules {
        IgnoreRules {
            type_markers: self.ignore_type_markers.clone(),
            name_markers: self.ignore_name_markers.clone(),
        }
    }
}

/// Settings for SQL deployments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SqlConfig {
    /// Ledger table
    pub control_table: String,

    /// Name of the initial setup script
    pub initial_setup: String,

    /// What to do when a script fails
    pub failure_policy: FailurePolicy,

    /// Ask before each script
    pub interactive: bool,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            control_table: DEFAULT_CONTROL_TABLE.to_string(),
            initial_setup: DEFAULT_INITIAL_SETUP.to_string(),
            failure_policy: FailurePolicy::Continue,
            interactive: false,
        }
    }
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    pub synapse: SynapseConfig,
    pub sql: SqlConfig,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,
}

/// Combined configuration (global + project)
#[derive(Debug, Clone)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,
    pub config_path: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from default locations
    pub fn load() -> Result<Self> {
        let global = Self::load_global()?;
        let config_path = std::env::current_dir()
            .ok()
            .and_then(|dir| Self::find_config_file(&dir));

        let project = match &config_path {
            Some(path) => Self::load_project_config(path)?,
            None => ProjectConfig::default(),
        };

        Ok(Self {
            project,
            global,
            config_path,
        })
    }

    /// Loads configuration with an explicit project config file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()).into());
        }

        Ok(Self {
            project: Self::load_project_config(path)?,
            global: Self::load_global()?,
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "cloudforge", "cloudforge").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads global configuration
    fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    /// Loads a project configuration file
    fn load_project_config(config_path: &Path) -> Result<ProjectConfig> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read project config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .with_context(|| format!("Failed to parse project config: {}", config_path.display()))
    }

    /// Finds `cloudforge.toml` in `start` or one of its parents
    pub fn find_config_file(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            let candidate = current.join(CONFIG_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }

            if !current.pop() {
                return None;
            }
        }
    }
}
