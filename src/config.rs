//!
//! Project configuration, read from `.hamlcop.toml` or `hamlcop.toml`.

use crate::analyzer::AnalyzerConfigStore;
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};

pub const CONFIG_FILES: &[&str] = &[".hamlcop.toml", "hamlcop.toml"];

/// Setting this to `true` keeps broken corrected text for inspection.
pub const DEBUG_ENV_VAR: &str = "HAMLCOP_DEBUG";

/// Errors that can occur when loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file at {path}: {source}")]
    IoError { source: io::Error, path: String },

    /// Failed to parse the configuration content
    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: String, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Keep a corrected text that fails to parse instead of rolling back
    pub debug: bool,
    pub analyzer: AnalyzerConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AnalyzerConfig {
    pub command: Vec<String>,
    /// Analyzer config files looked for from each template's directory up
    pub config_file_names: Vec<String>,
    /// Dropped from the report and disabled for the analyzer run
    pub ignored_rules: Vec<String>,
    /// Additionally disabled when autocorrecting
    pub ignored_autocorrect_rules: Vec<String>,
    /// Merged on top of the analyzer's own configuration
    pub extra_config: toml::Table,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            command: vec!["rubocop".to_string()],
            config_file_names: vec![".rubocop.yml".to_string()],
            ignored_rules: Vec::new(),
            ignored_autocorrect_rules: Vec::new(),
            extra_config: toml::Table::new(),
        }
    }
}

impl AnalyzerConfig {
    pub fn config_store(&self) -> AnalyzerConfigStore {
        AnalyzerConfigStore::new(self.config_file_names.clone(), self.extra_config.clone())
    }
}

impl Config {
    pub fn from_toml_str(content: &str, path: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            source,
            path: display.clone(),
        })?;
        Self::from_toml_str(&content, &display)
    }

    /// Load `explicit`, else the first config file found walking up from
    /// `start_dir`, else the defaults. Returns the file used.
    pub fn load(explicit: Option<&Path>, start_dir: &Path) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => discover_config_upward(start_dir),
        };
        let mut config = match &path {
            Some(path) => Self::load_file(path)?,
            None => Self::default(),
        };
        if debug_forced_by_env() {
            config.debug = true;
        }
        Ok((config, path))
    }
}

fn debug_forced_by_env() -> bool {
    std::env::var(DEBUG_ENV_VAR).is_ok_and(|value| value == "true")
}

/// Find a config file in `start_dir` or its parents, stopping at the
/// directory holding `.git`.
pub fn discover_config_upward(start_dir: &Path) -> Option<PathBuf> {
    const MAX_DEPTH: usize = 100; // Prevent infinite traversal

    for (depth, dir) in start_dir.ancestors().enumerate() {
        if depth >= MAX_DEPTH {
            log::debug!("[hamlcop-config] Maximum traversal depth reached");
            break;
        }
        log::debug!("[hamlcop-config] Searching for config in: {}", dir.display());

        if let Some(found) = CONFIG_FILES.iter().map(|name| dir.join(name)).find(|path| path.is_file()) {
            log::debug!("[hamlcop-config] Found config file: {}", found.display());
            return Some(found);
        }
        if dir.join(".git").exists() {
            log::debug!("[hamlcop-config] Stopping at .git directory");
            break;
        }
    }
    None
}
