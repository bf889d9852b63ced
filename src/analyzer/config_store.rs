//!
//! Per-directory analyzer configuration, shared by every session of a run.

use super::AnalyzerInvocationError;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tempfile::NamedTempFile;

/// The analyzer configuration that applies to one directory.
#[derive(Debug)]
pub struct ResolvedConfig {
    /// Nearest analyzer config file found walking up
    pub source: Option<PathBuf>,
    /// `source` with the extra configuration merged on top
    merged: Option<NamedTempFile>,
}

impl ResolvedConfig {
    /// Path to hand to `--config`, if any.
    pub fn config_path(&self) -> Option<&Path> {
        self.merged
            .as_ref()
            .map(NamedTempFile::path)
            .or(self.source.as_deref())
    }
}

type Slot = Arc<OnceLock<Result<Arc<ResolvedConfig>, String>>>;

/// Resolves each directory at most once, even under concurrent lookups.
#[derive(Debug, Default)]
pub struct AnalyzerConfigStore {
    config_file_names: Vec<String>,
    extra_config: toml::Table,
    entries: Mutex<HashMap<PathBuf, Slot>>,
}

impl AnalyzerConfigStore {
    pub fn new(config_file_names: Vec<String>, extra_config: toml::Table) -> Self {
        Self {
            config_file_names,
            extra_config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Configuration for the directory containing `file`, or the current
    /// directory for in-memory sources.
    pub fn for_file(&self, file: Option<&Path>) -> Result<Arc<ResolvedConfig>, AnalyzerInvocationError> {
        let dir = directory_of(file);
        let slot = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(entries.entry(dir.clone()).or_default())
        };
        slot.get_or_init(|| self.resolve(&dir).map(Arc::new))
            .clone()
            .map_err(AnalyzerInvocationError::Config)
    }

    fn resolve(&self, dir: &Path) -> Result<ResolvedConfig, String> {
        let source = self.find_config_upward(dir);
        log::debug!(
            "[hamlcop-analyzer] Configuration for {}: {}",
            dir.display(),
            source
                .as_deref()
                .map_or_else(|| "none".to_string(), |path| path.display().to_string())
        );
        let merged = if self.extra_config.is_empty() {
            None
        } else {
            Some(self.write_merged(source.as_deref())?)
        };
        Ok(ResolvedConfig { source, merged })
    }

    fn find_config_upward(&self, dir: &Path) -> Option<PathBuf> {
        dir.ancestors().find_map(|ancestor| {
            self.config_file_names
                .iter()
                .map(|name| ancestor.join(name))
                .find(|candidate| candidate.is_file())
        })
    }

    fn write_merged(&self, source: Option<&Path>) -> Result<NamedTempFile, String> {
        let mut merged = self.extra_config.clone();
        if let Some(source) = source {
            merged.insert(
                "inherit_from".to_string(),
                toml::Value::String(source.display().to_string()),
            );
        }
        let yaml = serde_yml::to_string(&merged).map_err(|e| format!("Failed to serialize extra config: {e}"))?;

        let mut file = tempfile::Builder::new()
            .prefix(".hamlcop-analyzer")
            .suffix(".yml")
            .tempfile()
            .map_err(|e| format!("Failed to create merged config file: {e}"))?;
        file.write_all(yaml.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| format!("Failed to write merged config file: {e}"))?;
        Ok(file)
    }
}

fn directory_of(file: Option<&Path>) -> PathBuf {
    let current = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let dir = match file.and_then(Path::parent) {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => return current,
    };
    if dir.is_absolute() { dir } else { current.join(dir) }
}
