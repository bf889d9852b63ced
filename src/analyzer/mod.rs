//!
//! The external Ruby analyzer: what the session hands it and what comes back.
//!
//! Any closure with the right signature is an [`Analyzer`], which is how the
//! tests script rewrites. [`ExternalToolAnalyzer`] runs a RuboCop-compatible
//! command line tool.

pub mod config_store;
pub mod executor;
pub mod offenses;

pub use config_store::AnalyzerConfigStore;
pub use executor::ExternalToolAnalyzer;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutocorrectMode {
    /// Only corrections the analyzer marks as safe
    Safe,
    All,
}

impl AutocorrectMode {
    pub fn flag(self) -> &'static str {
        match self {
            AutocorrectMode::Safe => "-a",
            AutocorrectMode::All => "-A",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzeOptions {
    /// Template the source was extracted from, used for config lookup
    pub file: Option<PathBuf>,
    pub autocorrect: Option<AutocorrectMode>,
    /// Rules disabled for the run
    pub ignored_rules: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnalyzerSeverity {
    Info,
    Refactor,
    Convention,
    Warning,
    Error,
    Fatal,
}

impl AnalyzerSeverity {
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "I" => Some(AnalyzerSeverity::Info),
            "R" => Some(AnalyzerSeverity::Refactor),
            "C" => Some(AnalyzerSeverity::Convention),
            "W" => Some(AnalyzerSeverity::Warning),
            "E" => Some(AnalyzerSeverity::Error),
            "F" => Some(AnalyzerSeverity::Fatal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerDiagnostic {
    /// 1-based line in the synthetic source
    pub synthetic_line: usize,
    pub column: usize,
    pub message: String,
    pub severity: AnalyzerSeverity,
    pub rule: Option<String>,
    pub corrected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzerOutput {
    pub diagnostics: Vec<AnalyzerDiagnostic>,
    /// The rewritten source, when autocorrect ran
    pub rewritten: Option<String>,
}

/// The analyzer could not produce a result. Fatal for the document and
/// never retried.
#[derive(Debug, Error)]
pub enum AnalyzerInvocationError {
    #[error("Analyzer command is empty")]
    EmptyCommand,

    #[error("Analyzer '{tool}' not found in PATH")]
    ToolNotFound { tool: String },

    #[error("Failed to run analyzer '{tool}': {source}")]
    Io {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("Analyzer '{tool}' exited unsuccessfully with status {status}: {stderr}")]
    UnexpectedStatus { tool: String, status: i32, stderr: String },

    #[error("Failed to prepare analyzer configuration: {0}")]
    Config(String),
}

pub trait Analyzer: Send + Sync {
    fn analyze(&self, source: &str, options: &AnalyzeOptions) -> Result<AnalyzerOutput, AnalyzerInvocationError>;
}

impl<F> Analyzer for F
where
    F: Fn(&str, &AnalyzeOptions) -> Result<AnalyzerOutput, AnalyzerInvocationError> + Send + Sync,
{
    fn analyze(&self, source: &str, options: &AnalyzeOptions) -> Result<AnalyzerOutput, AnalyzerInvocationError> {
        self(source, options)
    }
}
