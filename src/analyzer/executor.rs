//! Runs a RuboCop-compatible command line tool over the synthetic source.
//!
//! The source goes in on stdin, offenses come back on stdout in emacs
//! format followed, when autocorrecting, by the corrected source.

use super::offenses::{parse_offenses, split_output};
use super::{AnalyzeOptions, Analyzer, AnalyzerConfigStore, AnalyzerInvocationError, AnalyzerOutput};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

/// Exit statuses meaning "ran fine" and "ran fine, found offenses".
const ACCEPTED_STATUSES: [i32; 2] = [0, 1];

/// Name the analyzer reports for sources not backed by a file.
const STDIN_FILE_NAME: &str = "template.haml";

pub struct ExternalToolAnalyzer {
    command: Vec<String>,
    config_store: Arc<AnalyzerConfigStore>,
    /// Extra rules disabled when autocorrecting
    ignored_autocorrect_rules: Vec<String>,
    /// Cache of tool availability checks (tool name -> available).
    tool_cache: Mutex<HashMap<String, bool>>,
}

impl ExternalToolAnalyzer {
    pub fn new(command: Vec<String>, config_store: Arc<AnalyzerConfigStore>) -> Self {
        Self {
            command,
            config_store,
            ignored_autocorrect_rules: Vec::new(),
            tool_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ignored_autocorrect_rules(mut self, rules: Vec<String>) -> Self {
        self.ignored_autocorrect_rules = rules;
        self
    }

    /// Check if a tool is available (lazy, cached).
    pub fn is_tool_available(&self, tool_name: &str) -> bool {
        if let Some(&available) = self
            .tool_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tool_name)
        {
            return available;
        }

        let available = check_tool_exists(tool_name);
        self.tool_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tool_name.to_string(), available);
        available
    }

    /// Arguments following the configured command.
    pub fn arguments(&self, options: &AnalyzeOptions, config_path: Option<&std::path::Path>) -> Vec<String> {
        let file = options
            .file
            .as_deref()
            .map_or_else(|| STDIN_FILE_NAME.to_string(), |file| file.display().to_string());
        let mut args = vec!["--stdin".to_string(), file, "--format".to_string(), "emacs".to_string()];

        if let Some(config_path) = config_path {
            args.push("--config".to_string());
            args.push(config_path.display().to_string());
        }

        let mut ignored = options.ignored_rules.clone();
        if options.autocorrect.is_some() {
            ignored.extend(self.ignored_autocorrect_rules.iter().cloned());
        }
        let mut seen = std::collections::HashSet::new();
        ignored.retain(|rule| seen.insert(rule.clone()));
        if !ignored.is_empty() {
            args.push("--except".to_string());
            args.push(ignored.join(","));
        }

        if let Some(mode) = options.autocorrect {
            args.push(mode.flag().to_string());
        }
        args
    }
}

impl Analyzer for ExternalToolAnalyzer {
    fn analyze(&self, source: &str, options: &AnalyzeOptions) -> Result<AnalyzerOutput, AnalyzerInvocationError> {
        let Some((tool_name, base_args)) = self.command.split_first() else {
            return Err(AnalyzerInvocationError::EmptyCommand);
        };
        if !self.is_tool_available(tool_name) {
            return Err(AnalyzerInvocationError::ToolNotFound {
                tool: tool_name.clone(),
            });
        }

        let config = self.config_store.for_file(options.file.as_deref())?;
        let io_error = |source: std::io::Error| AnalyzerInvocationError::Io {
            tool: tool_name.clone(),
            source,
        };

        let mut cmd = Command::new(tool_name);
        cmd.args(base_args)
            .args(self.arguments(options, config.config_path()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        log::debug!("[hamlcop-analyzer] Running {cmd:?}");

        let mut child = cmd.spawn().map_err(io_error)?;
        let stdout_handle = child
            .stdout
            .take()
            .map(|stdout| thread::spawn(move || read_pipe_to_string(stdout)));
        let stderr_handle = child
            .stderr
            .take()
            .map(|stderr| thread::spawn(move || read_pipe_to_string(stderr)));

        // Dropping stdin closes the pipe; the child is reaped even when the
        // write fails because it exited early.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(source.as_bytes()),
            None => Ok(()),
        };

        let status = child.wait().map_err(io_error)?;
        let stdout = join_reader(stdout_handle).map_err(io_error)?;
        let stderr = join_reader(stderr_handle).map_err(io_error)?;

        let code = status.code().unwrap_or(-1);
        if !ACCEPTED_STATUSES.contains(&code) {
            return Err(AnalyzerInvocationError::UnexpectedStatus {
                tool: tool_name.clone(),
                status: code,
                stderr: stderr.trim().to_string(),
            });
        }
        written.map_err(io_error)?;

        let (offenses, rewritten) = split_output(&stdout);
        Ok(AnalyzerOutput {
            diagnostics: parse_offenses(offenses),
            rewritten: rewritten.filter(|_| options.autocorrect.is_some()).map(str::to_string),
        })
    }
}

/// Check if a tool binary exists.
fn check_tool_exists(tool_name: &str) -> bool {
    #[cfg(unix)]
    let finder = "which";
    #[cfg(windows)]
    let finder = "where";

    Command::new(finder)
        .arg(tool_name)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

fn read_pipe_to_string<R: Read>(mut pipe: R) -> std::io::Result<String> {
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).to_string())
}

fn join_reader(handle: Option<thread::JoinHandle<std::io::Result<String>>>) -> std::io::Result<String> {
    match handle {
        Some(handle) => handle
            .join()
            .unwrap_or_else(|_| Err(std::io::Error::other("Output reader thread panicked"))),
        None => Ok(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnalyzerSeverity, AutocorrectMode};
    use std::path::PathBuf;

    fn analyzer(command: &[&str]) -> ExternalToolAnalyzer {
        ExternalToolAnalyzer::new(
            command.iter().map(|s| s.to_string()).collect(),
            Arc::new(AnalyzerConfigStore::new(Vec::new(), toml::Table::new())),
        )
    }

    #[test]
    fn test_arguments() {
        let analyzer = analyzer(&["rubocop"]).with_ignored_autocorrect_rules(vec!["Style/A".to_string()]);
        let options = AnalyzeOptions {
            file: Some(PathBuf::from("app/show.haml")),
            autocorrect: Some(AutocorrectMode::All),
            ignored_rules: vec!["Lint/B".to_string(), "Style/A".to_string()],
        };
        assert_eq!(
            analyzer.arguments(&options, Some(std::path::Path::new("/tmp/merged.yml"))),
            [
                "--stdin",
                "app/show.haml",
                "--format",
                "emacs",
                "--config",
                "/tmp/merged.yml",
                "--except",
                "Lint/B,Style/A",
                "-A"
            ]
        );

        let options = AnalyzeOptions::default();
        assert_eq!(
            analyzer.arguments(&options, None),
            ["--stdin", "template.haml", "--format", "emacs"]
        );
    }

    #[test]
    fn test_empty_command() {
        let result = analyzer(&[]).analyze("x", &AnalyzeOptions::default());
        assert!(matches!(result, Err(AnalyzerInvocationError::EmptyCommand)));
    }

    #[test]
    fn test_tool_not_found() {
        let result = analyzer(&["nonexistent-tool-xyz123"]).analyze("x", &AnalyzeOptions::default());
        assert!(matches!(result, Err(AnalyzerInvocationError::ToolNotFound { .. })));
    }

    #[test]
    #[cfg(unix)]
    fn test_offenses_and_rewrite_from_stdout() {
        let script = r#"src=$(cat); echo "$2:2:4: C: [Corrected] Layout/SpaceBeforeComma: Space found before comma."; echo "===================="; printf '%s\n' "$src" | sed 's/ ,/,/'; exit 1"#;
        let analyzer = analyzer(&["sh", "-c", script, "fake-analyzer"]);
        let options = AnalyzeOptions {
            autocorrect: Some(AutocorrectMode::Safe),
            ..AnalyzeOptions::default()
        };
        let output = analyzer
            .analyze("haml_lint_marker_1\nfoo(bar , 42)\nhaml_lint_marker_3\n", &options)
            .unwrap();
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].synthetic_line, 2);
        assert_eq!(output.diagnostics[0].severity, AnalyzerSeverity::Convention);
        assert_eq!(
            output.rewritten.as_deref(),
            Some("haml_lint_marker_1\nfoo(bar, 42)\nhaml_lint_marker_3\n")
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_unexpected_status_is_an_error() {
        let analyzer = analyzer(&["sh", "-c", "cat >/dev/null; echo boom >&2; exit 2", "fake-analyzer"]);
        match analyzer.analyze("x\n", &AnalyzeOptions::default()) {
            Err(AnalyzerInvocationError::UnexpectedStatus { status, stderr, .. }) => {
                assert_eq!(status, 2);
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected an unexpected status, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_early_exit_reports_status_not_broken_pipe() {
        // Exits without reading stdin, larger than any pipe buffer
        let analyzer = analyzer(&["sh", "-c", "echo refused >&2; exit 3", "fake-analyzer"]);
        let source = "foo(bar , 42)\n".repeat(100_000);
        match analyzer.analyze(&source, &AnalyzeOptions::default()) {
            Err(AnalyzerInvocationError::UnexpectedStatus { status, stderr, .. }) => {
                assert_eq!(status, 3);
                assert_eq!(stderr, "refused");
            }
            other => panic!("expected an unexpected status, got {other:?}"),
        }
    }
}
