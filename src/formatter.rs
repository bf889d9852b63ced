//! Output formatting and display utilities

use hamlcop_lib::lint::{LintWarning, Severity};

#[derive(Debug, Clone, Copy)]
enum Paint {
    Path,
    Line,
    Error,
    Warning,
    Corrected,
}

/// Human-readable formatter, colored when the `color` feature is on
pub struct TextFormatter {
    #[cfg_attr(not(feature = "color"), allow(dead_code))]
    use_colors: bool,
}

impl TextFormatter {
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Format: path:line [S] Rule: message
    pub fn format_lint(&self, path: &str, lint: &LintWarning) -> String {
        let severity = format!("[{}]", lint.severity.as_letter());
        let severity = match lint.severity {
            Severity::Error => self.paint(&severity, Paint::Error),
            Severity::Warning => self.paint(&severity, Paint::Warning),
        };
        let rule = lint
            .rule_name
            .as_deref()
            .map(|rule| format!("{rule}: "))
            .unwrap_or_default();
        let corrected = if lint.corrected {
            format!("{} ", self.paint("[Corrected]", Paint::Corrected))
        } else {
            String::new()
        };

        format!(
            "{}:{} {} {}{}{}",
            self.paint(path, Paint::Path),
            self.paint(&lint.line.to_string(), Paint::Line),
            severity,
            rule,
            corrected,
            lint.message
        )
    }

    pub fn summary(&self, files: usize, lints: usize, corrected: usize) -> String {
        let files_word = if files == 1 { "file" } else { "files" };
        let lints_word = if lints == 1 { "lint" } else { "lints" };
        let mut summary = format!("{files} {files_word} inspected, {lints} {lints_word} detected");
        if corrected > 0 {
            summary.push_str(&format!(", {corrected} corrected"));
        }
        summary
    }

    fn paint(&self, text: &str, paint: Paint) -> String {
        #[cfg(feature = "color")]
        if self.use_colors {
            use colored::Colorize;
            return match paint {
                Paint::Path => text.blue().underline(),
                Paint::Line => text.cyan(),
                Paint::Error => text.red().bold(),
                Paint::Warning => text.yellow(),
                Paint::Corrected => text.green(),
            }
            .to_string();
        }
        let _ = paint;
        text.to_string()
    }
}
