//! Lints reported against template lines.

use crate::analyzer::AnalyzerSeverity;
use serde::Serialize;
use std::fmt;

#[derive(Debug, PartialEq, Eq, Clone, Serialize)]
pub struct LintWarning {
    pub message: String,
    /// 1-based template line
    pub line: usize,
    pub severity: Severity,
    pub rule_name: Option<String>,
    /// The analyzer rewrote the offending code and the rewrite was applied
    pub corrected: bool,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_letter(self) -> &'static str {
        match self {
            Severity::Error => "E",
            Severity::Warning => "W",
        }
    }
}

impl From<AnalyzerSeverity> for Severity {
    fn from(severity: AnalyzerSeverity) -> Self {
        match severity {
            AnalyzerSeverity::Error | AnalyzerSeverity::Fatal => Severity::Error,
            AnalyzerSeverity::Info
            | AnalyzerSeverity::Refactor
            | AnalyzerSeverity::Convention
            | AnalyzerSeverity::Warning => Severity::Warning,
        }
    }
}

impl fmt::Display for LintWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.severity.as_letter())?;
        if let Some(rule) = &self.rule_name {
            write!(f, "{rule}: ")?;
        }
        if self.corrected {
            write!(f, "[Corrected] ")?;
        }
        write!(f, "{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_normalization() {
        assert_eq!(Severity::from(AnalyzerSeverity::Fatal), Severity::Error);
        assert_eq!(Severity::from(AnalyzerSeverity::Error), Severity::Error);
        assert_eq!(Severity::from(AnalyzerSeverity::Convention), Severity::Warning);
        assert_eq!(Severity::from(AnalyzerSeverity::Info), Severity::Warning);
    }

    #[test]
    fn test_display() {
        let warning = LintWarning {
            message: "Space found before comma.".to_string(),
            line: 3,
            severity: Severity::Warning,
            rule_name: Some("Layout/SpaceBeforeComma".to_string()),
            corrected: true,
        };
        assert_eq!(
            warning.to_string(),
            "W Layout/SpaceBeforeComma: [Corrected] Space found before comma."
        );
    }
}
