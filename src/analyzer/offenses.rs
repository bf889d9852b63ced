//!
//! Reading the analyzer's `--format emacs` output.

use super::{AnalyzerDiagnostic, AnalyzerSeverity};
use regex::Regex;
use std::sync::LazyLock;

/// Line printed between the offenses and the corrected source in stdin mode.
pub const SOURCE_SEPARATOR: &str = "====================";

// file:line:col: S: [Corrected] Dept/Name: message
static OFFENSE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<file>.+?):(?P<line>\d+):(?P<column>\d+): (?P<severity>[IRCWEF]): (?P<corrected>\[Corrected\] )?(?:\[Correctable\] )?(?:(?P<rule>[A-Z][A-Za-z0-9]*(?:/[A-Z][A-Za-z0-9]*)+): )?(?P<message>.*)$",
    )
    .unwrap()
});

/// Split stdout into the offense lines and the rewritten source, if any.
pub fn split_output(stdout: &str) -> (&str, Option<&str>) {
    let mut offset = 0;
    for line in stdout.split_inclusive('\n') {
        if line.trim_end() == SOURCE_SEPARATOR {
            return (&stdout[..offset], Some(&stdout[offset + line.len()..]));
        }
        offset += line.len();
    }
    (stdout, None)
}

/// Parse emacs-format offense lines, skipping anything else.
pub fn parse_offenses(output: &str) -> Vec<AnalyzerDiagnostic> {
    output
        .lines()
        .filter_map(|line| {
            let captures = OFFENSE_LINE.captures(line)?;
            let severity = AnalyzerSeverity::from_letter(&captures["severity"])?;
            Some(AnalyzerDiagnostic {
                synthetic_line: captures["line"].parse().ok()?,
                column: captures["column"].parse().ok()?,
                message: captures["message"].to_string(),
                severity,
                rule: captures.name("rule").map(|rule| rule.as_str().to_string()),
                corrected: captures.name("corrected").is_some(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_offense_line() {
        let found = parse_offenses(
            "/tmp/show.haml:2:8: C: [Corrected] Layout/SpaceBeforeComma: Space found before comma.\n\
             /tmp/show.haml:5:1: W: Lint/UselessAssignment: Useless assignment to variable - `x`.\n",
        );
        assert_eq!(
            found,
            vec![
                AnalyzerDiagnostic {
                    synthetic_line: 2,
                    column: 8,
                    message: "Space found before comma.".to_string(),
                    severity: AnalyzerSeverity::Convention,
                    rule: Some("Layout/SpaceBeforeComma".to_string()),
                    corrected: true,
                },
                AnalyzerDiagnostic {
                    synthetic_line: 5,
                    column: 1,
                    message: "Useless assignment to variable - `x`.".to_string(),
                    severity: AnalyzerSeverity::Warning,
                    rule: Some("Lint/UselessAssignment".to_string()),
                    corrected: false,
                },
            ]
        );
    }

    #[test]
    fn test_windows_path_and_missing_rule() {
        let found = parse_offenses("C:\\app\\a.haml:3:1: F: unexpected token $end\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].synthetic_line, 3);
        assert_eq!(found[0].severity, AnalyzerSeverity::Fatal);
        assert_eq!(found[0].rule, None);
        assert_eq!(found[0].message, "unexpected token $end");
    }

    #[test]
    fn test_noise_is_ignored() {
        assert!(parse_offenses("Inspecting 1 file\n\n1 file inspected\n").is_empty());
    }

    #[test]
    fn test_split_output() {
        let (offenses, source) = split_output("a.rb:1:1: C: X/Y: z\n====================\nfoo(bar, 42)\n");
        assert_eq!(offenses, "a.rb:1:1: C: X/Y: z\n");
        assert_eq!(source, Some("foo(bar, 42)\n"));

        let (offenses, source) = split_output("a.rb:1:1: C: X/Y: z\n");
        assert_eq!(offenses, "a.rb:1:1: C: X/Y: z\n");
        assert_eq!(source, None);
    }
}
