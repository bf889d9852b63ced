//! Shared helpers: scripted analyzers and one-call session runs.
#![allow(dead_code)]

use hamlcop_lib::analyzer::{
    AnalyzeOptions, Analyzer, AnalyzerDiagnostic, AnalyzerInvocationError, AnalyzerOutput, AnalyzerSeverity,
    AutocorrectMode,
};
use hamlcop_lib::document::TemplateDocument;
use hamlcop_lib::extraction::{Assembler, Assembly, extract};
use hamlcop_lib::session::{LintSession, SessionError, SessionOptions, SessionReport};

pub type AnalyzeResult = Result<AnalyzerOutput, AnalyzerInvocationError>;

/// An analyzer rewriting the synthetic source with `rewrite`.
pub fn rewriting<F>(rewrite: F) -> impl Analyzer
where
    F: Fn(&str) -> String + Send + Sync,
{
    move |source: &str, _: &AnalyzeOptions| -> AnalyzeResult {
        Ok(AnalyzerOutput {
            diagnostics: Vec::new(),
            rewritten: Some(rewrite(source)),
        })
    }
}

/// An analyzer applying plain text replacements, in order.
pub fn replacing(pairs: &[(&str, &str)]) -> impl Analyzer {
    let pairs: Vec<(String, String)> = pairs.iter().map(|(from, to)| (from.to_string(), to.to_string())).collect();
    rewriting(move |source| {
        pairs
            .iter()
            .fold(source.to_string(), |text, (from, to)| text.replace(from.as_str(), to))
    })
}

/// An analyzer reporting fixed diagnostics and no rewrite.
pub fn reporting(diagnostics: Vec<AnalyzerDiagnostic>) -> impl Analyzer {
    move |_: &str, _: &AnalyzeOptions| -> AnalyzeResult {
        Ok(AnalyzerOutput {
            diagnostics: diagnostics.clone(),
            rewritten: None,
        })
    }
}

pub fn diagnostic(synthetic_line: usize, rule: &str) -> AnalyzerDiagnostic {
    AnalyzerDiagnostic {
        synthetic_line,
        column: 1,
        message: format!("{rule} offense"),
        severity: AnalyzerSeverity::Convention,
        rule: Some(rule.to_string()),
        corrected: false,
    }
}

pub fn autocorrect_session(text: &str) -> LintSession {
    LintSession::new(
        TemplateDocument::new(text, None).expect("fixture should parse"),
        SessionOptions {
            autocorrect: Some(AutocorrectMode::Safe),
            ignored_rules: Vec::new(),
        },
    )
}

/// Run one autocorrect cycle over `text`.
pub fn autocorrect(text: &str, analyzer: &dyn Analyzer) -> Result<(String, SessionReport), SessionError> {
    let mut session = autocorrect_session(text);
    let report = session.run(analyzer)?;
    Ok((session.document().current_text().to_string(), report))
}

/// The template text after one autocorrect cycle.
pub fn corrected_text(text: &str, analyzer: &dyn Analyzer) -> String {
    autocorrect(text, analyzer).expect("autocorrect should succeed").0
}

pub fn assemble(text: &str) -> (TemplateDocument, Assembly) {
    let document = TemplateDocument::new(text, None).expect("fixture should parse");
    let assembly = Assembler::assemble(extract(document.extraction_context()), document.current_lines());
    (document, assembly)
}
