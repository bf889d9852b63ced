//!
//! One lint (and optionally autocorrect) cycle over one document.
//!
//! The session extracts the document's Ruby, hands it to the analyzer, maps
//! the diagnostics back to template lines and, when a rewrite came back,
//! splices it into the document. A corrected text that no longer parses is
//! rolled back by the document before the error surfaces.

use crate::analyzer::{AnalyzeOptions, Analyzer, AnalyzerDiagnostic, AnalyzerInvocationError, AutocorrectMode};
use crate::document::TemplateDocument;
use crate::extraction::{Assembler, SourceMap, TransferSkipped, extract};
use crate::lint::LintWarning;
use crate::template::ParseError;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Clean,
    Analyzing,
    Correcting,
    /// The last cycle failed; the next run starts a fresh one
    Failed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Analyzer(#[from] AnalyzerInvocationError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub autocorrect: Option<AutocorrectMode>,
    pub ignored_rules: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Sorted by template line
    pub lints: Vec<LintWarning>,
    /// The template text changed
    pub corrected: bool,
    pub extracted_source: String,
    /// The analyzer's rewrite, when it produced one
    pub corrected_source: Option<String>,
    pub skipped: Vec<TransferSkipped>,
}

pub struct LintSession {
    document: TemplateDocument,
    options: SessionOptions,
    state: SessionState,
}

impl LintSession {
    pub fn new(document: TemplateDocument, options: SessionOptions) -> Self {
        Self {
            document,
            options,
            state: SessionState::Clean,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn document(&self) -> &TemplateDocument {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut TemplateDocument {
        &mut self.document
    }

    pub fn into_document(self) -> TemplateDocument {
        self.document
    }

    pub fn run(&mut self, analyzer: &dyn Analyzer) -> Result<SessionReport, SessionError> {
        self.state = SessionState::Analyzing;
        let result = self.cycle(analyzer);
        self.state = if result.is_ok() {
            SessionState::Clean
        } else {
            SessionState::Failed
        };
        result
    }

    fn cycle(&mut self, analyzer: &dyn Analyzer) -> Result<SessionReport, SessionError> {
        let fragments = extract(self.document.extraction_context());
        let assembly = Assembler::assemble(fragments, self.document.current_lines());
        let mut report = SessionReport {
            extracted_source: assembly.source().to_string(),
            ..SessionReport::default()
        };
        if assembly.is_empty() {
            return Ok(report);
        }
        log::debug!(
            "{}: {} fragments, {} synthetic lines",
            display_name(self.document.file()),
            assembly.fragments().len(),
            assembly.lines().len()
        );

        let options = AnalyzeOptions {
            file: self.document.file().map(Path::to_path_buf),
            autocorrect: self.options.autocorrect,
            ignored_rules: self.options.ignored_rules.clone(),
        };
        let output = analyzer.analyze(assembly.source(), &options)?;
        report.lints = self.map_diagnostics(output.diagnostics, assembly.source_map());

        let Some(rewritten) = output.rewritten.filter(|_| self.options.autocorrect.is_some()) else {
            return Ok(report);
        };
        if rewritten == assembly.source() {
            report.corrected_source = Some(rewritten);
            return Ok(report);
        }

        self.state = SessionState::Correcting;
        let corrected = assembly.apply_corrections(self.document.current_lines(), &rewritten);
        report.corrected_source = Some(rewritten);
        report.skipped = corrected.skipped.clone();

        let text = corrected.text();
        report.corrected = text != self.document.current_text();
        self.document.replace_text(text)?;
        Ok(report)
    }

    fn map_diagnostics(&self, diagnostics: Vec<AnalyzerDiagnostic>, source_map: &SourceMap) -> Vec<LintWarning> {
        let autocorrecting = self.options.autocorrect.is_some();
        let mut lints: Vec<LintWarning> = diagnostics
            .into_iter()
            .filter(|diagnostic| {
                diagnostic
                    .rule
                    .as_ref()
                    .is_none_or(|rule| !self.options.ignored_rules.contains(rule))
            })
            .map(|diagnostic| LintWarning {
                line: source_map.template_line(diagnostic.synthetic_line),
                message: diagnostic.message,
                severity: diagnostic.severity.into(),
                rule_name: diagnostic.rule,
                corrected: autocorrecting && diagnostic.corrected,
            })
            .collect();
        lints.sort_by_key(|lint| lint.line);
        lints
    }
}

fn display_name(file: Option<&Path>) -> String {
    file.map_or_else(|| "<string>".to_string(), |path| path.display().to_string())
}
