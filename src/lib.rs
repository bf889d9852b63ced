//! Runs a Ruby analyzer over the code embedded in HAML templates and carries
//! its diagnostics and corrections back to the templates.
//!
//! A [`session::LintSession`] owns one [`document::TemplateDocument`]:
//! the document's Ruby is extracted into a synthetic source
//! ([`extraction`]), handed to an [`analyzer::Analyzer`], and any rewrite is
//! spliced back into the template.

pub mod analyzer;
pub mod config;
pub mod document;
pub mod exit_codes;
pub mod extraction;
pub mod lint;
pub mod session;
pub mod template;
pub mod utils;

pub use analyzer::{Analyzer, AutocorrectMode};
pub use document::TemplateDocument;
pub use lint::{LintWarning, Severity};
pub use session::{LintSession, SessionError, SessionOptions, SessionReport};
