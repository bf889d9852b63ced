//! Ruby extraction: lift the Ruby code of a template into one synthetic
//! source, then carry the analyzer's corrections back into the template.
//!
//! [`extract`] walks the tree into [`Fragment`]s, [`Assembler::assemble`]
//! lays them out between markers and [`Assembly::apply_corrections`] splices
//! a corrected synthetic source back, last fragment first.

pub mod assembler;
pub mod extractor;
pub mod fragment;
pub mod keywords;
pub mod template_lines;

pub use assembler::{Assembler, Assembly, CorrectedTemplate, SourceMap};
pub use extractor::extract;
pub use fragment::{Fragment, FragmentKind, MarkerSpan, PlaceholderKind};
pub use template_lines::TemplateLines;

use crate::template::Tree;
use std::collections::HashMap;
use thiserror::Error;

/// Prefix making output scripts look like a used value.
pub const OUTPUT_PREFIX: &str = "HL.out = ";
pub const MARKER_PREFIX: &str = "haml_lint_marker_";

pub const TAG_INDENT_PLACEHOLDER: &str = "if haml_lint_tag_indent";
pub const TAG_PLACEHOLDER: &str = "haml_lint_tag_placeholder";
pub const PLAIN_PLACEHOLDER: &str = "haml_lint_plain_placeholder";
pub const FILTER_PLACEHOLDER: &str = "haml_lint_filter_placeholder";

/// Everything extraction reads from a document.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionContext<'a> {
    pub tree: &'a Tree,
    pub lines: &'a [String],
    pub interpolation_originals: &'a HashMap<String, String>,
}

/// A fragment whose correction could not be carried back. Only that
/// fragment's correction is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transfer skipped for template line {template_line}: {reason}")]
pub struct TransferSkipped {
    pub template_line: usize,
    pub reason: String,
}
