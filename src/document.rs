//!
//! A template document: its current text, lines and parse tree.
//!
//! Every mutation goes through [`TemplateDocument::replace_text`], which
//! reparses and reverts to the last good text when the new one is broken.

use crate::extraction::ExtractionContext;
use crate::template::{HamlParser, ParseError, ParsedTemplate, TemplateParser, Tree};
use crate::utils::split_lines;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Parse(#[from] ParseError),
}

pub struct TemplateDocument {
    parser: Arc<dyn TemplateParser>,
    file: Option<PathBuf>,
    text: String,
    lines: Vec<String>,
    parsed: ParsedTemplate,
    changed: bool,
    keep_broken: bool,
}

impl TemplateDocument {
    /// Parse `text` with the built-in HAML parser.
    pub fn new(text: impl Into<String>, file: Option<PathBuf>) -> Result<Self, ParseError> {
        Self::with_parser(text, file, Arc::new(HamlParser))
    }

    pub fn with_parser(
        text: impl Into<String>,
        file: Option<PathBuf>,
        parser: Arc<dyn TemplateParser>,
    ) -> Result<Self, ParseError> {
        let text = text.into();
        let parsed = parser
            .parse(&text)
            .map_err(|e| locate(file.as_deref(), e))?;
        Ok(Self {
            parser,
            file,
            lines: split_lines(&text),
            text,
            parsed,
            changed: false,
            keep_broken: false,
        })
    }

    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let text = fs::read_to_string(path).map_err(|source| DocumentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(text, Some(path.to_path_buf()))?)
    }

    /// Keep a broken corrected text instead of reverting, for inspection.
    pub fn keep_broken_text(mut self, keep: bool) -> Self {
        self.keep_broken = keep;
        self
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn current_text(&self) -> &str {
        &self.text
    }

    pub fn current_lines(&self) -> &[String] {
        &self.lines
    }

    pub fn tree(&self) -> &Tree {
        &self.parsed.tree
    }

    pub fn was_changed(&self) -> bool {
        self.changed
    }

    pub fn extraction_context(&self) -> ExtractionContext<'_> {
        ExtractionContext {
            tree: &self.parsed.tree,
            lines: &self.lines,
            interpolation_originals: &self.parsed.interpolation_originals,
        }
    }

    /// Replace the text and reparse it.
    ///
    /// On a parse error the previous text is restored (unless broken text is
    /// kept) and the error is returned with a `file:line - ` prefix.
    pub fn replace_text(&mut self, new_text: String) -> Result<(), ParseError> {
        if new_text == self.text {
            return Ok(());
        }

        match self.parser.parse(&new_text) {
            Ok(parsed) => {
                self.lines = split_lines(&new_text);
                self.text = new_text;
                self.parsed = parsed;
                self.changed = true;
                Ok(())
            }
            Err(error) => {
                if self.keep_broken {
                    log::debug!("keeping unparsable corrected text of {}", self.display_name());
                    self.lines = split_lines(&new_text);
                    self.text = new_text;
                    self.changed = true;
                } else {
                    log::debug!("reverting {} to its last parsable text", self.display_name());
                }
                Err(locate(self.file.as_deref(), error))
            }
        }
    }

    /// Write the text back to its file when it was changed.
    ///
    /// Returns whether anything was written.
    pub fn write_to_disk(&mut self) -> io::Result<bool> {
        let Some(path) = &self.file else {
            return Ok(false);
        };
        if !self.changed {
            return Ok(false);
        }
        fs::write(path, &self.text)?;
        self.changed = false;
        Ok(true)
    }

    fn display_name(&self) -> String {
        self.file
            .as_ref()
            .map_or_else(|| "<string>".to_string(), |path| path.display().to_string())
    }
}

fn locate(file: Option<&Path>, error: ParseError) -> ParseError {
    let name = file.map_or_else(|| "<string>".to_string(), |path| path.display().to_string());
    let line = error.line.map_or_else(String::new, |line| line.to_string());
    ParseError {
        message: format!("{name}:{line} - {}", error.message),
        line: error.line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_replace_text_reparses() {
        let mut document = TemplateDocument::new("- foo\n", None).unwrap();
        assert!(!document.was_changed());
        document.replace_text("- bar\n%p\n".to_string()).unwrap();
        assert!(document.was_changed());
        assert_eq!(document.current_lines(), ["- bar", "%p", ""]);
        assert_eq!(document.tree().children(document.tree().root()).len(), 2);
    }

    #[test]
    fn test_identical_text_is_not_a_change() {
        let mut document = TemplateDocument::new("- foo\n", None).unwrap();
        document.replace_text("- foo\n".to_string()).unwrap();
        assert!(!document.was_changed());
    }

    #[test]
    fn test_broken_text_is_reverted() {
        let mut document = TemplateDocument::new("%p\n  - foo\n", Some(PathBuf::from("a.haml"))).unwrap();
        let error = document.replace_text("%p\n\t- foo\n".to_string()).unwrap_err();
        assert_eq!(error.message, "a.haml:2 - Indentation can't use tabs.");
        assert_eq!(document.current_text(), "%p\n  - foo\n");
        assert!(!document.was_changed());
    }

    #[test]
    fn test_broken_text_is_kept_in_debug_mode() {
        let mut document = TemplateDocument::new("%p\n", None).unwrap().keep_broken_text(true);
        assert!(document.replace_text("  %p\n".to_string()).is_err());
        assert_eq!(document.current_text(), "  %p\n");
        assert!(document.was_changed());
    }

    #[test]
    fn test_initial_parse_error_is_located() {
        let error = TemplateDocument::new("%p{\n", None).err().unwrap();
        assert_eq!(error.message, "<string>:1 - Unbalanced brackets.");
    }

    #[test]
    fn test_write_to_disk_only_when_changed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("view.haml");
        fs::write(&path, "- foo(bar , 42)\n").unwrap();

        let mut document = TemplateDocument::load(&path).unwrap();
        assert!(!document.write_to_disk().unwrap());

        document.replace_text("- foo(bar, 42)\n".to_string()).unwrap();
        assert!(document.write_to_disk().unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "- foo(bar, 42)\n");
        assert!(!document.was_changed());
    }
}
