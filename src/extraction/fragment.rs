//!
//! Fragments: independently correctable spans of embedded Ruby.
//!
//! Each variant knows how to carry a corrected span back into the template
//! lines. Transfers receive the span as it was assembled (`from`) and as the
//! analyzer left it (`to`), both without their markers.

use super::keywords::is_mid_block;
use super::template_lines::TemplateLines;
use super::{OUTPUT_PREFIX, TransferSkipped};
use crate::template::NodeId;
use crate::utils::{StrExt, indent};
use regex::Regex;
use std::sync::LazyLock;

static WRAP_OPENING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*W+\(").unwrap());
static WRAP_CLOSING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\)\s*$").unwrap());
static UNFINISHED_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",[ \t]*$").unwrap());
// A line HAML cannot continue onto the next one
static OPEN_CONTINUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:[(\[{\\.+*/%-]|&&|\|\||\b(?:and|or|not))\s*$").unwrap());
static CLOSING_START: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(?:[)\]}]|\.|&\.)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    /// `if haml_lint_tag_indent` opening the block of a tag's children
    TagIndent,
    Tag,
    Plain,
    Filter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentKind {
    /// `-` or `=` script, possibly fused with following scripts and `end`s
    Script {
        /// Never fuse into the preceding fragment
        must_start: bool,
        /// Indexes of lines with no template counterpart
        synthetic_lines: Vec<usize>,
        /// Sigil and padding of each statement as written, e.g. `"!= "`
        sigils: Vec<String>,
    },
    ImplicitBlockEnd,
    Interpolation {
        /// Byte offset of the code in its template line
        start_char: usize,
    },
    TagAttributes {
        /// Spaces added to continuation lines to fit the wrapper
        extra_indent: usize,
    },
    TagTrailingScript,
    RubyFilterBody {
        /// Column of the body in the template
        body_indent: usize,
        level: usize,
    },
    Placeholder(PlaceholderKind),
}

/// Synthetic line numbers of a fragment's markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerSpan {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct Fragment {
    pub node: NodeId,
    pub kind: FragmentKind,
    pub lines: Vec<String>,
    /// 1-based template line of the first code line
    pub haml_start: usize,
    /// 1-based template line of the last code line
    pub haml_end: usize,
    /// Indentation level of the end marker; `None` never fuses
    pub end_level: Option<usize>,
    /// Set by the assembler
    pub markers: Option<MarkerSpan>,
}

impl Fragment {
    pub fn new(node: NodeId, kind: FragmentKind, lines: Vec<String>, haml_start: usize, end_level: Option<usize>) -> Self {
        let haml_end = haml_start + lines.len().saturating_sub(1);
        Self {
            node,
            kind,
            lines,
            haml_start,
            haml_end,
            end_level,
            markers: None,
        }
    }

    pub fn script(node: NodeId, lines: Vec<String>, haml_start: usize, end_level: usize, must_start: bool) -> Self {
        Self::new(
            node,
            FragmentKind::Script {
                must_start,
                synthetic_lines: Vec::new(),
                sigils: Vec::new(),
            },
            lines,
            haml_start,
            Some(end_level),
        )
    }

    /// Remember the sigil a script was written with.
    pub fn with_sigil(mut self, sigil: impl Into<String>) -> Self {
        if let FragmentKind::Script { sigils, .. } = &mut self.kind {
            sigils.push(sigil.into());
        }
        self
    }

    pub fn placeholder(node: NodeId, kind: PlaceholderKind, line: String, haml_start: usize) -> Self {
        Self::new(node, FragmentKind::Placeholder(kind), vec![line], haml_start, None)
    }

    pub fn wraps_in_markers(&self) -> bool {
        !matches!(self.kind, FragmentKind::Placeholder(_) | FragmentKind::ImplicitBlockEnd)
    }

    /// Lines whose synthetic line has no template counterpart.
    pub fn synthetic_lines(&self) -> &[usize] {
        match &self.kind {
            FragmentKind::Script { synthetic_lines, .. } => synthetic_lines,
            _ => &[],
        }
    }

    /// Indentation level of the start marker, from the first code line.
    ///
    /// A script starting with `else`/`when`/... is one level deeper so the
    /// marker stays inside the preceding branch.
    pub fn start_marker_level(&self) -> usize {
        let first = self.lines.first().map_or("", String::as_str);
        let level = first.leading_spaces() / 2;
        match self.kind {
            FragmentKind::Script { .. } if is_mid_block(first.trim_start()) => level + 1,
            _ => level,
        }
    }

    /// Merge `other` into this fragment when it is provably safe.
    ///
    /// Only scripts absorb anything: a following script or `end` with a
    /// defined end level, separated by nothing but blank template lines.
    pub fn fuse(&self, other: &Fragment, template_lines: &[String]) -> Option<Fragment> {
        let FragmentKind::Script {
            must_start,
            synthetic_lines,
            sigils,
        } = &self.kind
        else {
            return None;
        };
        other.end_level?;

        let mut lines = self.lines.clone();
        let mut skips = synthetic_lines.clone();
        let mut sigils = sigils.clone();
        let haml_end;

        match &other.kind {
            FragmentKind::ImplicitBlockEnd => {
                skips.extend(lines.len()..lines.len() + other.lines.len());
                haml_end = self.haml_end;
            }
            FragmentKind::Script {
                must_start: false,
                synthetic_lines: other_skips,
                sigils: other_sigils,
            } => {
                let gap_start = self.haml_end;
                let gap_end = other.haml_start.saturating_sub(1);
                if gap_end > gap_start {
                    let gap = template_lines.get(gap_start..gap_end)?;
                    if !gap.iter().all(|line| line.is_blank()) {
                        return None;
                    }
                    lines.extend(std::iter::repeat_n(String::new(), gap.len()));
                }
                skips.extend(other_skips.iter().map(|i| i + lines.len()));
                sigils.extend(other_sigils.iter().cloned());
                haml_end = other.haml_end;
            }
            _ => return None,
        }

        lines.extend(other.lines.iter().cloned());
        Some(Fragment {
            node: self.node,
            kind: FragmentKind::Script {
                must_start: *must_start,
                synthetic_lines: skips,
                sigils,
            },
            lines,
            haml_start: self.haml_start,
            haml_end,
            end_level: other.end_level,
            markers: None,
        })
    }

    fn skip(&self, reason: impl Into<String>) -> TransferSkipped {
        TransferSkipped {
            template_line: self.haml_start,
            reason: reason.into(),
        }
    }

    /// Carry the correction `from` -> `to` into `template`.
    pub fn transfer(&self, from: &[String], to: &[String], template: &mut TemplateLines) -> Result<(), TransferSkipped> {
        if from == to {
            return Ok(());
        }
        match &self.kind {
            FragmentKind::Script { sigils, .. } => self.transfer_script(from, to, sigils, template),
            FragmentKind::TagAttributes { extra_indent } => {
                self.transfer_tag_attributes(from, to, *extra_indent, template)
            }
            FragmentKind::TagTrailingScript => self.transfer_tag_script(from, to, template),
            FragmentKind::Interpolation { start_char } => self.transfer_interpolation(from, to, *start_char, template),
            FragmentKind::RubyFilterBody { body_indent, level } => {
                self.transfer_filter(from, to, *body_indent, *level, template);
                Ok(())
            }
            FragmentKind::ImplicitBlockEnd | FragmentKind::Placeholder(_) => Ok(()),
        }
    }

    fn transfer_script(
        &self,
        from: &[String],
        to: &[String],
        sigils: &[String],
        template: &mut TemplateLines,
    ) -> Result<(), TransferSkipped> {
        let from_last_indent = last_statement_indent(from);
        let to_last_indent = last_statement_indent(to);

        let to: Vec<&str> = to
            .iter()
            .map(String::as_str)
            .filter(|line| line.trim() != "end")
            .collect();
        check_script_split(&to).map_err(|reason| self.skip(reason))?;

        // Sigils are matched to statements by position, so only while the
        // analyzer kept the number of statements.
        let statements = (0..to.len())
            .filter(|&i| !to[i].is_blank() && starts_statement(&to, i))
            .count();
        let aligned = statements == sigils.len();
        if !aligned && sigils.iter().any(|sigil| !matches!(sigil.trim_end(), "=" | "-")) {
            return Err(self.skip("statements changed around a `!=`, `&=` or `~` script"));
        }

        let mut statement = 0;
        let mut continuation_delta: isize = 2;
        let mut haml = Vec::with_capacity(to.len());
        for (i, line) in to.iter().enumerate() {
            if line.is_blank() {
                haml.push(String::new());
            } else if starts_statement(&to, i) {
                let original = sigils.get(statement).filter(|_| aligned).map(String::as_str);
                statement += 1;
                let code_start = line.leading_spaces();
                let code = &line[code_start..];
                if let Some(output) = code.strip_prefix(OUTPUT_PREFIX) {
                    let sigil = original.filter(|sigil| !sigil.starts_with('-')).unwrap_or("= ");
                    continuation_delta = sigil.len() as isize - OUTPUT_PREFIX.len() as isize;
                    haml.push(format!("{}{}{}", &line[..code_start], sigil, output));
                } else {
                    let sigil = original.filter(|sigil| sigil.starts_with('-')).unwrap_or("- ");
                    continuation_delta = sigil.len() as isize;
                    haml.push(format!("{}{}{}", &line[..code_start], sigil, code));
                }
            } else {
                haml.push(indent(line, continuation_delta));
            }
        }

        let start = self.haml_start - 1;
        let count = haml.len();
        template.splice(start, self.haml_end, haml);
        if count == 0 {
            return Ok(());
        }
        let end = start + count - 1;
        template.lock(start..=end);
        if let (Some(from_indent), Some(to_indent)) = (from_last_indent, to_last_indent) {
            template.shift_indent_after(end, from_indent, to_indent);
        }
        Ok(())
    }

    fn transfer_tag_attributes(
        &self,
        from: &[String],
        to: &[String],
        extra_indent: usize,
        template: &mut TemplateLines,
    ) -> Result<(), TransferSkipped> {
        check_comma_split(to).map_err(|reason| self.skip(reason))?;
        let from = unwrap_attributes(from, extra_indent);
        let to = unwrap_attributes(to, extra_indent);

        let start = self.haml_start - 1;
        let end = start + from.len();
        let affected: Vec<&str> = (start..end).filter_map(|i| template.get(i)).collect();
        if affected.len() != from.len() {
            return Err(self.skip("attribute lines are past the end of the template"));
        }
        let affected = affected.join("\n");
        let from = from.join("\n");
        let to = to.join("\n");

        let search_from = affected.find('{').map_or(0, |brace| brace + 1);
        let Some(found) = affected[search_from..].find(&from).map(|i| i + search_from) else {
            return Err(self.skip("attributes no longer found in the tag"));
        };
        let mut replaced = String::with_capacity(affected.len() + to.len());
        replaced.push_str(&affected[..found]);
        replaced.push_str(&to);
        replaced.push_str(&affected[found + from.len()..]);

        template.splice(start, end, replaced.split('\n').map(str::to_string).collect());
        Ok(())
    }

    fn transfer_tag_script(&self, from: &[String], to: &[String], template: &mut TemplateLines) -> Result<(), TransferSkipped> {
        check_comma_split(to).map_err(|reason| self.skip(reason))?;
        let (Some(from_first), Some(to_first)) = (from.first(), to.first()) else {
            return Err(self.skip("script vanished"));
        };
        let first_to_indent = to_first.leading_spaces();
        let Some(from_code) = strip_output_prefix(from_first) else {
            return Err(self.skip("assembled script lost its output prefix"));
        };
        let Some(to_code) = strip_output_prefix(to_first) else {
            return Err(self.skip("corrected script no longer starts with its output prefix"));
        };

        let start = self.haml_start - 1;
        let Some(haml_line) = template.get(start) else {
            return Err(self.skip("script line is past the end of the template"));
        };
        let Some(offset) = haml_line.rfind(from_code) else {
            return Err(self.skip("script no longer found after the tag"));
        };
        let replaced = format!("{}{}", &haml_line[..offset], to_code);
        template.set(start, replaced);

        let delta = offset as isize - OUTPUT_PREFIX.len() as isize - first_to_indent as isize;
        let continuation = to[1..].iter().map(|line| indent(line, delta)).collect();
        template.splice(start + 1, start + from.len(), continuation);
        Ok(())
    }

    fn transfer_interpolation(
        &self,
        from: &[String],
        to: &[String],
        start_char: usize,
        template: &mut TemplateLines,
    ) -> Result<(), TransferSkipped> {
        let ([from], [to]) = (from, to) else {
            return Err(self.skip("interpolation spans several lines"));
        };
        let (Some(from_code), Some(to_code)) = (strip_output_prefix(from), strip_output_prefix(to)) else {
            return Err(self.skip("interpolation lost its output prefix"));
        };

        let index = self.haml_start - 1;
        let Some(line) = template.get(index) else {
            return Err(self.skip("interpolation line is past the end of the template"));
        };
        let end = start_char + from_code.len();
        if line.get(start_char..end) != Some(from_code) {
            return Err(self.skip("interpolation moved from its recorded offset"));
        }
        let replaced = format!("{}{}{}", &line[..start_char], to_code, &line[end..]);
        template.set(index, replaced);
        Ok(())
    }

    fn transfer_filter(&self, from: &[String], to: &[String], body_indent: usize, level: usize, template: &mut TemplateLines) {
        let start = self.haml_start - 1;
        let mut first_missing = None;

        for i in 0..from.len().max(to.len()) {
            let to_haml = to.get(i).map(|line| {
                if line.is_blank() {
                    String::new()
                } else {
                    format!("{}{}", " ".repeat(body_indent), indent(line, -((level * 2) as isize)))
                }
            });

            match (from.get(i), to_haml) {
                (None, Some(line)) => {
                    template.insert(start + i, line);
                    template.lock(start + i..=start + i);
                }
                (Some(_), None) => {
                    let index = *first_missing.get_or_insert(start + i);
                    template.remove(index);
                }
                (Some(before), Some(line)) => {
                    if *before != to[i] {
                        template.set(start + i, line);
                        template.lock(start + i..=start + i);
                    }
                }
                (None, None) => {}
            }
        }
    }
}

fn unfinished(line: &str) -> bool {
    UNFINISHED_LINE.is_match(line)
}

fn starts_statement<S: AsRef<str>>(lines: &[S], index: usize) -> bool {
    index == 0 || !unfinished(lines[index - 1].as_ref())
}

/// Indentation of the last line starting a statement, `end` lines included.
fn last_statement_indent(lines: &[String]) -> Option<usize> {
    (0..lines.len())
        .rev()
        .filter(|&i| starts_statement(lines, i))
        .find_map(|i| lines[i].first_non_blank())
}

fn strip_output_prefix(line: &str) -> Option<&str> {
    line.trim_start().strip_prefix(OUTPUT_PREFIX)
}

/// Rewritten script lines HAML can represent: statements split after commas
/// only, with the output prefix nowhere but at a statement start.
fn check_script_split(lines: &[&str]) -> Result<(), String> {
    for (i, line) in lines.iter().enumerate() {
        if line.is_blank() {
            continue;
        }
        let statement = starts_statement(lines, i);
        if i + 1 < lines.len() && OPEN_CONTINUATION.is_match(line) {
            return Err(format!("line {} continues without a trailing comma", i + 1));
        }
        if i > 0 && CLOSING_START.is_match(line) {
            return Err(format!("line {} starts with a closing bracket or a call", i + 1));
        }
        let code = line.trim_start();
        let prefix_at = code.find(OUTPUT_PREFIX);
        if prefix_at.is_some_and(|at| at > 0 || !statement) {
            return Err(format!("output capture moved inside line {}", i + 1));
        }
    }
    Ok(())
}

/// Every line but the last must end with a comma.
fn check_comma_split(lines: &[String]) -> Result<(), String> {
    let Some((_, init)) = lines.split_last() else {
        return Err("code vanished".to_string());
    };
    match init.iter().position(|line| !unfinished(line)) {
        Some(i) => Err(format!("line {} does not end with a comma", i + 1)),
        None => Ok(()),
    }
}

/// Strip the `W...(`/`)` wrapper and the padding added to continuation lines.
fn unwrap_attributes(lines: &[String], extra_indent: usize) -> Vec<String> {
    let last = lines.len().saturating_sub(1);
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let mut line = if i == 0 {
                WRAP_OPENING.replace(line, "").into_owned()
            } else {
                indent(line, -(extra_indent as isize))
            };
            if i == last {
                line = WRAP_CLOSING.replace(&line, "").into_owned();
            }
            line
        })
        .collect()
}
