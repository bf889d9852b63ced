//!
//! Lays fragments out into the synthetic Ruby source and splices corrected
//! sources back into the template.

use super::fragment::{Fragment, MarkerSpan};
use super::template_lines::TemplateLines;
use super::{MARKER_PREFIX, TransferSkipped};
use crate::utils::{indentation, join_lines, split_lines};
use std::collections::BTreeMap;

/// Synthetic line -> template line, both 1-based. Not injective: fused
/// fragments may map several synthetic lines near one template line, and
/// markers, placeholders and synthetic `end`s are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    entries: BTreeMap<usize, usize>,
}

impl SourceMap {
    pub fn get(&self, synthetic_line: usize) -> Option<usize> {
        self.entries.get(&synthetic_line).copied()
    }

    /// Template line for a diagnostic: the mapped line, else the nearest
    /// preceding mapped one, else line 1.
    pub fn template_line(&self, synthetic_line: usize) -> usize {
        self.entries
            .range(..=synthetic_line)
            .next_back()
            .map_or(1, |(_, &template_line)| template_line)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, synthetic_line: usize, template_line: usize) {
        self.entries.insert(synthetic_line, template_line);
    }
}

pub struct Assembler {
    lines: Vec<String>,
    source_map: SourceMap,
}

impl Assembler {
    /// Fuse `fragments` where safe and lay them out between markers.
    pub fn assemble(fragments: Vec<Fragment>, template_lines: &[String]) -> Assembly {
        let mut fragments = fuse_all(fragments, template_lines);
        let mut assembler = Assembler {
            lines: Vec::new(),
            source_map: SourceMap::default(),
        };
        for fragment in &mut fragments {
            assembler.add_fragment(fragment);
        }
        if assembler.lines.last().is_some_and(|line| !line.is_empty()) {
            assembler.lines.push(String::new());
        }

        Assembly {
            source: join_lines(&assembler.lines),
            lines: assembler.lines,
            source_map: assembler.source_map,
            fragments,
        }
    }

    /// Marker ids are the marker's own synthetic line number.
    fn add_marker(&mut self, level: usize) -> usize {
        let id = self.lines.len() + 1;
        self.lines.push(format!("{}{MARKER_PREFIX}{id}", indentation(level)));
        id
    }

    fn add_fragment(&mut self, fragment: &mut Fragment) {
        if !fragment.wraps_in_markers() {
            self.lines.extend(fragment.lines.iter().cloned());
            return;
        }

        let start = self.add_marker(fragment.start_marker_level());
        let mut template_line = fragment.haml_start;
        for (i, line) in fragment.lines.iter().enumerate() {
            self.lines.push(line.clone());
            if fragment.synthetic_lines().contains(&i) {
                continue;
            }
            self.source_map.insert(self.lines.len(), template_line);
            template_line += 1;
        }
        let end = self.add_marker(fragment.end_level.unwrap_or(0));
        fragment.markers = Some(MarkerSpan { start, end });
    }
}

fn fuse_all(fragments: Vec<Fragment>, template_lines: &[String]) -> Vec<Fragment> {
    let mut fused: Vec<Fragment> = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        match fused.last().and_then(|last| last.fuse(&fragment, template_lines)) {
            Some(merged) => {
                if let Some(last) = fused.last_mut() {
                    *last = merged;
                }
            }
            None => fused.push(fragment),
        }
    }
    fused
}

/// Index of marker `id` in `lines`: its own line when nothing moved,
/// otherwise the first line holding it.
pub fn find_marker(lines: &[String], id: usize) -> Option<usize> {
    let marker = format!("{MARKER_PREFIX}{id}");
    let expected = id.checked_sub(1)?;
    if lines.get(expected).is_some_and(|line| line.trim() == marker) {
        return Some(expected);
    }
    lines.iter().position(|line| line.trim() == marker)
}

/// Lines strictly between a fragment's markers.
fn marker_span(lines: &[String], markers: MarkerSpan) -> Result<&[String], String> {
    let start = find_marker(lines, markers.start).ok_or_else(|| format!("marker {MARKER_PREFIX}{} not found", markers.start))?;
    let end = find_marker(lines, markers.end).ok_or_else(|| format!("marker {MARKER_PREFIX}{} not found", markers.end))?;
    if end <= start {
        return Err(format!("markers {} and {} are out of order", markers.start, markers.end));
    }
    Ok(&lines[start + 1..end])
}

/// The synthetic source of a document.
#[derive(Debug, Clone)]
pub struct Assembly {
    fragments: Vec<Fragment>,
    lines: Vec<String>,
    source: String,
    source_map: SourceMap,
}

/// Template lines after carrying back a correction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectedTemplate {
    pub lines: Vec<String>,
    pub skipped: Vec<TransferSkipped>,
}

impl CorrectedTemplate {
    pub fn text(&self) -> String {
        join_lines(&self.lines)
    }
}

impl Assembly {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn source_map(&self) -> &SourceMap {
        &self.source_map
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Nothing was extracted.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Carry `corrected` back into `template`, last fragment first so a
    /// change in line count never shifts a fragment still to be processed.
    pub fn apply_corrections(&self, template: &[String], corrected: &str) -> CorrectedTemplate {
        self.transfer_in_order(self.fragments.iter().rev(), template, corrected)
    }

    fn transfer_in_order<'f>(
        &self,
        order: impl Iterator<Item = &'f Fragment>,
        template: &[String],
        corrected: &str,
    ) -> CorrectedTemplate {
        let corrected_lines = split_lines(corrected);
        let mut lines = TemplateLines::new(template.to_vec());
        let mut skipped = Vec::new();

        for fragment in order {
            if let Err(skip) = self.transfer_fragment(fragment, &corrected_lines, &mut lines) {
                log::debug!("{skip}");
                skipped.push(skip);
            }
        }

        let mut lines = lines.into_lines();
        let finished_with_empty_line = template.last().is_some_and(|line| line.is_empty());
        if finished_with_empty_line && !lines.last().is_some_and(|line| line.is_empty()) {
            lines.push(String::new());
        }
        CorrectedTemplate { lines, skipped }
    }

    fn transfer_fragment(
        &self,
        fragment: &Fragment,
        corrected_lines: &[String],
        template: &mut TemplateLines,
    ) -> Result<(), TransferSkipped> {
        let Some(markers) = fragment.markers else {
            return Ok(());
        };
        let skip = |reason: String| TransferSkipped {
            template_line: fragment.haml_start,
            reason,
        };
        let from = marker_span(&self.lines, markers).map_err(skip)?;
        let to = marker_span(corrected_lines, markers).map_err(skip)?;
        fragment.transfer(from, to, template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TemplateDocument;
    use crate::extraction::extract;
    use pretty_assertions::assert_eq;

    fn assemble(text: &str) -> (TemplateDocument, Assembly) {
        let document = TemplateDocument::new(text, None).unwrap();
        let fragments = extract(document.extraction_context());
        let assembly = Assembler::assemble(fragments, document.current_lines());
        (document, assembly)
    }

    #[test]
    fn test_single_script() {
        let (_, assembly) = assemble("- foo(bar , 42)\n");
        assert_eq!(assembly.source(), "haml_lint_marker_1\nfoo(bar , 42)\nhaml_lint_marker_3\n");
        assert_eq!(assembly.source_map().get(2), Some(1));
        assert_eq!(assembly.source_map().get(1), None);
    }

    #[test]
    fn test_block_is_fused_with_its_end() {
        let (_, assembly) = assemble("- deeper do\n  - foo(bar , 42)\n");
        assert_eq!(
            assembly.source(),
            "haml_lint_marker_1\ndeeper do\n  foo(bar , 42)\nend\nhaml_lint_marker_5\n"
        );
        assert_eq!(assembly.source_map().get(3), Some(2));
        assert_eq!(assembly.source_map().get(4), None);
        assert_eq!(assembly.source_map().template_line(4), 2);
    }

    #[test]
    fn test_tag_attributes_layout() {
        let (_, assembly) = assemble("%tag{abc:   42}\n");
        assert_eq!(
            assembly.source(),
            "haml_lint_tag_placeholder\nhaml_lint_marker_2\nWWWW(abc:   42)\nhaml_lint_marker_4\n"
        );
    }

    #[test]
    fn test_tag_children_are_guarded() {
        let (_, assembly) = assemble("%tag\n  - foo(bar , 42)\n");
        assert_eq!(
            assembly.source(),
            "if haml_lint_tag_indent\n  haml_lint_tag_placeholder\n  haml_lint_marker_3\n  foo(bar , 42)\n  haml_lint_marker_5\nend\n"
        );
        assert_eq!(assembly.source_map().template_line(1), 1);
        assert_eq!(assembly.source_map().template_line(6), 2);
    }

    #[test]
    fn test_empty_document() {
        let (_, assembly) = assemble("%p hello\n");
        assert!(!assembly.is_empty());
        let (_, assembly) = assemble("-# nothing\n");
        assert!(assembly.is_empty());
        assert_eq!(assembly.source(), "");
    }

    #[test]
    fn test_find_marker_falls_back_to_scan() {
        let lines: Vec<String> = ["x", "haml_lint_marker_1", "  haml_lint_marker_12"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(find_marker(&lines, 1), Some(1));
        assert_eq!(find_marker(&lines, 12), Some(2));
        assert_eq!(find_marker(&lines, 2), None);
    }

    #[test]
    fn test_unchanged_source_is_identity() {
        let text = "%div\n  - if a\n    = b(1 , 2)\n  :ruby\n    x = 1\n  %p= c\n";
        let (document, assembly) = assemble(text);
        let corrected = assembly.apply_corrections(document.current_lines(), assembly.source());
        assert_eq!(corrected.text(), text);
        assert!(corrected.skipped.is_empty());
    }

    #[test]
    fn test_missing_marker_skips_only_that_fragment() {
        let (document, assembly) = assemble("- foo(bar , 42)\n- zee(a ,  5)\n-# keep apart\n- last(1 , 2)\n");
        let corrected = assembly
            .source()
            .replace("haml_lint_marker_1\n", "")
            .replace("last(1 , 2)", "last(1, 2)")
            .replace("foo(bar , 42)", "foo(bar, 42)");
        let result = assembly.apply_corrections(document.current_lines(), &corrected);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].template_line, 1);
        assert_eq!(result.text(), "- foo(bar , 42)\n- zee(a ,  5)\n-# keep apart\n- last(1, 2)\n");
    }

    #[test]
    fn test_reverse_order_is_required() {
        let text = ":ruby\n  foo(bar , 42)\n  zee(:a => 5)\nhello #{foo(bar , 42)}\n";
        let (document, assembly) = assemble(text);
        assert_eq!(
            assembly.source(),
            "haml_lint_marker_1\nfoo(bar , 42)\nzee(:a => 5)\nhaml_lint_marker_4\nhaml_lint_marker_5\nHL.out = foo(bar , 42)\nhaml_lint_marker_7\n"
        );
        let corrected = "haml_lint_marker_1\nfoo(bar, 42)\n\nzee(a: 5)\nhaml_lint_marker_4\nhaml_lint_marker_5\nHL.out = foo(bar, 42)\nhaml_lint_marker_7\n";

        let reverse = assembly.apply_corrections(document.current_lines(), corrected);
        assert_eq!(reverse.text(), ":ruby\n  foo(bar, 42)\n\n  zee(a: 5)\nhello #{foo(bar, 42)}\n");
        assert!(reverse.skipped.is_empty());

        let forward = assembly.transfer_in_order(assembly.fragments().iter(), document.current_lines(), corrected);
        assert_ne!(forward.text(), reverse.text());
        assert_eq!(forward.skipped.len(), 1);
    }
}
