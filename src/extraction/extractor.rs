//!
//! Pre-order walk of the template tree producing [`Fragment`]s.
//!
//! Ruby code is recovered verbatim from the template lines rather than from
//! the parser's normalized text, so that corrections can be matched back.

use super::fragment::{Fragment, FragmentKind, PlaceholderKind};
use super::keywords::{is_case, is_mid_block, opens_block};
use super::{
    ExtractionContext, FILTER_PLACEHOLDER, OUTPUT_PREFIX, PLAIN_PLACEHOLDER, TAG_INDENT_PLACEHOLDER, TAG_PLACEHOLDER,
};
use crate::template::interpolation::scan_interpolations;
use crate::template::{NodeId, NodeKind, TagDetails, Tree};
use crate::utils::{StrExt, indent, indentation, insert_after_indentation};
use regex::Regex;
use std::sync::LazyLock;

static ATTRIBUTE_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*").unwrap());

/// Extract the fragments of a document, in template order.
pub fn extract(context: ExtractionContext<'_>) -> Vec<Fragment> {
    let mut extractor = Extractor {
        context,
        fragments: Vec::new(),
        level: 0,
    };
    extractor.visit(context.tree.root());
    extractor.fragments
}

/// Where to look for code on a single template line.
#[derive(Debug, Clone, Copy)]
enum Anchor {
    /// Inside the first `{`
    AfterBrace,
    /// Last occurrence
    Last,
}

struct Extractor<'a> {
    context: ExtractionContext<'a>,
    fragments: Vec<Fragment>,
    level: usize,
}

impl<'a> Extractor<'a> {
    fn visit(&mut self, id: NodeId) {
        let tree = self.context.tree;
        match &tree[id].kind {
            NodeKind::Root => self.visit_children(id),
            NodeKind::Script => self.visit_script(id, true),
            NodeKind::SilentScript => self.visit_script(id, false),
            NodeKind::Tag(details) => self.visit_tag(id, details),
            NodeKind::Plain => self.visit_plain(id),
            NodeKind::Comment { html: true } => self.visit_html_comment(id),
            NodeKind::Comment { html: false } => {}
            NodeKind::Filter { name } if name == "ruby" => self.visit_ruby_filter(id),
            NodeKind::Filter { .. } => self.visit_filter(id),
        }
    }

    fn visit_children(&mut self, id: NodeId) {
        for &child in self.context.tree.children(id) {
            self.visit(child);
        }
    }

    fn indentation(&self) -> String {
        indentation(self.level)
    }

    fn push(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    fn increment(&mut self) {
        self.level += 1;
    }

    fn decrement(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    fn last_haml_end(&self, fallback: usize) -> usize {
        self.fragments.last().map_or(fallback, |fragment| fragment.haml_end)
    }

    /// The line `line_number` and the lines it continues onto after a
    /// trailing comma.
    fn raw_lines_of_interest(&self, line_number: usize) -> Vec<&'a str> {
        let lines = self.context.lines;
        let Some(first) = line_number.checked_sub(1).and_then(|index| lines.get(index)) else {
            return Vec::new();
        };
        let mut index = line_number - 1;
        let mut found = vec![first.as_str()];
        while lines[index].trim_end().ends_with(',') && index + 1 < lines.len() {
            index += 1;
            found.push(lines[index].as_str());
        }
        found
    }

    /// Locate `code` as written in the template, starting at `line_number`.
    ///
    /// The parser joins comma-continued lines; this recovers the original
    /// line split. Returns the column of the code on its first line and its
    /// lines.
    fn raw_ruby_lines(&self, code: &str, line_number: usize, anchor: Anchor) -> Option<(usize, Vec<String>)> {
        let stripped = code.trim();
        if stripped.is_empty() {
            return None;
        }
        let lines = self.raw_lines_of_interest(line_number);
        let search_from = match anchor {
            Anchor::AfterBrace => lines.first()?.find('{').map_or(0, |brace| brace + 1),
            Anchor::Last => 0,
        };

        if let [line] = lines.as_slice() {
            let offset = match anchor {
                Anchor::AfterBrace => line.get(search_from..)?.find(stripped).map(|i| i + search_from),
                Anchor::Last => line.rfind(stripped),
            }?;
            return Some((offset, vec![stripped.to_string()]));
        }

        let raw = lines.join("\n");
        let flattened = stripped.replace('\n', " ");
        let mut parts: Vec<&str> = ATTRIBUTE_SEPARATOR.split(&flattened).collect();
        while parts.last().is_some_and(|part| part.is_empty()) {
            parts.pop();
        }
        let pattern = parts
            .iter()
            .map(|part| regex::escape(part))
            .collect::<Vec<_>>()
            .join(r",\s*");
        let found = Regex::new(&pattern).ok()?.find_at(&raw, search_from)?;
        let found_lines = found.as_str().split('\n').map(str::to_string).collect();
        Some((found.start(), found_lines))
    }

    /// A silent script continuing a block opened by a preceding sibling
    /// (`- else` after `- if`).
    fn continues_block(&self, id: NodeId) -> bool {
        let tree = self.context.tree;
        if !is_sibling_mid_block(tree, id) {
            return false;
        }
        for sibling in tree.previous_siblings(id) {
            let node = &tree[sibling];
            if is_sibling_mid_block(tree, sibling) {
                continue;
            }
            return node.is_script() && opens_block(&node.text);
        }
        false
    }

    /// The block of `id` goes on in its next sibling.
    fn block_continues_after(&self, id: NodeId) -> bool {
        let tree = self.context.tree;
        tree.next_sibling(id)
            .is_some_and(|next| is_sibling_mid_block(tree, next) && self.continues_block(next))
    }

    fn visit_script(&mut self, id: NodeId, output: bool) {
        let tree = self.context.tree;
        let node = &tree[id];
        let mut lines: Vec<String> = self
            .raw_lines_of_interest(node.line)
            .into_iter()
            .map(str::to_string)
            .collect();
        let sigils: &[&str] = if output { &["!=", "&=", "=", "~"] } else { &["-"] };
        let Some((first, sigil)) = lines.first().and_then(|first| strip_sigil(first, sigils)) else {
            log::debug!("script at line {} does not start with a sigil, left unextracted", node.line);
            self.visit_children(id);
            return;
        };
        lines[0] = first;
        let sigil_len = sigil.len();

        if output {
            lines[0] = insert_after_indentation(&lines[0], OUTPUT_PREFIX);
            let delta = OUTPUT_PREFIX.len() as isize - sigil_len as isize;
            for line in lines.iter_mut().skip(1) {
                *line = indent(line, delta);
            }
        } else {
            for line in lines.iter_mut().skip(1) {
                *line = indent(line, -(sigil_len as isize));
            }
        }

        let must_start = output
            && self.fragments.last().is_some_and(|previous| {
                matches!(previous.kind, FragmentKind::Script { .. })
                    && tree[previous.node].kind == NodeKind::Script
                    && Some(previous.node) == node.parent
            });

        let opens = opens_block(&node.text) || self.continues_block(id);
        let case_block = is_case(&node.text);
        if opens {
            self.increment();
        }
        if case_block {
            self.increment();
        }

        self.push(Fragment::script(id, lines, node.line, self.level, must_start).with_sigil(sigil));
        self.visit_children(id);

        if case_block {
            self.decrement();
        }
        if opens {
            self.decrement();
            if !self.block_continues_after(id) {
                let haml_start = self.last_haml_end(node.line);
                self.push(Fragment::new(
                    id,
                    FragmentKind::ImplicitBlockEnd,
                    vec![format!("{}end", self.indentation())],
                    haml_start,
                    Some(self.level),
                ));
            }
        }
    }

    /// Guard a block of children with `if haml_lint_tag_indent` so their
    /// deeper indentation stays valid Ruby.
    fn open_guard(&mut self, id: NodeId) {
        let line = self.context.tree[id].line;
        self.push(Fragment::placeholder(
            id,
            PlaceholderKind::TagIndent,
            format!("{}{}", self.indentation(), TAG_INDENT_PLACEHOLDER),
            line,
        ));
        self.increment();
    }

    fn close_guard(&mut self, id: NodeId) {
        self.decrement();
        let haml_start = self.last_haml_end(self.context.tree[id].line);
        self.push(Fragment::new(
            id,
            FragmentKind::ImplicitBlockEnd,
            vec![format!("{}end", self.indentation())],
            haml_start,
            None,
        ));
    }

    fn visit_tag(&mut self, id: NodeId, details: &TagDetails) {
        let tree = self.context.tree;
        let node = &tree[id];
        let has_children = !tree.children(id).is_empty();

        if has_children {
            self.open_guard(id);
        }
        self.push(Fragment::placeholder(
            id,
            PlaceholderKind::Tag,
            format!("{}{}", self.indentation(), TAG_PLACEHOLDER),
            node.line,
        ));

        let mut attribute_lines = None;
        match details.dynamic_attributes_sources.as_slice() {
            [] => {}
            [source] => attribute_lines = self.add_tag_attributes(id, source),
            sources => log::debug!(
                "tag at line {} has {} dynamic attribute sources, left unextracted",
                node.line,
                sources.len()
            ),
        }

        if let Some(script) = details.script.as_deref().filter(|script| !script.trim().is_empty()) {
            let line_number = node.line + attribute_lines.map_or(0, |count: usize| count - 1);
            self.add_tag_script(id, script, line_number);
        }

        if has_children {
            self.visit_children(id);
            self.close_guard(id);
        }
    }

    /// Returns the number of template lines the attributes span.
    fn add_tag_attributes(&mut self, id: NodeId, source: &str) -> Option<usize> {
        let line_number = self.context.tree[id].line;
        let Some((offset, mut lines)) = self.raw_ruby_lines(source, line_number, Anchor::AfterBrace) else {
            log::debug!("attributes at line {line_number} not found as written, left unextracted");
            return None;
        };

        let mut wrap_by = offset as isize - (self.level * 2) as isize;
        let mut extra_indent = 0;
        if wrap_by < 2 {
            extra_indent = (2 - wrap_by) as usize;
            for line in lines.iter_mut().skip(1) {
                *line = indent(line, extra_indent as isize);
            }
            wrap_by = 2;
        }
        lines[0] = format!("{}{}({}", self.indentation(), "W".repeat(wrap_by as usize - 1), lines[0]);
        if let Some(last) = lines.last_mut() {
            last.push(')');
        }

        let count = lines.len();
        self.push(Fragment::new(
            id,
            FragmentKind::TagAttributes { extra_indent },
            lines,
            line_number,
            Some(self.level),
        ));
        Some(count)
    }

    fn add_tag_script(&mut self, id: NodeId, script: &str, line_number: usize) {
        if let Some((offset, mut lines)) = self.raw_ruby_lines(script, line_number, Anchor::Last) {
            lines[0] = format!("{}{}{}", self.indentation(), OUTPUT_PREFIX, lines[0]);
            let delta = OUTPUT_PREFIX.len() as isize - offset as isize + (self.level * 2) as isize;
            for line in lines.iter_mut().skip(1) {
                *line = indent(line, delta);
            }
            self.push(Fragment::new(
                id,
                FragmentKind::TagTrailingScript,
                lines,
                line_number,
                Some(self.level),
            ));
            return;
        }

        // Inline text with interpolation reaches the tree as a string script
        let context = self.context;
        let node_line = context.tree[id].line;
        let original = context.interpolation_originals.get(script);
        let raw_line = node_line.checked_sub(1).and_then(|index| context.lines.get(index));
        match (original, raw_line) {
            (Some(original), Some(raw_line)) => match raw_line.rfind(original.as_str()) {
                Some(start) => {
                    self.add_interpolations(id, original, node_line, start);
                }
                None => log::debug!("inline text at line {node_line} not found as written"),
            },
            _ => log::debug!("tag script at line {node_line} not found as written, left unextracted"),
        }
    }

    fn add_interpolations(&mut self, id: NodeId, text: &str, line_number: usize, line_start: usize) -> usize {
        let found = scan_interpolations(text);
        for interpolation in &found {
            let line = format!("{}{}{}", self.indentation(), OUTPUT_PREFIX, interpolation.code);
            self.push(Fragment::new(
                id,
                FragmentKind::Interpolation {
                    start_char: line_start + interpolation.start,
                },
                vec![line],
                line_number,
                Some(self.level),
            ));
        }
        found.len()
    }

    fn visit_plain(&mut self, id: NodeId) {
        let context = self.context;
        let line_number = context.tree[id].line;
        let raw = line_number
            .checked_sub(1)
            .and_then(|index| context.lines.get(index))
            .map_or("", String::as_str);
        if self.add_interpolations(id, raw, line_number, 0) == 0 {
            self.push(Fragment::placeholder(
                id,
                PlaceholderKind::Plain,
                format!("{}{}", self.indentation(), PLAIN_PLACEHOLDER),
                line_number,
            ));
        }
    }

    fn visit_html_comment(&mut self, id: NodeId) {
        if self.context.tree.children(id).is_empty() {
            return;
        }
        self.open_guard(id);
        self.push(Fragment::placeholder(
            id,
            PlaceholderKind::Tag,
            format!("{}{}", self.indentation(), TAG_PLACEHOLDER),
            self.context.tree[id].line,
        ));
        self.visit_children(id);
        self.close_guard(id);
    }

    /// Blank template lines right after the filter's header, which the
    /// parser strips from the body.
    fn leading_blank_lines(&self, id: NodeId) -> usize {
        let header = self.context.tree[id].line;
        self.context
            .lines
            .iter()
            .skip(header)
            .take_while(|line| line.is_blank())
            .count()
    }

    fn visit_ruby_filter(&mut self, id: NodeId) {
        let tree = self.context.tree;
        let node = &tree[id];
        if node.text.trim().is_empty() {
            return;
        }
        let blanks = self.leading_blank_lines(id);
        let body_indent = self
            .context
            .lines
            .iter()
            .skip(node.line + blanks)
            .take(node.text.lines().count())
            .filter(|line| !line.is_blank())
            .map(|line| line.leading_spaces())
            .min()
            .unwrap_or(0);

        let prefix = self.indentation();
        let mut lines = vec![String::new(); blanks];
        lines.extend(node.text.lines().map(|line| {
            if line.is_blank() {
                String::new()
            } else {
                format!("{prefix}{line}")
            }
        }));

        self.push(Fragment::new(
            id,
            FragmentKind::RubyFilterBody {
                body_indent,
                level: self.level,
            },
            lines,
            node.line + 1,
            Some(self.level),
        ));
    }

    fn visit_filter(&mut self, id: NodeId) {
        let tree = self.context.tree;
        let node = &tree[id];
        let count = self.leading_blank_lines(id) + node.text.lines().count();
        let lines = self.context.lines;
        let mut found = 0;
        for index in node.line..node.line + count {
            if let Some(raw) = lines.get(index) {
                found += self.add_interpolations(id, raw, index + 1, 0);
            }
        }
        if found == 0 {
            self.push(Fragment::placeholder(
                id,
                PlaceholderKind::Filter,
                format!("{}{}", self.indentation(), FILTER_PLACEHOLDER),
                node.line,
            ));
        }
    }
}

fn is_sibling_mid_block(tree: &Tree, id: NodeId) -> bool {
    let node = &tree[id];
    node.kind == NodeKind::SilentScript && is_mid_block(&node.text)
}

/// Remove the first sigil after the indentation and the blanks following
/// it. Returns the line and the removed text.
fn strip_sigil(line: &str, sigils: &[&str]) -> Option<(String, String)> {
    let code_start = line.first_non_blank()?;
    let code = &line[code_start..];
    let sigil = sigils.iter().find(|sigil| code.starts_with(**sigil))?;
    let after = &code[sigil.len()..];
    let rest = after.trim_start_matches([' ', '\t']);
    let removed = code.len() - rest.len();
    Some((format!("{}{}", &line[..code_start], rest), code[..removed].to_string()))
}
