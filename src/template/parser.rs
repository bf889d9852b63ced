//!
//! Built-in HAML parser.
//!
//! Covers the part of HAML the extractor understands: indentation-based
//! nesting, tag heads with `{}`/`()` attributes, trailing scripts and inline
//! text, `-`/`=` scripts with comma continuation, comments, filters and plain
//! text. Anything else is treated as plain text.

use super::interpolation::{contains_interpolation, to_string_script};
use super::{NodeId, NodeKind, ParseError, ParsedTemplate, TagDetails, TemplateParser, Tree};
use crate::utils::{StrExt, split_lines};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-:\w]+").unwrap());
static FILTER_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^:([\w-]+)\s*$").unwrap());
// `a="b"` is static, `a=b` or `a=@b` is not
static DYNAMIC_LEGACY_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"=\s*[^\s"']"#).unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct HamlParser;

impl TemplateParser for HamlParser {
    fn parse(&self, text: &str) -> Result<ParsedTemplate, ParseError> {
        let lines = split_lines(text);
        let mut state = ParseState::new(&lines);
        state.run()?;
        Ok(ParsedTemplate {
            tree: state.tree,
            interpolation_originals: state.originals,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nesting {
    Allowed,
    PlainText,
    Closed,
}

#[derive(Debug)]
struct OpenNode {
    /// None for the root
    indent: Option<usize>,
    id: NodeId,
    nesting: Nesting,
    child_indent: Option<usize>,
}

struct ParseState<'a> {
    lines: &'a [String],
    tree: Tree,
    originals: HashMap<String, String>,
    open: Vec<OpenNode>,
}

impl<'a> ParseState<'a> {
    fn new(lines: &'a [String]) -> Self {
        let tree = Tree::new();
        let root = tree.root();
        Self {
            lines,
            tree,
            originals: HashMap::new(),
            open: vec![OpenNode {
                indent: None,
                id: root,
                nesting: Nesting::Allowed,
                child_indent: Some(0),
            }],
        }
    }

    fn run(&mut self) -> Result<(), ParseError> {
        let lines = self.lines;
        let mut index = 0;
        while index < lines.len() {
            let line = lines[index].as_str();
            if line.is_blank() {
                index += 1;
                continue;
            }
            let indent = indentation_of(line, index + 1)?;
            let parent = self.enter_level(indent, index + 1)?;
            index = self.parse_line(parent, indent, index, &line[indent..])?;
        }
        Ok(())
    }

    /// Close every node at or below `indent` and return the parent for a line
    /// at that indentation.
    fn enter_level(&mut self, indent: usize, line_number: usize) -> Result<NodeId, ParseError> {
        while self
            .open
            .last()
            .is_some_and(|node| node.indent.is_some_and(|open_indent| open_indent >= indent))
        {
            self.open.pop();
        }

        let Some(top) = self.open.last_mut() else {
            return Err(ParseError::new(line_number, "Indentation matches no open level."));
        };

        match top.nesting {
            Nesting::Allowed => {}
            Nesting::PlainText => {
                return Err(ParseError::new(
                    line_number,
                    "Illegal nesting: nesting within plain text is illegal.",
                ));
            }
            Nesting::Closed => {
                return Err(ParseError::new(
                    line_number,
                    "Illegal nesting: content can't be both given on the same line and nested within it.",
                ));
            }
        }

        match top.child_indent {
            None => top.child_indent = Some(indent),
            Some(expected) if expected == indent => {}
            Some(0) => {
                return Err(ParseError::new(
                    line_number,
                    "Indenting at the beginning of the document is illegal.",
                ));
            }
            Some(_) => {
                return Err(ParseError::new(
                    line_number,
                    "Inconsistent indentation: indentation matches no open level.",
                ));
            }
        }

        Ok(top.id)
    }

    fn push_open(&mut self, indent: usize, id: NodeId, nesting: Nesting) {
        self.open.push(OpenNode {
            indent: Some(indent),
            id,
            nesting,
            child_indent: None,
        });
    }

    /// Parse the construct starting at `index` and return the index of the
    /// first line after it.
    fn parse_line(&mut self, parent: NodeId, indent: usize, index: usize, content: &'a str) -> Result<usize, ParseError> {
        if let Some(comment) = content.strip_prefix("-#") {
            let id = self
                .tree
                .add_child(parent, NodeKind::Comment { html: false }, index + 1, comment.trim());
            log::trace!("haml comment {id:?} at line {}", index + 1);
            return Ok(self.block_end(index, indent));
        }

        if let Some(code) = content.strip_prefix('-') {
            return self.script(parent, indent, index, code, NodeKind::SilentScript);
        }
        if let Some(code) = script_sigil(content) {
            return self.script(parent, indent, index, code, NodeKind::Script);
        }

        match content.chars().next() {
            Some('%') | Some('.') => self.tag(parent, indent, index, content),
            Some('#') if !content.starts_with("#{") => self.tag(parent, indent, index, content),
            Some('/') => {
                let text = content[1..].trim();
                let nesting = if text.is_empty() || text.starts_with('[') {
                    Nesting::Allowed
                } else {
                    Nesting::Closed
                };
                let id = self
                    .tree
                    .add_child(parent, NodeKind::Comment { html: true }, index + 1, text);
                self.push_open(indent, id, nesting);
                Ok(index + 1)
            }
            Some(':') => self.filter(parent, indent, index, content),
            Some('\\') => Ok(self.plain(parent, indent, index, &content[1..])),
            _ => Ok(self.plain(parent, indent, index, content)),
        }
    }

    fn plain(&mut self, parent: NodeId, indent: usize, index: usize, text: &str) -> usize {
        let id = self.tree.add_child(parent, NodeKind::Plain, index + 1, text.trim());
        self.push_open(indent, id, Nesting::PlainText);
        index + 1
    }

    fn script(
        &mut self,
        parent: NodeId,
        indent: usize,
        index: usize,
        code: &str,
        kind: NodeKind,
    ) -> Result<usize, ParseError> {
        let last = self.continuation_end(index);
        let text = self.join_continuation(code, index, last);
        if text.is_empty() {
            let message = match kind {
                NodeKind::Script => "There's no Ruby code for = to output.",
                _ => "There's no Ruby code for - to evaluate.",
            };
            return Err(ParseError::new(index + 1, message));
        }
        let id = self.tree.add_child(parent, kind, index + 1, text);
        self.push_open(indent, id, Nesting::Allowed);
        Ok(last + 1)
    }

    /// Last line of a comma-continued statement starting at `index`.
    fn continuation_end(&self, index: usize) -> usize {
        let mut last = index;
        while last + 1 < self.lines.len() && self.lines[last].trim_end().ends_with(',') {
            last += 1;
        }
        last
    }

    fn join_continuation(&self, first: &str, index: usize, last: usize) -> String {
        let mut text = first.trim().to_string();
        for line in &self.lines[index + 1..=last] {
            text.push(' ');
            text.push_str(line.trim());
        }
        text
    }

    /// First line index after the block nested under the line at `index`.
    /// Trailing blank lines are not part of the block.
    fn block_end(&self, index: usize, indent: usize) -> usize {
        let mut next = index + 1;
        while next < self.lines.len() && (self.lines[next].is_blank() || self.lines[next].leading_spaces() > indent) {
            next += 1;
        }
        while next > index + 1 && self.lines[next - 1].is_blank() {
            next -= 1;
        }
        next
    }

    fn filter(&mut self, parent: NodeId, indent: usize, index: usize, content: &str) -> Result<usize, ParseError> {
        let Some(name) = FILTER_NAME.captures(content).and_then(|caps| caps.get(1)) else {
            return Err(ParseError::new(index + 1, format!("Invalid filter name \"{content}\".")));
        };
        let end = self.block_end(index, indent);
        let body: Vec<&str> = self.lines[index + 1..end]
            .iter()
            .map(String::as_str)
            .skip_while(|line| line.is_blank())
            .collect();
        let common = body
            .iter()
            .filter(|line| !line.is_blank())
            .map(|line| line.leading_spaces())
            .min()
            .unwrap_or(0);

        let mut text = String::new();
        for line in &body {
            if !line.is_blank() {
                text.push_str(&line[common..]);
            }
            text.push('\n');
        }

        self.tree.add_child(
            parent,
            NodeKind::Filter {
                name: name.as_str().to_string(),
            },
            index + 1,
            text,
        );
        Ok(end)
    }

    fn tag(&mut self, parent: NodeId, indent: usize, index: usize, content: &'a str) -> Result<usize, ParseError> {
        let line_number = index + 1;
        let mut details = TagDetails::default();
        let mut rest = content;
        let mut current = index;

        if let Some(after) = rest.strip_prefix('%') {
            let len = NAME.find(after).map_or(0, |m| m.end());
            if len == 0 {
                return Err(ParseError::new(line_number, "Invalid tag: \"%\"."));
            }
            details.name = after[..len].to_string();
            rest = &after[len..];
        } else {
            details.name = "div".to_string();
        }

        while (rest.starts_with('.') || rest.starts_with('#')) && !rest.starts_with("#{") {
            let len = NAME.find(&rest[1..]).map_or(0, |m| m.end());
            if len == 0 {
                return Err(ParseError::new(
                    line_number,
                    "Illegal element: classes and ids must have values.",
                ));
            }
            rest = &rest[1 + len..];
        }

        loop {
            let (open, close) = match rest.chars().next() {
                Some('{') => ('{', '}'),
                Some('(') => ('(', ')'),
                Some('[') => ('[', ']'),
                _ => break,
            };
            let (inner, line, remainder) = self.balanced(current, rest, open, close, line_number)?;
            match open {
                '{' => details.dynamic_attributes_sources.push(inner),
                '(' if DYNAMIC_LEGACY_ATTRIBUTE.is_match(&inner) => details
                    .dynamic_attributes_sources
                    .push(format!("{{{},}}", inner.replace('\n', " "))),
                _ => {}
            }
            current = line;
            rest = remainder;
        }

        rest = rest.trim_start_matches(['<', '>']);
        let self_closing = rest.starts_with('/');
        let mut nesting = Nesting::Allowed;
        let mut last = current;

        if self_closing {
            if !rest[1..].trim().is_empty() {
                return Err(ParseError::new(line_number, "Self-closing tags can't have content."));
            }
            nesting = Nesting::Closed;
        } else if let Some(code) = script_sigil(rest) {
            last = self.continuation_end(current);
            let script = self.join_continuation(code, current, last);
            if script.is_empty() {
                return Err(ParseError::new(line_number, "There's no Ruby code for = to evaluate."));
            }
            details.script = Some(script);
            nesting = Nesting::Closed;
        } else {
            let text = rest.trim();
            if !text.is_empty() {
                nesting = Nesting::Closed;
                if contains_interpolation(text) {
                    let script = to_string_script(text);
                    self.originals.insert(script.clone(), text.to_string());
                    details.script = Some(script);
                } else {
                    details.inline_text = Some(text.to_string());
                }
            }
        }

        let id = self
            .tree
            .add_child(parent, NodeKind::Tag(details), line_number, content.trim());
        self.push_open(indent, id, nesting);
        Ok(last + 1)
    }

    /// Read a bracketed group starting at `rest` (which begins with `open`),
    /// following it onto later lines. Returns the inner text with newlines
    /// preserved, the line it ended on and the rest of that line.
    fn balanced(
        &self,
        mut current: usize,
        rest: &'a str,
        open: char,
        close: char,
        line_number: usize,
    ) -> Result<(String, usize, &'a str), ParseError> {
        let lines = self.lines;
        let mut inner = String::new();
        let mut depth = 0usize;
        let mut segment = rest;

        loop {
            for (i, c) in segment.char_indices() {
                if c == open {
                    depth += 1;
                    if depth == 1 {
                        continue;
                    }
                } else if c == close {
                    depth -= 1;
                    if depth == 0 {
                        return Ok((inner, current, &segment[i + c.len_utf8()..]));
                    }
                }
                inner.push(c);
            }
            current += 1;
            if current >= lines.len() {
                return Err(ParseError::new(line_number, "Unbalanced brackets."));
            }
            inner.push('\n');
            segment = lines[current].as_str();
        }
    }
}

fn indentation_of(line: &str, line_number: usize) -> Result<usize, ParseError> {
    let whitespace = line.len() - line.trim_start().len();
    if line[..whitespace].contains('\t') {
        return Err(ParseError::new(line_number, "Indentation can't use tabs."));
    }
    Ok(whitespace)
}

fn script_sigil(text: &str) -> Option<&str> {
    ["!=", "&=", "=", "~"].iter().find_map(|sigil| text.strip_prefix(sigil))
}
