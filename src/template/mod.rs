//!
//! Parsed template tree and the parser seam.
//!
//! The tree is an arena: nodes own their children through id lists and keep a
//! non-owning parent id for upward traversal. Any parser producing this tree
//! can drive extraction; [`HamlParser`] is the built-in one.

pub mod interpolation;
pub mod parser;

pub use parser::HamlParser;

use std::collections::HashMap;
use std::ops::Index;
use thiserror::Error;

/// Error raised by a [`TemplateParser`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseError {
    /// 1-based line of the failure, when known
    pub line: Option<usize>,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            message: message.into(),
        }
    }
}

/// Result of parsing a template.
#[derive(Debug, Clone, Default)]
pub struct ParsedTemplate {
    pub tree: Tree,
    /// Normalized string script -> text exactly as written in the template.
    ///
    /// Inline tag text containing interpolation is handed to the tree as a
    /// quoted string script; this recovers the author's original text.
    pub interpolation_originals: HashMap<String, String>,
}

/// Turns template text into a [`Tree`].
pub trait TemplateParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<ParsedTemplate, ParseError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDetails {
    pub name: String,
    /// Ruby sources of the dynamic attributes, in order of appearance
    pub dynamic_attributes_sources: Vec<String>,
    /// Trailing script (`%p= foo`), or a quoted string for interpolated inline text
    pub script: Option<String>,
    /// Inline text without interpolation (`%p hello`)
    pub inline_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Tag(TagDetails),
    /// Output script (`= foo`)
    Script,
    /// Silent script (`- foo`)
    SilentScript,
    Plain,
    Comment { html: bool },
    Filter { name: String },
}

#[derive(Debug, Clone)]
pub struct TemplateNode {
    pub kind: NodeKind,
    /// 1-based line of the node's first source line (0 for the root)
    pub line: usize,
    /// Code or text as given by the parser: scripts without their sigil and with
    /// continuation lines joined, filter bodies with normalized indentation
    pub text: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl TemplateNode {
    pub fn tag(&self) -> Option<&TagDetails> {
        match &self.kind {
            NodeKind::Tag(details) => Some(details),
            _ => None,
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self.kind, NodeKind::Script | NodeKind::SilentScript)
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<TemplateNode>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self {
            nodes: vec![TemplateNode {
                kind: NodeKind::Root,
                line: 0,
                text: String::new(),
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn add_child(&mut self, parent: NodeId, kind: NodeKind, line: usize, text: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(TemplateNode {
            kind,
            line,
            text: text.into(),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    fn position_in_parent(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.parent(id)?;
        let position = self.children(parent).iter().position(|&c| c == id)?;
        Some((parent, position))
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (parent, position) = self.position_in_parent(id)?;
        self.children(parent).get(position + 1).copied()
    }

    /// Siblings before `id`, nearest first.
    pub fn previous_siblings(&self, id: NodeId) -> Vec<NodeId> {
        match self.position_in_parent(id) {
            Some((parent, position)) => self.children(parent)[..position].iter().rev().copied().collect(),
            None => Vec::new(),
        }
    }

    /// All node ids in pre-order, root first.
    #[cfg(test)]
    pub(crate) fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut pending = vec![self.root()];
        while let Some(id) = pending.pop() {
            order.push(id);
            pending.extend(self.children(id).iter().rev());
        }
        order
    }
}

impl Index<NodeId> for Tree {
    type Output = TemplateNode;

    fn index(&self, id: NodeId) -> &TemplateNode {
        &self.nodes[id.0]
    }
}
