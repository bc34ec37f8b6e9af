//! # Markdown AST
//!
//! An arena of nodes built from `pulldown-cmark` offset events. Every node
//! keeps its byte span in the content it was parsed from, so renderers and
//! projectors can fall back to the exact source when canonical output would
//! differ.
//!
//! ## Shape
//!
//! - Block containers: `Document`, `Blockquote`, `List`, `ListItem`
//! - Leaf blocks: `Heading`, `Paragraph`, `TextBlock`, `FencedCodeBlock`,
//!   `CodeBlock`, `HtmlBlock`, `ThematicBreak`, `LinkReferenceDefinition`
//! - Inlines: `Text`, `CodeSpan`, `Emphasis`, `Link`, `Image`, `AutoLink`,
//!   `RawHtml`, `String`
//!
//! `TextBlock` wraps the inline run of a tight list item, where CommonMark
//! has no paragraph.

mod builder;

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Value, json};

use crate::span::Span;

pub use builder::parse;

/// Document-node attribute holding the number of trailing line breaks to emit.
pub const FINAL_LINE_BREAKS_KEY: &str = "finalLineBreaks";

/// Index of a node in its [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum NodeKind {
    Document,
    Heading {
        level: u8,
        setext: bool,
    },
    Paragraph,
    TextBlock,
    Blockquote,
    List {
        ordered: bool,
        start: u64,
        /// Bullet character, or the `.`/`)` delimiter of an ordered list.
        marker: char,
        tight: bool,
    },
    ListItem {
        /// Column where item content starts, relative to the marker.
        offset: usize,
    },
    FencedCodeBlock {
        fence_char: char,
        fence_len: usize,
        /// Info string exactly as written after the opening fence.
        info: String,
        /// Body with LF line endings.
        literal: String,
    },
    CodeBlock {
        literal: String,
    },
    HtmlBlock {
        lines: Vec<Span>,
    },
    ThematicBreak,
    LinkReferenceDefinition,
    Text {
        soft_line_break: bool,
        hard_line_break: bool,
        /// Hard break written as a trailing backslash rather than two spaces.
        backslash_break: bool,
    },
    String {
        value: String,
    },
    CodeSpan {
        literal: String,
    },
    Emphasis {
        level: u8,
    },
    Link {
        destination: String,
        title: String,
    },
    Image {
        destination: String,
        title: String,
    },
    AutoLink {
        url: String,
        email: bool,
    },
    RawHtml,
    /// Constructs outside plain CommonMark, kept verbatim.
    Other,
}

impl NodeKind {
    #[must_use]
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            NodeKind::Document
                | NodeKind::Heading { .. }
                | NodeKind::Paragraph
                | NodeKind::TextBlock
                | NodeKind::Blockquote
                | NodeKind::List { .. }
                | NodeKind::ListItem { .. }
                | NodeKind::FencedCodeBlock { .. }
                | NodeKind::CodeBlock { .. }
                | NodeKind::HtmlBlock { .. }
                | NodeKind::ThematicBreak
                | NodeKind::LinkReferenceDefinition
        )
    }

    /// Short name used in debug dumps.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Document => "Document",
            NodeKind::Heading { .. } => "Heading",
            NodeKind::Paragraph => "Paragraph",
            NodeKind::TextBlock => "TextBlock",
            NodeKind::Blockquote => "Blockquote",
            NodeKind::List { .. } => "List",
            NodeKind::ListItem { .. } => "ListItem",
            NodeKind::FencedCodeBlock { .. } => "FencedCodeBlock",
            NodeKind::CodeBlock { .. } => "CodeBlock",
            NodeKind::HtmlBlock { .. } => "HTMLBlock",
            NodeKind::ThematicBreak => "ThematicBreak",
            NodeKind::LinkReferenceDefinition => "LinkReferenceDefinition",
            NodeKind::Text { .. } => "Text",
            NodeKind::String { .. } => "String",
            NodeKind::CodeSpan { .. } => "CodeSpan",
            NodeKind::Emphasis { .. } => "Emphasis",
            NodeKind::Link { .. } => "Link",
            NodeKind::Image { .. } => "Image",
            NodeKind::AutoLink { .. } => "AutoLink",
            NodeKind::RawHtml => "RawHTML",
            NodeKind::Other => "Other",
        }
    }
}

/// Typed node attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub attributes: BTreeMap<String, AttrValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub(crate) fn with_root(span: Span) -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                span,
                parent: None,
                children: Vec::new(),
                attributes: BTreeMap::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append a node under `parent` and return its id.
    pub fn append(&mut self, parent: NodeId, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            span,
            parent: Some(parent),
            children: Vec::new(),
            attributes: BTreeMap::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Insert a detached-to-be node among `parent`'s children at `index`.
    pub(crate) fn insert_child(&mut self, parent: NodeId, index: usize, kind: NodeKind, span: Span) -> NodeId {
        let id = self.append(parent, kind, span);
        let children = &mut self.nodes[parent.0].children;
        children.pop();
        children.insert(index.min(children.len()), id);
        id
    }

    pub fn attribute(&self, id: NodeId, key: &str) -> Option<&AttrValue> {
        self.node(id).attributes.get(key)
    }

    pub fn set_attribute(&mut self, id: NodeId, key: impl Into<String>, value: AttrValue) {
        self.node_mut(id).attributes.insert(key.into(), value);
    }

    /// Previous sibling of `id`, if any.
    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|c| *c == id)?;
        index.checked_sub(1).map(|i| siblings[i])
    }

    /// Index of `id` among its parent's children.
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    /// Pre-order walk of the subtree rooted at `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    /// Nearest ancestor (or self) matching `predicate`.
    pub fn ancestor_where(&self, id: NodeId, predicate: impl Fn(&NodeKind) -> bool) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if predicate(self.kind(node)) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    /// Plain text of an inline subtree, markup dropped.
    pub fn plain_text(&self, id: NodeId, source: &str) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            match self.kind(node) {
                NodeKind::Text { soft_line_break, .. } => {
                    out.push_str(self.node(node).span.slice(source).unwrap_or_default());
                    if *soft_line_break {
                        out.push(' ');
                    }
                }
                NodeKind::String { value } => out.push_str(value),
                NodeKind::CodeSpan { literal } => out.push_str(literal),
                _ => {}
            }
        }
        out.trim().to_string()
    }

    /// Marker text for a list item: `-`, `*`, `+`, `3.` or `3)`.
    pub fn list_item_marker(&self, item: NodeId) -> Option<String> {
        let list = self.parent(item)?;
        let NodeKind::List {
            ordered,
            start,
            marker,
            ..
        } = self.kind(list)
        else {
            return None;
        };
        if *ordered {
            let index = self.index_in_parent(item).unwrap_or(0) as u64;
            Some(format!("{}{}", start + index, marker))
        } else {
            Some(marker.to_string())
        }
    }

    /// JSON dump of a subtree, used for debug metadata on cells.
    pub fn dump(&self, id: NodeId, source: &str) -> Value {
        let node = self.node(id);
        let mut value = json!({
            "kind": node.kind.name(),
            "start": node.span.start,
            "end": node.span.end,
        });
        if !node.kind.is_block()
            && node.children.is_empty()
            && let Some(text) = node.span.slice(source)
        {
            value["text"] = Value::String(text.to_string());
        }
        if !node.children.is_empty() {
            value["children"] = Value::Array(node.children.iter().map(|c| self.dump(*c, source)).collect());
        }
        value
    }
}
