//! # Block tree
//!
//! Classifies top-level AST nodes into markdown blocks, code blocks and
//! inner containers (lists, list items, blockquotes). Code blocks carry
//! everything a runner needs: parsed attributes, a stable identity, a
//! resolved name and the normalized command lines.

mod builder;
mod tree;

use std::collections::HashMap;

use crate::ast::{Ast, NodeId};
use crate::attributes::Attributes;
use crate::render::NodeSourceProvider;
use crate::span::Span;

pub use builder::{BuildContext, build};
pub use tree::{BlockId, BlockTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Inner,
    Code,
    Markdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InnerKind {
    List,
    ListItem,
    Blockquote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Inner(InnerBlock),
    Code(CodeBlock),
    Markdown(MarkdownBlock),
}

impl Block {
    pub fn kind(&self) -> BlockKind {
        match self {
            Block::Inner(_) => BlockKind::Inner,
            Block::Code(_) => BlockKind::Code,
            Block::Markdown(_) => BlockKind::Markdown,
        }
    }

    /// The AST node this block was built from.
    pub fn node(&self) -> NodeId {
        match self {
            Block::Inner(b) => b.node,
            Block::Code(b) => b.node,
            Block::Markdown(b) => b.node,
        }
    }

    /// Rendered markdown for the block.
    pub fn value(&self) -> &str {
        match self {
            Block::Inner(b) => &b.value,
            Block::Code(b) => &b.value,
            Block::Markdown(b) => &b.value,
        }
    }

    pub fn as_code(&self) -> Option<&CodeBlock> {
        match self {
            Block::Code(b) => Some(b),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownBlock {
    pub(crate) node: NodeId,
    pub(crate) value: String,
}

impl MarkdownBlock {
    pub fn value(&self) -> &str {
        &self.value
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerBlock {
    pub(crate) node: NodeId,
    pub(crate) kind: InnerKind,
    pub(crate) value: String,
}

impl InnerBlock {
    pub fn kind(&self) -> InnerKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// A fenced code block with resolved identity and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub(crate) node: NodeId,
    pub(crate) id: String,
    pub(crate) id_generated: bool,
    pub(crate) name: String,
    pub(crate) name_generated: bool,
    pub(crate) language: String,
    pub(crate) attributes: Attributes,
    pub(crate) content: String,
    pub(crate) lines: Vec<String>,
    pub(crate) value: String,
    pub(crate) intro: String,
    pub(crate) text_range: Span,
}

impl CodeBlock {
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Emitted identifier; empty unless cell identity is on or the block
    /// brought its own valid `id`.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn id_generated(&self) -> bool {
        self.id_generated
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_generated(&self) -> bool {
        self.name_generated
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Body text with LF breaks, surrounding newlines trimmed.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Body lines, right-trimmed, with a leading `$` prompt removed when the
    /// block is written as a shell transcript.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The block rendered as markdown, fences included.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Plain text of the paragraph right before the block.
    pub fn intro(&self) -> &str {
        &self.intro
    }

    /// Byte range of the block within the document content.
    pub fn text_range(&self) -> Span {
        self.text_range
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.attributes.get(key).and_then(parse_bool).unwrap_or(default)
    }

    pub fn is_interactive(&self) -> bool {
        self.flag("interactive", true)
    }

    pub fn is_background(&self) -> bool {
        self.flag("background", false)
    }

    pub fn exclude_from_run_all(&self) -> bool {
        self.flag("excludeFromRunAll", false)
    }

    pub fn prompt_env(&self) -> bool {
        self.flag("promptEnv", true)
    }

    pub fn categories(&self) -> Vec<&str> {
        self.attributes
            .get("category")
            .map(|c| c.split(',').map(str::trim).filter(|c| !c.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn cwd(&self) -> Option<&str> {
        self.attributes.get("cwd").filter(|c| !c.is_empty())
    }

    /// Interpreter from the `interpreter` attribute or a `#!` first line.
    pub fn interpreter(&self) -> Option<&str> {
        self.attributes
            .get("interpreter")
            .filter(|i| !i.is_empty())
            .or_else(|| {
                self.lines
                    .first()
                    .and_then(|l| l.strip_prefix("#!"))
                    .map(str::trim)
            })
    }

    /// Info string for the opening fence: language plus written attributes.
    pub fn info_string(&self) -> String {
        match (self.language.is_empty(), self.attributes.to_segment()) {
            (_, None) => self.language.clone(),
            (true, Some(segment)) => segment,
            (false, Some(segment)) => format!("{} {segment}", self.language),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Body lines of a code block: right-trimmed, `$` prompts stripped when the
/// first line starts with one.
pub fn normalize_lines(content: &str) -> Vec<String> {
    let lines: Vec<&str> = content.lines().map(str::trim_end).collect();
    let prompted = lines.first().is_some_and(|l| l.starts_with('$'));
    lines
        .into_iter()
        .map(|line| match line.strip_prefix('$') {
            Some(rest) if prompted => rest.trim_start().to_string(),
            _ => line.to_string(),
        })
        .collect()
}

/// Info strings rebuilt from each code block's current attributes, so
/// injected ids and rewritten attributes reach the rendered output.
#[derive(Debug, Default)]
pub struct BlockInfoProvider {
    infos: HashMap<NodeId, String>,
}

impl BlockInfoProvider {
    pub fn new(tree: &BlockTree) -> Self {
        Self {
            infos: tree
                .code_blocks()
                .into_iter()
                .map(|block| (block.node, block.info_string()))
                .collect(),
        }
    }
}

impl NodeSourceProvider for BlockInfoProvider {
    fn info_string(&self, _ast: &Ast, node: NodeId) -> Option<String> {
        self.infos.get(&node).cloned()
    }
}
