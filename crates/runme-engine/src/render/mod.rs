//! # Renderer
//!
//! Writes an [`Ast`] subtree back to CommonMark. Wherever the source bytes
//! for a construct are still available and unambiguous they are reused, so
//! rendering an unmodified document reproduces it byte for byte. Canonical
//! forms only appear for nodes without usable source.

mod writer;

use thiserror::Error;

use crate::ast::{AttrValue, Ast, FINAL_LINE_BREAKS_KEY, NodeId, NodeKind};
use crate::attributes::{self, AttributeFormat};
use crate::error::ErrorKind;
use crate::linebreak;
use crate::span::Span;
use writer::Writer;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("node attribute {key:?} has the wrong type, expected {expected}")]
    InvalidAttribute { key: String, expected: &'static str },
    #[error("node {0:?} is not part of this tree")]
    UnknownNode(NodeId),
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Render
    }
}

/// Supplies the info string written after a code fence.
pub trait NodeSourceProvider {
    fn info_string(&self, ast: &Ast, node: NodeId) -> Option<String>;
}

/// Info strings exactly as they appear in the source.
#[derive(Debug, Default, Clone, Copy)]
pub struct SourceInfo;

impl NodeSourceProvider for SourceInfo {
    fn info_string(&self, ast: &Ast, node: NodeId) -> Option<String> {
        match ast.get(node).map(|n| &n.kind) {
            Some(NodeKind::FencedCodeBlock { info, .. }) => Some(info.clone()),
            _ => None,
        }
    }
}

/// Rebuild an info string from its language and re-written attributes.
///
/// Info strings without an attribute segment, or with one that fails to
/// parse, are returned unchanged.
pub fn canonical_info(info: &str) -> String {
    if attributes::segment_range(info).is_none() {
        return info.trim().to_string();
    }
    let language = attributes::language(info);
    match attributes::from_info(info, AttributeFormat::default()) {
        Ok(attrs) => match attrs.to_segment() {
            Some(segment) if language.is_empty() => segment,
            Some(segment) => format!("{language} {segment}"),
            None => language.to_string(),
        },
        Err(_) => info.trim().to_string(),
    }
}

pub struct Renderer<'a> {
    ast: &'a Ast,
    source: &'a str,
    line_break: &'static str,
    provider: Option<&'a dyn NodeSourceProvider>,
}

impl<'a> Renderer<'a> {
    pub fn new(ast: &'a Ast, source: &'a str) -> Self {
        Self {
            ast,
            source,
            line_break: linebreak::detect(source),
            provider: None,
        }
    }

    pub fn with_line_break(mut self, line_break: &'static str) -> Self {
        self.line_break = line_break;
        self
    }

    pub fn with_provider(mut self, provider: &'a dyn NodeSourceProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Render the subtree rooted at `node`.
    ///
    /// The document node additionally gets its final line breaks appended.
    pub fn render(&self, node: NodeId) -> Result<String, RenderError> {
        if self.ast.get(node).is_none() {
            return Err(RenderError::UnknownNode(node));
        }
        let mut w = Writer::new(self.line_break);
        self.block(&mut w, node);
        let mut out = w.finish();
        if node == self.ast.root() {
            out.push_str(&self.line_break.repeat(self.final_line_breaks()?));
        }
        Ok(out)
    }

    fn final_line_breaks(&self) -> Result<usize, RenderError> {
        match self.ast.attribute(self.ast.root(), FINAL_LINE_BREAKS_KEY) {
            None => Ok(0),
            Some(AttrValue::Int(n)) => usize::try_from(*n).map_err(|_| RenderError::InvalidAttribute {
                key: FINAL_LINE_BREAKS_KEY.to_string(),
                expected: "non-negative integer",
            }),
            Some(AttrValue::Text(_)) => Err(RenderError::InvalidAttribute {
                key: FINAL_LINE_BREAKS_KEY.to_string(),
                expected: "integer",
            }),
        }
    }

    fn slice(&self, span: Span) -> Option<&'a str> {
        span.slice(self.source).filter(|s| !s.is_empty())
    }

    fn block(&self, w: &mut Writer, id: NodeId) {
        let node = self.ast.node(id);
        match &node.kind {
            NodeKind::Document => self.blocks(w, id, 2),
            NodeKind::Heading { level, setext } => self.heading(w, id, *level, *setext),
            NodeKind::Paragraph | NodeKind::TextBlock => self.inlines(w, id),
            NodeKind::Blockquote => {
                w.push_prefix("> ", "> ");
                if node.children.is_empty() {
                    w.write("");
                    w.trim_trailing_spaces();
                }
                self.blocks(w, id, 2);
                w.pop_prefix();
            }
            NodeKind::List { tight, .. } => self.blocks(w, id, if *tight { 1 } else { 2 }),
            NodeKind::ListItem { offset } => self.list_item(w, id, *offset),
            NodeKind::FencedCodeBlock { .. } => self.fenced(w, id),
            NodeKind::CodeBlock { literal } => {
                w.push_prefix("    ", "    ");
                code_lines(w, literal, false);
                w.pop_prefix();
            }
            NodeKind::HtmlBlock { lines } => {
                if lines.is_empty() {
                    self.verbatim(w, self.slice(node.span).unwrap_or_default());
                }
                for (i, line) in lines.iter().enumerate() {
                    if i > 0 {
                        w.newline();
                    }
                    let text = line.slice(self.source).unwrap_or_default();
                    self.verbatim(w, text.trim_end_matches(['\r', '\n']));
                }
            }
            NodeKind::ThematicBreak => {
                let text = self.slice(node.span).map(str::trim).unwrap_or("---");
                w.write(text);
            }
            NodeKind::LinkReferenceDefinition | NodeKind::Other => {
                self.verbatim(w, self.slice(node.span).unwrap_or_default());
            }
            _ => self.inline(w, id),
        }
    }

    /// Child blocks keep the line breaks the source puts between them;
    /// `separator` applies where either sibling has no source.
    fn blocks(&self, w: &mut Writer, id: NodeId, separator: usize) {
        let children = self.ast.children(id);
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                let breaks = self.source_gap(children[i - 1], *child);
                w.ensure_breaks(breaks.unwrap_or(separator));
            }
            self.block(w, *child);
        }
    }

    /// Line breaks between two sibling blocks as written in the source.
    fn source_gap(&self, prev: NodeId, next: NodeId) -> Option<usize> {
        let prev = self.ast.node(prev).span;
        let next = self.ast.node(next).span;
        if prev.is_empty() || next.is_empty() {
            return None;
        }
        let gap = self.source.get(prev.end..next.start)?;
        if !gap.chars().all(|c| c.is_whitespace() || c == '>') {
            return None;
        }
        let breaks = gap.matches('\n').count();
        (breaks > 0).then_some(breaks)
    }

    fn heading(&self, w: &mut Writer, id: NodeId, level: u8, setext: bool) {
        if setext {
            self.inlines(w, id);
            let underline = self
                .slice(self.ast.node(id).span)
                .and_then(|s| s.lines().last())
                .map(|l| l.trim_start_matches([' ', '>']).trim_end())
                .filter(|l| !l.is_empty() && (l.chars().all(|c| c == '=') || l.chars().all(|c| c == '-')))
                .map(str::to_string)
                .unwrap_or_else(|| if level == 1 { "===" } else { "---" }.to_string());
            w.newline();
            w.write(&underline);
            return;
        }
        let hashes = "#".repeat(usize::from(level));
        if self.ast.children(id).is_empty() {
            w.write(&hashes);
        } else {
            w.write(&format!("{hashes} "));
            self.inlines(w, id);
        }
    }

    fn list_item(&self, w: &mut Writer, id: NodeId, offset: usize) {
        let marker = self.ast.list_item_marker(id).unwrap_or_else(|| "-".to_string());
        let width = offset.max(marker.len() + 1);
        w.push_prefix(format!("{marker:<width$}"), " ".repeat(width));
        if self.ast.children(id).is_empty() {
            w.write("");
            w.trim_trailing_spaces();
        }
        let tight = self
            .ast
            .parent(id)
            .is_none_or(|list| matches!(self.ast.kind(list), NodeKind::List { tight: true, .. }));
        self.blocks(w, id, if tight { 1 } else { 2 });
        w.pop_prefix();
    }

    fn fenced(&self, w: &mut Writer, id: NodeId) {
        let NodeKind::FencedCodeBlock {
            fence_char,
            fence_len,
            info,
            literal,
        } = self.ast.kind(id)
        else {
            return;
        };
        let info = match self.provider {
            Some(provider) => provider.info_string(self.ast, id).unwrap_or_else(|| info.clone()),
            None => canonical_info(info),
        };
        let needed = (longest_run(literal, *fence_char) + 1).max(3);
        let fence = fence_char.to_string().repeat((*fence_len).max(needed));

        w.write(&format!("{fence}{info}"));
        code_lines(w, literal, true);
        w.newline();
        w.write(&fence);
    }

    fn inlines(&self, w: &mut Writer, id: NodeId) {
        for child in self.ast.children(id) {
            self.inline(w, *child);
        }
    }

    fn inline(&self, w: &mut Writer, id: NodeId) {
        let node = self.ast.node(id);
        match &node.kind {
            NodeKind::Text {
                soft_line_break,
                hard_line_break,
                backslash_break,
            } => {
                self.verbatim(w, self.slice(node.span).unwrap_or_default());
                if *hard_line_break {
                    w.write(if *backslash_break { "\\" } else { "  " });
                    w.newline();
                } else if *soft_line_break {
                    w.newline();
                }
            }
            NodeKind::String { value } => w.write(value),
            NodeKind::CodeSpan { literal } => match self.slice(node.span) {
                Some(text) => self.verbatim(w, text),
                None => {
                    let ticks = "`".repeat(longest_run(literal, '`') + 1);
                    let pad = if literal.starts_with('`') || literal.ends_with('`') { " " } else { "" };
                    w.write(&format!("{ticks}{pad}{literal}{pad}{ticks}"));
                }
            },
            NodeKind::Emphasis { level } => match self.wrappers(id) {
                Some((head, tail)) => {
                    w.write(head);
                    self.inlines(w, id);
                    w.write(tail);
                }
                None => {
                    let marker = self.emphasis_char(id).to_string().repeat(usize::from(*level));
                    w.write(&marker);
                    self.inlines(w, id);
                    w.write(&marker);
                }
            },
            NodeKind::Link { destination, title } => self.link(w, id, "[", destination, title),
            NodeKind::Image { destination, title } => self.link(w, id, "![", destination, title),
            NodeKind::AutoLink { url, .. } => match self.slice(node.span) {
                Some(text) => self.verbatim(w, text),
                None => w.write(&format!("<{url}>")),
            },
            NodeKind::RawHtml | NodeKind::Other => {
                self.verbatim(w, self.slice(node.span).unwrap_or_default());
            }
            _ => self.block(w, id),
        }
    }

    fn link(&self, w: &mut Writer, id: NodeId, opener: &str, destination: &str, title: &str) {
        if let Some((head, tail)) = self.wrappers(id) {
            w.write(head);
            self.inlines(w, id);
            w.write(tail);
            return;
        }
        let destination = if destination.is_empty() || destination.contains(' ') {
            format!("<{destination}>")
        } else {
            destination.to_string()
        };
        let title = if title.is_empty() {
            String::new()
        } else {
            format!(" \"{}\"", title.replace('"', "\\\""))
        };
        w.write(opener);
        self.inlines(w, id);
        w.write(&format!("]({destination}{title})"));
    }

    /// Source text before the first child and after the last one.
    fn wrappers(&self, id: NodeId) -> Option<(&'a str, &'a str)> {
        let node = self.ast.node(id);
        let first = self.ast.node(*node.children.first()?).span;
        let last = self.ast.node(*node.children.last()?).span;
        let head = self.source.get(node.span.start..first.start)?;
        let tail = self.source.get(last.end..node.span.end)?;
        if head.is_empty() || tail.is_empty() || head.contains('\n') || tail.contains('\n') {
            return None;
        }
        let valid = match &node.kind {
            NodeKind::Emphasis { .. } => {
                let is_marker = |s: &str| s.chars().all(|c| c == '*' || c == '_');
                is_marker(head) && is_marker(tail)
            }
            NodeKind::Link { .. } => head == "[" && tail.starts_with(']'),
            NodeKind::Image { .. } => head == "![" && tail.starts_with(']'),
            _ => false,
        };
        valid.then_some((head, tail))
    }

    fn emphasis_char(&self, id: NodeId) -> char {
        let uses_underscore = self
            .ast
            .ancestor_where(id, |k| {
                matches!(k, NodeKind::Paragraph | NodeKind::TextBlock | NodeKind::Heading { .. })
            })
            .and_then(|block| self.slice(self.ast.node(block).span))
            .is_some_and(|text| text.contains('_'));
        if uses_underscore { '_' } else { '*' }
    }

    /// Write source text, dropping container prefixes on continuation lines.
    fn verbatim(&self, w: &mut Writer, text: &str) {
        for (i, line) in text.split('\n').enumerate() {
            let line = line.trim_end_matches('\r');
            if i == 0 {
                w.write(line);
                continue;
            }
            w.newline();
            if w.has_prefix() {
                w.write(line.trim_start_matches([' ', '>']));
            } else {
                w.write(line);
            }
        }
    }
}

fn code_lines(w: &mut Writer, literal: &str, break_first: bool) {
    if literal.is_empty() {
        return;
    }
    let body = literal.strip_suffix('\n').unwrap_or(literal);
    for (i, line) in body.split('\n').enumerate() {
        if i > 0 || break_first {
            w.newline();
        }
        if line.is_empty() {
            w.blank_line();
        } else {
            w.write(line);
        }
    }
}

/// Longest run of `c` anywhere in `text`.
pub(crate) fn longest_run(text: &str, c: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for ch in text.chars() {
        if ch == c {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}
