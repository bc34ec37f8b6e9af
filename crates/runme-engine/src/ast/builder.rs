use pulldown_cmark::{CodeBlockKind, Event, LinkType, Options, Parser, Tag};

use super::{Ast, NodeId, NodeKind};
use crate::span::Span;

/// Parse CommonMark `content` into an [`Ast`].
///
/// Link reference definitions never reach the event stream, so they are
/// recovered from the parser's definition table and spliced back in at
/// their source position.
pub fn parse(content: &str) -> Ast {
    let parser = Parser::new_ext(content, Options::empty());
    let definitions: Vec<Span> = parser
        .reference_definitions()
        .iter()
        .map(|(_, def)| Span::from(def.span.clone()))
        .collect();

    let mut builder = AstBuilder::new(content);
    for (event, range) in parser.into_offset_iter() {
        builder.push(event, Span::from(range));
    }
    builder.finish(definitions)
}

struct Open {
    id: NodeId,
    /// A `TextBlock` opened for a tight list item, closed with its item.
    implicit: bool,
}

struct AstBuilder<'a> {
    source: &'a str,
    ast: Ast,
    stack: Vec<Open>,
}

impl<'a> AstBuilder<'a> {
    fn new(source: &'a str) -> Self {
        let ast = Ast::with_root(Span::new(0, source.len()));
        let root = ast.root();
        Self {
            source,
            ast,
            stack: vec![Open {
                id: root,
                implicit: false,
            }],
        }
    }

    fn top(&self) -> NodeId {
        self.stack.last().map_or(self.ast.root(), |open| open.id)
    }

    fn push(&mut self, event: Event<'_>, span: Span) {
        match event {
            Event::Start(tag) => self.start(tag, span),
            Event::End(_) => self.end(),
            Event::Text(text) => self.text(&text, span),
            Event::Code(code) => {
                self.inline(
                    NodeKind::CodeSpan {
                        literal: code.to_string(),
                    },
                    span,
                );
            }
            Event::Html(_) => self.html(span),
            Event::InlineHtml(_) => {
                self.inline(NodeKind::RawHtml, span);
            }
            Event::SoftBreak => self.line_break(span, false),
            Event::HardBreak => self.line_break(span, true),
            Event::Rule => {
                self.close_text_block();
                let span = self.trim_block(span);
                self.ast.append(self.top(), NodeKind::ThematicBreak, span);
            }
            _ => {
                self.inline(NodeKind::Other, span);
            }
        }
    }

    fn start(&mut self, tag: Tag<'_>, span: Span) {
        let inline = is_inline_tag(&tag);
        let span = if inline {
            span
        } else {
            self.close_text_block();
            self.trim_block(span)
        };

        let kind = match tag {
            Tag::Paragraph => NodeKind::Paragraph,
            Tag::Heading { level, .. } => NodeKind::Heading {
                level: level as u8,
                setext: !self.slice(span).trim_start().starts_with('#'),
            },
            Tag::BlockQuote(_) => NodeKind::Blockquote,
            Tag::CodeBlock(CodeBlockKind::Fenced(_)) => self.fenced(span),
            Tag::CodeBlock(CodeBlockKind::Indented) => NodeKind::CodeBlock {
                literal: String::new(),
            },
            Tag::HtmlBlock => NodeKind::HtmlBlock { lines: Vec::new() },
            Tag::List(start) => self.list(start, span),
            Tag::Item => NodeKind::ListItem {
                offset: item_offset(self.slice(span)),
            },
            Tag::Emphasis => NodeKind::Emphasis { level: 1 },
            Tag::Strong => NodeKind::Emphasis { level: 2 },
            Tag::Link {
                link_type,
                dest_url,
                title,
                ..
            } => match link_type {
                LinkType::Autolink => NodeKind::AutoLink {
                    url: dest_url.to_string(),
                    email: false,
                },
                LinkType::Email => NodeKind::AutoLink {
                    url: dest_url.to_string(),
                    email: true,
                },
                _ => NodeKind::Link {
                    destination: dest_url.to_string(),
                    title: title.to_string(),
                },
            },
            Tag::Image { dest_url, title, .. } => NodeKind::Image {
                destination: dest_url.to_string(),
                title: title.to_string(),
            },
            _ => NodeKind::Other,
        };

        let parent = if inline { self.inline_parent(span) } else { self.top() };
        let id = self.ast.append(parent, kind, span);
        self.stack.push(Open { id, implicit: false });
    }

    fn end(&mut self) {
        self.close_text_block();
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    fn text(&mut self, text: &str, span: Span) {
        let top = self.top();
        if let NodeKind::FencedCodeBlock { literal, .. } | NodeKind::CodeBlock { literal } =
            &mut self.ast.node_mut(top).kind
        {
            literal.push_str(&text.replace("\r\n", "\n"));
            return;
        }
        self.inline(
            NodeKind::Text {
                soft_line_break: false,
                hard_line_break: false,
                backslash_break: false,
            },
            span,
        );
    }

    fn html(&mut self, span: Span) {
        let top = self.top();
        let line = self.trim_block(span);
        if let NodeKind::HtmlBlock { lines } = &mut self.ast.node_mut(top).kind {
            lines.push(line);
            return;
        }
        self.inline(NodeKind::RawHtml, span);
    }

    fn line_break(&mut self, span: Span, hard: bool) {
        let backslash = hard && self.slice(span).starts_with('\\');
        let parent = self.top();
        let last_text = self.ast.children(parent).last().copied().filter(|id| {
            matches!(
                self.ast.kind(*id),
                NodeKind::Text {
                    soft_line_break: false,
                    hard_line_break: false,
                    ..
                }
            )
        });
        let target = match last_text {
            Some(id) => id,
            None => self.inline(
                NodeKind::Text {
                    soft_line_break: false,
                    hard_line_break: false,
                    backslash_break: false,
                },
                Span::new(span.start, span.start),
            ),
        };
        if let NodeKind::Text {
            soft_line_break,
            hard_line_break,
            backslash_break,
        } = &mut self.ast.node_mut(target).kind
        {
            *soft_line_break = !hard;
            *hard_line_break = hard;
            *backslash_break = backslash;
        }
    }

    fn inline(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let parent = self.inline_parent(span);
        self.ast.append(parent, kind, span)
    }

    /// Inline content directly inside a list item goes into a `TextBlock`.
    fn inline_parent(&mut self, span: Span) -> NodeId {
        let top = self.top();
        if !matches!(self.ast.kind(top), NodeKind::ListItem { .. }) {
            return top;
        }
        let id = self.ast.append(top, NodeKind::TextBlock, span);
        self.stack.push(Open { id, implicit: true });
        id
    }

    fn close_text_block(&mut self) {
        if self.stack.last().is_some_and(|open| open.implicit) {
            self.stack.pop();
        }
    }

    fn fenced(&self, span: Span) -> NodeKind {
        let line = first_line(self.slice(span)).trim_start_matches([' ', '\t', '>']);
        let fence_char = line.chars().next().unwrap_or('`');
        let fence_len = line.chars().take_while(|c| *c == fence_char).count();
        NodeKind::FencedCodeBlock {
            fence_char,
            fence_len,
            info: line[fence_len * fence_char.len_utf8()..].trim_end().to_string(),
            literal: String::new(),
        }
    }

    fn list(&self, start: Option<u64>, span: Span) -> NodeKind {
        let line = first_line(self.slice(span)).trim_start();
        let marker = match start {
            Some(_) => line
                .chars()
                .find(|c| !c.is_ascii_digit())
                .filter(|c| matches!(c, '.' | ')'))
                .unwrap_or('.'),
            None => line
                .chars()
                .next()
                .filter(|c| matches!(c, '-' | '*' | '+'))
                .unwrap_or('-'),
        };
        NodeKind::List {
            ordered: start.is_some(),
            start: start.unwrap_or(1),
            marker,
            tight: true,
        }
    }

    fn slice(&self, span: Span) -> &'a str {
        span.slice(self.source).unwrap_or_default()
    }

    fn trim_block(&self, span: Span) -> Span {
        let text = self.slice(span);
        let trimmed = text.trim_end_matches(['\n', '\r']);
        Span::new(span.start, span.start + trimmed.len())
    }

    fn finish(mut self, definitions: Vec<Span>) -> Ast {
        for definition in definitions {
            let span = self.trim_block(definition);
            self.insert_definition(span);
        }

        for index in 0..self.ast.len() {
            let id = NodeId(index);
            if matches!(self.ast.kind(id), NodeKind::List { .. }) {
                let loose = self.ast.children(id).iter().any(|item| {
                    self.ast
                        .children(*item)
                        .iter()
                        .any(|c| matches!(self.ast.kind(*c), NodeKind::Paragraph))
                });
                if let NodeKind::List { tight, .. } = &mut self.ast.node_mut(id).kind {
                    *tight = !loose;
                }
            } else if matches!(self.ast.kind(id), NodeKind::TextBlock) {
                let children = self.ast.children(id);
                if let (Some(first), Some(last)) = (children.first(), children.last()) {
                    let span = Span::new(self.ast.node(*first).span.start, self.ast.node(*last).span.end);
                    self.ast.node_mut(id).span = span;
                }
            }
        }
        self.ast
    }

    fn insert_definition(&mut self, span: Span) {
        let mut parent = self.ast.root();
        while let Some(next) = self.ast.children(parent).iter().copied().find(|c| {
            matches!(
                self.ast.kind(*c),
                NodeKind::Blockquote | NodeKind::List { .. } | NodeKind::ListItem { .. }
            ) && self.ast.node(*c).span.contains(span)
        }) {
            parent = next;
        }
        let index = self
            .ast
            .children(parent)
            .iter()
            .position(|c| self.ast.node(*c).span.start >= span.end)
            .unwrap_or(self.ast.children(parent).len());
        self.ast
            .insert_child(parent, index, NodeKind::LinkReferenceDefinition, span);
    }
}

fn is_inline_tag(tag: &Tag<'_>) -> bool {
    matches!(
        tag,
        Tag::Emphasis | Tag::Strong | Tag::Strikethrough | Tag::Link { .. } | Tag::Image { .. }
    )
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

/// Width from the start of the marker to the item content.
fn item_offset(item: &str) -> usize {
    let line = first_line(item).trim_start_matches(' ');
    let marker_len = if line.starts_with(['-', '*', '+']) {
        1
    } else {
        line.chars().take_while(char::is_ascii_digit).count() + 1
    };
    let rest = line.get(marker_len..).unwrap_or_default();
    if rest.trim().is_empty() {
        return marker_len + 1;
    }
    let spaces = rest.len() - rest.trim_start_matches(' ').len();
    if (1..=4).contains(&spaces) {
        marker_len + spaces
    } else {
        marker_len + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn kinds(ast: &Ast, id: NodeId) -> Vec<&'static str> {
        ast.children(id).iter().map(|c| ast.kind(*c).name()).collect()
    }

    #[test]
    fn test_heading_and_paragraph() {
        let ast = parse("# Title\n\nSome text\n");

        assert_eq!(kinds(&ast, ast.root()), vec!["Heading", "Paragraph"]);
        let heading = ast.children(ast.root())[0];
        assert_eq!(
            ast.kind(heading),
            &NodeKind::Heading {
                level: 1,
                setext: false
            }
        );
    }

    #[test]
    fn test_setext_heading_is_flagged() {
        let ast = parse("Title\n=====\n");
        let heading = ast.children(ast.root())[0];
        assert_eq!(
            ast.kind(heading),
            &NodeKind::Heading {
                level: 1,
                setext: true
            }
        );
    }

    #[test]
    fn test_fenced_code_block_keeps_raw_info() {
        let source = "```sh {name=x}\necho hi\n```\n";
        let ast = parse(source);
        let block = ast.children(ast.root())[0];

        assert_eq!(
            ast.kind(block),
            &NodeKind::FencedCodeBlock {
                fence_char: '`',
                fence_len: 3,
                info: "sh {name=x}".into(),
                literal: "echo hi\n".into(),
            }
        );
        // Block spans stop at the closing fence.
        assert_eq!(ast.node(block).span.slice(source), Some("```sh {name=x}\necho hi\n```"));
    }

    #[test]
    fn test_info_keeps_space_after_fence() {
        let ast = parse("``` {name=foo}\nls\n```\n");
        let block = ast.children(ast.root())[0];

        let NodeKind::FencedCodeBlock { info, .. } = ast.kind(block) else {
            panic!("expected a fenced code block");
        };
        assert_eq!(info, " {name=foo}");
    }

    #[test]
    fn test_tight_list_wraps_inlines_in_text_blocks() {
        let ast = parse("- a\n- b\n");
        let list = ast.children(ast.root())[0];

        assert!(matches!(ast.kind(list), NodeKind::List { tight: true, marker: '-', .. }));
        for item in ast.children(list) {
            assert_eq!(kinds(&ast, *item), vec!["TextBlock"]);
        }
    }

    #[test]
    fn test_loose_list() {
        let ast = parse("- a\n\n- b\n");
        let list = ast.children(ast.root())[0];

        assert!(matches!(ast.kind(list), NodeKind::List { tight: false, .. }));
        assert_eq!(kinds(&ast, ast.children(list)[0]), vec!["Paragraph"]);
    }

    #[test]
    fn test_ordered_list_marker_and_start() {
        let ast = parse("3) x\n4) y\n");
        let list = ast.children(ast.root())[0];

        assert_eq!(
            ast.kind(list),
            &NodeKind::List {
                ordered: true,
                start: 3,
                marker: ')',
                tight: true
            }
        );
        assert_eq!(ast.list_item_marker(ast.children(list)[1]), Some("4)".into()));
    }

    #[test]
    fn test_reference_definition_is_recovered() {
        let source = "[foo]: /url\n\nSee [foo].\n";
        let ast = parse(source);

        assert_eq!(kinds(&ast, ast.root()), vec!["LinkReferenceDefinition", "Paragraph"]);
        let def = ast.children(ast.root())[0];
        assert_eq!(ast.node(def).span.slice(source), Some("[foo]: /url"));
        let para = ast.children(ast.root())[1];
        assert_eq!(kinds(&ast, para), vec!["Text", "Link", "Text"]);
    }

    #[test]
    fn test_soft_break_flags_previous_text() {
        let source = "one\ntwo\n";
        let ast = parse(source);
        let para = ast.children(ast.root())[0];
        let first = ast.children(para)[0];

        assert!(matches!(ast.kind(first), NodeKind::Text { soft_line_break: true, .. }));
        assert_eq!(ast.plain_text(para, source), "one two");
    }

    #[rstest]
    #[case("- a", 2)]
    #[case("-   a", 4)]
    #[case("10. a", 4)]
    #[case("-", 2)]
    #[case("-      code", 2)]
    fn test_item_offset(#[case] line: &str, #[case] expected: usize) {
        assert_eq!(item_offset(line), expected);
    }
}
