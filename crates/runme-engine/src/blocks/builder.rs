use std::sync::{Mutex, PoisonError};

use super::{Block, BlockId, BlockTree, CodeBlock, InnerBlock, InnerKind, MarkdownBlock, normalize_lines};
use crate::ast::{Ast, NodeId, NodeKind};
use crate::attributes::{self, AttributeFormat, Attributes};
use crate::identity::IdentityResolver;
use crate::naming::NameResolver;
use crate::render::{RenderError, Renderer, SourceInfo};

/// Everything the block builder reads from its document.
pub struct BuildContext<'a> {
    pub ast: &'a Ast,
    /// Document content the AST spans point into.
    pub content: &'a str,
    pub line_break: &'static str,
    pub identity: &'a IdentityResolver,
    pub names: &'a Mutex<NameResolver>,
    pub default_format: AttributeFormat,
}

/// Build the block tree for the top-level children of the AST.
pub fn build(ctx: &BuildContext<'_>) -> Result<BlockTree, RenderError> {
    let mut tree = BlockTree::new();
    let root = tree.root();
    build_children(ctx, &mut tree, root, ctx.ast.root())?;
    Ok(tree)
}

fn build_children(ctx: &BuildContext<'_>, tree: &mut BlockTree, parent: BlockId, node: NodeId) -> Result<(), RenderError> {
    for child in ctx.ast.children(node) {
        let inner = match ctx.ast.kind(*child) {
            NodeKind::FencedCodeBlock { info, literal, .. } => {
                let block = code_block(ctx, *child, info, literal)?;
                tree.append(parent, Block::Code(block));
                continue;
            }
            NodeKind::List { .. } => Some(InnerKind::List),
            NodeKind::ListItem { .. } => Some(InnerKind::ListItem),
            NodeKind::Blockquote => Some(InnerKind::Blockquote),
            _ => None,
        };
        let value = render(ctx, *child)?;
        match inner {
            Some(kind) => {
                let id = tree.append(
                    parent,
                    Block::Inner(InnerBlock {
                        node: *child,
                        kind,
                        value,
                    }),
                );
                build_children(ctx, tree, id, *child)?;
            }
            None => {
                tree.append(parent, Block::Markdown(MarkdownBlock { node: *child, value }));
            }
        }
    }
    Ok(())
}

fn render(ctx: &BuildContext<'_>, node: NodeId) -> Result<String, RenderError> {
    Renderer::new(ctx.ast, ctx.content)
        .with_line_break(ctx.line_break)
        .with_provider(&SourceInfo)
        .render(node)
}

fn code_block(ctx: &BuildContext<'_>, node: NodeId, info: &str, literal: &str) -> Result<CodeBlock, RenderError> {
    let mut attributes = attributes::from_info(info, ctx.default_format).unwrap_or_else(|err| {
        log::warn!("ignoring attributes of code block {info:?}: {err}");
        Attributes::new(ctx.default_format)
    });

    let content = literal.trim_matches('\n').to_string();
    let lines = normalize_lines(&content);

    let lifecycle = ctx.identity.lifecycle();
    let (id, id_from_attributes) = ctx.identity.cell_id(node, &attributes);
    if lifecycle.cell_identity() {
        attributes.insert("id", id.clone());
    }
    let id = if lifecycle.cell_identity() || id_from_attributes {
        id
    } else {
        String::new()
    };

    let resolved = ctx
        .names
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .resolve(node, attributes.get("name"), &lines);

    let intro = ctx
        .ast
        .previous_sibling(node)
        .filter(|prev| matches!(ctx.ast.kind(*prev), NodeKind::Paragraph))
        .map(|prev| ctx.ast.plain_text(prev, ctx.content))
        .unwrap_or_default();

    Ok(CodeBlock {
        node,
        id,
        id_generated: !id_from_attributes,
        name: resolved.name,
        name_generated: !resolved.explicit,
        language: attributes::language(info).to_string(),
        attributes,
        content,
        lines,
        value: render(ctx, node)?,
        intro,
        text_range: ctx.ast.node(node).span,
    })
}
