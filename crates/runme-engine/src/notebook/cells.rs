use super::serializer::{fence, info_string};
use super::{
    AST_KEY, ATTRIBUTES_FORMAT_KEY, Cell, FENCE_KEY, ID_KEY, INFO_STRING_KEY, LINE_BREAKS_BEFORE_KEY,
    NAME_GENERATED_KEY, NAME_KEY,
};
use crate::ast::{NodeId, NodeKind};
use crate::attributes::AttributeFormat;
use crate::blocks::{Block, BlockId, BlockTree, CodeBlock, InnerKind};
use crate::document::{Document, DocumentError};
use crate::linebreak;

/// Project a document onto notebook cells.
///
/// Lists and blockquotes stay whole markup cells unless they hold a code
/// block, in which case they are split so every code block gets a cell.
pub fn to_cells(doc: &Document) -> Result<Vec<Cell>, DocumentError> {
    let tree = doc.block_tree()?;
    let mut cells = Vec::new();
    walk(doc, tree, tree.root(), &mut cells);
    record_spacing(doc, &mut cells);
    Ok(cells.into_iter().map(|(_, cell)| cell).collect())
}

/// Note the line breaks ahead of each cell that the serializer would not
/// write on its own.
fn record_spacing(doc: &Document, cells: &mut [(NodeId, Cell)]) {
    let content = doc.content();
    let count = |text: &str| text.matches('\n').count();
    let mut previous_end = None;
    for (node, cell) in cells.iter_mut() {
        let span = doc.ast().node(*node).span;
        let (breaks, usual) = match previous_end {
            Some(end) => (content.get(end..span.start).map(count), 2),
            None => {
                let separator = doc.split().separator.slice(doc.source()).unwrap_or_default();
                let leading = content.get(..span.start).map(|text| count(separator) + count(text));
                (leading, if doc.frontmatter_raw().is_some() { 2 } else { 0 })
            }
        };
        if let Some(breaks) = breaks.filter(|b| *b != usual) {
            cell.metadata.insert(LINE_BREAKS_BEFORE_KEY.to_string(), breaks.to_string());
        }
        previous_end = Some(span.end);
    }
}

fn walk(doc: &Document, tree: &BlockTree, parent: BlockId, cells: &mut Vec<(NodeId, Cell)>) {
    for child in tree.children(parent) {
        let Some(block) = tree.block(*child) else {
            continue;
        };
        match block {
            Block::Inner(inner) if !tree.contains_code(*child) => {
                cells.push((block.node(), markup_cell(doc, block.node(), inner.value())));
            }
            Block::Inner(inner) if inner.kind() == InnerKind::List => {
                for item in tree.children(*child) {
                    match tree.block(*item) {
                        Some(item_block) if !tree.contains_code(*item) => {
                            cells.push((item_block.node(), markup_cell(doc, item_block.node(), item_block.value())));
                        }
                        Some(_) => walk(doc, tree, *item, cells),
                        None => {}
                    }
                }
            }
            Block::Inner(_) => walk(doc, tree, *child, cells),
            Block::Code(code) => cells.push((code.node(), code_cell(doc, code))),
            Block::Markdown(markdown) => {
                let value = match list_item_prefix(doc, tree, *child) {
                    Some(prefix) => format!("{prefix}{}", markdown.value()),
                    None => markdown.value().to_string(),
                };
                cells.push((block.node(), markup_cell(doc, block.node(), &value)));
            }
        }
    }
}

/// Marker for the first block of a list item, e.g. `"- "` or `"3. "`.
fn list_item_prefix(doc: &Document, tree: &BlockTree, id: BlockId) -> Option<String> {
    if tree.index(id) != Some(0) {
        return None;
    }
    let item = tree.parent(id).and_then(|p| tree.block(p))?;
    match item {
        Block::Inner(inner) if inner.kind() == InnerKind::ListItem => {
            doc.ast().list_item_marker(item.node()).map(|marker| format!("{marker} "))
        }
        _ => None,
    }
}

fn markup_cell(doc: &Document, node: NodeId, value: &str) -> Cell {
    let mut cell = Cell::markup(value.trim_end_matches(['\r', '\n']));
    if doc.options().ast_metadata {
        let dump = doc.ast().dump(node, doc.content());
        cell.metadata.insert(AST_KEY.to_string(), dump.to_string());
    }
    cell
}

fn code_cell(doc: &Document, block: &CodeBlock) -> Cell {
    let mut cell = Cell::code(block.language(), linebreak::convert(block.content(), doc.line_break()));

    for (key, value) in block.attributes().iter() {
        cell.metadata.insert(key.to_string(), value.to_string());
    }
    cell.metadata.insert(NAME_KEY.to_string(), block.name().to_string());
    cell.metadata
        .insert(NAME_GENERATED_KEY.to_string(), block.name_generated().to_string());
    if !block.id().is_empty() {
        cell.metadata.insert(ID_KEY.to_string(), block.id().to_string());
    }
    if block.attributes().format() == AttributeFormat::Json {
        cell.metadata
            .insert(ATTRIBUTES_FORMAT_KEY.to_string(), AttributeFormat::Json.as_str().to_string());
    }
    if let NodeKind::FencedCodeBlock {
        fence_char,
        fence_len,
        info,
        ..
    } = doc.ast().kind(block.node())
    {
        let written = fence_char.to_string().repeat(*fence_len);
        if written != fence(&cell) {
            cell.metadata.insert(FENCE_KEY.to_string(), written);
        }
        let canonical = info_string(&cell);
        cell.metadata.insert(INFO_STRING_KEY.to_string(), info.clone());
        if *info == canonical || info_string(&cell) != *info {
            cell.metadata.remove(INFO_STRING_KEY);
        }
    }
    if doc.options().ast_metadata {
        let dump = doc.ast().dump(block.node(), doc.content());
        cell.metadata.insert(AST_KEY.to_string(), dump.to_string());
    }
    cell.text_range = Some(block.text_range().shift(doc.content_offset()));
    cell
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Lifecycle;
    use crate::notebook::CellKind;
    use crate::tests::{FIXED_ID, fixed_options};
    use pretty_assertions::assert_eq;

    fn cells(source: &str, lifecycle: Lifecycle) -> Vec<Cell> {
        to_cells(&Document::new(source, fixed_options(lifecycle))).unwrap()
    }

    fn values(cells: &[Cell]) -> Vec<(CellKind, &str)> {
        cells.iter().map(|c| (c.kind, c.value.as_str())).collect()
    }

    #[test]
    fn test_heading_and_code() {
        let cells = cells(
            "# Examples\n\n```sh { name=echo first= second=2 }\n$ echo \"Hello, runme!\"\n```\n",
            Lifecycle::Unspecified,
        );

        assert_eq!(
            values(&cells),
            vec![
                (CellKind::Markup, "# Examples"),
                (CellKind::Code, "$ echo \"Hello, runme!\""),
            ]
        );
        let code = &cells[1];
        assert_eq!(code.language_id, "sh");
        assert_eq!(code.metadata.get("name").map(String::as_str), Some("echo"));
        assert_eq!(code.metadata.get("first").map(String::as_str), Some(""));
        assert_eq!(code.metadata.get(NAME_KEY).map(String::as_str), Some("echo"));
        assert_eq!(code.metadata.get(NAME_GENERATED_KEY).map(String::as_str), Some("false"));
        assert!(!code.metadata.contains_key(ID_KEY));
    }

    #[test]
    fn test_generated_name_and_cell_id() {
        let cells = cells("```sh\necho 1\n```\n", Lifecycle::Cell);
        let code = &cells[0];

        assert_eq!(code.name(), Some("echo-1"));
        assert_eq!(code.metadata.get(NAME_GENERATED_KEY).map(String::as_str), Some("true"));
        assert_eq!(code.id(), Some(FIXED_ID));
        assert_eq!(code.metadata.get("id").map(String::as_str), Some(FIXED_ID));
    }

    #[test]
    fn test_text_range_points_into_source() {
        let source = "---\nshell: bash\n---\n\n```sh\necho 1\n```\n";
        let cells = cells(source, Lifecycle::Unspecified);
        let range = cells[0].text_range.unwrap();

        assert_eq!(&source[range.start..range.end], "```sh\necho 1\n```");
    }

    #[test]
    fn test_list_without_code_is_one_cell() {
        let cells = cells("- one\n- two\n", Lifecycle::Unspecified);
        assert_eq!(values(&cells), vec![(CellKind::Markup, "- one\n- two")]);
    }

    #[test]
    fn test_list_with_code_is_split() {
        let source = "1. Install\n\n   ```sh\n   brew install runme\n   ```\n\n2. Done\n";
        let cells = cells(source, Lifecycle::Unspecified);

        assert_eq!(
            values(&cells),
            vec![
                (CellKind::Markup, "1. Install"),
                (CellKind::Code, "brew install runme"),
                (CellKind::Markup, "2. Done"),
            ]
        );
    }

    #[test]
    fn test_blockquote_with_code_is_split() {
        let cells = cells("> Note\n>\n> ```sh\n> ls\n> ```\n", Lifecycle::Unspecified);
        assert_eq!(
            values(&cells),
            vec![(CellKind::Markup, "Note"), (CellKind::Code, "ls")]
        );
    }

    #[test]
    fn test_crlf_code_value() {
        let cells = cells("```sh\r\necho 1\r\necho 2\r\n```\r\n", Lifecycle::Unspecified);
        assert_eq!(cells[0].value, "echo 1\r\necho 2");
    }

    #[test]
    fn test_ast_metadata() {
        let doc = Document::new("# Hi\n", fixed_options(Lifecycle::Unspecified).with_ast_metadata(true));
        let cells = to_cells(&doc).unwrap();

        let dump: serde_json::Value = serde_json::from_str(&cells[0].metadata[AST_KEY]).unwrap();
        assert_eq!(dump["kind"], "Heading");
    }

    #[test]
    fn test_spacing_other_than_one_blank_line_is_recorded() {
        let cells = cells("# Title\nParagraph\n\n\n\nLast\n\n```sh\nls\n```\n", Lifecycle::Unspecified);
        let before: Vec<Option<&str>> = cells
            .iter()
            .map(|c| c.metadata.get(LINE_BREAKS_BEFORE_KEY).map(String::as_str))
            .collect();

        assert_eq!(before, vec![None, Some("1"), Some("4"), None]);
    }

    #[test]
    fn test_leading_breaks_are_recorded() {
        let without_frontmatter = cells("\n\n# Hi\n", Lifecycle::Unspecified);
        let tight_frontmatter = cells("---\nx: 1\n---\n# Hi\n", Lifecycle::Unspecified);

        assert_eq!(
            without_frontmatter[0].metadata.get(LINE_BREAKS_BEFORE_KEY).map(String::as_str),
            Some("2")
        );
        assert_eq!(
            tight_frontmatter[0].metadata.get(LINE_BREAKS_BEFORE_KEY).map(String::as_str),
            Some("1")
        );
    }

    #[test]
    fn test_info_string_kept_only_when_not_canonical() {
        let cells = cells(
            "```sh {name=echo first= second=2}\nls\n```\n\n```sh { name=list }\nls\n```\n",
            Lifecycle::Unspecified,
        );

        assert_eq!(
            cells[0].metadata.get(INFO_STRING_KEY).map(String::as_str),
            Some("sh {name=echo first= second=2}")
        );
        assert!(!cells[1].metadata.contains_key(INFO_STRING_KEY));
    }

    #[test]
    fn test_injected_id_drops_source_info_string() {
        let cells = cells("```sh {name=echo}\nls\n```\n", Lifecycle::Cell);
        assert!(!cells[0].metadata.contains_key(INFO_STRING_KEY));
    }

    #[test]
    fn test_tilde_fence_is_recorded() {
        let cells = cells("~~~sh\nls\n~~~\n\n```sh\nls\n```\n", Lifecycle::Unspecified);

        assert_eq!(cells[0].metadata.get(FENCE_KEY).map(String::as_str), Some("~~~"));
        assert!(!cells[1].metadata.contains_key(FENCE_KEY));
    }
}
