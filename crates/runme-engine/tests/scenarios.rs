mod common;

use pretty_assertions::assert_eq;
use runme_engine::identity::{Lifecycle, is_valid_id};
use runme_engine::notebook::{
    FRONTMATTER_KEY, NAME_GENERATED_KEY, NAME_KEY, SerializeOptions, deserialize, serialize,
};
use runme_engine::{CellKind, Document};

use common::{FIXED_ID, fixture, options};

fn meta<'a>(cell: &'a runme_engine::Cell, key: &str) -> Option<&'a str> {
    cell.metadata.get(key).map(String::as_str)
}

#[test]
fn heading_and_code_blocks_with_html_attributes() {
    let source = fixture("examples");
    let notebook = deserialize(source.as_bytes(), options(Lifecycle::Unspecified)).unwrap();

    let kinds: Vec<CellKind> = notebook.cells.iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![CellKind::Markup, CellKind::Code, CellKind::Markup, CellKind::Code]
    );

    let first = &notebook.cells[1];
    assert_eq!(notebook.cells[0].value, "# Examples");
    assert_eq!(first.language_id, "sh");
    assert_eq!(first.value, "$ echo \"Hello, runme!\"");
    assert_eq!(meta(first, "name"), Some("echo"));
    assert_eq!(meta(first, NAME_GENERATED_KEY), Some("false"));

    assert_eq!(serialize(&notebook, &SerializeOptions::default()).unwrap(), source);
}

#[test]
fn tight_source_with_unpadded_attributes_is_reproduced() {
    let source = "# Examples\n```sh {name=echo first= second=2}\n$ echo \"Hello, runme!\"\n```\n";

    let doc = Document::new(source, options(Lifecycle::Unspecified));
    assert_eq!(doc.render().unwrap(), source);

    let notebook = deserialize(source.as_bytes(), options(Lifecycle::Unspecified)).unwrap();
    let code = &notebook.cells[1];
    assert_eq!(code.value, "$ echo \"Hello, runme!\"");
    assert_eq!(meta(code, "first"), Some(""));
    assert_eq!(meta(code, "second"), Some("2"));
    assert_eq!(serialize(&notebook, &SerializeOptions::default()).unwrap(), source);
}

#[test]
fn unnamed_block_gets_generated_name() {
    let source = "```sh\necho 1\n```\n";
    let notebook = deserialize(source.as_bytes(), options(Lifecycle::Unspecified)).unwrap();
    let cell = &notebook.cells[0];

    assert_eq!(meta(cell, NAME_KEY), Some("echo-1"));
    assert_eq!(meta(cell, NAME_GENERATED_KEY), Some("true"));
    assert_eq!(meta(cell, "name"), None);
    assert_eq!(serialize(&notebook, &SerializeOptions::default()).unwrap(), source);
}

#[test]
fn duplicate_seeds_are_numbered() {
    let doc = Document::new(
        "```sh\necho hi\n```\n\n```sh\necho hi\n```\n\n```sh\necho hi\n```\n",
        options(Lifecycle::Unspecified),
    );

    let names: Vec<&str> = doc.code_blocks().unwrap().into_iter().map(|b| b.name()).collect();

    assert_eq!(names, vec!["echo-hi", "echo-hi-2", "echo-hi-3"]);
}

#[test]
fn duplicate_explicit_names_are_numbered() {
    let source = "```sh {name=build}\nmake\n```\n\n```sh {name=build}\nmake all\n```\n";
    let doc = Document::new(source, options(Lifecycle::Unspecified));

    let blocks = doc.code_blocks().unwrap();
    let names: Vec<&str> = blocks.iter().map(|b| b.name()).collect();

    assert_eq!(names, vec!["build", "build-2"]);
    assert!(blocks.iter().all(|b| !b.name_generated()));

    let notebook = deserialize(source.as_bytes(), options(Lifecycle::Unspecified)).unwrap();
    assert_eq!(meta(&notebook.cells[1], NAME_KEY), Some("build-2"));
    assert_eq!(meta(&notebook.cells[1], "name"), Some("build"));
    assert_eq!(serialize(&notebook, &SerializeOptions::default()).unwrap(), source);
}

#[test]
fn frontmatter_round_trip() {
    let source = "---\nshell: fish\n---\n\nBody\n";
    let notebook = deserialize(source.as_bytes(), options(Lifecycle::Unspecified)).unwrap();

    assert_eq!(
        notebook.frontmatter.as_ref().and_then(|f| f.shell.as_deref()),
        Some("fish")
    );
    assert_eq!(meta_of(&notebook, FRONTMATTER_KEY), Some("---\nshell: fish\n---"));
    assert_eq!(serialize(&notebook, &SerializeOptions::default()).unwrap(), source);
}

fn meta_of<'a>(notebook: &'a runme_engine::Notebook, key: &str) -> Option<&'a str> {
    notebook.metadata.get(key).map(String::as_str)
}

#[test]
fn crlf_is_preserved() {
    let source = "# Title\r\n\r\nSome text\r\n\r\n```sh\r\nls\r\n```\r\n\r\n";
    let doc = Document::new(source, options(Lifecycle::Unspecified));
    assert_eq!(doc.render().unwrap(), source);

    let notebook = deserialize(source.as_bytes(), options(Lifecycle::Unspecified)).unwrap();
    assert_eq!(serialize(&notebook, &SerializeOptions::default()).unwrap(), source);
}

#[test]
fn document_identity_is_injected_once() {
    let source = "# Hi\n\nSome text\n";
    let notebook = deserialize(source.as_bytes(), options(Lifecycle::All)).unwrap();

    let out = serialize(&notebook, &SerializeOptions::default()).unwrap();
    insta::assert_snapshot!(out, @r"
    ---
    runme:
      id: 01HFB6Z3N6Y8Q4B2T7G9KJ3M5V
      version: v3
    ---

    # Hi

    Some text
    ");

    let reread = deserialize(out.as_bytes(), options(Lifecycle::All)).unwrap();
    let id = reread.frontmatter.as_ref().and_then(|f| f.id()).unwrap();
    assert!(is_valid_id(id));
    assert_eq!(id, FIXED_ID);
    assert_eq!(serialize(&reread, &SerializeOptions::default()).unwrap(), out);
}

#[test]
fn list_items_with_code_are_split_into_cells() {
    let notebook = deserialize(fixture("list_with_code").as_bytes(), options(Lifecycle::Unspecified)).unwrap();

    let values: Vec<&str> = notebook.cells.iter().map(|c| c.value.as_str()).collect();
    assert_eq!(
        values,
        vec![
            "## Install",
            "1. Get the binary:",
            "brew install runme",
            "2. Check it works:",
            "runme --version",
        ]
    );
    assert_eq!(notebook.cells[4].name(), Some("version"));
}
