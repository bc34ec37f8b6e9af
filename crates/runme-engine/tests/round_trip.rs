mod common;

use pretty_assertions::assert_eq;
use rstest::rstest;
use runme_engine::identity::Lifecycle;
use runme_engine::linebreak;
use runme_engine::notebook::{SerializeOptions, deserialize, serialize};
use runme_engine::{Document, ParseOptions};

use common::{fixture, options};

#[rstest]
#[case("examples")]
#[case("frontmatter_yaml")]
#[case("frontmatter_toml")]
#[case("frontmatter_json")]
#[case("mixed")]
#[case("list_with_code")]
fn render_reproduces_fixture(#[case] name: &str) {
    let source = fixture(name);
    let doc = Document::new(source.clone(), options(Lifecycle::Unspecified));

    assert_eq!(doc.render().unwrap(), source);
}

#[rstest]
#[case("examples")]
#[case("frontmatter_yaml")]
#[case("frontmatter_toml")]
#[case("frontmatter_json")]
#[case("mixed")]
fn notebook_round_trip(#[case] name: &str) {
    let source = fixture(name);
    let notebook = deserialize(source.as_bytes(), options(Lifecycle::Unspecified)).unwrap();

    assert_eq!(serialize(&notebook, &SerializeOptions::default()).unwrap(), source);
}

#[rstest]
#[case("# Title\nParagraph\n")]
#[case("para one\n\n\n\npara two\n")]
#[case("# Heading\n\n\n```sh {name=a}\nls\n```\n```sh\npwd\n```\n")]
#[case("---\nshell: bash\n---\n# Title\n")]
#[case("---\nshell: bash\n---\n\n\n\n# Title\n")]
#[case("\n\n\nText after blank lines\n")]
fn notebook_round_trip_keeps_spacing(#[case] source: &str) {
    let notebook = deserialize(source.as_bytes(), options(Lifecycle::Unspecified)).unwrap();

    assert_eq!(serialize(&notebook, &SerializeOptions::default()).unwrap(), source);
}

/// Code inside list items becomes its own cell, so the item indentation is
/// not written back and the code block leaves the list.
#[test]
fn notebook_round_trip_drops_list_indentation() {
    let source = fixture("list_with_code");
    let notebook = deserialize(source.as_bytes(), options(Lifecycle::Unspecified)).unwrap();

    let out = serialize(&notebook, &SerializeOptions::default()).unwrap();

    assert_ne!(out, source);
    insta::assert_snapshot!(out, @r"
    ## Install

    1. Get the binary:

    ```sh
    brew install runme
    ```

    2. Check it works:

    ```sh { name=version }
    runme --version
    ```
    ");
    assert_eq!(out.replace("\n", ""), source.replace("\n", "").replace("   ", ""));
}

#[rstest]
#[case("examples")]
#[case("frontmatter_yaml")]
#[case("frontmatter_toml")]
#[case("frontmatter_json")]
#[case("mixed")]
fn identity_settles_after_first_pass(#[case] name: &str) {
    let source = fixture(name);
    let options = || ParseOptions::default().with_lifecycle(Lifecycle::All).with_ast_metadata(false);

    let first = serialize(&deserialize(source.as_bytes(), options()).unwrap(), &SerializeOptions::default()).unwrap();
    let second = serialize(&deserialize(first.as_bytes(), options()).unwrap(), &SerializeOptions::default()).unwrap();

    assert_eq!(first, second);
}

#[rstest]
#[case("examples")]
#[case("frontmatter_yaml")]
#[case("mixed")]
#[case("list_with_code")]
fn code_blocks_are_named_and_keep_public_attributes(#[case] name: &str) {
    let doc = Document::new(fixture(name), options(Lifecycle::All));

    for block in doc.code_blocks().unwrap() {
        assert!(!block.name().is_empty());
        assert!(block.attributes().iter().all(|(key, _)| !key.starts_with("runme.dev/")));
    }
}

#[rstest]
#[case("examples")]
#[case("frontmatter_toml")]
#[case("---\nshell: bash\n---\n\n\nBody\n\n\n")]
#[case("\u{feff}---\nx: 1\n---\nBody")]
#[case("\n\n# Leading blank lines\n")]
fn source_splits_into_frontmatter_content_and_trailing(#[case] input: &str) {
    let source = if input.contains('\n') { input.to_string() } else { fixture(input) };
    let doc = Document::new(source.clone(), options(Lifecycle::Unspecified));
    let (_, trailing_bytes) = linebreak::trailing(&source);

    assert_eq!(source.len(), doc.content_offset() + doc.content().len() + trailing_bytes);
}
