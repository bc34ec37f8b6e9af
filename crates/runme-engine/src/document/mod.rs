//! # Document
//!
//! A parsed markdown source. Each stage (split, frontmatter, AST, block
//! tree) is computed on first use and memoized, so a document can be asked
//! for its code blocks many times without reparsing or reassigning ids.

use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::ast::{self, AttrValue, Ast, FINAL_LINE_BREAKS_KEY};
use crate::attributes::AttributeFormat;
use crate::blocks::{self, BlockInfoProvider, BlockTree, BuildContext, CodeBlock};
use crate::error::ErrorKind;
use crate::frontmatter::{Frontmatter, FrontmatterError, FrontmatterFormat, Split, split};
use crate::identity::{IdGenerator, IdentityResolver, Lifecycle, default_generator};
use crate::linebreak;
use crate::naming::NameResolver;
use crate::render::{RenderError, Renderer, SourceInfo};

/// Environment variable that turns on AST debug metadata for cells.
pub const AST_METADATA_ENV: &str = "RUNME_AST_METADATA";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Frontmatter(#[from] FrontmatterError),
}

impl DocumentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocumentError::Encoding(_) => ErrorKind::Encoding,
            DocumentError::Render(err) => err.kind(),
            DocumentError::Frontmatter(err) => err.kind(),
        }
    }
}

/// How a document is parsed.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub lifecycle: Lifecycle,
    pub generator: Arc<dyn IdGenerator>,
    /// Notation for attributes on blocks that had none.
    pub default_attribute_format: AttributeFormat,
    /// Attach a JSON dump of each block's AST to its cell.
    pub ast_metadata: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            lifecycle: Lifecycle::default(),
            generator: default_generator(),
            default_attribute_format: AttributeFormat::default(),
            ast_metadata: ast_metadata_from_env(),
        }
    }
}

impl ParseOptions {
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn IdGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_ast_metadata(mut self, enabled: bool) -> Self {
        self.ast_metadata = enabled;
        self
    }
}

fn ast_metadata_from_env() -> bool {
    std::env::var(AST_METADATA_ENV).is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

#[derive(Debug)]
struct FrontmatterState {
    frontmatter: Option<Frontmatter>,
    error: Option<FrontmatterError>,
}

#[derive(Debug)]
pub struct Document {
    source: String,
    options: ParseOptions,
    identity: IdentityResolver,
    names: Mutex<NameResolver>,
    split: OnceCell<Split>,
    frontmatter: OnceCell<FrontmatterState>,
    ast: OnceCell<Ast>,
    tree: OnceCell<BlockTree>,
}

impl Document {
    pub fn new(source: impl Into<String>, options: ParseOptions) -> Self {
        let identity = IdentityResolver::new(options.lifecycle, Arc::clone(&options.generator));
        Self {
            source: source.into(),
            options,
            identity,
            names: Mutex::new(NameResolver::new()),
            split: OnceCell::new(),
            frontmatter: OnceCell::new(),
            ast: OnceCell::new(),
            tree: OnceCell::new(),
        }
    }

    /// Documents must be UTF-8; anything else is rejected up front.
    pub fn from_bytes(source: &[u8], options: ParseOptions) -> Result<Self, DocumentError> {
        let text = std::str::from_utf8(source)?;
        Ok(Self::new(text, options))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.options.lifecycle
    }

    pub fn generator(&self) -> &dyn IdGenerator {
        self.options.generator.as_ref()
    }

    pub fn line_break(&self) -> &'static str {
        linebreak::detect(&self.source)
    }

    pub fn split(&self) -> &Split {
        self.split.get_or_init(|| split(&self.source))
    }

    /// Markdown body without frontmatter, separator or trailing breaks.
    pub fn content(&self) -> &str {
        self.split().content(&self.source)
    }

    /// Byte offset of the content within the source.
    pub fn content_offset(&self) -> usize {
        self.split().content.start
    }

    pub fn trailing_line_breaks(&self) -> usize {
        self.split().trailing_line_breaks
    }

    /// Frontmatter block exactly as written, delimiters included.
    pub fn frontmatter_raw(&self) -> Option<&str> {
        self.split().raw_frontmatter(&self.source)
    }

    fn frontmatter_state(&self) -> &FrontmatterState {
        self.frontmatter.get_or_init(|| {
            let split = self.split();
            match split.frontmatter {
                Some(region) => {
                    let inner = region.inner.slice(&self.source).unwrap_or_default();
                    match Frontmatter::parse(inner, region.delimiter) {
                        Ok(frontmatter) => FrontmatterState {
                            frontmatter: Some(frontmatter),
                            error: None,
                        },
                        Err(err) => {
                            log::warn!("could not parse frontmatter: {err}");
                            FrontmatterState {
                                frontmatter: None,
                                error: Some(err),
                            }
                        }
                    }
                }
                None => FrontmatterState {
                    frontmatter: None,
                    error: split.error.clone().map(FrontmatterError::from),
                },
            }
        })
    }

    pub fn frontmatter(&self) -> Option<&Frontmatter> {
        self.frontmatter_state().frontmatter.as_ref()
    }

    /// Soft error from splitting or parsing the frontmatter, if any.
    pub fn frontmatter_error(&self) -> Option<&FrontmatterError> {
        self.frontmatter_state().error.as_ref()
    }

    pub fn ast(&self) -> &Ast {
        self.ast.get_or_init(|| {
            let mut ast = ast::parse(self.content());
            let root = ast.root();
            let breaks = i64::try_from(self.trailing_line_breaks()).unwrap_or(i64::MAX);
            ast.set_attribute(root, FINAL_LINE_BREAKS_KEY, AttrValue::Int(breaks));
            ast
        })
    }

    pub fn block_tree(&self) -> Result<&BlockTree, DocumentError> {
        self.tree
            .get_or_try_init(|| {
                blocks::build(&BuildContext {
                    ast: self.ast(),
                    content: self.content(),
                    line_break: self.line_break(),
                    identity: &self.identity,
                    names: &self.names,
                    default_format: self.options.default_attribute_format,
                })
            })
            .map_err(DocumentError::from)
    }

    pub fn code_blocks(&self) -> Result<Vec<&CodeBlock>, DocumentError> {
        Ok(self.block_tree()?.code_blocks())
    }

    /// Render the document back to markdown from its source.
    pub fn render(&self) -> Result<String, DocumentError> {
        let body = Renderer::new(self.ast(), self.content())
            .with_line_break(self.line_break())
            .with_provider(&SourceInfo)
            .render(self.ast().root())?;
        let split = self.split();
        let separator = split.separator.slice(&self.source).unwrap_or_default();
        Ok(format!("{}{separator}{body}", self.frontmatter_raw().unwrap_or_default()))
    }

    /// Render with identity applied: a document id in the frontmatter and
    /// code block info strings rebuilt from their current attributes.
    pub fn format(&self) -> Result<String, DocumentError> {
        let tree = self.block_tree()?;
        let provider = BlockInfoProvider::new(tree);
        let line_break = self.line_break();
        let body = Renderer::new(self.ast(), self.content())
            .with_line_break(line_break)
            .with_provider(&provider)
            .render(self.ast().root())?;

        let raw = self.frontmatter_raw();
        let separator = self.split().separator.slice(&self.source).unwrap_or_default();
        let (frontmatter, separator) = match (self.frontmatter(), raw) {
            (Some(frontmatter), Some(raw)) if self.lifecycle().document_identity() => {
                let mut frontmatter = frontmatter.clone();
                if frontmatter.ensure_id(self.generator()) {
                    (frontmatter.marshal(line_break)?, separator.to_string())
                } else {
                    (raw.to_string(), separator.to_string())
                }
            }
            (None, None) if self.lifecycle().document_identity() => {
                let mut frontmatter = Frontmatter::new(FrontmatterFormat::Yaml);
                frontmatter.ensure_id(self.generator());
                let separator = if self.content().is_empty() {
                    String::new()
                } else {
                    line_break.repeat(2)
                };
                (frontmatter.marshal(line_break)?, separator)
            }
            (_, raw) => (raw.unwrap_or_default().to_string(), separator.to_string()),
        };
        Ok(format!("{frontmatter}{separator}{body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::FixedIdGenerator;
    use crate::tests::{FIXED_ID, fixed_options};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("")]
    #[case("# Title\n")]
    #[case("---\nshell: bash\n---\n\n# Title\n\n```sh\necho hi\n```\n")]
    #[case("+++\ncategory = \"x\"\n+++\nBody text\n\n\n")]
    #[case("Para one\r\n\r\nPara two\r\n")]
    #[case("> quote\n>\n> - item\n")]
    #[case("# Examples\n```sh {name=echo first= second=2}\n$ echo \"Hello, runme!\"\n```\n")]
    #[case("para one\n\n\n\npara two\n")]
    #[case("> a\n> > b\n")]
    fn test_render_reproduces_source(#[case] source: &str) {
        let doc = Document::new(source, fixed_options(Lifecycle::Unspecified));
        assert_eq!(doc.render().unwrap(), source);
    }

    #[test]
    fn test_from_bytes_rejects_invalid_utf8() {
        let err = Document::from_bytes(&[0x66, 0xff, 0x6f], ParseOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
    }

    #[test]
    fn test_frontmatter_error_is_soft() {
        let doc = Document::new("---\nkey: [unclosed\n---\n\n# Title\n", fixed_options(Lifecycle::All));

        assert!(doc.frontmatter().is_none());
        assert!(doc.frontmatter_error().is_some());
        assert_eq!(doc.code_blocks().unwrap().len(), 0);
        assert_eq!(doc.render().unwrap(), "---\nkey: [unclosed\n---\n\n# Title\n");
    }

    #[test]
    fn test_code_blocks_are_memoized() {
        let doc = Document::new("```sh\necho 1\n```\n", ParseOptions::default());

        let first = doc.code_blocks().unwrap()[0].id().to_string();
        let second = doc.code_blocks().unwrap()[0].id().to_string();

        assert_eq!(first, second);
    }

    #[test]
    fn test_format_injects_identity() {
        let doc = Document::new(
            "# Title\n\n```sh {name=greet}\necho hi\n```\n",
            ParseOptions::default()
                .with_lifecycle(Lifecycle::All)
                .with_generator(Arc::new(FixedIdGenerator::new(FIXED_ID))),
        );

        let formatted = doc.format().unwrap();

        assert_eq!(
            formatted,
            format!(
                "---\nrunme:\n  id: {FIXED_ID}\n  version: v3\n---\n\n# Title\n\n```sh {{ name=greet id={FIXED_ID} }}\necho hi\n```\n"
            )
        );
    }

    #[test]
    fn test_format_without_identity_keeps_frontmatter() {
        let source = "---\nshell: bash\n---\n\n```sh\necho hi\n```\n";
        let doc = Document::new(source, fixed_options(Lifecycle::Unspecified));
        assert_eq!(doc.format().unwrap(), source);
    }
}
