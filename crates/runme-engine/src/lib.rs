pub mod ast;
pub mod attributes;
pub mod blocks;
pub mod document;
pub mod error;
pub mod frontmatter;
pub mod identity;
pub mod io;
pub mod linebreak;
pub mod naming;
pub mod notebook;
pub mod project;
pub mod render;
pub mod service;
pub mod span;

#[cfg(test)]
pub mod tests;

// Re-export key types for easier usage
pub use blocks::{Block, BlockTree, CodeBlock};
pub use document::{Document, DocumentError, ParseOptions};
pub use error::ErrorKind;
pub use frontmatter::Frontmatter;
pub use identity::{IdGenerator, Lifecycle};
pub use notebook::{Cell, CellKind, Notebook, SerializeOptions, deserialize, serialize};
pub use project::{LoadEvent, Project, ProjectOptions, Task};
pub use service::{LoadRequest, ParserService, ProjectService};
