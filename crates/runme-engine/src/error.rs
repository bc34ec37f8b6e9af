//! Error kinds shared by every component.
//!
//! Each module owns its own `thiserror` enum; this module only carries the
//! coarse classification callers use to decide whether a failure is fatal.

use serde::{Deserialize, Serialize};

/// Coarse classification of engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Frontmatter delimiters were malformed. Soft: the document still parses.
    FrontmatterSplit,
    /// Frontmatter content matched no supported format. Soft.
    FrontmatterParse,
    /// Frontmatter could not be serialized back to text.
    FrontmatterMarshal,
    /// Code-block attributes could not be parsed. Soft: attributes are dropped.
    AttributeParse,
    /// A caller-supplied identifier was not a valid ULID. Soft.
    Identity,
    /// A node could not be rendered back to markdown.
    Render,
    /// Input bytes were not valid UTF-8.
    Encoding,
    /// Notebook could not be serialized.
    Serialize,
    /// A project walk or document load failed.
    ProjectLoad,
    /// Loading was cancelled by the caller.
    Cancelled,
    /// Filesystem failure.
    Io,
}

impl ErrorKind {
    /// Soft errors are surfaced to callers but never abort parsing.
    #[must_use]
    pub fn is_soft(self) -> bool {
        matches!(
            self,
            ErrorKind::FrontmatterSplit
                | ErrorKind::FrontmatterParse
                | ErrorKind::AttributeParse
                | ErrorKind::Identity
        )
    }
}
