//! # Notebook
//!
//! The cell view of a document: markup and code cells with string metadata,
//! plus the serializer that turns cells back into markdown.
//!
//! Internal metadata keys share the `runme.dev/` prefix and are never
//! written as code block attributes.

mod cells;
mod serializer;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::frontmatter::Frontmatter;
use crate::span::Span;

pub use cells::to_cells;
pub use serializer::{
    OutputOptions, SerializeError, SerializeOptions, SessionOptions, deserialize, format_duration, serialize,
    serialize_cells, strip_ansi,
};

pub const INTERNAL_PREFIX: &str = "runme.dev/";

pub const FRONTMATTER_KEY: &str = "runme.dev/frontmatter";
pub const ID_KEY: &str = "runme.dev/id";
pub const FINAL_LINE_BREAKS_KEY: &str = "runme.dev/finalLineBreaks";
pub const NAME_KEY: &str = "runme.dev/name";
pub const NAME_GENERATED_KEY: &str = "runme.dev/nameGenerated";
pub const AST_KEY: &str = "runme.dev/ast";
pub const ATTRIBUTES_FORMAT_KEY: &str = "runme.dev/attributesFormat";
/// Set to `crlf` on notebooks read from CRLF sources.
pub const LINE_BREAK_KEY: &str = "runme.dev/lineBreak";
/// Line breaks in the source before a cell, when not one blank line (or
/// none ahead of the first cell of a document without frontmatter).
pub const LINE_BREAKS_BEFORE_KEY: &str = "runme.dev/lineBreaksBefore";
/// Code block info string as written, when it differs from the canonical one.
pub const INFO_STRING_KEY: &str = "runme.dev/infoString";
/// Opening fence as written, when not the shortest backtick fence.
pub const FENCE_KEY: &str = "runme.dev/fence";

/// `name` under the internal prefix.
pub fn internal_key(name: &str) -> String {
    format!("{INTERNAL_PREFIX}{name}")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellKind {
    #[default]
    Markup,
    Code,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub kind: CellKind,
    pub value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub language_id: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<CellOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_summary: Option<ExecutionSummary>,
    /// Byte range of a code cell within the source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_range: Option<Span>,
}

impl Cell {
    pub fn markup(value: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Markup,
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn code(language_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Code,
            value: value.into(),
            language_id: language_id.into(),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.get(NAME_KEY).map(String::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.metadata.get(ID_KEY).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellOutput {
    #[serde(default)]
    pub items: Vec<CellOutputItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_info: Option<ProcessInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellOutputItem {
    pub mime: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl CellOutputItem {
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            mime: "text/plain".to_string(),
            data: data.into().into_bytes(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
}

/// Unix milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub start_time: i64,
    pub end_time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontmatter: Option<Frontmatter>,
}

impl Notebook {
    pub fn code_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|c| c.kind == CellKind::Code)
    }

    pub fn frontmatter_raw(&self) -> Option<&str> {
        self.metadata.get(FRONTMATTER_KEY).map(String::as_str)
    }
}

pub(crate) mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
