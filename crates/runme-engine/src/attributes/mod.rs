//! # Code block attributes
//!
//! The `{ ... }` segment of a fenced code block's info string, e.g.
//!
//! ```text
//! ```sh { name=echo interactive=false }
//! ```js {"name":"run","background":true}
//! ```
//!
//! Two notations are accepted. Parsing tries JSON first and falls back to
//! the html-like `key=value` form. The notation a block was parsed with is
//! remembered so it can be written back the same way.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::ErrorKind;
use crate::notebook::INTERNAL_PREFIX;

#[derive(Debug, Error)]
pub enum AttributeError {
    #[error("attributes are not a JSON object: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed attributes: {0}")]
    Malformed(String),
    #[error("could not parse attributes {raw:?} with any known notation")]
    Unparseable { raw: String },
}

impl AttributeError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::AttributeParse
    }
}

/// Notation of an attribute segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeFormat {
    #[default]
    Html,
    Json,
}

impl AttributeFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeFormat::Html => "html",
            AttributeFormat::Json => "json",
        }
    }
}

/// Ordered attribute map plus the notation it was written in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    items: IndexMap<String, String>,
    format: AttributeFormat,
}

impl Attributes {
    pub fn new(format: AttributeFormat) -> Self {
        Self {
            items: IndexMap::new(),
            format,
        }
    }

    pub fn format(&self) -> AttributeFormat {
        self.format
    }

    pub fn set_format(&mut self, format: AttributeFormat) {
        self.format = format;
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.items.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.items.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Parse a `{ ... }` segment, JSON first, html-like second.
    pub fn parse(raw: &str) -> Result<Self, AttributeError> {
        let mut first_error = None;
        for parser in PARSERS {
            match parser.parse(raw) {
                Ok(mut attributes) => {
                    attributes.items.retain(|key, _| !key.starts_with(INTERNAL_PREFIX));
                    return Ok(attributes);
                }
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        Err(first_error.unwrap_or_else(|| AttributeError::Unparseable {
            raw: raw.to_string(),
        }))
    }

    /// Public attributes in write order: `name` first, then lexicographic.
    fn public_sorted(&self) -> Vec<(&str, &str)> {
        let mut public: Vec<(&str, &str)> = self.iter().filter(|(k, _)| !is_private_key(k)).collect();
        public.sort_by(|(a, _), (b, _)| match (*a == "name", *b == "name") {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.cmp(b),
        });
        public
    }

    /// The segment to append to an info string, `None` when nothing public remains.
    pub fn to_segment(&self) -> Option<String> {
        let public = self.public_sorted();
        if public.is_empty() {
            return None;
        }
        let format = match self.format {
            AttributeFormat::Html if public.iter().any(|(_, v)| !html_safe(v)) => AttributeFormat::Json,
            format => format,
        };
        Some(match format {
            AttributeFormat::Json => write_json(&public),
            AttributeFormat::Html => write_html(&public),
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            format: AttributeFormat::default(),
        }
    }
}

/// Keys never written to an info string.
pub fn is_private_key(key: &str) -> bool {
    key.starts_with('_') || key.starts_with(INTERNAL_PREFIX) || key == "index"
}

trait AttributeParser: Sync {
    fn parse(&self, raw: &str) -> Result<Attributes, AttributeError>;
}

static PARSERS: &[&dyn AttributeParser] = &[&JsonParser, &HtmlParser];

struct JsonParser;

impl AttributeParser for JsonParser {
    fn parse(&self, raw: &str) -> Result<Attributes, AttributeError> {
        let object: serde_json::Map<String, Value> = serde_json::from_str(raw)?;
        let mut attributes = Attributes::new(AttributeFormat::Json);
        for (key, value) in object {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            attributes.insert(key, value);
        }
        Ok(attributes)
    }
}

struct HtmlParser;

impl AttributeParser for HtmlParser {
    fn parse(&self, raw: &str) -> Result<Attributes, AttributeError> {
        let inner = raw
            .trim()
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| AttributeError::Malformed(raw.to_string()))?;
        let mut attributes = Attributes::new(AttributeFormat::Html);
        for token in inner.split_whitespace() {
            // Bare flags carry no value and are dropped.
            if let Some((key, value)) = token.split_once('=')
                && !key.is_empty()
            {
                attributes.insert(key, value);
            }
        }
        Ok(attributes)
    }
}

fn html_safe(value: &str) -> bool {
    !value.chars().any(|c| c.is_whitespace() || c == '{' || c == '}')
}

fn write_html(public: &[(&str, &str)]) -> String {
    let mut out = String::from("{");
    for (key, value) in public {
        out.push(' ');
        out.push_str(key);
        out.push('=');
        out.push_str(value);
    }
    out.push_str(" }");
    out
}

fn write_json(public: &[(&str, &str)]) -> String {
    let mut object = serde_json::Map::new();
    for (key, value) in public {
        object.insert((*key).to_string(), restore_literal(value));
    }
    Value::Object(object).to_string()
}

/// Strings that spell a JSON bool, number, object or array go back out as that literal.
fn restore_literal(value: &str) -> Value {
    match serde_json::from_str::<Value>(value) {
        Ok(v @ (Value::Bool(_) | Value::Number(_) | Value::Object(_) | Value::Array(_))) => v,
        _ => Value::String(value.to_string()),
    }
}

/// Byte range of the attribute segment inside an info string, braces included.
///
/// `None` when there is no unescaped `{`, the braces never balance, or the
/// segment is an empty `{}`.
pub fn segment_range(info: &str) -> Option<(usize, usize)> {
    let bytes = info.as_bytes();
    let start = bytes
        .iter()
        .enumerate()
        .position(|(i, b)| *b == b'{' && (i == 0 || bytes[i - 1] != b'\\'))?;
    let end = balanced_end(info, start)?;
    let inner = &info[start + 1..end - 1];
    if inner.trim().is_empty() {
        return None;
    }
    Some((start, end))
}

/// Language of an info string: the first token before whitespace or `{`.
pub fn language(info: &str) -> &str {
    let info = info.trim_start();
    let end = info
        .find(|c: char| c.is_whitespace() || c == '{')
        .unwrap_or(info.len());
    &info[..end]
}

/// Extract and parse the attribute segment of `info`.
///
/// A missing segment yields empty attributes in `default_format`.
pub fn from_info(info: &str, default_format: AttributeFormat) -> Result<Attributes, AttributeError> {
    match segment_range(info) {
        Some((start, end)) => Attributes::parse(&info[start..end]),
        None => Ok(Attributes::new(default_format)),
    }
}

/// End (exclusive) of the brace group opening at `start`, honoring JSON
/// string literals and their escapes.
pub(crate) fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}
