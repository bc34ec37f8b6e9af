//! # Frontmatter
//!
//! Typed view over a document's YAML, JSON or TOML frontmatter, plus the
//! `runme` section that carries document identity and session data.
//!
//! Only the `runme` section is ever rewritten. Marshaling re-reads the raw
//! text into an order-preserving map, overlays or removes `runme`, and
//! writes the map back out, so every user key survives in place.

pub mod split;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::identity::{IdGenerator, is_valid_id};
use crate::linebreak;

pub use split::{Delimiter, FrontmatterRegion, Split, SplitError, split};

/// Version stamped into `runme.version` when the engine assigns an id.
pub const BASE_VERSION: &str = "v3";

const RUNME_KEY: &str = "runme";

#[derive(Debug, Error)]
pub enum FrontmatterError {
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error("invalid YAML frontmatter: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid JSON frontmatter: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML frontmatter: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("could not write TOML frontmatter: {0}")]
    TomlWrite(#[from] toml::ser::Error),
}

impl FrontmatterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrontmatterError::Split(_) => ErrorKind::FrontmatterSplit,
            FrontmatterError::TomlWrite(_) => ErrorKind::FrontmatterMarshal,
            _ => ErrorKind::FrontmatterParse,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontmatterFormat {
    #[default]
    Yaml,
    Json,
    Toml,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

/// The `runme` section of a frontmatter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunmeMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionMeta>,
}

impl RunmeMeta {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.version.is_none() && self.document.is_none() && self.session.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frontmatter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runme: Option<RunmeMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "string_or_number")]
    pub terminal_rows: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_prompts: Option<bool>,
    #[serde(skip)]
    format: FrontmatterFormat,
    #[serde(skip)]
    delimiter: Delimiter,
    /// Text between the delimiters as it was read.
    #[serde(skip)]
    raw: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|scalar| match scalar {
        Scalar::Text(s) => s,
        Scalar::Int(n) => n.to_string(),
        Scalar::Float(n) => n.to_string(),
    }))
}

impl Frontmatter {
    /// An empty frontmatter that will be written with `---` fences.
    pub fn new(format: FrontmatterFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    /// Parse the text between delimiters.
    ///
    /// Content that starts with `{` is tried as JSON first; everything else
    /// goes YAML, JSON, TOML. The first failure is reported if all fail.
    pub fn parse(inner: &str, delimiter: Delimiter) -> Result<Self, FrontmatterError> {
        let trimmed = inner.trim();
        if trimmed.is_empty() {
            let format = match delimiter {
                Delimiter::Pluses => FrontmatterFormat::Toml,
                Delimiter::Braces => FrontmatterFormat::Json,
                Delimiter::Dashes => FrontmatterFormat::Yaml,
            };
            return Ok(Self {
                format,
                delimiter,
                raw: inner.to_string(),
                ..Self::default()
            });
        }

        let order: [FrontmatterFormat; 3] = if trimmed.starts_with('{') {
            [FrontmatterFormat::Json, FrontmatterFormat::Yaml, FrontmatterFormat::Toml]
        } else {
            [FrontmatterFormat::Yaml, FrontmatterFormat::Json, FrontmatterFormat::Toml]
        };

        let mut first_error = None;
        for format in order {
            let parsed: Result<Frontmatter, FrontmatterError> = match format {
                FrontmatterFormat::Yaml => serde_yaml::from_str(inner).map_err(Into::into),
                FrontmatterFormat::Json => serde_json::from_str(inner).map_err(Into::into),
                FrontmatterFormat::Toml => toml::from_str(inner).map_err(Into::into),
            };
            match parsed {
                Ok(mut frontmatter) => {
                    frontmatter.format = format;
                    frontmatter.delimiter = delimiter;
                    frontmatter.raw = inner.to_string();
                    return Ok(frontmatter);
                }
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(Self::default()),
        }
    }

    /// Parse a whole frontmatter block, delimiters included.
    pub fn from_raw(raw: &str) -> Result<Option<Self>, FrontmatterError> {
        let split = split(raw);
        if let Some(err) = split.error {
            return Err(err.into());
        }
        match split.frontmatter {
            Some(region) => {
                let inner = region.inner.slice(raw).unwrap_or_default();
                Self::parse(inner, region.delimiter).map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn format(&self) -> FrontmatterFormat {
        self.format
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn id(&self) -> Option<&str> {
        self.runme.as_ref().and_then(|r| r.id.as_deref())
    }

    /// Make sure `runme.id` holds a valid ULID. Returns true if anything changed.
    pub fn ensure_id(&mut self, generator: &dyn IdGenerator) -> bool {
        let runme = self.runme.get_or_insert_with(RunmeMeta::default);
        if !runme.id.as_deref().is_some_and(is_valid_id) {
            runme.id = Some(generator.generate());
            runme.version = Some(BASE_VERSION.to_string());
            return true;
        }
        if runme.version.is_none() {
            runme.version = Some(BASE_VERSION.to_string());
            return true;
        }
        false
    }

    /// Write the frontmatter back out, delimiters included.
    pub fn marshal(&self, line_break: &str) -> Result<String, FrontmatterError> {
        let runme = self.runme.as_ref().filter(|r| !r.is_empty());
        let empty = self.raw.trim().is_empty();

        let body = match self.format {
            FrontmatterFormat::Yaml => {
                let mut map: serde_yaml::Mapping = if empty {
                    serde_yaml::Mapping::new()
                } else {
                    serde_yaml::from_str(&self.raw)?
                };
                let key = serde_yaml::Value::String(RUNME_KEY.to_string());
                match runme {
                    Some(runme) => {
                        map.insert(key, serde_yaml::to_value(runme)?);
                    }
                    None => {
                        map.remove(&key);
                    }
                }
                if map.is_empty() {
                    String::new()
                } else {
                    serde_yaml::to_string(&map)?
                }
            }
            FrontmatterFormat::Json => {
                let mut map: serde_json::Map<String, serde_json::Value> = if empty {
                    serde_json::Map::new()
                } else {
                    serde_json::from_str(&self.raw)?
                };
                match runme {
                    Some(runme) => {
                        map.insert(RUNME_KEY.to_string(), serde_json::to_value(runme)?);
                    }
                    None => {
                        map.remove(RUNME_KEY);
                    }
                }
                format!("{}\n", serde_json::to_string_pretty(&map)?)
            }
            FrontmatterFormat::Toml => {
                let mut table: toml::Table = if empty {
                    toml::Table::new()
                } else {
                    toml::from_str(&self.raw)?
                };
                match runme {
                    Some(runme) => {
                        table.insert(RUNME_KEY.to_string(), toml::Value::try_from(runme)?);
                    }
                    None => {
                        table.remove(RUNME_KEY);
                    }
                }
                toml::to_string(&table)?
            }
        };

        let text = match self.delimiter {
            Delimiter::Braces => body.trim_end().to_string(),
            delimiter => format!("{marker}\n{body}{marker}", marker = delimiter.marker()),
        };
        Ok(linebreak::convert(&text, line_break))
    }
}
