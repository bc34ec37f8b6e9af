use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    ATTRIBUTES_FORMAT_KEY, Cell, CellKind, CellOutput, FENCE_KEY, FINAL_LINE_BREAKS_KEY, FRONTMATTER_KEY,
    INFO_STRING_KEY, INTERNAL_PREFIX, LINE_BREAK_KEY, LINE_BREAKS_BEFORE_KEY, Notebook, to_cells,
};
use crate::attributes::{self, AttributeFormat, Attributes};
use crate::document::{Document, DocumentError, ParseOptions};
use crate::error::ErrorKind;
use crate::frontmatter::{DocumentMeta, Frontmatter, FrontmatterError, FrontmatterFormat, SessionMeta};
use crate::linebreak::{self, CRLF, LF};
use crate::render::longest_run;

static ANSI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
        .expect("ANSI pattern is valid")
});

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Frontmatter(#[from] FrontmatterError),
    #[error("invalid notebook metadata {key}={value:?}")]
    InvalidMetadata { key: String, value: String },
}

impl SerializeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SerializeError::Document(err) => err.kind(),
            SerializeError::Frontmatter(err) => err.kind(),
            SerializeError::InvalidMetadata { .. } => ErrorKind::Serialize,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputOptions {
    pub enabled: bool,
    /// Prefix text outputs with a `# Ran on ...` line.
    #[serde(default)]
    pub summary: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    pub id: String,
    /// RFC 3339 timestamp; the current time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializeOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<OutputOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionOptions>,
}

/// Parse markdown bytes into a notebook.
pub fn deserialize(source: &[u8], options: ParseOptions) -> Result<Notebook, SerializeError> {
    let doc = Document::from_bytes(source, options)?;
    let cells = to_cells(&doc)?;

    let mut metadata = BTreeMap::new();
    if let Some(raw) = doc.frontmatter_raw() {
        metadata.insert(FRONTMATTER_KEY.to_string(), raw.to_string());
    }
    metadata.insert(
        FINAL_LINE_BREAKS_KEY.to_string(),
        doc.trailing_line_breaks().to_string(),
    );
    if doc.line_break() == CRLF {
        metadata.insert(LINE_BREAK_KEY.to_string(), "crlf".to_string());
    }

    let mut frontmatter = doc.frontmatter().cloned();
    if doc.lifecycle().document_identity() {
        match doc.frontmatter_error() {
            None => {
                frontmatter
                    .get_or_insert_with(|| Frontmatter::new(FrontmatterFormat::Yaml))
                    .ensure_id(doc.generator());
            }
            Some(err) => log::debug!("not assigning a document id: {err}"),
        }
    }

    Ok(Notebook {
        cells,
        metadata,
        frontmatter,
    })
}

/// Write a notebook back to markdown.
///
/// The frontmatter is copied verbatim unless its `runme` section changed or
/// a session is recorded; then only that section is rewritten.
pub fn serialize(notebook: &Notebook, options: &SerializeOptions) -> Result<String, SerializeError> {
    let line_break = notebook_line_break(notebook);
    let final_line_breaks = match notebook.metadata.get(FINAL_LINE_BREAKS_KEY) {
        Some(value) => value.trim().parse::<usize>().map_err(|_| SerializeError::InvalidMetadata {
            key: FINAL_LINE_BREAKS_KEY.to_string(),
            value: value.clone(),
        })?,
        None => 1,
    };

    let mut out = frontmatter_text(notebook, options, line_break)?.unwrap_or_default();
    let body = serialize_cells(&notebook.cells, options.outputs.as_ref(), line_break);
    if !body.is_empty() {
        let leading = notebook.cells.first().and_then(line_breaks_before);
        let breaks = if out.is_empty() {
            leading.unwrap_or(0)
        } else {
            leading.filter(|n| *n > 0).unwrap_or(2)
        };
        out.push_str(&line_break.repeat(breaks));
    }
    out.push_str(&body);
    if !out.is_empty() {
        linebreak::set_trailing(&mut out, final_line_breaks, line_break);
    }
    Ok(out)
}

fn notebook_line_break(notebook: &Notebook) -> &'static str {
    match notebook.metadata.get(LINE_BREAK_KEY) {
        Some(value) if value.eq_ignore_ascii_case("crlf") => CRLF,
        Some(_) => LF,
        None => {
            let mut sample = notebook.frontmatter_raw().unwrap_or_default().to_string();
            for cell in &notebook.cells {
                sample.push_str(&cell.value);
            }
            linebreak::detect(&sample)
        }
    }
}

fn frontmatter_text(
    notebook: &Notebook,
    options: &SerializeOptions,
    line_break: &str,
) -> Result<Option<String>, SerializeError> {
    let raw = notebook.frontmatter_raw().filter(|raw| !raw.trim().is_empty());
    let base = match raw.map(Frontmatter::from_raw).transpose() {
        Ok(base) => base.flatten(),
        Err(err) => {
            log::warn!("keeping unparseable frontmatter as written: {err}");
            return Ok(raw.map(str::to_string));
        }
    };

    let mut runme = notebook.frontmatter.as_ref().and_then(|f| f.runme.clone());
    if let Some(session) = &options.session {
        let meta = runme.get_or_insert_with(Default::default);
        meta.session = Some(SessionMeta {
            id: Some(session.id.clone()),
            updated: Some(
                session
                    .updated
                    .clone()
                    .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
            ),
        });
        if let Some(path) = &session.relative_path {
            meta.document = Some(DocumentMeta {
                relative_path: Some(path.clone()),
            });
        }
    }
    let runme = runme.filter(|r| !r.is_empty());

    let current = base.as_ref().and_then(|b| b.runme.clone()).filter(|r| !r.is_empty());
    if runme == current {
        return Ok(raw.map(str::to_string));
    }

    let mut frontmatter = base.unwrap_or_else(|| Frontmatter::new(FrontmatterFormat::Yaml));
    frontmatter.runme = runme;
    Ok(Some(frontmatter.marshal(line_break)?))
}

/// Write cells as markdown and a single line break after the last.
///
/// Cells are separated by one blank line unless a cell records the line
/// breaks it was read with.
pub fn serialize_cells(cells: &[Cell], outputs: Option<&OutputOptions>, line_break: &str) -> String {
    let outputs = outputs.filter(|o| o.enabled);
    let mut out = String::new();
    for cell in cells {
        if !out.is_empty() {
            let breaks = line_breaks_before(cell).filter(|n| *n > 0).unwrap_or(2);
            linebreak::set_trailing(&mut out, breaks, line_break);
        }
        match cell.kind {
            CellKind::Markup => out.push_str(&cell.value),
            CellKind::Code => write_code_cell(&mut out, cell, outputs, line_break),
        }
    }
    if !out.is_empty() {
        linebreak::set_trailing(&mut out, 1, line_break);
    }
    out
}

fn line_breaks_before(cell: &Cell) -> Option<usize> {
    cell.metadata.get(LINE_BREAKS_BEFORE_KEY)?.trim().parse().ok()
}

/// Attributes written after the language of a code cell.
fn written_attributes(cell: &Cell) -> Attributes {
    let mut attributes: Attributes = cell
        .metadata
        .iter()
        .filter(|(key, _)| !key.starts_with(INTERNAL_PREFIX))
        .collect();
    if cell
        .metadata
        .get(ATTRIBUTES_FORMAT_KEY)
        .is_some_and(|f| f == AttributeFormat::Json.as_str())
    {
        attributes.set_format(AttributeFormat::Json);
    }
    attributes
}

/// Info string of a code cell.
///
/// The recorded source text is reused while it still names the cell's
/// language and attributes; otherwise both are written out canonically.
pub(super) fn info_string(cell: &Cell) -> String {
    let attributes = written_attributes(cell);
    if let Some(raw) = cell.metadata.get(INFO_STRING_KEY)
        && describes(raw, &cell.language_id, &attributes)
    {
        return raw.clone();
    }
    let mut info = cell.language_id.clone();
    if let Some(segment) = attributes.to_segment() {
        if !info.is_empty() {
            info.push(' ');
        }
        info.push_str(&segment);
    }
    info
}

fn describes(raw: &str, language: &str, current: &Attributes) -> bool {
    if attributes::language(raw) != language {
        return false;
    }
    let written = attributes::from_info(raw, current.format()).unwrap_or_default();
    let written: BTreeMap<&str, &str> = written.iter().collect();
    let current: BTreeMap<&str, &str> = current.iter().collect();
    written == current
}

/// Opening and closing fence of a code cell, long enough for its value.
///
/// Backticks unless the cell records a tilde fence.
pub(super) fn fence(cell: &Cell) -> String {
    let recorded = cell
        .metadata
        .get(FENCE_KEY)
        .and_then(|f| f.chars().next().filter(|c| matches!(c, '`' | '~')).map(|c| (c, f.chars().count())));
    let (fence_char, len) = recorded.unwrap_or(('`', 3));
    let needed = longest_run(&cell.value, fence_char) + 1;
    fence_char.to_string().repeat(len.max(needed).max(3))
}

fn write_code_cell(out: &mut String, cell: &Cell, outputs: Option<&OutputOptions>, line_break: &str) {
    let value = cell.value.as_str();
    let fence = fence(cell);

    out.push_str(&fence);
    out.push_str(&info_string(cell));
    out.push_str(line_break);
    if !value.is_empty() {
        out.push_str(value);
        out.push_str(line_break);
    }
    if let Some(options) = outputs {
        write_text_outputs(out, cell, options, line_break);
    }
    out.push_str(&fence);
    if outputs.is_some() {
        write_image_outputs(out, cell, line_break);
    }
}

fn write_text_outputs(out: &mut String, cell: &Cell, options: &OutputOptions, line_break: &str) {
    for output in &cell.outputs {
        for item in output.items.iter().filter(|item| !item.is_image()) {
            if options.summary
                && let Some(line) = summary_line(cell, output)
            {
                out.push_str(&line);
                out.push_str(line_break);
            }
            let text = strip_ansi(&String::from_utf8_lossy(&item.data));
            let text = text.trim_end_matches(['\r', '\n']);
            if !text.is_empty() {
                out.push_str(&linebreak::convert(text, line_break));
                out.push_str(line_break);
            }
        }
    }
}

fn write_image_outputs(out: &mut String, cell: &Cell, line_break: &str) {
    let alt = cell.value.replace(['\r', '\n'], " ");
    for item in cell.outputs.iter().flat_map(|o| &o.items).filter(|i| i.is_image()) {
        out.push_str(line_break);
        out.push_str(line_break);
        out.push_str(&format!(
            "![{}](data:{};base64,{})",
            alt.trim(),
            item.mime,
            STANDARD.encode(&item.data)
        ));
    }
}

/// `# Ran on <start> for <duration>[ exited with <code>]`, when timing is known.
fn summary_line(cell: &Cell, output: &CellOutput) -> Option<String> {
    let timing = cell.execution_summary.as_ref()?.timing?;
    let start = DateTime::<Utc>::from_timestamp_millis(timing.start_time)?;
    let mut line = format!(
        "# Ran on {} for {}",
        start.to_rfc3339_opts(SecondsFormat::Secs, true).replacen('T', " ", 1),
        format_duration(timing.end_time - timing.start_time),
    );
    if let Some(code) = output.process_info.as_ref().and_then(|p| p.exit_code) {
        line.push_str(&format!(" exited with {code}"));
    }
    Some(line)
}

/// Human duration in the `1h2m3.5s` / `250ms` style.
pub fn format_duration(millis: i64) -> String {
    if millis < 0 {
        return format!("-{}", format_duration(millis.saturating_neg()));
    }
    if millis == 0 {
        return "0s".to_string();
    }
    if millis < 1000 {
        return format!("{millis}ms");
    }
    let hours = millis / 3_600_000;
    let minutes = millis % 3_600_000 / 60_000;
    let seconds = format!("{:.3}", (millis % 60_000) as f64 / 1000.0);
    let seconds = seconds.trim_end_matches('0').trim_end_matches('.');
    match (hours, minutes) {
        (0, 0) => format!("{seconds}s"),
        (0, m) => format!("{m}m{seconds}s"),
        (h, m) => format!("{h}h{m}m{seconds}s"),
    }
}

/// Remove terminal escape sequences from command output.
pub fn strip_ansi(text: &str) -> String {
    ANSI.replace_all(text, "").into_owned()
}
