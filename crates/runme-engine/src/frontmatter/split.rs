//! Frontmatter/content splitter.
//!
//! Splits a document into four contiguous regions:
//!
//! ```text
//! [frontmatter raw][separator][content][trailing line breaks]
//! ```
//!
//! Concatenating the four reproduces the source exactly. The frontmatter
//! region keeps its delimiters plus anything before them (a BOM, leading
//! blank lines). An unclosed frontmatter is a soft error: the whole input
//! is then treated as content.

use serde::Serialize;
use thiserror::Error;

use crate::attributes::balanced_end;
use crate::linebreak;
use crate::span::Span;

const BOM: char = '\u{feff}';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("frontmatter opened with {delimiter} at byte {offset} is never closed")]
    Unclosed { delimiter: &'static str, offset: usize },
    #[error("JSON frontmatter starting at byte {offset} has unbalanced braces")]
    UnbalancedJson { offset: usize },
}

/// How a frontmatter block is fenced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Delimiter {
    /// `---` lines, YAML by convention.
    #[default]
    Dashes,
    /// `+++` lines, TOML by convention.
    Pluses,
    /// A bare `{ ... }` JSON object.
    Braces,
}

impl Delimiter {
    pub fn marker(self) -> &'static str {
        match self {
            Delimiter::Dashes => "---",
            Delimiter::Pluses => "+++",
            Delimiter::Braces => "{",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontmatterRegion {
    /// Whole region, delimiters included.
    pub raw: Span,
    /// Text between the delimiters; the object itself for JSON.
    pub inner: Span,
    pub delimiter: Delimiter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub frontmatter: Option<FrontmatterRegion>,
    pub separator: Span,
    pub content: Span,
    pub trailing: Span,
    pub trailing_line_breaks: usize,
    pub error: Option<SplitError>,
}

impl Split {
    pub fn raw_frontmatter<'s>(&self, source: &'s str) -> Option<&'s str> {
        self.frontmatter.and_then(|r| r.raw.slice(source))
    }

    pub fn content<'s>(&self, source: &'s str) -> &'s str {
        self.content.slice(source).unwrap_or_default()
    }
}

/// Split `source` into frontmatter, separator, content and trailing breaks.
pub fn split(source: &str) -> Split {
    let (trailing_line_breaks, trailing_len) = linebreak::trailing(source);
    let body_end = source.len() - trailing_len;
    let (frontmatter, error) = Scanner::new(source).run();

    let start = frontmatter.map_or(0, |r| r.raw.end);
    let mut pos = start;
    while pos < body_end {
        let rest = &source[pos..];
        if rest.starts_with(linebreak::CRLF) {
            pos += 2;
        } else if rest.starts_with(linebreak::LF) {
            pos += 1;
        } else {
            break;
        }
    }

    Split {
        frontmatter,
        separator: Span::new(start, pos),
        content: Span::new(pos, body_end.max(pos)),
        trailing: Span::new(body_end.max(pos), source.len()),
        trailing_line_breaks,
        error,
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    Start,
    Delimited { delimiter: Delimiter, open: usize, inner: usize },
    Json { open: usize },
}

struct Scanner<'a> {
    source: &'a str,
    pos: usize,
    state: State,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            state: State::Start,
        }
    }

    /// Line at `pos` without its break, and the offset of the next line.
    fn line_at(&self, pos: usize) -> (&'a str, usize) {
        let rest = &self.source[pos..];
        match rest.find('\n') {
            Some(nl) => (rest[..nl].trim_end_matches('\r'), pos + nl + 1),
            None => (rest, self.source.len()),
        }
    }

    fn run(mut self) -> (Option<FrontmatterRegion>, Option<SplitError>) {
        loop {
            match self.state {
                State::Start => {
                    if self.source.starts_with(BOM) {
                        self.pos = BOM.len_utf8();
                    }
                    let (line, next) = loop {
                        let (line, next) = self.line_at(self.pos);
                        if !line.trim().is_empty() || next >= self.source.len() {
                            break (line, next);
                        }
                        self.pos = next;
                    };
                    let marker = line.trim_end();
                    if marker == Delimiter::Dashes.marker() || marker == Delimiter::Pluses.marker() {
                        let delimiter = if marker == "---" { Delimiter::Dashes } else { Delimiter::Pluses };
                        self.state = State::Delimited {
                            delimiter,
                            open: self.pos,
                            inner: next,
                        };
                    } else if line.trim_start().starts_with('{') {
                        let open = self.pos + (line.len() - line.trim_start().len());
                        // Template syntax such as `{{` or `{%` is content.
                        if matches!(self.source[open + 1..].chars().next(), Some('{' | '%')) {
                            return (None, None);
                        }
                        self.state = State::Json { open };
                    } else {
                        return (None, None);
                    }
                }
                State::Delimited { delimiter, open, inner } => {
                    let mut pos = inner;
                    while pos < self.source.len() {
                        let (line, next) = self.line_at(pos);
                        if line.trim_end() == delimiter.marker() {
                            let region = FrontmatterRegion {
                                raw: Span::new(0, pos + line.len()),
                                inner: Span::new(inner, pos),
                                delimiter,
                            };
                            return (Some(region), None);
                        }
                        pos = next;
                    }
                    let error = SplitError::Unclosed {
                        delimiter: delimiter.marker(),
                        offset: open,
                    };
                    return (None, Some(error));
                }
                State::Json { open } => {
                    let Some(end) = balanced_end(self.source, open) else {
                        return (None, Some(SplitError::UnbalancedJson { offset: open }));
                    };
                    let (rest_of_line, _) = self.line_at(end);
                    if !rest_of_line.trim().is_empty() {
                        return (None, None);
                    }
                    let region = FrontmatterRegion {
                        raw: Span::new(0, end),
                        inner: Span::new(open, end),
                        delimiter: Delimiter::Braces,
                    };
                    return (Some(region), None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn parts(source: &str) -> (Option<&str>, &str, &str, &str) {
        let s = split(source);
        (
            s.raw_frontmatter(source),
            s.separator.slice(source).unwrap(),
            s.content(source),
            s.trailing.slice(source).unwrap(),
        )
    }

    #[test]
    fn test_yaml_frontmatter() {
        let source = "---\nshell: bash\n---\n\n# Title\n";
        let s = split(source);
        let region = s.frontmatter.unwrap();

        assert_eq!(region.raw.slice(source), Some("---\nshell: bash\n---"));
        assert_eq!(region.inner.slice(source), Some("shell: bash\n"));
        assert_eq!(region.delimiter, Delimiter::Dashes);
        assert_eq!(parts(source), (Some("---\nshell: bash\n---"), "\n\n", "# Title", "\n"));
        assert_eq!(s.trailing_line_breaks, 1);
        assert_eq!(s.error, None);
    }

    #[test]
    fn test_toml_frontmatter() {
        let source = "+++\ntitle = \"x\"\n+++\nbody";
        let s = split(source);

        assert_eq!(s.frontmatter.unwrap().delimiter, Delimiter::Pluses);
        assert_eq!(parts(source), (Some("+++\ntitle = \"x\"\n+++"), "\n", "body", ""));
    }

    #[test]
    fn test_json_frontmatter() {
        let source = "{\"shell\": \"bash\"}\n\n# T";
        let s = split(source);
        let region = s.frontmatter.unwrap();

        assert_eq!(region.delimiter, Delimiter::Braces);
        assert_eq!(region.inner.slice(source), Some("{\"shell\": \"bash\"}"));
        assert_eq!(s.content(source), "# T");
    }

    #[rstest]
    #[case("{{ template }}\n")]
    #[case("{% raw %}\n")]
    #[case("{\"a\": 1} trailing text\n")]
    #[case("# Just content\n")]
    fn test_no_frontmatter(#[case] source: &str) {
        let s = split(source);
        assert_eq!(s.frontmatter, None);
        assert_eq!(s.error, None);
    }

    #[test]
    fn test_unclosed_frontmatter_is_soft_error() {
        let source = "---\nunclosed\n";
        let s = split(source);

        assert_eq!(s.frontmatter, None);
        assert_eq!(
            s.error,
            Some(SplitError::Unclosed {
                delimiter: "---",
                offset: 0
            })
        );
        assert_eq!(s.content(source), "---\nunclosed");
    }

    #[test]
    fn test_unbalanced_json_is_soft_error() {
        let s = split("{\"a\": 1\n\nbody\n");
        assert_eq!(s.error, Some(SplitError::UnbalancedJson { offset: 0 }));
    }

    #[test]
    fn test_frontmatter_only_has_empty_separator() {
        let source = "---\na: 1\n---\n";
        assert_eq!(parts(source), (Some("---\na: 1\n---"), "", "", "\n"));
    }

    #[test]
    fn test_crlf_frontmatter() {
        let source = "---\r\na: 1\r\n---\r\n\r\nbody\r\n";
        assert_eq!(parts(source), (Some("---\r\na: 1\r\n---"), "\r\n\r\n", "body", "\r\n"));
    }

    #[test]
    fn test_bom_and_leading_blank_lines_belong_to_frontmatter() {
        let source = "\u{feff}\n---\na: 1\n---\nx";
        let s = split(source);
        let region = s.frontmatter.unwrap();

        assert_eq!(region.raw.start, 0);
        assert_eq!(region.inner.slice(source), Some("a: 1\n"));
        assert_eq!(s.content(source), "x");
    }

    #[rstest]
    #[case("")]
    #[case("\n\n")]
    #[case("# T")]
    #[case("\n# T\n\n")]
    #[case("---\na: 1\n---")]
    #[case("---\na: 1\n---\n\n\nbody\n\n")]
    #[case("---\r\na: 1\r\n---\r\nbody")]
    #[case("---\nnever closed\n")]
    #[case("{\"a\":{\"b\":1}}\nbody")]
    #[case("+++\n+++\n")]
    fn test_regions_concatenate_to_source(#[case] source: &str) {
        let s = split(source);
        let raw = s.raw_frontmatter(source).unwrap_or_default();
        let rebuilt = format!(
            "{raw}{}{}{}",
            s.separator.slice(source).unwrap(),
            s.content(source),
            s.trailing.slice(source).unwrap()
        );
        assert_eq!(rebuilt, source);
    }
}
