//! Line-oriented output buffer with container prefixes.
//!
//! Blocks request line breaks lazily; breaks are only materialized when the
//! next content arrives, so a rendered subtree never ends with a dangling
//! newline. Every materialized line starts with the active prefix stack,
//! e.g. `> ` for blockquotes or the marker of a list item.

#[derive(Debug)]
struct Prefix {
    first: String,
    rest: String,
    first_used: bool,
}

#[derive(Debug)]
pub(crate) struct Writer {
    out: String,
    line_break: &'static str,
    prefixes: Vec<Prefix>,
    pending_breaks: usize,
    at_line_start: bool,
}

impl Writer {
    pub(crate) fn new(line_break: &'static str) -> Self {
        Self {
            out: String::new(),
            line_break,
            prefixes: Vec::new(),
            pending_breaks: 0,
            at_line_start: true,
        }
    }

    pub(crate) fn push_prefix(&mut self, first: impl Into<String>, rest: impl Into<String>) {
        self.prefixes.push(Prefix {
            first: first.into(),
            rest: rest.into(),
            first_used: false,
        });
    }

    pub(crate) fn pop_prefix(&mut self) {
        self.prefixes.pop();
    }

    /// At least `count` line breaks before the next content.
    pub(crate) fn ensure_breaks(&mut self, count: usize) {
        self.pending_breaks = self.pending_breaks.max(count);
    }

    pub(crate) fn newline(&mut self) {
        self.ensure_breaks(1);
    }

    /// One more empty line before the next content.
    pub(crate) fn blank_line(&mut self) {
        self.pending_breaks = self.pending_breaks.max(1) + 1;
    }

    /// Write text on the current line. `text` must not contain line breaks.
    pub(crate) fn write(&mut self, text: &str) {
        self.flush_breaks();
        if self.at_line_start {
            let prefix = self.line_prefix();
            self.out.push_str(&prefix);
            self.at_line_start = false;
        }
        self.out.push_str(text);
    }

    /// Drop trailing spaces left by a prefix with no content after it.
    pub(crate) fn trim_trailing_spaces(&mut self) {
        let trimmed = self.out.trim_end_matches(' ').len();
        self.out.truncate(trimmed);
    }

    pub(crate) fn has_prefix(&self) -> bool {
        !self.prefixes.is_empty()
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }

    fn flush_breaks(&mut self) {
        let breaks = std::mem::take(&mut self.pending_breaks);
        if self.out.is_empty() {
            return;
        }
        for i in 0..breaks {
            if i > 0 {
                let blank = self.blank_prefix();
                self.out.push_str(&blank);
            }
            self.out.push_str(self.line_break);
            self.at_line_start = true;
        }
    }

    fn line_prefix(&mut self) -> String {
        let mut prefix = String::new();
        for entry in &mut self.prefixes {
            if entry.first_used {
                prefix.push_str(&entry.rest);
            } else {
                prefix.push_str(&entry.first);
                entry.first_used = true;
            }
        }
        prefix
    }

    /// Prefixes pushed but not yet written belong to content after the blank.
    fn blank_prefix(&self) -> String {
        let prefix: String = self
            .prefixes
            .iter()
            .filter(|p| p.first_used)
            .map(|p| p.rest.as_str())
            .collect();
        prefix.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linebreak::{CRLF, LF};

    #[test]
    fn test_breaks_are_lazy() {
        let mut w = Writer::new(LF);
        w.write("a");
        w.ensure_breaks(2);
        w.write("b");
        w.newline();

        assert_eq!(w.finish(), "a\n\nb");
    }

    #[test]
    fn test_prefixes_apply_to_each_line() {
        let mut w = Writer::new(LF);
        w.push_prefix("> ", "> ");
        w.write("one");
        w.ensure_breaks(2);
        w.write("two");
        w.pop_prefix();

        assert_eq!(w.finish(), "> one\n>\n> two");
    }

    #[test]
    fn test_list_prefix_uses_marker_once() {
        let mut w = Writer::new(CRLF);
        w.push_prefix("- ", "  ");
        w.write("first");
        w.newline();
        w.write("second");

        assert_eq!(w.finish(), "- first\r\n  second");
    }

    #[test]
    fn test_blank_lines_accumulate() {
        let mut w = Writer::new(LF);
        w.write("a");
        w.newline();
        w.blank_line();
        w.newline();
        w.write("b");

        assert_eq!(w.finish(), "a\n\nb");
    }

    #[test]
    fn test_blank_line_before_nested_prefix() {
        let mut w = Writer::new(LF);
        w.push_prefix("> ", "> ");
        w.write("a");
        w.ensure_breaks(2);
        w.push_prefix("> ", "> ");
        w.write("b");

        assert_eq!(w.finish(), "> a\n>\n> > b");
    }
}
