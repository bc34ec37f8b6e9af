//! Line-break detection and trailing-break accounting.
//!
//! Every byte-stable path in the engine works in terms of the document's
//! dominant line break. CRLF wins only when every LF in the source is part
//! of a CRLF pair.

pub const LF: &str = "\n";
pub const CRLF: &str = "\r\n";

/// Detect the line break used by `source`.
pub fn detect(source: &str) -> &'static str {
    let lf = source.bytes().filter(|b| *b == b'\n').count();
    let crlf = source.matches(CRLF).count();
    if lf > 0 && crlf == lf { CRLF } else { LF }
}

/// Trailing line breaks at the end of `source`: `(count, byte_len)`.
///
/// LF and CRLF are both counted, mixed runs included.
pub fn trailing(source: &str) -> (usize, usize) {
    let mut rest = source;
    let mut count = 0;
    loop {
        if let Some(stripped) = rest.strip_suffix(CRLF) {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_suffix(LF) {
            rest = stripped;
        } else {
            break;
        }
        count += 1;
    }
    (count, source.len() - rest.len())
}

/// Replace every trailing line break of `text` with exactly `count` of `line_break`.
pub fn set_trailing(text: &mut String, count: usize, line_break: &str) {
    let (_, len) = trailing(text);
    text.truncate(text.len() - len);
    for _ in 0..count {
        text.push_str(line_break);
    }
}

/// Rewrite bare LF line endings as `line_break`.
pub fn convert(text: &str, line_break: &str) -> String {
    if line_break == LF {
        return text.replace(CRLF, LF);
    }
    text.replace(CRLF, LF).replace(LF, CRLF)
}
