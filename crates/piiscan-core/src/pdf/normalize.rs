//! Deterministic text normalization applied before matching.

use unicode_normalization::UnicodeNormalization;

/// Normalize extracted page text.
///
/// Invisible and non-whitespace control characters dropped, then NFKC,
/// horizontal whitespace runs collapsed to one space, runs containing a line
/// break collapsed to one `\n`, leading and trailing whitespace removed.
/// Finding offsets refer to this output, and
/// `normalize_text(normalize_text(s)) == normalize_text(s)`.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    let mut pending_newline = false;

    // Drop before NFKC so composition sees the final neighbours.
    for c in raw.chars().filter(|&c| !is_dropped(c)).nfkc() {
        if is_line_break(c) {
            pending_newline = true;
        } else if c.is_whitespace() {
            pending_space = true;
        } else {
            if !out.is_empty() {
                if pending_newline {
                    out.push('\n');
                } else if pending_space {
                    out.push(' ');
                }
            }
            pending_space = false;
            pending_newline = false;
            out.push(c);
        }
    }

    out
}

fn is_dropped(c: char) -> bool {
    is_invisible(c) || (c.is_control() && !c.is_whitespace())
}

fn is_line_break(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{000B}' | '\u{000C}' | '\u{0085}' | '\u{2028}' | '\u{2029}')
}

fn is_invisible(c: char) -> bool {
    matches!(c, '\u{00AD}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}')
}
