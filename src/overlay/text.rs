//! Sanitising untrusted overlay text for ffmpeg `drawtext`
//!
//! The output of [`sanitize`] is meant to sit inside a single-quoted
//! `text='...'` option value. Wrapping happens first, on the raw text, so the
//! line width is measured in visible characters rather than escape sequences.

use std::fmt;

/// Text that has been wrapped and escaped for a quoted drawtext value.
///
/// Only [`sanitize`] constructs this, so anything holding a `SanitizedText`
/// has gone through escaping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedText(String);

impl SanitizedText {
    /// Escaped text, ready to be embedded between single quotes.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SanitizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wrap and escape `raw` for use as a drawtext `text` value.
///
/// `max_line_chars == 0` disables wrapping.
#[must_use]
pub fn sanitize(raw: &str, max_line_chars: usize) -> SanitizedText {
    let wrapped = wrap(raw, max_line_chars).join("\n");
    SanitizedText(escape(&wrapped))
}

/// Greedy word wrap.
///
/// Explicit line breaks in `raw` are kept as hard breaks and each paragraph
/// is wrapped on its own. Words longer than `max_line_chars` are never split;
/// they get a line to themselves. Widths are counted in `char`s.
#[must_use]
pub fn wrap(raw: &str, max_line_chars: usize) -> Vec<String> {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines = Vec::new();

    for paragraph in normalized.split('\n') {
        let mut current = String::new();
        let mut current_len = 0usize;

        for word in paragraph.split_whitespace() {
            let word_len = word.chars().count();

            if current.is_empty() {
                current.push_str(word);
                current_len = word_len;
            } else if max_line_chars == 0 || current_len + 1 + word_len <= max_line_chars {
                current.push(' ');
                current.push_str(word);
                current_len += 1 + word_len;
            } else {
                lines.push(std::mem::take(&mut current));
                current.push_str(word);
                current_len = word_len;
            }
        }

        lines.push(current);
    }

    // Trailing newlines would render as empty rows under the text.
    while lines.len() > 1 && lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }

    lines
}

/// Escape a value for a single-quoted drawtext option.
///
/// Backslash, colon, single quote and square brackets get a leading
/// backslash; a line break becomes the two characters `\n`. Every input
/// character is mapped exactly once, so no escape can be re-escaped by a
/// later rule. Other control characters are dropped.
#[must_use]
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + value.len() / 4);

    for ch in value.chars() {
        match ch {
            '\\' | ':' | '\'' | '[' | ']' => {
                out.push('\\');
                out.push(ch);
            }
            '\n' => out.push_str("\\n"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    out
}
