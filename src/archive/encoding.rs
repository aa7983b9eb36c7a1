//! Subtitle text encoding detection.
//!
//! Subtitle archives in the wild carry text in UTF-8 or one of the central
//! European legacy code pages, with no reliable declaration. Decoders are
//! tried in a fixed priority order, each with an explicit success
//! criterion, so the behavior is reproducible instead of depending on a
//! library's auto-detection:
//!
//! 1. UTF-8 (byte-order mark stripped when present),
//! 2. Windows-1250,
//! 3. ISO-8859-2.
//!
//! A legacy decode is accepted only when it maps every byte (no replacement
//! characters) and the result looks like text (no stray control
//! characters). When every decoder fails the caller gets
//! [`Error::EncodingDetection`] rather than corrupted text.

use encoding_rs::{Encoding, ISO_8859_2, WINDOWS_1250};
use tracing::debug;

use crate::error::{Error, Result};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Decode raw subtitle bytes to a UTF-8 string.
pub fn decode(bytes: &[u8]) -> Result<String> {
    let stripped = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    if let Ok(text) = std::str::from_utf8(stripped) {
        debug!(encoding = "utf-8", bytes = bytes.len(), "subtitle decoded");
        return Ok(text.to_string());
    }

    for encoding in [WINDOWS_1250, ISO_8859_2] {
        if let Some(text) = try_single_byte(encoding, stripped) {
            debug!(
                encoding = encoding.name(),
                bytes = bytes.len(),
                "subtitle decoded via fallback"
            );
            return Ok(text);
        }
    }

    Err(Error::EncodingDetection)
}

/// Attempt one single-byte decode; `None` when the result is implausible.
fn try_single_byte(encoding: &'static Encoding, bytes: &[u8]) -> Option<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return None;
    }
    if !plausible_text(&text) {
        return None;
    }
    Some(text.into_owned())
}

/// Subtitle text never legitimately contains replacement characters or
/// control characters beyond line breaks and tabs. ISO-8859-2 maps every
/// byte to *something*, so this check is what gives it a failure mode.
fn plausible_text(text: &str) -> bool {
    !text
        .chars()
        .any(|c| c == '\u{FFFD}' || (c.is_control() && c != '\n' && c != '\r' && c != '\t'))
}

/// Collapse `\r\n` and bare `\r` line endings to `\n`.
pub fn normalize_line_endings(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    out
}
