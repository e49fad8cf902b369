//! # Line Decoder Module
//!
//! Turns the raw serial byte stream into parsed JSON values, one line at a
//! time.
//!
//! This module handles:
//! - Accumulating read chunks into complete newline-terminated lines
//! - Stripping line terminators and decoding UTF-8
//! - Parsing each non-empty line as JSON
//! - Isolating decode/parse failures per line (a bad line never affects
//!   its neighbours or the connection)

use bytes::{Buf, BytesMut};

use crate::error::{Result, ThermolinkError};

/// Longest line the accumulator will buffer before giving up on it
///
/// The instrument's JSON lines are a few hundred bytes at most; anything
/// bigger means the link is spewing newline-free noise, and buffering it
/// indefinitely would grow memory without bound.
pub const MAX_LINE_BYTES: usize = 8192;

/// Accumulates raw byte chunks into complete lines
///
/// Reads from a serial port arrive in arbitrary chunks that rarely align
/// with line boundaries. Push each chunk in with [`push`](Self::push), then
/// drain complete lines with [`next_line`](Self::next_line).
#[derive(Debug, Default)]
pub struct LineAccumulator {
    buf: BytesMut,
}

impl LineAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw chunk from the serial port
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete line, if one is buffered
    ///
    /// Returns the bytes up to (and excluding) the next `\n`. If the
    /// buffered fragment exceeds [`MAX_LINE_BYTES`] without a terminator,
    /// the fragment is discarded and returned as a `Decode` error so the
    /// caller can report it and move on.
    ///
    /// # Errors
    ///
    /// Returns `ThermolinkError::Decode` with the discarded bytes when the
    /// line length cap is exceeded.
    pub fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(pos).to_vec();
            self.buf.advance(1); // Consume the terminator
            return Ok(Some(line));
        }

        if self.buf.len() > MAX_LINE_BYTES {
            let discarded = self.buf.split().to_vec();
            return Err(ThermolinkError::Decode(discarded));
        }

        Ok(None)
    }

    /// Number of bytes buffered without a terminator yet
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Decode one raw line as UTF-8 text
///
/// Trailing `\r` and `\n` are stripped first. Lines that are empty after
/// stripping yield `Ok(None)` and are silently dropped by the caller.
///
/// # Errors
///
/// Returns `ThermolinkError::Decode` carrying the raw bytes if the line is
/// not valid UTF-8.
pub fn decode_line(raw: &[u8]) -> Result<Option<String>> {
    let stripped = strip_terminators(raw);
    if stripped.is_empty() {
        return Ok(None);
    }

    match std::str::from_utf8(stripped) {
        Ok(text) => Ok(Some(text.to_string())),
        Err(_) => Err(ThermolinkError::Decode(raw.to_vec())),
    }
}

/// Parse a decoded line as a JSON value
///
/// # Errors
///
/// Returns `ThermolinkError::Parse` carrying the raw text if the line is
/// not valid JSON. The instrument legitimately interleaves human-readable
/// diagnostic text with its JSON stream, so callers surface this text to
/// the operator rather than treating it as corruption.
pub fn parse_json(text: &str) -> Result<serde_json::Value> {
    serde_json::from_str(text).map_err(|_| ThermolinkError::Parse(text.to_string()))
}

fn strip_terminators(raw: &[u8]) -> &[u8] {
    let mut end = raw.len();
    while end > 0 && (raw[end - 1] == b'\n' || raw[end - 1] == b'\r') {
        end -= 1;
    }
    &raw[..end]
}
