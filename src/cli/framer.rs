//! Newline framing for the stream-json pipe.
//!
//! Claude Code writes one JSON record per line, but the pipe delivers
//! arbitrary chunks with no framing guarantees: a read may end in the
//! middle of a line or in the middle of a UTF-8 sequence. The framer
//! carries the incomplete tail across feeds and recovers it at EOF.

/// Splits a byte stream into newline-delimited records.
#[derive(Debug, Default)]
pub struct LineFramer {
    carry: Vec<u8>,
}

impl LineFramer {
    /// Create a new framer with an empty carry-over buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every line completed by it.
    ///
    /// Content after the last newline is retained for the next call.
    /// Lines are decoded lossily and stripped of a trailing `\r`.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.carry.iter().position(|&b| b == b'\n') {
            let rest = self.carry.split_off(pos + 1);
            self.carry.pop(); // the newline itself
            let line = std::mem::replace(&mut self.carry, rest);
            lines.push(decode(&line));
        }
        lines
    }

    /// Return the carry-over as one final implicit line, if non-empty.
    ///
    /// Call when the source stream ends; clears the buffer.
    pub fn flush(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.carry);
        Some(decode(&line))
    }

    /// Whether any incomplete fragment is currently held back.
    #[must_use]
    pub fn has_carry(&self) -> bool {
        !self.carry.is_empty()
    }
}

fn decode(bytes: &[u8]) -> String {
    let mut line = String::from_utf8_lossy(bytes).into_owned();
    if line.ends_with('\r') {
        line.pop();
    }
    line
}
