use std::borrow::Cow;

use crate::constants::limit_constants::MAX_LINE_BYTES;

/// One item produced by the line assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssembledLine {
    Line(String),
    /// A line longer than the limit was dropped. Reported where its terminator arrived.
    TooLong { discarded_bytes: usize },
}

/// Streaming line splitter that accumulates serial bytes and yields complete lines.
///
/// Lines are split on `\n` and a single trailing `\r` is removed, so both `\n` and `\r\n`
/// terminated streams produce the same lines. Splitting happens on raw bytes before UTF-8
/// decoding, which means a multi-byte character cut in half by a chunk boundary is put back
/// together before it is decoded.
///
/// A line that grows past `max_line_bytes` is not buffered any further; its bytes are
/// skipped up to the next `\n` and reported once as `AssembledLine::TooLong`.
#[derive(Debug)]
pub struct LineAssembler {
    /// Bytes received after the last newline.
    tail: Vec<u8>,
    max_line_bytes: usize,
    /// Bytes skipped so far of an oversized line.
    skipping: Option<usize>,
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::with_max_line_bytes(MAX_LINE_BYTES)
    }
}

impl LineAssembler {
    /// Creates a new `LineAssembler` with an empty tail.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            tail: Vec::new(),
            max_line_bytes,
            skipping: None,
        }
    }

    /// Feeds a chunk of text and returns every line it completes.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.feed_bytes(chunk.as_bytes())
    }

    /// Feeds a chunk of raw bytes and returns every line it completes.
    ///
    /// Oversized lines are dropped silently; use `assemble` to see them.
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        self.assemble(bytes)
            .into_iter()
            .filter_map(|item| match item {
                AssembledLine::Line(line) => Some(line),
                AssembledLine::TooLong { .. } => None,
            })
            .collect()
    }

    /// Feeds a chunk of raw bytes and returns everything it completes.
    ///
    /// # Arguments
    ///
    /// - `bytes` (`&[u8]`) - Incoming bytes, split at any point relative to line boundaries.
    ///
    /// # Returns
    ///
    /// - `Vec<AssembledLine>` - Completed lines (without terminators) and dropped oversized
    ///   lines, in arrival order.
    pub fn assemble(&mut self, bytes: &[u8]) -> Vec<AssembledLine> {
        let mut out = Vec::new();
        let mut rest = bytes;

        while let Some(newline) = rest.iter().position(|&b| b == b'\n') {
            let segment = &rest[..newline];
            if let Some(skipped) = self.skipping.take() {
                out.push(AssembledLine::TooLong {
                    discarded_bytes: skipped + segment.len(),
                });
            } else if self.tail.len() + segment.len() > self.max_line_bytes {
                out.push(AssembledLine::TooLong {
                    discarded_bytes: self.tail.len() + segment.len(),
                });
                self.tail.clear();
            } else if self.tail.is_empty() {
                out.push(AssembledLine::Line(decode_line(segment)));
            } else {
                // The line began in an earlier chunk.
                self.tail.extend_from_slice(segment);
                out.push(AssembledLine::Line(decode_line(&self.tail)));
                self.tail.clear();
            }
            rest = &rest[newline + 1..];
        }

        if let Some(skipped) = self.skipping.as_mut() {
            *skipped += rest.len();
        } else if self.tail.len() + rest.len() > self.max_line_bytes {
            self.skipping = Some(self.tail.len() + rest.len());
            self.tail.clear();
        } else {
            self.tail.extend_from_slice(rest);
        }
        out
    }

    /// Returns the buffered partial line, if any, and empties the buffer.
    ///
    /// Used when the transport closes without a trailing delimiter; the partial line is
    /// treated as a best-effort final line.
    pub fn flush(&mut self) -> Option<String> {
        match self.finish()? {
            AssembledLine::Line(line) => Some(line),
            AssembledLine::TooLong { .. } => None,
        }
    }

    /// Like `flush`, but also reports an unterminated oversized line.
    pub fn finish(&mut self) -> Option<AssembledLine> {
        if let Some(discarded_bytes) = self.skipping.take() {
            return Some(AssembledLine::TooLong { discarded_bytes });
        }
        if self.tail.is_empty() {
            return None;
        }
        let line = decode_line(&self.tail);
        self.tail.clear();
        Some(AssembledLine::Line(line))
    }

    /// Number of bytes waiting for a line terminator.
    pub fn pending(&self) -> usize {
        self.tail.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(s) => s.to_owned(),
        Cow::Owned(s) => s,
    }
}
