//! Byte-stream to line splitting
//!
//! Device replies are LF-terminated; CR is noise and dropped wherever it
//! appears. One parser instance lives in every port context and survives
//! across arbitrarily chunked reads.

use memchr::memchr;

use crate::logging::warn;

/// Incremental line accumulator with a fixed-size buffer.
///
/// Lines longer than the buffer are delivered truncated (with a warning);
/// empty lines are delivered as empty slices and left to the caller to skip.
#[derive(Debug)]
pub(crate) struct LineParser {
    buf: Vec<u8>,
    max_len: usize,
    overflow: bool,
}

impl LineParser {
    pub(crate) fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_len),
            max_len,
            overflow: false,
        }
    }

    /// Drops any partially accumulated line.
    ///
    /// Called when the engine switches a port into raw binary reception so a
    /// stray half-line cannot bleed into the next parsed line.
    pub(crate) fn reset(&mut self) {
        self.buf.clear();
        self.overflow = false;
    }

    /// Consumes a chunk of raw bytes, invoking `on_line` once per completed
    /// line (terminator excluded).
    pub(crate) fn feed<F: FnMut(&[u8])>(&mut self, bytes: &[u8], mut on_line: F) {
        let mut rest = bytes;
        while let Some(i) = memchr(b'\n', rest) {
            self.accumulate(&rest[..i]);
            if self.overflow {
                warn!("line too long, delivering truncated ({} bytes)", self.buf.len());
            }
            on_line(&self.buf);
            self.buf.clear();
            self.overflow = false;
            rest = &rest[i + 1..];
        }
        self.accumulate(rest);
    }

    fn accumulate(&mut self, segment: &[u8]) {
        for &b in segment {
            if b == b'\r' {
                continue;
            }
            if self.buf.len() < self.max_len {
                self.buf.push(b);
            } else {
                self.overflow = true;
            }
        }
    }
}
