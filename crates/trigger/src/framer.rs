//! Line framer
//!
//! TCP and serial deliver telegrams split or coalesced arbitrarily; the
//! framer restores line boundaries (`\n` or `\r`, empty lines skipped).

use bytes::{Bytes, BytesMut};

use crate::error::{Result, TriggerError};

/// Longest line accepted before the partial line is discarded
pub const DEFAULT_MAX_LINE_LEN: usize = 256;

/// Incremental line splitter
#[derive(Debug)]
pub struct LineFramer {
    buf: BytesMut,
    max_line_len: usize,
    /// Inside an over-long line; drop bytes until the next terminator
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

impl LineFramer {
    pub fn new(max_line_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_line_len.min(1024)),
            max_line_len: max_line_len.max(1),
            discarding: false,
        }
    }

    /// Feed one chunk; returns the complete lines it finished
    ///
    /// An over-long line yields one `LineTooLong` error in its place.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<Bytes>> {
        let mut frames = Vec::new();

        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if self.discarding {
                    self.discarding = false;
                } else if !self.buf.is_empty() {
                    frames.push(Ok(self.buf.split().freeze()));
                }
                continue;
            }
            if self.discarding {
                continue;
            }
            if self.buf.len() == self.max_line_len {
                self.buf.clear();
                self.discarding = true;
                frames.push(Err(TriggerError::LineTooLong {
                    max: self.max_line_len,
                }));
                continue;
            }
            self.buf.extend_from_slice(&[byte]);
        }

        frames
    }

    /// Bytes of the current partial line
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop the partial line
    pub fn clear(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(frames: Vec<Result<Bytes>>) -> Vec<String> {
        frames
            .into_iter()
            .map(|f| String::from_utf8(f.unwrap().to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn test_split_across_chunks() {
        let mut framer = LineFramer::default();
        assert!(framer.feed(b"+OCC").is_empty());
        assert_eq!(framer.pending(), 4);
        assert_eq!(lines(framer.feed(b"H1:1\r\n+OCCH1:0\r\n+OC")), vec!["+OCCH1:1", "+OCCH1:0"]);
        assert_eq!(lines(framer.feed(b"CH1:1\n")), vec!["+OCCH1:1"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_clear_drops_partial_line() {
        let mut framer = LineFramer::default();
        assert!(framer.feed(b"+OCCH1:").is_empty());
        framer.clear();
        assert_eq!(framer.pending(), 0);
        assert_eq!(lines(framer.feed(b"+OCCH1:0\n")), vec!["+OCCH1:0"]);
    }

    #[test]
    fn test_bare_cr_terminates() {
        let mut framer = LineFramer::default();
        assert_eq!(lines(framer.feed(b"a\rb\r\r\nc\n")), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_overlong_line_discarded_once() {
        let mut framer = LineFramer::new(8);
        let frames = framer.feed(b"0123456789abcdef");
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], Err(TriggerError::LineTooLong { max: 8 })));

        // rest of the long line is dropped, the next one survives
        assert_eq!(lines(framer.feed(b"xyz\n+OCCH1:1\n")), vec!["+OCCH1:1"]);
    }
}
