//! Buffered line scanner
//!
//! Accumulates the bytes of a connection whose protocol is not yet known and
//! locates the first line terminator without giving the bytes up. The arena
//! is a single `BytesMut` addressed by two offsets:
//!
//! - the *commit cursor* (`read`): start of the unconsumed region
//! - the *scan cursor* (`scanned`): how far the terminator search has already
//!   looked, so a line split across many chunks is not rescanned from the start
//!
//! Speculative reads are undone with [`LineScanner::mark`] and
//! [`LineScanner::reset_to_mark`].

use bytes::{Bytes, BytesMut};
use log::trace;

/// Line terminator byte
pub const LINE_TERMINATOR: u8 = b'\n';

/// A complete line found in the buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    text: String,
    len: usize,
}

impl Line {
    /// Line content without the terminator (and without a trailing `\r`)
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Bytes making up the line, terminator included
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the line carries no content (a bare terminator)
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Saved read position, see [`LineScanner::mark`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanMark {
    read: usize,
    scanned: usize,
}

/// Incremental line scanner over a growing byte buffer
#[derive(Debug, Default)]
pub struct LineScanner {
    buf: BytesMut,
    read: usize,
    scanned: usize,
}

impl LineScanner {
    /// Create an empty scanner
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty scanner with preallocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            read: 0,
            scanned: 0,
        }
    }

    /// Append newly arrived bytes
    ///
    /// No upper bound is enforced here; callers guard the buffered size.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        trace!("Scanner fed {} bytes, {} buffered", bytes.len(), self.buffered_len());
    }

    /// Number of unconsumed bytes
    pub fn buffered_len(&self) -> usize {
        self.buf.len() - self.read
    }

    /// Whether there are no unconsumed bytes
    pub fn is_empty(&self) -> bool {
        self.buffered_len() == 0
    }

    /// Find the first complete line without consuming it
    ///
    /// Returns `None` when no terminator is buffered yet; the caller must wait
    /// for more input and retry. The line bytes remain in the buffer either way.
    pub fn try_extract_line(&mut self) -> Option<Line> {
        let end = self.find_terminator()?;
        let mut content = &self.buf[self.read..end];
        if content.last() == Some(&b'\r') {
            content = &content[..content.len() - 1];
        }

        Some(Line {
            text: String::from_utf8_lossy(content).into_owned(),
            len: end + 1 - self.read,
        })
    }

    /// Consume the first complete line
    ///
    /// Advances the commit cursor past the terminator. Use [`mark`](Self::mark)
    /// beforehand to be able to give the bytes back.
    pub fn read_line(&mut self) -> Option<Line> {
        let line = self.try_extract_line()?;
        self.read += line.len();
        self.scanned = self.read;
        Some(line)
    }

    /// Remember the current read position
    pub fn mark(&self) -> ScanMark {
        ScanMark {
            read: self.read,
            scanned: self.scanned,
        }
    }

    /// Restore a position saved with [`mark`](Self::mark)
    ///
    /// A mark taken before [`full_buffered_region`](Self::full_buffered_region)
    /// refers to bytes that are gone; it is clamped to the current buffer.
    pub fn reset_to_mark(&mut self, mark: ScanMark) {
        debug_assert!(mark.read <= self.buf.len(), "stale scanner mark");
        self.read = mark.read.min(self.buf.len());
        self.scanned = mark.scanned.clamp(self.read, self.buf.len());
    }

    /// Take the entire unconsumed region for replay
    ///
    /// Returns the line, its terminator and everything buffered after it,
    /// verbatim. The scanner is empty afterwards.
    pub fn full_buffered_region(&mut self) -> Bytes {
        if self.read > 0 {
            let _consumed = self.buf.split_to(self.read);
        }
        self.read = 0;
        self.scanned = 0;
        self.buf.split().freeze()
    }

    fn find_terminator(&mut self) -> Option<usize> {
        let start = self.scanned.max(self.read);
        match self.buf[start..].iter().position(|&b| b == LINE_TERMINATOR) {
            Some(offset) => {
                self.scanned = start + offset;
                Some(start + offset)
            }
            None => {
                self.scanned = self.buf.len();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_line_yet() {
        let mut scanner = LineScanner::new();
        scanner.feed(b"CONNE");

        assert!(scanner.try_extract_line().is_none());
        assert_eq!(scanner.buffered_len(), 5);
    }

    #[test]
    fn test_line_does_not_consume() {
        let mut scanner = LineScanner::new();
        scanner.feed(b"CONNECT\naccept-version:1.2\n");

        let line = scanner.try_extract_line().unwrap();
        assert_eq!(line.text(), "CONNECT");
        assert_eq!(line.len(), 8);

        // Asking twice yields the same line; nothing was consumed.
        assert_eq!(scanner.try_extract_line().unwrap(), line);
        assert_eq!(scanner.buffered_len(), 27);
    }

    #[test]
    fn test_line_split_across_feeds() {
        let mut scanner = LineScanner::new();
        scanner.feed(b"GET /ind");
        assert!(scanner.try_extract_line().is_none());
        scanner.feed(b"ex HTTP/1.1\r");
        assert!(scanner.try_extract_line().is_none());
        scanner.feed(b"\nHost: a\r\n");

        let line = scanner.try_extract_line().unwrap();
        assert_eq!(line.text(), "GET /index HTTP/1.1");
        assert_eq!(line.len(), 21);
    }

    #[test]
    fn test_empty_line() {
        let mut scanner = LineScanner::new();
        scanner.feed(b"\n");

        let line = scanner.try_extract_line().unwrap();
        assert!(line.is_empty());
        assert_eq!(line.len(), 1);
    }

    #[test]
    fn test_mark_and_reset_restore_region() {
        let mut scanner = LineScanner::new();
        scanner.feed(b"STOMP\nhost:x\n\n\0");

        let mark = scanner.mark();
        let line = scanner.read_line().unwrap();
        assert_eq!(line.text(), "STOMP");
        assert_eq!(scanner.buffered_len(), 9);

        scanner.reset_to_mark(mark);
        assert_eq!(scanner.buffered_len(), 15);
        assert_eq!(&scanner.full_buffered_region()[..], b"STOMP\nhost:x\n\n\0");
    }

    #[test]
    fn test_full_region_after_consumed_line() {
        let mut scanner = LineScanner::new();
        scanner.feed(b"a\nb\nc");

        scanner.read_line().unwrap();
        assert_eq!(&scanner.full_buffered_region()[..], b"b\nc");
        assert!(scanner.is_empty());
    }

    #[test]
    fn test_full_region_includes_trailing_bytes() {
        let mut scanner = LineScanner::with_capacity(64);
        scanner.feed(b"CONNECT\n");
        scanner.feed(b"login:guest\n");

        assert!(scanner.try_extract_line().is_some());
        let region = scanner.full_buffered_region();
        assert_eq!(&region[..], b"CONNECT\nlogin:guest\n");
        assert!(scanner.is_empty());
        assert!(scanner.try_extract_line().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut scanner = LineScanner::new();
        scanner.feed(&[0xff, 0xfe, b'\n']);

        let line = scanner.try_extract_line().unwrap();
        assert_eq!(line.len(), 3);
        assert!(line.text().contains('\u{fffd}'));
    }
}
