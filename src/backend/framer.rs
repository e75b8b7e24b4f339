//! Incremental line framing for child process output.
//!
//! Pipes deliver arbitrary byte chunks; a line may be split across any
//! number of reads. The framer buffers the partial tail between calls and
//! yields only complete lines.

/// Longest line kept in the buffer before it is force-split (64 KiB).
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Stateful line accumulator.
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Bytes received after the last newline.
    pending: Vec<u8>,
}

impl LineFramer {
    /// Creates an empty framer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every line it completes, in order.
    ///
    /// Lines are split on `\n`; a trailing `\r` is dropped. Invalid UTF-8 is
    /// replaced rather than rejected. A line is only force-split once a byte
    /// arrives that would take it past `MAX_LINE_BYTES`, so a full-length line
    /// followed by `\n` or `\r\n` stays a single line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in chunk {
            if byte == b'\n' {
                lines.push(self.take_pending(true));
                continue;
            }

            // One extra byte of room for the `\r` of a CRLF ending.
            let full = self.pending.len() > MAX_LINE_BYTES
                || (self.pending.len() == MAX_LINE_BYTES && byte != b'\r');
            if full {
                tracing::warn!(
                    "Backend output line exceeded {} bytes, splitting",
                    MAX_LINE_BYTES
                );
                lines.push(self.take_pending(false));
            }
            self.pending.push(byte);
        }

        lines
    }

    /// Flushes a trailing partial line at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_pending(true))
        }
    }

    /// Discards any buffered partial line.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Returns true if a partial line is buffered.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn take_pending(&mut self, strip_cr: bool) -> String {
        if strip_cr && self.pending.last() == Some(&b'\r') {
            self.pending.pop();
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_chunk_lines() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"one\ntwo\n");
        assert_eq!(lines, vec!["one", "two"]);
        assert!(!framer.has_pending());
    }

    #[test]
    fn test_partial_line_carried_over() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"hel").is_empty());
        assert!(framer.has_pending());
        assert_eq!(framer.push(b"lo\nwor"), vec!["hello"]);
        assert_eq!(framer.push(b"ld\n"), vec!["world"]);
    }

    #[test]
    fn test_crlf_is_stripped() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"a\r\nb\r"), vec!["a"]);
        assert_eq!(framer.push(b"\n"), vec!["b"]);
    }

    #[test]
    fn test_empty_lines_preserved() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"\n\nx\n"), vec!["", "", "x"]);
    }

    #[test]
    fn test_finish_flushes_tail() {
        let mut framer = LineFramer::new();
        framer.push(b"done\nno newline");
        assert_eq!(framer.finish(), Some("no newline".to_string()));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_reset_discards_tail() {
        let mut framer = LineFramer::new();
        framer.push(b"stale");
        framer.reset();
        assert_eq!(framer.push(b"fresh\n"), vec!["fresh"]);
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let text = "caf\u{e9}\n".as_bytes();
        let mut framer = LineFramer::new();
        assert!(framer.push(&text[..4]).is_empty());
        assert_eq!(framer.push(&text[4..]), vec!["caf\u{e9}"]);
    }

    #[test]
    fn test_overlong_line_is_split() {
        let mut framer = LineFramer::new();
        let long = vec![b'x'; MAX_LINE_BYTES + 10];
        let lines = framer.push(&long);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), MAX_LINE_BYTES);
        assert_eq!(framer.finish().map(|l| l.len()), Some(10));
    }

    #[test]
    fn test_full_length_line_is_not_split() {
        let mut framer = LineFramer::new();
        let mut stream = vec![b'x'; MAX_LINE_BYTES];
        stream.extend_from_slice(b"\nPORT::1\n");

        let lines = framer.push(&stream);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), MAX_LINE_BYTES);
        assert_eq!(lines[1], "PORT::1");
    }

    #[test]
    fn test_full_length_crlf_line_is_not_split() {
        let mut framer = LineFramer::new();
        let mut stream = vec![b'x'; MAX_LINE_BYTES];
        stream.extend_from_slice(b"\r\nnext\n");

        let lines = framer.push(&stream);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), MAX_LINE_BYTES);
        assert_eq!(lines[1], "next");
    }

    #[test]
    fn test_cap_boundary_across_chunks() {
        let mut framer = LineFramer::new();
        assert!(framer.push(&vec![b'x'; MAX_LINE_BYTES]).is_empty());
        assert_eq!(framer.push(b"\n").len(), 1);
        assert!(!framer.has_pending());
    }
}
