//! Property tests for stdout framing and the port handshake.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use devassist::backend::{LineFramer, ScanEvent, StdoutScanner};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Splits `bytes` at the given (sorted, deduplicated) cut points.
fn split_at(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for &cut in cuts {
        chunks.push(bytes[start..cut].to_vec());
        start = cut;
    }
    chunks.push(bytes[start..].to_vec());
    chunks
}

fn cut_points(len: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..=len, 0..8).prop_map(|mut cuts| {
        cuts.sort_unstable();
        cuts.dedup();
        cuts
    })
}

const STREAM: &str = "booting\r\nloading model\nPORT::54321\nready\nPORT::1\n";

proptest! {
    #[test]
    fn chunking_never_changes_lines(cuts in cut_points(STREAM.len())) {
        let mut framer = LineFramer::new();
        let mut lines = Vec::new();
        for chunk in split_at(STREAM.as_bytes(), &cuts) {
            lines.extend(framer.push(&chunk));
        }
        prop_assert!(framer.finish().is_none());
        prop_assert_eq!(
            lines,
            vec!["booting", "loading model", "PORT::54321", "ready", "PORT::1"]
        );
    }

    #[test]
    fn chunking_resolves_port_once(cuts in cut_points(STREAM.len())) {
        let mut scanner = StdoutScanner::new();
        let mut events = Vec::new();
        for chunk in split_at(STREAM.as_bytes(), &cuts) {
            events.extend(scanner.feed(&chunk));
        }
        events.extend(scanner.finish());

        let handshakes: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ScanEvent::Handshake(port) => Some(port.as_str()),
                _ => None,
            })
            .collect();
        prop_assert_eq!(handshakes, vec!["54321"]);
        prop_assert_eq!(scanner.port(), Some("54321"));
    }

    #[test]
    fn arbitrary_bytes_keep_every_newline(
        (data, cuts) in prop::collection::vec(any::<u8>(), 0..512)
            .prop_flat_map(|data| {
                let len = data.len();
                (Just(data), cut_points(len))
            }),
    ) {
        let mut framer = LineFramer::new();
        let mut count = 0;
        for chunk in split_at(&data, &cuts) {
            count += framer.push(&chunk).len();
        }
        let newlines = data.iter().filter(|&&b| b == b'\n').count();
        prop_assert_eq!(count, newlines);
    }
}

#[test]
fn test_unterminated_handshake_at_eof() {
    let mut scanner = StdoutScanner::new();
    assert!(scanner.feed(b"PORT::8080").is_empty());

    let events = scanner.finish();
    assert_eq!(
        events,
        vec![
            ScanEvent::Line("PORT::8080".into()),
            ScanEvent::Handshake("8080".into())
        ]
    );
}
