// src/io/serial/framer.rs
//
// Marker framing: extracts the text between literal `START` and `END`
// sentinels from an arbitrarily chunked byte stream.

use serde::Serialize;

// =============================================================================
// Marker Constants
// =============================================================================

pub const START_MARKER: &[u8] = b"START";
pub const END_MARKER: &[u8] = b"END";

// =============================================================================
// Types
// =============================================================================

/// One framed message: the text strictly between a `START` and the first
/// `END` after it, split into lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    body: String,
    lines: Vec<String>,
}

impl Message {
    /// Build a message from a raw body. Lines are split on `\n`; a trailing
    /// empty segment (body ending in a newline) is not a line.
    pub fn from_body(body: impl Into<String>) -> Self {
        let body = body.into();
        let mut lines: Vec<String> = body.split('\n').map(str::to_owned).collect();
        if lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        Message { body, lines }
    }

    /// Raw text between the markers, newlines included.
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Lines joined with `\n`, without the trailing newline of the body.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

// =============================================================================
// Marker Framer
// =============================================================================

/// Stateful framer for streaming data.
///
/// Bytes are buffered until a `START ... END` pair is complete. A second
/// `START` seen before the closing `END` is part of the body. Text is decoded
/// only once a frame is complete, so multi-byte UTF-8 sequences split across
/// feeds are never corrupted.
#[derive(Debug, Default)]
pub struct MarkerFramer {
    buffer: Vec<u8>,
    /// Upper bound for buffered bytes while a frame is open (None = unbounded)
    max_buffered: Option<usize>,
    /// Bytes discarded by the bound, for diagnostics
    dropped: u64,
}

impl MarkerFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the buffer. When a frame stays open past `limit` bytes, the oldest
    /// unmatched `START` is dropped and the search resumes at the next one.
    pub fn with_max_buffered(limit: usize) -> Self {
        MarkerFramer {
            max_buffered: Some(limit.max(START_MARKER.len())),
            ..Self::default()
        }
    }

    /// Feed raw bytes into the framer.
    /// Returns every message completed by this chunk, in stream order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Message> {
        self.buffer.extend_from_slice(data);

        let mut messages = Vec::new();
        while let Some(message) = self.try_extract() {
            messages.push(message);
        }

        self.discard_unframed();
        self.enforce_bound();
        messages
    }

    /// Bytes currently held while waiting for more data.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Total bytes discarded by the buffer bound.
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped
    }

    /// Discard everything buffered, e.g. before reading from a fresh session.
    /// Returns the number of bytes discarded.
    pub fn reset(&mut self) -> usize {
        let n = self.buffer.len();
        self.buffer.clear();
        n
    }

    /// Pull the first complete frame off the front of the buffer.
    fn try_extract(&mut self) -> Option<Message> {
        let start = find(&self.buffer, START_MARKER)?;
        let body_start = start + START_MARKER.len();
        let end = body_start + find(&self.buffer[body_start..], END_MARKER)?;

        let body = String::from_utf8_lossy(&self.buffer[body_start..end]).into_owned();
        // Everything up to and including END goes, stray markers before START too
        self.buffer.drain(..end + END_MARKER.len());
        Some(Message::from_body(body))
    }

    /// Drop bytes that can never belong to a frame: everything before the
    /// first `START`, or when there is none, everything except a tail that
    /// could still be the beginning of one.
    fn discard_unframed(&mut self) {
        match find(&self.buffer, START_MARKER) {
            Some(0) => {}
            Some(start) => {
                self.buffer.drain(..start);
            }
            None => {
                let keep = partial_prefix_len(&self.buffer, START_MARKER);
                let cut = self.buffer.len() - keep;
                self.buffer.drain(..cut);
            }
        }
    }

    fn enforce_bound(&mut self) {
        let Some(limit) = self.max_buffered else {
            return;
        };

        while self.buffer.len() > limit {
            // Buffer starts with an unmatched START here; skip past it
            let before = self.buffer.len();
            self.buffer.drain(..START_MARKER.len().min(before));
            self.discard_unframed();
            let dropped = before - self.buffer.len();
            self.dropped += dropped as u64;
            tracing::warn!(
                dropped,
                limit,
                "Frame buffer over limit, dropped oldest unmatched START"
            );
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Position of the first occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Length of the longest proper prefix of `marker` that `buf` ends with.
fn partial_prefix_len(buf: &[u8], marker: &[u8]) -> usize {
    (1..marker.len())
        .rev()
        .find(|&n| buf.ends_with(&marker[..n]))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bodies(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(Message::body).collect()
    }

    #[test]
    fn test_single_frame() {
        let mut framer = MarkerFramer::new();
        let messages = framer.feed(b"STARTabcEND");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].lines(), ["abc"]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_multiline_frame() {
        let mut framer = MarkerFramer::new();
        let messages = framer.feed(b"STARTline1\nline2END");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].lines(), ["line1", "line2"]);
        assert_eq!(messages[0].text(), "line1\nline2");
    }

    #[test]
    fn test_frames_across_calls_keep_order() {
        let mut framer = MarkerFramer::new();
        let mut messages = framer.feed(b"STARTfooEND");
        messages.extend(framer.feed(b"STARTbarEND"));

        assert_eq!(bodies(&messages), ["foo", "bar"]);
    }

    #[test]
    fn test_two_frames_in_one_chunk() {
        let mut framer = MarkerFramer::new();
        let messages = framer.feed(b"\r\nSTARTfooEND\r\nSTARTbarEND\r\n");

        assert_eq!(bodies(&messages), ["foo", "bar"]);
    }

    #[test]
    fn test_pending_frame_completes_later() {
        let mut framer = MarkerFramer::new();
        assert!(framer.feed(b"garbage START pendingNoEndYet").is_empty());

        let messages = framer.feed(b"END");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body(), " pendingNoEndYet");
    }

    #[test]
    fn test_stray_end_before_start() {
        let mut framer = MarkerFramer::new();
        let messages = framer.feed(b"ENDSTARTxEND");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body(), "x");
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_second_start_absorbed_into_body() {
        let mut framer = MarkerFramer::new();
        let messages = framer.feed(b"STARTaSTARTbEND");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body(), "aSTARTb");
    }

    #[test]
    fn test_split_invariance() {
        let input: &[u8] =
            b"noise\nSTARTtemp=21.5\nhum=40\nEND\nENDjunkSTARTsecond\xc3\xa9END\nSTARTtail";
        let expected = MarkerFramer::new().feed(input);
        assert_eq!(expected.len(), 2);

        // Every two-way split
        for cut in 0..=input.len() {
            let mut framer = MarkerFramer::new();
            let mut got = framer.feed(&input[..cut]);
            got.extend(framer.feed(&input[cut..]));
            assert_eq!(got, expected, "split at {}", cut);
        }

        // Byte at a time and assorted chunk sizes
        for size in 1..=7 {
            let mut framer = MarkerFramer::new();
            let got: Vec<Message> = input.chunks(size).flat_map(|c| framer.feed(c)).collect();
            assert_eq!(got, expected, "chunk size {}", size);
        }
    }

    #[test]
    fn test_marker_split_across_feeds() {
        let mut framer = MarkerFramer::new();
        assert!(framer.feed(b"xxSTA").is_empty());
        assert!(framer.feed(b"RThello\nE").is_empty());
        let messages = framer.feed(b"ND");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].lines(), ["hello"]);
    }

    #[test]
    fn test_utf8_split_across_feeds() {
        let mut framer = MarkerFramer::new();
        let snowman = "☃".as_bytes();
        assert!(framer.feed(b"START").is_empty());
        assert!(framer.feed(&snowman[..1]).is_empty());
        assert!(framer.feed(&snowman[1..]).is_empty());
        let messages = framer.feed(b"END");

        assert_eq!(messages[0].body(), "☃");
    }

    #[test]
    fn test_trailing_newline_is_not_a_line() {
        let message = Message::from_body("\nfirst\n\nthird\n");
        assert_eq!(message.lines(), ["", "first", "", "third"]);

        let empty = Message::from_body("");
        assert!(empty.lines().is_empty());
    }

    #[test]
    fn test_unframed_noise_is_not_retained() {
        let mut framer = MarkerFramer::new();
        framer.feed(b"boot log line without markers\nSTA");
        assert_eq!(framer.pending(), b"STA");

        framer.feed(b"ndby");
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_bound_drops_oldest_unmatched_start() {
        let mut framer = MarkerFramer::with_max_buffered(16);
        assert!(framer.feed(b"STARTthis frame never ends").is_empty());
        assert!(framer.pending().len() <= 16);
        assert!(framer.dropped_bytes() > 0);

        // The stream recovers on the next well-formed frame
        let messages = framer.feed(b"STARTokEND");
        assert_eq!(bodies(&messages), ["ok"]);
    }

    #[test]
    fn test_bound_resumes_at_next_start() {
        let mut framer = MarkerFramer::with_max_buffered(12);
        let messages = framer.feed(b"STARTlostSTARTkeptEND");

        // Oversized input is framed before the bound applies
        assert_eq!(bodies(&messages), ["lostSTARTkept"]);

        assert!(framer.feed(b"STARTabcdefghSTARTxy").is_empty());
        assert_eq!(framer.pending(), b"STARTxy");
        assert_eq!(bodies(&framer.feed(b"END")), ["xy"]);
    }

    #[test]
    fn test_reset_discards_pending() {
        let mut framer = MarkerFramer::new();
        framer.feed(b"STARTpartial");
        assert_eq!(framer.reset(), 12);
        assert!(framer.feed(b"END").is_empty());
    }
}
