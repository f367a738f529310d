//! SSE stream framing.
//!
//! [`SseFramer`] turns arbitrarily split byte chunks into complete `data:`
//! payloads. Bytes are buffered until a full line is available, so chunk
//! boundaries may fall anywhere, including inside a UTF-8 sequence.

use crate::error::AgentResult;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use tracing::trace;

/// Incremental SSE parser yielding raw `data:` payloads.
#[derive(Debug, Default)]
pub struct SseFramer {
    /// Bytes not yet terminated by `\n`.
    buffer: Vec<u8>,
    /// Completed payloads, oldest first.
    queue: VecDeque<String>,
    /// `data:` lines of the event being assembled.
    data: Vec<String>,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and frame every complete line it finishes.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let line = &self.buffer[start..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let line = String::from_utf8_lossy(line).into_owned();
            self.process_line(&line);
            start = end + 1;
        }

        self.buffer.drain(..start);
    }

    fn process_line(&mut self, line: &str) {
        if line.is_empty() {
            self.complete_event();
            return;
        }

        if line.starts_with(':') {
            trace!(comment = %line, "Skipping SSE comment");
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            // event, id, retry and unknown fields carry nothing we use
            _ => trace!(field = %field, "Ignoring SSE field"),
        }
    }

    fn complete_event(&mut self) {
        if self.data.is_empty() {
            return;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        if !payload.is_empty() {
            self.queue.push_back(payload);
        }
    }

    pub fn has_event(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Pop the oldest completed payload.
    pub fn next_event(&mut self) -> Option<String> {
        self.queue.pop_front()
    }

    /// Pop every completed payload.
    pub fn drain(&mut self) -> Vec<String> {
        self.queue.drain(..).collect()
    }

    /// Number of completed payloads waiting.
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Complete whatever is in progress at end of stream.
    ///
    /// An unterminated final line is treated as if it ended with `\n`.
    pub fn flush(&mut self) {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let rest = rest.strip_suffix(b"\r").unwrap_or(&rest);
            let line = String::from_utf8_lossy(rest).into_owned();
            self.process_line(&line);
        }
        self.complete_event();
    }

    /// Reset for reuse across runs.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.queue.clear();
        self.data.clear();
    }
}

/// Frame a stream of byte chunks into a stream of payloads.
///
/// Chunk errors are forwarded and end the stream. The framer is flushed when
/// the input ends.
pub fn frame_stream<S, B>(chunks: S) -> impl Stream<Item = AgentResult<String>>
where
    S: Stream<Item = AgentResult<B>>,
    B: AsRef<[u8]>,
{
    async_stream::stream! {
        let mut framer = SseFramer::new();
        futures::pin_mut!(chunks);

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    framer.feed(bytes.as_ref());
                    for payload in framer.drain() {
                        yield Ok(payload);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        framer.flush();
        for payload in framer.drain() {
            yield Ok(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;

    fn frame_all(input: &[u8]) -> Vec<String> {
        let mut framer = SseFramer::new();
        framer.feed(input);
        framer.flush();
        framer.drain()
    }

    #[test]
    fn test_basic_event() {
        let mut framer = SseFramer::new();
        framer.feed(b"data: {\"type\":\"TEST\"}\n\n");
        assert!(framer.has_event());
        assert_eq!(framer.next_event().as_deref(), Some("{\"type\":\"TEST\"}"));
        assert!(!framer.has_event());
    }

    #[test]
    fn test_multiple_events_in_one_chunk() {
        let mut framer = SseFramer::new();
        framer.feed(b"data: one\n\ndata: two\n\ndata: three\n\n");
        assert_eq!(framer.pending_len(), 3);
        assert_eq!(framer.drain(), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_empty_data_produces_nothing() {
        let mut framer = SseFramer::new();
        framer.feed(b"data:\n\n\n\ndata: \n\n");
        assert!(!framer.has_event());
    }

    #[test]
    fn test_split_event_waits_for_blank_line() {
        let mut framer = SseFramer::new();
        framer.feed(b"data: {\"type\":");
        assert!(!framer.has_event());
        framer.feed(b"\"TEST\"}\n");
        assert!(!framer.has_event());
        framer.feed(b"\n");
        assert_eq!(framer.next_event().as_deref(), Some("{\"type\":\"TEST\"}"));
    }

    #[test]
    fn test_data_prefix_split_from_content() {
        let mut framer = SseFramer::new();
        framer.feed(b"da");
        framer.feed(b"ta: ");
        framer.feed(b"x\n\n");
        assert_eq!(framer.drain(), vec!["x"]);
    }

    #[test]
    fn test_multiline_data_joined_with_newline() {
        assert_eq!(
            frame_all(b"data: {\ndata: \"a\": 1\ndata: }\n\n"),
            vec!["{\n\"a\": 1\n}"]
        );
    }

    #[test]
    fn test_only_one_leading_space_stripped() {
        assert_eq!(frame_all(b"data:  two\n\ndata:none\n\n"), vec![" two", "none"]);
    }

    #[test]
    fn test_comments_and_other_fields_ignored() {
        let input = b": keep-alive\nevent: message\nid: 7\nretry: 1000\ndata: payload\n\n";
        assert_eq!(frame_all(input), vec!["payload"]);
    }

    #[test]
    fn test_crlf_line_endings() {
        assert_eq!(frame_all(b"data: a\r\n\r\ndata: b\r\n\r\n"), vec!["a", "b"]);
    }

    #[test]
    fn test_flush_completes_unterminated_event() {
        let mut framer = SseFramer::new();
        framer.feed(b"data: tail");
        assert!(!framer.has_event());
        framer.flush();
        assert_eq!(framer.next_event().as_deref(), Some("tail"));
    }

    #[test]
    fn test_clear_discards_everything() {
        let mut framer = SseFramer::new();
        framer.feed(b"data: done\n\ndata: partial\ndata: more");
        framer.clear();
        framer.flush();
        assert!(!framer.has_event());

        framer.feed(b"data: fresh\n\n");
        assert_eq!(framer.drain(), vec!["fresh"]);
    }

    #[test]
    fn test_split_utf8_sequence() {
        let input = "data: héllo ✓\n\n".as_bytes();
        // split inside the two-byte 'é' and the three-byte '✓'
        for split in [8, 14, 15] {
            let mut framer = SseFramer::new();
            framer.feed(&input[..split]);
            framer.feed(&input[split..]);
            assert_eq!(framer.drain(), vec!["héllo ✓"], "split at {split}");
        }
    }

    #[test]
    fn test_framing_is_chunk_boundary_invariant() {
        let input = b"data: {\"a\":1}\r\n\r\n: ping\ndata: line1\ndata: line2\n\nevent: x\ndata: last";
        let whole = frame_all(input);
        assert_eq!(whole.len(), 3);

        for split in 0..=input.len() {
            let mut framer = SseFramer::new();
            framer.feed(&input[..split]);
            framer.feed(&input[split..]);
            framer.flush();
            assert_eq!(framer.drain(), whole, "split at {split}");
        }

        let mut framer = SseFramer::new();
        for byte in input.iter() {
            framer.feed(std::slice::from_ref(byte));
        }
        framer.flush();
        assert_eq!(framer.drain(), whole);
    }

    #[tokio::test]
    async fn test_frame_stream() {
        let chunks: Vec<AgentResult<&[u8]>> = vec![
            Ok(b"data: a\n\nda".as_slice()),
            Ok(b"ta: b\n\ndata: c".as_slice()),
        ];
        let payloads: Vec<String> = frame_stream(futures::stream::iter(chunks))
            .map(|p| p.unwrap())
            .collect()
            .await;
        assert_eq!(payloads, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_frame_stream_forwards_errors() {
        let chunks: Vec<AgentResult<&[u8]>> = vec![
            Ok(b"data: a\n\n".as_slice()),
            Err(AgentError::network("reset")),
            Ok(b"data: never\n\n".as_slice()),
        ];
        let items: Vec<AgentResult<String>> =
            frame_stream(futures::stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(AgentError::Network { .. })));
    }
}
