//! Incremental decoder for `text/event-stream` bodies.

use bytes::{Buf, BytesMut};

/// Splits a server-sent event stream into `data:` payloads.
///
/// Bytes are buffered until a full line is available, so chunk boundaries
/// of the underlying transport may fall anywhere, including inside a
/// multi-byte character.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: BytesMut,
    data: Vec<String>,
}

impl SseDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes and returns every event payload they complete.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            let line = String::from_utf8_lossy(&line[..pos]);
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                continue;
            }

            self.field(line);
        }

        events
    }

    /// Flushes a trailing event that was not terminated by a blank line.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest = String::from_utf8_lossy(self.buffer.chunk()).into_owned();
            self.buffer.clear();
            let rest = rest.strip_suffix('\r').unwrap_or(&rest).to_owned();
            if !rest.is_empty() {
                self.field(&rest);
            }
        }

        self.dispatch()
    }

    fn field(&mut self, line: &str) {
        // Comment line, used by servers for keep-alive.
        if line.starts_with(':') {
            return;
        }

        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if name == "data" {
            self.data.push(value.to_owned());
        }
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }

        let event = self.data.join("\n");
        self.data.clear();
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_events_across_chunk_boundaries() {
        let mut decoder = SseDecoder::new();

        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert!(decoder.push(b":1}\n").is_empty());
        assert_eq!(decoder.push(b"\ndata: [DONE]\n\n"), ["{\"a\":1}", "[DONE]"]);
    }

    #[test]
    fn handles_crlf_comments_and_multiline_data() {
        let mut decoder = SseDecoder::new();

        let events = decoder.push(b": keep-alive\r\n\r\nevent: message\r\ndata: one\r\ndata: two\r\n\r\n");
        assert_eq!(events, ["one\ntwo"]);
    }

    #[test]
    fn flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();

        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn splits_inside_multibyte_characters() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: héllo\n\n".as_bytes();

        assert!(decoder.push(&bytes[..8]).is_empty());
        assert_eq!(decoder.push(&bytes[8..]), ["héllo"]);
    }
}
