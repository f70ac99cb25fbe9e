use serde_json::Value;

use crate::events::{StreamEvent, DONE_SENTINEL};

/// Prefix that marks a data record. Records without it are ignored.
pub const DATA_PREFIX: &str = "data: ";

/// Buffer size past which a pushed-back record is reported once at `warn`.
const PUSH_BACK_WARN_BYTES: usize = 64 * 1024;

/// Incremental decoder for the newline-delimited `data: ` stream.
///
/// One decoder serves exactly one response. Bytes may arrive split at any
/// offset, including inside a record or inside a multi-byte UTF-8 sequence.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: String,
    pending_utf8: Vec<u8>,
    terminated: bool,
    push_back_warned: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum LineOutcome {
    Skip,
    Fragment(String),
    Done,
    Unparsed,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk and drain every complete record it finishes.
    ///
    /// Decoding halts for this chunk at `[DONE]` or at a data record whose
    /// payload does not parse yet; that record stays at the front of the
    /// buffer and is retried on the next chunk.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        if self.terminated {
            return Vec::new();
        }

        let text = self.decode_utf8(bytes);
        self.buffer.push_str(&text);

        let mut events = Vec::new();
        let mut consumed = 0;

        while let Some(offset) = self.buffer[consumed..].find('\n') {
            let end = consumed + offset;
            let outcome = classify_line(strip_cr(&self.buffer[consumed..end]));

            match outcome {
                LineOutcome::Skip => {}
                LineOutcome::Fragment(content) => events.push(StreamEvent::Delta { content }),
                LineOutcome::Done => {
                    tracing::debug!(
                        discarded = self.buffer.len() - (end + 1),
                        "stream terminal received"
                    );
                    self.terminate();
                    events.push(StreamEvent::Done);
                    return events;
                }
                LineOutcome::Unparsed => {
                    tracing::debug!(
                        line_len = end - consumed,
                        "data record did not parse; holding it for the next chunk"
                    );
                    break;
                }
            }

            consumed = end + 1;
        }

        self.buffer.drain(..consumed);
        self.warn_on_held_growth();
        tracing::trace!(fragments = events.len(), buffered = self.buffer.len(), "chunk decoded");
        events
    }

    /// Process whatever is left once the transport has no more chunks.
    ///
    /// Every remaining piece is treated as a complete line. Records that still
    /// fail to parse are dropped, and `[DONE]` is ignored. The decoder is
    /// terminated afterwards.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.terminated {
            return Vec::new();
        }

        if !self.pending_utf8.is_empty() {
            let tail = std::mem::take(&mut self.pending_utf8);
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }

        let remainder = std::mem::take(&mut self.buffer);
        self.terminate();

        let mut events = Vec::new();
        if remainder.trim().is_empty() {
            return events;
        }

        for raw in remainder.split('\n') {
            match classify_line(strip_cr(raw)) {
                LineOutcome::Fragment(content) => events.push(StreamEvent::Delta { content }),
                LineOutcome::Unparsed => {
                    tracing::debug!(line_len = raw.len(), "dropping unparsable record at flush");
                }
                LineOutcome::Skip | LineOutcome::Done => {}
            }
        }

        events
    }

    /// Decode a complete stream in one shot, including the final flush.
    pub fn decode_complete(input: &str) -> Vec<StreamEvent> {
        let mut decoder = Self::default();
        let mut events = decoder.feed(input.as_bytes());
        events.extend(decoder.finish());
        events
    }

    /// Bytes of text currently held for later chunks.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() + self.pending_utf8.len()
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty() && self.pending_utf8.is_empty()
    }

    /// True after `[DONE]` or [`StreamDecoder::finish`].
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    fn terminate(&mut self) {
        self.terminated = true;
        self.buffer.clear();
        self.pending_utf8.clear();
    }

    fn warn_on_held_growth(&mut self) {
        if self.push_back_warned || self.buffer.len() <= PUSH_BACK_WARN_BYTES {
            return;
        }

        if self.buffer.contains('\n') {
            self.push_back_warned = true;
            tracing::warn!(
                buffered = self.buffer.len(),
                "unparsable data record is holding back the stream buffer"
            );
        }
    }

    // Incomplete trailing sequences wait for the next chunk; invalid ones become U+FFFD.
    fn decode_utf8(&mut self, bytes: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending_utf8);
        input.extend_from_slice(bytes);

        let mut out = String::with_capacity(input.len());
        let mut rest = input.as_slice();

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(error) => {
                    let (valid, after) = rest.split_at(error.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match error.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending_utf8 = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        out
    }
}

fn strip_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

fn classify_line(line: &str) -> LineOutcome {
    if line.trim().is_empty() || line.starts_with(':') {
        return LineOutcome::Skip;
    }

    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return LineOutcome::Skip;
    };

    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return LineOutcome::Done;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(value) => extract_content(&value).map_or(LineOutcome::Skip, LineOutcome::Fragment),
        Err(_) => LineOutcome::Unparsed,
    }
}

fn extract_content(value: &Value) -> Option<String> {
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .filter(|content| !content.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::{classify_line, LineOutcome, StreamDecoder};
    use crate::events::StreamEvent;

    #[test]
    fn classify_line_skips_comments_and_foreign_records() {
        assert_eq!(classify_line(": keepalive"), LineOutcome::Skip);
        assert_eq!(classify_line("   "), LineOutcome::Skip);
        assert_eq!(classify_line("event: message"), LineOutcome::Skip);
        assert_eq!(classify_line("data:{\"no\":\"space\"}"), LineOutcome::Skip);
    }

    #[test]
    fn classify_line_treats_empty_payload_as_unparsed() {
        assert_eq!(classify_line("data: "), LineOutcome::Unparsed);
        assert_eq!(classify_line("data:    "), LineOutcome::Unparsed);
    }

    #[test]
    fn classify_line_reads_nested_content_path() {
        assert_eq!(
            classify_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#),
            LineOutcome::Fragment("Hi".to_string())
        );
        assert_eq!(
            classify_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            LineOutcome::Skip
        );
        assert_eq!(
            classify_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#),
            LineOutcome::Skip
        );
        assert_eq!(classify_line(r#"data: {"choices":[]}"#), LineOutcome::Skip);
        assert_eq!(classify_line("data:  [DONE] "), LineOutcome::Done);
        assert_eq!(classify_line(r#"data: {"choi"#), LineOutcome::Unparsed);
    }

    #[test]
    fn utf8_sequence_split_across_chunks_is_reassembled() {
        let record = "data: {\"choices\":[{\"delta\":{\"content\":\"h\u{e9}llo\"}}]}\n";
        let bytes = record.as_bytes();
        let split = record.find('\u{e9}').expect("accented char present") + 1;

        let mut decoder = StreamDecoder::default();
        assert!(decoder.feed(&bytes[..split]).is_empty());
        assert_eq!(decoder.buffered_len(), split);

        let events = decoder.feed(&bytes[split..]);
        assert_eq!(
            events,
            vec![StreamEvent::Delta {
                content: "h\u{e9}llo".to_string(),
            }]
        );
        assert!(decoder.is_empty_buffer());
    }

    #[test]
    fn done_discards_buffered_tail_and_terminates() {
        let mut decoder = StreamDecoder::new();
        let events = decoder.feed(
            b"data: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
        );

        assert_eq!(events, vec![StreamEvent::Done]);
        assert!(decoder.is_terminated());
        assert_eq!(decoder.buffered_len(), 0);
        assert!(decoder.finish().is_empty());
    }
}
