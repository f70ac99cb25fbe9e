/// Sentinel payload that marks the logical end of a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Event produced by [`crate::StreamDecoder`] after classifying one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Non-empty assistant text taken from `choices[0].delta.content`.
    Delta { content: String },
    /// Upstream sent `[DONE]`; nothing after it is decoded.
    Done,
}

impl StreamEvent {
    /// Returns the fragment text for delta events.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Delta { content } => Some(content),
            Self::Done => None,
        }
    }
}
