//! Incremental terminal rendering of the transcript.

use std::io::{self, Write};

use transcript::{ChatTurn, TranscriptObserver, TurnId};

/// Prints each assistant turn to `out` as it grows.
///
/// Only the suffix not yet written is printed, so repeated notifications for
/// the same turn produce a continuous line of text.
#[derive(Debug)]
pub struct TerminalObserver<W: Write = io::Stdout> {
    out: W,
    printed: Option<(TurnId, usize)>,
}

impl TerminalObserver<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out, printed: None }
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    /// Ends the current line once a response has finished.
    pub fn finish_turn(&mut self) {
        if self.printed.take().is_some() {
            self.write(b"\n");
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        if let Err(error) = self.out.write_all(bytes).and_then(|()| self.out.flush()) {
            tracing::warn!(%error, "failed to write response text");
        }
    }
}

impl<W: Write> TranscriptObserver for TerminalObserver<W> {
    fn on_transcript_changed(&mut self, turns: &[ChatTurn]) {
        let Some(turn) = turns.last().filter(|turn| turn.is_assistant()) else {
            return;
        };

        let already = match self.printed {
            Some((id, len)) if id == turn.id => len,
            _ => 0,
        };
        if let Some(suffix) = turn.text.get(already..).filter(|suffix| !suffix.is_empty()) {
            self.write(suffix.as_bytes());
        }
        self.printed = Some((turn.id, turn.text.len()));
    }

    fn on_error(&mut self, message: &str) {
        self.finish_turn();
        eprintln!("error: {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transcript::TranscriptReducer;

    fn rendered(observer: &TerminalObserver<Vec<u8>>) -> String {
        String::from_utf8_lossy(observer.writer()).to_string()
    }

    #[test]
    fn prints_only_new_text_for_each_fragment() {
        let mut reducer = TranscriptReducer::with_observer(TerminalObserver::new(Vec::new()));
        reducer.append_user_turn("question");
        let id = reducer.begin_assistant_turn().expect("begin");
        reducer.on_fragment(id, "Hel");
        reducer.on_fragment(id, "lo");
        reducer.on_complete(id);

        assert_eq!(rendered(reducer.observer()), "Hello");
    }

    #[test]
    fn consecutive_turns_are_separated_by_finish_turn() {
        let mut reducer = TranscriptReducer::with_observer(TerminalObserver::new(Vec::new()));
        for reply in ["one", "two"] {
            reducer.append_user_turn("q");
            let id = reducer.begin_assistant_turn().expect("begin");
            reducer.on_fragment(id, reply);
            reducer.on_complete(id);
            reducer.observer_mut().finish_turn();
        }

        assert_eq!(rendered(reducer.observer()), "one\ntwo\n");
    }

    #[test]
    fn user_turns_are_not_echoed() {
        let mut reducer = TranscriptReducer::with_observer(TerminalObserver::new(Vec::new()));
        reducer.append_user_turn("typed by the user");
        reducer.observer_mut().finish_turn();

        assert_eq!(rendered(reducer.observer()), "");
    }
}
