use std::fmt;

use crate::error::TranscriptError;
use crate::observer::{NoopObserver, TranscriptObserver};
use crate::turn::{ChatTurn, Role, TurnId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenTurn {
    id: TurnId,
    inserted: bool,
}

/// Single source of truth for the visible conversation.
pub struct TranscriptReducer<O = NoopObserver> {
    turns: Vec<ChatTurn>,
    next_id: u64,
    open: Option<OpenTurn>,
    observer: O,
}

impl Default for TranscriptReducer<NoopObserver> {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptReducer<NoopObserver> {
    pub fn new() -> Self {
        Self::with_observer(NoopObserver)
    }
}

impl<O> fmt::Debug for TranscriptReducer<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscriptReducer")
            .field("turns", &self.turns)
            .field("next_id", &self.next_id)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl<O: TranscriptObserver> TranscriptReducer<O> {
    pub fn with_observer(observer: O) -> Self {
        Self {
            turns: Vec::new(),
            next_id: 1,
            open: None,
            observer,
        }
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Identifier of the assistant turn currently accepting fragments.
    pub fn open_turn(&self) -> Option<TurnId> {
        self.open.map(|open| open.id)
    }

    /// True while an assistant response is in flight, inserted or not.
    pub fn is_streaming(&self) -> bool {
        self.open.is_some()
    }

    /// Appends a user turn. Never fails.
    ///
    /// An assistant turn still open at this point is closed with the text it
    /// already has so the open turn stays last.
    pub fn append_user_turn(&mut self, text: impl Into<String>) -> TurnId {
        if let Some(open) = self.open.take() {
            tracing::warn!(
                open = %open.id,
                "user turn appended while assistant turn was open; closing it"
            );
        }

        let id = self.allocate_id();
        self.turns.push(ChatTurn::new(id, Role::User, text));
        self.notify_changed();
        id
    }

    /// Reserves the id for the next assistant turn without inserting it.
    pub fn begin_assistant_turn(&mut self) -> Result<TurnId, TranscriptError> {
        if let Some(open) = self.open {
            return Err(TranscriptError::TurnInFlight { id: open.id });
        }

        let id = self.allocate_id();
        self.open = Some(OpenTurn {
            id,
            inserted: false,
        });
        tracing::debug!(%id, "assistant turn opened");
        Ok(id)
    }

    /// Appends `fragment` to the open assistant turn `id`.
    ///
    /// The first fragment inserts the turn at the end of the transcript; later
    /// fragments extend the same turn. Calls for any other id are ignored.
    pub fn on_fragment(&mut self, id: TurnId, fragment: &str) {
        if fragment.is_empty() {
            return;
        }

        let Some(open) = self.open.as_mut().filter(|open| open.id == id) else {
            tracing::warn!(%id, "fragment for a turn that is not open; ignoring");
            return;
        };

        if open.inserted {
            match self.turns.iter_mut().rev().find(|turn| turn.id == id) {
                Some(turn) => turn.text.push_str(fragment),
                None => {
                    tracing::warn!(%id, "open turn missing from transcript; ignoring fragment");
                    return;
                }
            }
        } else {
            open.inserted = true;
            self.turns.push(ChatTurn::new(id, Role::Assistant, fragment));
        }

        self.notify_changed();
    }

    /// Closes the open turn `id`. No-op for any other id.
    pub fn on_complete(&mut self, id: TurnId) {
        if !self.is_open(id) {
            return;
        }

        if let Some(open) = self.open.take() {
            tracing::debug!(%id, inserted = open.inserted, "assistant turn completed");
        }
        self.notify_changed();
    }

    /// Discards the open turn `id` and forwards `message` to the observer.
    pub fn on_error(&mut self, id: TurnId, message: &str) {
        tracing::warn!(%id, error = message, "assistant turn failed");

        if self.is_open(id) {
            let inserted = self.open.take().is_some_and(|open| open.inserted);
            if inserted {
                if let Some(index) = self.turns.iter().rposition(|turn| turn.id == id) {
                    self.turns.remove(index);
                }
            }
            self.notify_changed();
        }

        self.observer.on_error(message);
    }

    /// Drops every turn, including an open one.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.open = None;
        self.notify_changed();
    }

    fn is_open(&self, id: TurnId) -> bool {
        self.open.is_some_and(|open| open.id == id)
    }

    fn allocate_id(&mut self) -> TurnId {
        let id = TurnId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn notify_changed(&mut self) {
        self.observer.on_transcript_changed(&self.turns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct CountingObserver {
        changes: usize,
        errors: Vec<String>,
    }

    impl TranscriptObserver for CountingObserver {
        fn on_transcript_changed(&mut self, _turns: &[ChatTurn]) {
            self.changes += 1;
        }

        fn on_error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }
    }

    #[test]
    fn begin_assistant_turn_inserts_nothing_until_first_fragment() {
        let mut reducer = TranscriptReducer::new();
        reducer.append_user_turn("hi");

        let id = reducer
            .begin_assistant_turn()
            .expect("no turn is open yet");
        assert_eq!(reducer.len(), 1);
        assert_eq!(reducer.open_turn(), Some(id));
        assert!(reducer.is_streaming());

        reducer.on_fragment(id, "");
        assert_eq!(reducer.len(), 1, "empty fragments do not insert a turn");

        reducer.on_fragment(id, "hey");
        assert_eq!(reducer.len(), 2);
        assert_eq!(reducer.last().map(|turn| turn.text.as_str()), Some("hey"));
    }

    #[test]
    fn second_begin_while_open_reports_turn_in_flight() {
        let mut reducer = TranscriptReducer::new();
        let first = reducer.begin_assistant_turn().expect("first begin");

        assert_eq!(
            reducer.begin_assistant_turn(),
            Err(TranscriptError::TurnInFlight { id: first })
        );

        reducer.on_complete(first);
        assert!(reducer.begin_assistant_turn().is_ok());
    }

    #[test]
    fn ids_increase_in_allocation_order() {
        let mut reducer = TranscriptReducer::new();
        let user = reducer.append_user_turn("a");
        let assistant = reducer.begin_assistant_turn().expect("begin");
        reducer.on_complete(assistant);
        let next_user = reducer.append_user_turn("b");

        assert!(user < assistant);
        assert!(assistant < next_user);
    }

    #[test]
    fn observer_sees_each_mutation_and_each_error() {
        let mut reducer = TranscriptReducer::with_observer(CountingObserver::default());
        reducer.append_user_turn("q");
        let id = reducer.begin_assistant_turn().expect("begin");
        reducer.on_fragment(id, "a");
        reducer.on_fragment(id, "b");
        reducer.on_error(id, "boom");

        assert_eq!(reducer.observer().changes, 4);
        assert_eq!(reducer.observer().errors, vec!["boom".to_string()]);
    }

    #[test]
    fn appending_user_turn_closes_open_assistant_turn() {
        let mut reducer = TranscriptReducer::new();
        let id = reducer.begin_assistant_turn().expect("begin");
        reducer.on_fragment(id, "partial");

        reducer.append_user_turn("interrupt");
        assert!(!reducer.is_streaming());

        reducer.on_fragment(id, " more");
        let texts: Vec<_> = reducer.turns().iter().map(|turn| turn.text.as_str()).collect();
        assert_eq!(texts, vec!["partial", "interrupt"]);
    }
}
