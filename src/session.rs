//! One conversation: a transcript plus the transport that feeds it.
//!
//! [`ChatSession::send`] appends the user turn, opens an assistant turn and
//! routes the stream callbacks into the reducer. The stream contract
//! (`on_error` at most once, `on_done` exactly once) is re-checked here so a
//! transport that returns without closing out still leaves the transcript
//! consistent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chat_api::{CancellationSignal, ChatApiClient, ChatMessage, ChatRequest, StreamHandler};
use futures_util::future::{FutureExt, LocalBoxFuture};
use transcript::{
    ChatTurn, NoopObserver, Role, TranscriptError, TranscriptObserver, TranscriptReducer, TurnId,
};

pub const INCOMPLETE_STREAM_ERROR: &str = "stream ended without completion";

/// Source of streamed responses for a session.
///
/// Implementations must honor the [`StreamHandler`] ordering contract.
pub trait ChatTransport {
    fn stream<'a>(
        &'a self,
        request: &'a ChatRequest,
        cancellation: &'a CancellationSignal,
        handler: &'a mut dyn StreamHandler,
    ) -> LocalBoxFuture<'a, ()>;
}

impl ChatTransport for ChatApiClient {
    fn stream<'a>(
        &'a self,
        request: &'a ChatRequest,
        cancellation: &'a CancellationSignal,
        handler: &'a mut dyn StreamHandler,
    ) -> LocalBoxFuture<'a, ()> {
        async move {
            match self.stream_chat(request, Some(cancellation), handler).await {
                Ok(end) => tracing::debug!(?end, "response stream finished"),
                Err(error) => tracing::debug!(%error, "response stream ended with error"),
            }
        }
        .boxed_local()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error(transparent)]
    Transcript(#[from] TranscriptError),
}

/// How one `send` ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed { id: TurnId },
    Failed { id: TurnId, message: String },
    Cancelled { id: TurnId },
}

impl TurnOutcome {
    pub fn id(&self) -> TurnId {
        match self {
            Self::Completed { id } | Self::Failed { id, .. } | Self::Cancelled { id } => *id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

pub struct ChatSession<T, O = NoopObserver> {
    transport: T,
    reducer: TranscriptReducer<O>,
    cancellation: CancellationSignal,
}

impl<T: ChatTransport> ChatSession<T, NoopObserver> {
    pub fn new(transport: T) -> Self {
        Self::with_observer(transport, NoopObserver)
    }
}

impl<T: ChatTransport, O: TranscriptObserver> ChatSession<T, O> {
    pub fn with_observer(transport: T, observer: O) -> Self {
        Self {
            transport,
            reducer: TranscriptReducer::with_observer(observer),
            cancellation: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn transcript(&self) -> &TranscriptReducer<O> {
        &self.reducer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        self.reducer.observer_mut()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Flag that cancels the in-flight response when set.
    ///
    /// The same flag is reused for every turn and cleared when a new turn
    /// starts.
    pub fn cancellation_handle(&self) -> CancellationSignal {
        Arc::clone(&self.cancellation)
    }

    pub fn clear(&mut self) {
        self.reducer.clear();
    }

    /// Sends `text` with the prior conversation and streams the reply into
    /// the transcript.
    pub async fn send(&mut self, text: &str) -> Result<TurnOutcome, SessionError> {
        let prompt = text.trim();
        if prompt.is_empty() {
            return Err(SessionError::EmptyPrompt);
        }
        if let Some(id) = self.reducer.open_turn() {
            return Err(TranscriptError::TurnInFlight { id }.into());
        }

        let mut messages = history_messages(self.reducer.turns());
        messages.push(ChatMessage::user(prompt));
        let request = ChatRequest::new(messages);

        self.cancellation.store(false, Ordering::Release);
        self.reducer.append_user_turn(prompt);
        let id = self.reducer.begin_assistant_turn()?;
        tracing::info!(%id, history = request.messages.len(), "streaming assistant turn");

        let mut handler = TurnHandler::new(&mut self.reducer, id);
        self.transport
            .stream(&request, &self.cancellation, &mut handler)
            .await;

        if !handler.done {
            tracing::warn!(%id, "transport returned without closing the stream");
            handler.on_error(INCOMPLETE_STREAM_ERROR);
            handler.on_done();
        }

        let outcome = match handler.error.take() {
            None => TurnOutcome::Completed { id },
            Some(_) if self.cancellation.load(Ordering::Acquire) => TurnOutcome::Cancelled { id },
            Some(message) => TurnOutcome::Failed { id, message },
        };
        Ok(outcome)
    }
}

/// Converts finished turns into request history, oldest first.
pub fn history_messages(turns: &[ChatTurn]) -> Vec<ChatMessage> {
    turns
        .iter()
        .map(|turn| match turn.role {
            Role::User => ChatMessage::user(turn.text.clone()),
            Role::Assistant => ChatMessage::assistant(turn.text.clone()),
        })
        .collect()
}

// Routes stream callbacks for one assistant turn into the reducer.
struct TurnHandler<'r, O> {
    reducer: &'r mut TranscriptReducer<O>,
    id: TurnId,
    error: Option<String>,
    done: bool,
}

impl<'r, O: TranscriptObserver> TurnHandler<'r, O> {
    fn new(reducer: &'r mut TranscriptReducer<O>, id: TurnId) -> Self {
        Self {
            reducer,
            id,
            error: None,
            done: false,
        }
    }
}

impl<O: TranscriptObserver> StreamHandler for TurnHandler<'_, O> {
    fn on_delta(&mut self, fragment: &str) {
        if self.done || self.error.is_some() {
            return;
        }
        self.reducer.on_fragment(self.id, fragment);
    }

    fn on_done(&mut self) {
        if std::mem::replace(&mut self.done, true) {
            return;
        }
        self.reducer.on_complete(self.id);
    }

    fn on_error(&mut self, message: &str) {
        if self.done || self.error.is_some() {
            return;
        }
        self.error = Some(message.to_string());
        self.reducer.on_error(self.id, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_preserves_roles_and_order() {
        let mut reducer = TranscriptReducer::new();
        reducer.append_user_turn("hi");
        let id = reducer.begin_assistant_turn().expect("begin");
        reducer.on_fragment(id, "hello");
        reducer.on_complete(id);

        let messages = history_messages(reducer.turns());
        assert_eq!(
            messages,
            vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")]
        );
    }

    #[test]
    fn turn_handler_ignores_callbacks_after_done() {
        let mut reducer = TranscriptReducer::new();
        let id = reducer.begin_assistant_turn().expect("begin");

        let mut handler = TurnHandler::new(&mut reducer, id);
        handler.on_delta("kept");
        handler.on_done();
        handler.on_delta("late");
        handler.on_error("late failure");
        handler.on_done();
        assert!(handler.error.is_none());

        assert_eq!(reducer.len(), 1);
        assert_eq!(reducer.last().map(|turn| turn.text.as_str()), Some("kept"));
    }

    #[test]
    fn turn_handler_forwards_only_the_first_error() {
        let mut reducer = TranscriptReducer::new();
        let id = reducer.begin_assistant_turn().expect("begin");

        let mut handler = TurnHandler::new(&mut reducer, id);
        handler.on_delta("partial");
        handler.on_error("first");
        handler.on_error("second");
        handler.on_done();

        assert_eq!(handler.error.as_deref(), Some("first"));
        assert!(reducer.is_empty());
        assert!(!reducer.is_streaming());
    }
}
