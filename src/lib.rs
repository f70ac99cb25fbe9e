//! Terminal chat client over a streaming completion endpoint.
//!
//! The pieces compose as: [`config`] resolves where to connect,
//! [`chat_api::ChatApiClient`] sends the request and decodes the `data: `
//! event stream, and [`session::ChatSession`] folds the decoded fragments into
//! a [`transcript::TranscriptReducer`] that a [`terminal::TerminalObserver`]
//! renders as it grows.

pub mod config;
pub mod logging;
pub mod session;
pub mod terminal;

pub use config::{ConfigError, StreamChatConfig};
pub use session::{history_messages, ChatSession, ChatTransport, SessionError, TurnOutcome};
pub use terminal::TerminalObserver;
