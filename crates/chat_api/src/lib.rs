//! Transport-only chat completion client primitives.
//!
//! This crate owns request building, endpoint normalization, and incremental
//! decoding of the line-oriented `data: ` event stream returned by the chat
//! endpoint. It contains no transcript state and no rendering concerns.
//!
//! Decoded output reaches callers through [`StreamHandler`]: `on_delta` zero or
//! more times, `on_error` at most once, and `on_done` exactly once on every
//! exit path.
//!
//! Malformed records are never surfaced as errors. A record that fails to
//! parse mid-stream is treated as not yet complete and retried against later
//! bytes; during the end-of-stream flush it is dropped.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod headers;
pub mod payload;
pub mod sse;
pub mod url;

pub use client::{decode_stream, CancellationSignal, ChatApiClient};
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use events::StreamEvent;
pub use handler::{CollectingHandler, StreamHandler};
pub use payload::{ChatMessage, ChatRequest, ChatRole};
pub use sse::StreamDecoder;
pub use url::normalize_chat_url;
