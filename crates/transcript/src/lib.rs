//! In-memory conversation transcript fed by a streaming response.
//!
//! [`TranscriptReducer`] owns the ordered list of [`ChatTurn`]s. At most one
//! assistant turn is open at a time and it is always the last turn. An open
//! turn is only inserted once its first fragment arrives, grows in place as
//! fragments follow, and is removed entirely if its stream fails.

mod error;
mod observer;
mod reducer;
mod turn;

pub use error::TranscriptError;
pub use observer::{NoopObserver, TranscriptObserver};
pub use reducer::TranscriptReducer;
pub use turn::{ChatTurn, Role, TurnId};
