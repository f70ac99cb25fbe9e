use thiserror::Error;

use crate::turn::TurnId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("assistant turn {id} is still streaming")]
    TurnInFlight { id: TurnId },
}
