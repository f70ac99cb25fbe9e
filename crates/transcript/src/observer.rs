use crate::turn::ChatTurn;

/// Rendering-side collaborator notified by the reducer.
pub trait TranscriptObserver {
    /// Called after every transcript mutation with the full turn list.
    fn on_transcript_changed(&mut self, _turns: &[ChatTurn]) {}

    /// Called once per failed or cancelled assistant turn.
    fn on_error(&mut self, _message: &str) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoopObserver;

impl TranscriptObserver for NoopObserver {}

impl<O: TranscriptObserver + ?Sized> TranscriptObserver for &mut O {
    fn on_transcript_changed(&mut self, turns: &[ChatTurn]) {
        (**self).on_transcript_changed(turns);
    }

    fn on_error(&mut self, message: &str) {
        (**self).on_error(message);
    }
}

impl<O: TranscriptObserver + ?Sized> TranscriptObserver for Box<O> {
    fn on_transcript_changed(&mut self, turns: &[ChatTurn]) {
        (**self).on_transcript_changed(turns);
    }

    fn on_error(&mut self, message: &str) {
        (**self).on_error(message);
    }
}
