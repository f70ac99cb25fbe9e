/// Receiver for one decoded response stream.
///
/// Callers can rely on this ordering: `on_delta` zero or more times, then
/// `on_error` at most once, then `on_done` exactly once. `on_done` fires on
/// every path, including transport failure and cancellation.
pub trait StreamHandler {
    fn on_delta(&mut self, fragment: &str);

    fn on_done(&mut self);

    fn on_error(&mut self, message: &str);
}

impl<H: StreamHandler + ?Sized> StreamHandler for &mut H {
    fn on_delta(&mut self, fragment: &str) {
        (**self).on_delta(fragment);
    }

    fn on_done(&mut self) {
        (**self).on_done();
    }

    fn on_error(&mut self, message: &str) {
        (**self).on_error(message);
    }
}

/// Handler that records every callback, useful for headless callers and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectingHandler {
    pub fragments: Vec<String>,
    pub errors: Vec<String>,
    pub done_count: usize,
}

impl CollectingHandler {
    /// Concatenation of every fragment in arrival order.
    pub fn text(&self) -> String {
        self.fragments.concat()
    }
}

impl StreamHandler for CollectingHandler {
    fn on_delta(&mut self, fragment: &str) {
        self.fragments.push(fragment.to_owned());
    }

    fn on_done(&mut self) {
        self.done_count += 1;
    }

    fn on_error(&mut self, message: &str) {
        self.errors.push(message.to_owned());
    }
}
