use crate::core::types::{FeedError, FeedEvent, FeedMessage};
use tokio::sync::mpsc;

/// Observer for a realtime subscription.
///
/// Every method has a no-op default so a handler only overrides the message
/// types it cares about. Callbacks run on the subscription task, in the order
/// frames arrive; a slow callback delays the next frame.
pub trait FeedHandler: Send + Sync {
    fn on_received(&self, _message: &FeedMessage) {}

    fn on_open(&self, _message: &FeedMessage) {}

    fn on_done(&self, _message: &FeedMessage) {}

    fn on_match(&self, _message: &FeedMessage) {}

    fn on_change(&self, _message: &FeedMessage) {}

    /// Decode failures, exchange error frames, connection loss and cancellation
    fn on_error(&self, _error: &FeedError) {}
}

/// Forwards every event into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<FeedEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FeedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: FeedEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

impl FeedHandler for ChannelHandler {
    fn on_received(&self, message: &FeedMessage) {
        self.forward(FeedEvent::Received(message.clone()));
    }

    fn on_open(&self, message: &FeedMessage) {
        self.forward(FeedEvent::Open(message.clone()));
    }

    fn on_done(&self, message: &FeedMessage) {
        self.forward(FeedEvent::Done(message.clone()));
    }

    fn on_match(&self, message: &FeedMessage) {
        self.forward(FeedEvent::Match(message.clone()));
    }

    fn on_change(&self, message: &FeedMessage) {
        self.forward(FeedEvent::Change(message.clone()));
    }

    fn on_error(&self, error: &FeedError) {
        self.forward(FeedEvent::Error(error.clone()));
    }
}
