//! Message sinks.

use tokio::sync::mpsc;

/// Receives messages for a subscription.
///
/// Called from the connection's receive task, one message at a time, in
/// arrival order. An implementation that blocks stalls delivery for every
/// other subscription, so long work should be handed off (see
/// [`forward_unbounded`] and [`forward_bounded`]).
pub trait Listener: Send + Sync + 'static {
    fn on_message(&self, channel: &str, payload: &[u8]);
}

impl<F> Listener for F
where
    F: Fn(&str, &[u8]) + Send + Sync + 'static,
{
    fn on_message(&self, channel: &str, payload: &[u8]) {
        self(channel, payload)
    }
}

/// An owned copy of one delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

/// A listener that forwards into an unbounded channel.
///
/// Messages arriving after the receiver is dropped are discarded.
pub fn forward_unbounded(tx: mpsc::UnboundedSender<ReceivedMessage>) -> impl Listener {
    move |channel: &str, payload: &[u8]| {
        let _ = tx.send(ReceivedMessage {
            channel: channel.to_string(),
            payload: payload.to_vec(),
        });
    }
}

/// A listener that forwards into a bounded channel without waiting.
///
/// When the channel is full the message is dropped with a warning.
pub fn forward_bounded(tx: mpsc::Sender<ReceivedMessage>) -> impl Listener {
    move |channel: &str, payload: &[u8]| {
        let message = ReceivedMessage {
            channel: channel.to_string(),
            payload: payload.to_vec(),
        };
        if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(message) {
            tracing::warn!(channel, "listener queue full, dropping message");
        }
    }
}
