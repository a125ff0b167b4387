//! The update stream handed from a push transport to the session.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::TransportEvent;

/// Capacity of the channel between the background event loop and the session.
///
/// When the session falls this far behind, the event loop waits for room
/// instead of dropping frames, so arrival order is always kept.
pub const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Ordered stream of [`TransportEvent`]s.
///
/// Implements [`Stream`]; the session also uses [`try_recv`](Self::try_recv)
/// to drain whatever is queued without waiting.
#[derive(Debug)]
pub struct UpdateStream {
    receiver: mpsc::Receiver<TransportEvent>,
}

impl UpdateStream {
    /// Create a bounded channel and the stream reading from it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<TransportEvent>, Self) {
        let (tx, receiver) = mpsc::channel(capacity);
        (tx, Self { receiver })
    }

    /// Wait for the next event. Returns `None` once the sender is gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.receiver.recv().await
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Whether the sending side has gone away.
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Stream for UpdateStream {
    type Item = TransportEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
