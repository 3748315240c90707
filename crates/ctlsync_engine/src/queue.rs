//! Bounded hand-off queue between the engine and its consumer.
//!
//! The engine is the only producer. A push waits while the queue is full, so
//! a slow consumer stalls the reconcile tick instead of losing events. The
//! stream ends once the engine's worker has exited and dropped its sender.

use ctlsync_protocol::ChangeEvent;
use tokio::sync::mpsc;

/// Capacity of the queue created by the engine.
pub const EVENT_QUEUE_CAPACITY: usize = 10;

/// Creates a bounded event queue.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn event_queue(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender { tx }, EventReceiver { rx })
}

/// Producing half of the event queue.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<ChangeEvent>,
}

impl EventSender {
    /// Pushes an event, waiting for space if the queue is full.
    ///
    /// Returns `false` if the receiver is gone; the event is discarded.
    pub async fn push(&self, event: ChangeEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Returns true if the receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consuming half of the event queue.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<ChangeEvent>,
}

impl EventReceiver {
    /// Receives the next event.
    ///
    /// Returns `None` once the queue is drained and the engine has shut down.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Receives an event if one is ready.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }

    /// Receives the next event from outside the async runtime.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async execution context.
    pub fn blocking_recv(&mut self) -> Option<ChangeEvent> {
        self.rx.blocking_recv()
    }

    /// Takes every event that is ready without waiting.
    pub fn drain_ready(&mut self) -> Vec<ChangeEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Returns the number of events waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true if no event is waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Returns true if the stream has ended: nothing is waiting and no
    /// producer is left.
    pub fn is_finished(&self) -> bool {
        self.rx.is_closed() && self.rx.is_empty()
    }
}
