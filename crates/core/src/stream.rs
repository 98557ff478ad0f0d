//! Event delivery to the consumer attached to a run.
//!
//! Two styles are supported and the step loop cannot tell them apart:
//! - [`CallbackSink`] runs a closure in-line, for blocking callers;
//! - [`EventStream`] queues onto a bounded channel for event-loop consumers
//!   and drops the event when the queue is full or the receiver is gone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::event::Event;

/// Default queue depth for [`EventStream::channel`].
pub const DEFAULT_CAPACITY: usize = 100;

/// Receives the events of one run. `emit` must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: Event) {
        (**self).emit(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn emit(&self, event: Event) {
        (**self).emit(event);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// Delivers events synchronously by calling a closure.
pub struct CallbackSink<F> {
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: Fn(Event) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> EventSink for CallbackSink<F>
where
    F: Fn(Event) + Send + Sync,
{
    fn emit(&self, event: Event) {
        (self.callback)(event);
    }
}

/// Sending half of a bounded event queue.
#[derive(Debug, Clone)]
pub struct EventStream {
    sender: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventStream {
    /// Create a stream and the receiver the consumer listens on.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let stream = Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (stream, receiver)
    }

    /// Number of events discarded so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for EventStream {
    fn emit(&self, event: Event) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Event queue full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Event consumer gone, dropping event");
            }
        }
    }
}
