//! Fan-out of stored run transitions to observers.
//!
//! The run store is the record of what happened; the bus only tells
//! dashboards and notification hooks about it. A pass that is repeated after a
//! crash may publish the same transition again, so observers key on
//! `(run_id, sequence_number)`.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

/// Receiving end handed out by [`EventBus::subscribe`]. Sees every message
/// published after it was created.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Everything buffered so far, oldest first. Never blocks.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }

    /// Wait up to `timeout` for the next message. `None` on timeout or once
    /// the bus is gone.
    pub fn next_within(&self, timeout: Duration) -> Option<M> {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Publisher of run transitions.
///
/// ```text
/// Run::handle → RunStore::append → EventBus::publish → observers
/// ```
///
/// A publish error leaves the stored transition in place; callers surface it
/// and may republish.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
