//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes messages to consumers and makes minimal assumptions:
//!
//! - **Transport-agnostic**: in-memory channels today, a managed queue later.
//! - **At-least-once delivery**: a message may be delivered more than once;
//!   consumers must be idempotent.
//! - **No persistence**: the bus distributes, it does not store.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

/// A subscription to an event stream.
///
/// Each subscription receives every message published after it was created.
/// Subscriptions are meant for a single consuming task.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: UnboundedReceiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: UnboundedReceiver<M>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    /// Try to receive a message without waiting.
    pub fn try_recv(&mut self) -> Option<M> {
        self.receiver.try_recv().ok()
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// `publish()` can fail; failures are surfaced to the caller, which decides
/// whether the originating write should be reported as failed.
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
