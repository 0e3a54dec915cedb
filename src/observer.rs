//! Observer surface.
//!
//! Monitors push every state transition and poll result to their
//! registered observers as a `(snapshot, message)` pair. Dispatch is
//! fire-and-forget: implementations must return quickly and never block
//! the polling task. For consumers that *are* slow (UI threads, file
//! sinks), `ChannelObserver` decouples them behind an unbounded channel.

use tokio::sync::mpsc;
use tracing::info;

use crate::types::Product;

/// A consumer of product status updates.
pub trait ProductObserver: Send + Sync {
    /// Called with a detached snapshot of the product and a human-readable
    /// message describing what just happened. Must not block.
    fn on_status(&self, product: &Product, message: &str);
}

// ---------------------------------------------------------------------------
// Shipped observers
// ---------------------------------------------------------------------------

/// Observer that emits status updates as structured log events.
#[derive(Debug, Default)]
pub struct LogObserver;

impl ProductObserver for LogObserver {
    fn on_status(&self, product: &Product, message: &str) {
        info!(
            product = %product.name,
            price = %product.current_price,
            status = %product.status,
            "{message}"
        );
    }
}

/// A status event delivered through a `ChannelObserver`.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub product: Product,
    pub message: String,
}

/// Observer that forwards events into an unbounded channel, so slow
/// consumers never serialize behind the polling task.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProductObserver for ChannelObserver {
    fn on_status(&self, product: &Product, message: &str) {
        // A closed receiver just means the consumer went away; dropping
        // the event is the fire-and-forget contract.
        let _ = self.tx.send(StatusEvent {
            product: product.clone(),
            message: message.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
