/**
 * Broadcast Signal Sink
 *
 * Signals are published on a `tokio::sync::broadcast` channel. Queue
 * adapters (and tests) subscribe to the channel and forward what they
 * receive; with no subscriber the signal is dropped and logged.
 */

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::backend::signals::{Signal, SignalSink};

/// Default channel capacity
const SIGNAL_CAPACITY: usize = 1024;

/// Publish a signal to every subscriber
///
/// # Arguments
///
/// * `sender` - The broadcast sender
/// * `signal` - The signal to publish
///
/// # Returns
///
/// Number of subscribers that received the signal (0 if none)
pub fn broadcast_signal(sender: &broadcast::Sender<Signal>, signal: Signal) -> usize {
    let kind = signal.kind();
    let page_id = signal.page_id();
    match sender.send(signal) {
        Ok(subscriber_count) => {
            tracing::info!(
                "[Signals] {} for page {} sent to {} subscribers",
                kind,
                page_id,
                subscriber_count
            );
            subscriber_count
        }
        Err(_) => {
            tracing::debug!("[Signals] No subscribers for {} on page {}", kind, page_id);
            0
        }
    }
}

/// Sink backed by a broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastSignalSink {
    sender: broadcast::Sender<Signal>,
}

impl BroadcastSignalSink {
    /// Create a sink with the default capacity
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self { sender }
    }

    /// Receive every signal emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSignalSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalSink for BroadcastSignalSink {
    async fn emit(&self, signal: Signal) {
        broadcast_signal(&self.sender, signal);
    }
}
