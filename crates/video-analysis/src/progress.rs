//! Progress fan-out and cooperative cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// Default number of buffered progress updates per subscriber
pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// One-way progress channel.
///
/// The pipeline publishes percentages; any number of subscribers (job
/// ledger, logging, status streams) may listen. Publishing never blocks and
/// is a no-op without subscribers.
#[derive(Debug, Clone)]
pub struct ProgressBus {
    tx: broadcast::Sender<u8>,
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<u8> {
        self.tx.subscribe()
    }

    /// Publish a percentage, clamped to 100
    pub fn report(&self, percent: u8) {
        let _ = self.tx.send(percent.min(100));
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(PROGRESS_CHANNEL_CAPACITY)
    }
}

/// Cooperative cancellation flag, checked between samples
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_sees_updates() {
        let bus = ProgressBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.report(10);
        bus.report(250);

        assert_eq!(first.recv().await.unwrap(), 10);
        assert_eq!(first.recv().await.unwrap(), 100);
        assert_eq!(second.recv().await.unwrap(), 10);
    }

    #[test]
    fn test_report_without_subscribers() {
        let bus = ProgressBus::default();
        bus.report(50);
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());

        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
