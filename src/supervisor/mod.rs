//! Background supervision
//!
//! - [`HeartbeatSupervisor`]: periodic liveness heartbeat and staleness check
//! - [`StatsReporter`]: periodic statistics log line
//! - [`ReconnectionManager`]: bounded, retried session establishment
//!
//! Timer loops are bound to a [`Shutdown`] signal and joined by the caller.

mod heartbeat;
mod reconnect;
mod stats;

pub use heartbeat::*;
pub use reconnect::*;
pub use stats::*;

use tokio::sync::watch;

// ─────────────────────────────────────────────────────────────────
// Shutdown Signal
// ─────────────────────────────────────────────────────────────────

/// One-shot shutdown broadcast for background loops
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Tell every subscriber to stop
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve once shutdown is signalled or the sender is gone
pub async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_wakes_subscribers() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        let waiter = tokio::spawn(async move { shutdown_requested(&mut rx).await });

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_shutdown() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut rx = shutdown.subscribe();
        shutdown_requested(&mut rx).await;
    }
}
