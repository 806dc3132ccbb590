//! Periodic statistics logging

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

use crate::state::ConnectionState;

use super::shutdown_requested;

/// Logs a stats snapshot on a coarse timer. Never mutates state.
#[derive(Debug, Clone)]
pub struct StatsReporter {
    state: Arc<ConnectionState>,
    interval: Duration,
}

impl StatsReporter {
    pub fn new(state: Arc<ConnectionState>, interval: Duration) -> Self {
        Self { state, interval }
    }

    /// Log and return the current stats line
    pub fn report(&self) -> String {
        let line = self.state.stats().to_string();
        info!(stats = %line, "Client statistics");
        line
    }

    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + self.interval, self.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        self.report();
                    }
                    _ = shutdown_requested(&mut shutdown) => break,
                }
            }
        })
    }
}
