//! Heartbeat Supervisor
//!
//! Every period the supervisor sends `client_heartbeat` over the live session
//! and checks how long the server has been silent. Silence past the staleness
//! threshold is recorded as an advisory error; nothing is torn down.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::state::{format_duration, ConnectionState};

use super::shutdown_requested;

/// Heartbeat timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSettings {
    /// Time between heartbeats
    pub interval: Duration,

    /// Server silence after which a staleness warning is recorded
    pub stale_threshold: Duration,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            stale_threshold: Duration::from_secs(120),
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No live session or no identity yet
    Skipped,
    Sent { stale: bool },
    Failed { stale: bool },
}

/// Periodic liveness heartbeat over the active session
#[derive(Debug, Clone)]
pub struct HeartbeatSupervisor {
    state: Arc<ConnectionState>,
    settings: HeartbeatSettings,
}

impl HeartbeatSupervisor {
    pub fn new(state: Arc<ConnectionState>, settings: HeartbeatSettings) -> Self {
        Self { state, settings }
    }

    /// Run one heartbeat tick
    pub async fn tick(&self) -> TickOutcome {
        let Some(session) = self.state.live_session() else {
            debug!("Heartbeat skipped: not connected");
            return TickOutcome::Skipped;
        };
        let client_id = self.state.client_identity();
        if client_id.is_empty() {
            debug!("Heartbeat skipped: no client identity yet");
            return TickOutcome::Skipped;
        }

        let silence = self.state.time_since_server_response().unwrap_or_default();
        let username = self.state.username();
        let payload = json!({
            "clientId": client_id,
            "username": username,
            "timestamp": Utc::now().to_rfc3339(),
            "message": format!("Heartbeat from {}", username),
        });

        let sent = match session.emit("client_heartbeat", payload).await {
            Ok(()) => {
                self.state.track_heartbeat_sent();
                debug!(client_id = %client_id, "Heartbeat sent");
                true
            }
            Err(e) => {
                warn!(error = %e, "Heartbeat send failed");
                self.state.add_connection_error(format!("Heartbeat send failed: {}", e));
                false
            }
        };

        let stale = silence > self.settings.stale_threshold;
        if stale {
            warn!(silence = %format_duration(silence), "Server has not answered heartbeats");
            self.state
                .add_connection_error(format!("No heartbeat response in {}", format_duration(silence)));
        }

        if sent {
            TickOutcome::Sent { stale }
        } else {
            TickOutcome::Failed { stale }
        }
    }

    /// Tick every period until shutdown. The first tick comes one period in.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.settings.interval;
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = period.as_millis() as u64, "Heartbeat supervisor started");

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        self.tick().await;
                    }
                    _ = shutdown_requested(&mut shutdown) => {
                        break;
                    }
                }
            }

            info!("Heartbeat supervisor stopped");
        })
    }
}
