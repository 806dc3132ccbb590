//! Connection statistics snapshot
//!
//! The `Display` form of [`ConnectionStats`] is the single-line report shown by
//! `/stats` and forwarded to the log by the stats reporter. Field order is fixed;
//! log collectors parse it.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time view of a [`ConnectionState`](super::ConnectionState)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    /// Whether the session is currently up
    pub connected: bool,

    /// Uptime while connected, last session length otherwise (seconds)
    pub duration_secs: u64,

    /// Identity assigned by the server
    pub client_identity: String,

    /// Current username
    pub username: String,

    pub messages_sent: u64,
    pub messages_received: u64,
    pub heartbeats_sent: u64,
    pub heartbeats_received: u64,

    /// Seconds since the last heartbeat went out (`None` = never)
    pub since_heartbeat_sent_secs: Option<u64>,

    /// Seconds since the last heartbeat response (`None` = never)
    pub since_heartbeat_received_secs: Option<u64>,

    /// Seconds since the last reconnect attempt (`None` = never attempted)
    pub since_reconnect_attempt_secs: Option<u64>,
}

impl ConnectionStats {
    /// Status label used in the report
    pub fn status(&self) -> &'static str {
        if self.connected {
            "Connected"
        } else {
            "Disconnected"
        }
    }
}

impl fmt::Display for ConnectionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Status: {}, Duration: {}, Client ID: {}, Username: {}, \
             Messages Sent: {}, Messages Received: {}, Heartbeats Sent: {}, Heartbeats Received: {}, \
             Time Since Last Heartbeat Sent: {}, Time Since Last Heartbeat Received: {}",
            self.status(),
            format_secs(self.duration_secs),
            self.client_identity,
            self.username,
            self.messages_sent,
            self.messages_received,
            self.heartbeats_sent,
            self.heartbeats_received,
            format_since(self.since_heartbeat_sent_secs),
            format_since(self.since_heartbeat_received_secs),
        )?;

        if let Some(secs) = self.since_reconnect_attempt_secs {
            write!(f, ", Last reconnect attempt: {} ago", format_secs(secs))?;
        }

        Ok(())
    }
}

fn format_since(secs: Option<u64>) -> String {
    secs.map(format_secs).unwrap_or_else(|| "Never".to_string())
}

/// Render whole seconds as `45s`, `2m5s`, `1h0m3s`
pub fn format_secs(total: u64) -> String {
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Render a duration rounded to the nearest second
pub fn format_duration(duration: Duration) -> String {
    format_secs(round_secs(duration))
}

/// Round a duration to the nearest whole second
pub fn round_secs(duration: Duration) -> u64 {
    (duration.as_millis() as u64 + 500) / 1000
}

/// Elapsed time from `earlier` to `later`, zero if the clock went backwards
pub(crate) fn elapsed_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConnectionStats {
        ConnectionStats {
            connected: true,
            duration_secs: 125,
            client_identity: "abc123".to_string(),
            username: "alice".to_string(),
            messages_sent: 3,
            messages_received: 7,
            heartbeats_sent: 2,
            heartbeats_received: 1,
            since_heartbeat_sent_secs: Some(4),
            since_heartbeat_received_secs: None,
            since_reconnect_attempt_secs: None,
        }
    }

    #[test]
    fn test_format_secs() {
        assert_eq!(format_secs(0), "0s");
        assert_eq!(format_secs(45), "45s");
        assert_eq!(format_secs(125), "2m5s");
        assert_eq!(format_secs(3603), "1h0m3s");
    }

    #[test]
    fn test_round_secs() {
        assert_eq!(round_secs(Duration::from_millis(1499)), 1);
        assert_eq!(round_secs(Duration::from_millis(1500)), 2);
        assert_eq!(round_secs(Duration::ZERO), 0);
    }

    #[test]
    fn test_display_field_order() {
        let line = sample().to_string();
        assert_eq!(
            line,
            "Status: Connected, Duration: 2m5s, Client ID: abc123, Username: alice, \
             Messages Sent: 3, Messages Received: 7, Heartbeats Sent: 2, Heartbeats Received: 1, \
             Time Since Last Heartbeat Sent: 4s, Time Since Last Heartbeat Received: Never"
        );
    }

    #[test]
    fn test_display_reconnect_suffix() {
        let mut stats = sample();
        stats.connected = false;
        stats.since_reconnect_attempt_secs = Some(61);
        let line = stats.to_string();
        assert!(line.starts_with("Status: Disconnected"));
        assert!(line.ends_with(", Last reconnect attempt: 1m1s ago"));
    }

    #[test]
    fn test_elapsed_never_negative() {
        let now = Utc::now();
        let later = now + chrono::Duration::seconds(5);
        assert_eq!(elapsed_between(later, now), Duration::ZERO);
        assert_eq!(elapsed_between(now, later), Duration::from_secs(5));
    }
}
