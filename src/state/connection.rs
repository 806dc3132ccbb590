//! Shared connection state
//!
//! One [`ConnectionState`] lives for the whole process and is shared by the
//! command loop, the heartbeat supervisor and the inbound event router. Every
//! accessor takes the single internal lock for its full read-modify-write, so no
//! caller ever sees a half-applied update.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::transport::SessionHandle;

use super::stats::{elapsed_between, format_duration, round_secs, ConnectionStats};

/// Capacity of the connection error history
pub const MAX_CONNECTION_ERRORS: usize = 10;

// ─────────────────────────────────────────────────────────────────
// Inner Record
// ─────────────────────────────────────────────────────────────────

struct Inner {
    connected: bool,
    session: Option<SessionHandle>,
    generation: u64,

    username: String,
    client_identity: String,
    current_room: String,

    connection_started_at: Option<DateTime<Utc>>,
    last_activity_at: DateTime<Utc>,
    last_heartbeat_sent_at: Option<DateTime<Utc>>,
    last_heartbeat_received_at: Option<DateTime<Utc>>,
    last_reconnect_attempt_at: Option<DateTime<Utc>>,

    messages_sent: u64,
    messages_received: u64,
    heartbeats_sent: u64,
    heartbeats_received: u64,

    connection_errors: VecDeque<String>,
}

// ─────────────────────────────────────────────────────────────────
// Connection State
// ─────────────────────────────────────────────────────────────────

/// Thread-safe record of session health and identity
pub struct ConnectionState {
    inner: Mutex<Inner>,
    identity_tx: watch::Sender<String>,
}

impl ConnectionState {
    /// Create a disconnected state for the given username
    pub fn new(username: impl Into<String>) -> Self {
        let (identity_tx, _) = watch::channel(String::new());

        Self {
            inner: Mutex::new(Inner {
                connected: false,
                session: None,
                generation: 0,
                username: username.into(),
                client_identity: String::new(),
                current_room: String::new(),
                connection_started_at: None,
                last_activity_at: Utc::now(),
                last_heartbeat_sent_at: None,
                last_heartbeat_received_at: None,
                last_reconnect_attempt_at: None,
                messages_sent: 0,
                messages_received: 0,
                heartbeats_sent: 0,
                heartbeats_received: 0,
                connection_errors: VecDeque::with_capacity(MAX_CONNECTION_ERRORS),
            }),
            identity_tx,
        }
    }

    // ─── Connection Status ──────────────────────────────────────

    /// Whether the session is marked connected
    pub fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    /// Update the connection flag, returning the previous value.
    ///
    /// Only an actual transition records timing: entering the connected state
    /// stamps `connection_started_at`, leaving it logs the session length.
    pub fn set_connected(&self, connected: bool) -> bool {
        let mut s = self.inner.lock();
        Self::transition(&mut s, connected)
    }

    /// [`set_connected`](Self::set_connected) for the session of `generation`.
    ///
    /// Returns `None` without touching anything when that session has been
    /// replaced or taken; the check and the update share one lock.
    pub fn set_connected_for(&self, generation: u64, connected: bool) -> Option<bool> {
        let mut s = self.inner.lock();
        if s.session.is_none() || s.generation != generation {
            return None;
        }
        Some(Self::transition(&mut s, connected))
    }

    /// Mark the session of `generation` connected under `identity`.
    ///
    /// Returns `false` when that session is no longer installed.
    pub fn confirm_session(&self, generation: u64, identity: impl Into<String>) -> bool {
        let identity = identity.into();
        let mut s = self.inner.lock();
        if s.session.is_none() || s.generation != generation {
            return false;
        }
        Self::transition(&mut s, true);
        s.client_identity = identity.clone();
        self.identity_tx.send_replace(identity);
        true
    }

    fn transition(s: &mut Inner, connected: bool) -> bool {
        let was_connected = s.connected;
        if was_connected == connected {
            return was_connected;
        }

        s.connected = connected;
        let now = Utc::now();
        if connected {
            s.connection_started_at = Some(now);
            info!(at = %now.to_rfc3339(), "Connection state: connected");
        } else {
            let length = s
                .connection_started_at
                .map(|started| elapsed_between(started, now))
                .unwrap_or_default();
            info!(after = %format_duration(length), "Connection state: disconnected");
        }

        was_connected
    }

    /// When the current (or last) session was marked connected
    pub fn connection_started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().connection_started_at
    }

    // ─── Session Handle ─────────────────────────────────────────

    /// Clone of the current session handle, if any
    pub fn session(&self) -> Option<SessionHandle> {
        self.inner.lock().session.clone()
    }

    /// Session handle only when connected with a live handle
    pub fn live_session(&self) -> Option<SessionHandle> {
        let s = self.inner.lock();
        if s.connected {
            s.session.clone()
        } else {
            None
        }
    }

    /// Replace the session handle wholesale and return its generation.
    ///
    /// A fresh server session has no identity or room membership yet, so both
    /// are cleared together with the swap.
    pub fn install_session(&self, session: SessionHandle) -> u64 {
        let generation = {
            let mut s = self.inner.lock();
            s.generation += 1;
            s.session = Some(session);
            s.client_identity.clear();
            s.current_room.clear();
            self.identity_tx.send_replace(String::new());
            s.generation
        };
        debug!(generation, "Session installed");
        generation
    }

    /// Remove and return the current session handle
    pub fn take_session(&self) -> Option<SessionHandle> {
        self.inner.lock().session.take()
    }

    /// Generation of the most recently installed session
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Whether `generation` still identifies the installed session
    pub fn is_current_generation(&self, generation: u64) -> bool {
        let s = self.inner.lock();
        s.session.is_some() && s.generation == generation
    }

    // ─── Identity ───────────────────────────────────────────────

    pub fn username(&self) -> String {
        self.inner.lock().username.clone()
    }

    pub fn set_username(&self, username: impl Into<String>) {
        self.inner.lock().username = username.into();
    }

    /// Identity assigned by the server on connect (empty until then)
    pub fn client_identity(&self) -> String {
        self.inner.lock().client_identity.clone()
    }

    pub fn set_client_identity(&self, identity: impl Into<String>) {
        let identity = identity.into();
        let mut s = self.inner.lock();
        s.client_identity = identity.clone();
        self.identity_tx.send_replace(identity);
    }

    /// Watch the client identity; used to wait for a new session's `connect`
    pub fn subscribe_identity(&self) -> watch::Receiver<String> {
        self.identity_tx.subscribe()
    }

    // ─── Rooms ──────────────────────────────────────────────────

    /// Current room (empty = global scope)
    pub fn current_room(&self) -> String {
        self.inner.lock().current_room.clone()
    }

    pub fn set_current_room(&self, room: impl Into<String>) {
        self.inner.lock().current_room = room.into();
    }

    /// Clear the current room only if it is `room`; returns whether it was cleared
    pub fn clear_room_if(&self, room: &str) -> bool {
        let mut s = self.inner.lock();
        if !s.current_room.is_empty() && s.current_room == room {
            s.current_room.clear();
            true
        } else {
            false
        }
    }

    // ─── Activity Tracking ──────────────────────────────────────

    pub fn track_message_sent(&self) {
        let mut s = self.inner.lock();
        s.messages_sent += 1;
        s.last_activity_at = Utc::now();
    }

    pub fn track_message_received(&self) {
        let mut s = self.inner.lock();
        s.messages_received += 1;
        s.last_activity_at = Utc::now();
    }

    pub fn track_heartbeat_sent(&self) {
        let mut s = self.inner.lock();
        let now = Utc::now();
        s.heartbeats_sent += 1;
        s.last_heartbeat_sent_at = Some(now);
        s.last_activity_at = now;
    }

    pub fn track_heartbeat_received(&self) {
        let mut s = self.inner.lock();
        let now = Utc::now();
        s.heartbeats_received += 1;
        s.last_heartbeat_received_at = Some(now);
        s.last_activity_at = now;
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.inner.lock().last_activity_at
    }

    pub fn set_last_reconnect_attempt(&self, at: DateTime<Utc>) {
        self.inner.lock().last_reconnect_attempt_at = Some(at);
    }

    /// Time since the server last proved it is alive.
    ///
    /// Measured from the latest heartbeat response, or from the start of the
    /// session when none has arrived yet. `None` if never connected.
    pub fn time_since_server_response(&self) -> Option<Duration> {
        let s = self.inner.lock();
        let reference = match (s.last_heartbeat_received_at, s.connection_started_at) {
            (Some(rx), Some(started)) => Some(rx.max(started)),
            (rx, started) => rx.or(started),
        }?;
        Some(elapsed_between(reference, Utc::now()))
    }

    // ─── Error History ──────────────────────────────────────────

    /// Record a connection error with a wall-clock prefix, evicting the oldest
    /// entry once the history is full.
    pub fn add_connection_error(&self, message: impl AsRef<str>) {
        let entry = format!("[{}] {}", Local::now().format("%H:%M:%S"), message.as_ref());
        let mut s = self.inner.lock();
        while s.connection_errors.len() >= MAX_CONNECTION_ERRORS {
            s.connection_errors.pop_front();
        }
        s.connection_errors.push_back(entry);
    }

    /// Copy of the error history, oldest first
    pub fn connection_errors(&self) -> Vec<String> {
        self.inner.lock().connection_errors.iter().cloned().collect()
    }

    // ─── Reporting ──────────────────────────────────────────────

    /// Snapshot of all counters and timings
    pub fn stats(&self) -> ConnectionStats {
        let s = self.inner.lock();
        let now = Utc::now();

        let duration = match s.connection_started_at {
            Some(started) if s.connected => elapsed_between(started, now),
            Some(started) => elapsed_between(started, s.last_activity_at),
            None => Duration::ZERO,
        };
        let since = |at: Option<DateTime<Utc>>| at.map(|t| round_secs(elapsed_between(t, now)));

        ConnectionStats {
            connected: s.connected,
            duration_secs: round_secs(duration),
            client_identity: s.client_identity.clone(),
            username: s.username.clone(),
            messages_sent: s.messages_sent,
            messages_received: s.messages_received,
            heartbeats_sent: s.heartbeats_sent,
            heartbeats_received: s.heartbeats_received,
            since_heartbeat_sent_secs: since(s.last_heartbeat_sent_at),
            since_heartbeat_received_secs: since(s.last_heartbeat_received_at),
            since_reconnect_attempt_secs: since(s.last_reconnect_attempt_at),
        }
    }

    /// Multi-line view used by `/debug`
    pub fn debug_report(&self) -> String {
        let s = self.inner.lock();
        let mut out = String::new();

        let _ = writeln!(out, "==== Debug Information ====");
        let _ = writeln!(out, "Connected: {}", s.connected);
        let _ = writeln!(out, "Username: {}", s.username);
        let _ = writeln!(out, "Client ID: {}", s.client_identity);
        let room = if s.current_room.is_empty() { "(global)" } else { s.current_room.as_str() };
        let _ = writeln!(out, "Current Room: {}", room);
        let _ = writeln!(out, "Last Activity: {}", s.last_activity_at.to_rfc3339());
        match s.session {
            Some(_) => {
                let _ = writeln!(out, "Session: active (generation {})", s.generation);
            }
            None => {
                let _ = writeln!(out, "Session: none");
            }
        }
        let _ = writeln!(out, "Connection Errors:");
        if s.connection_errors.is_empty() {
            let _ = writeln!(out, "  No connection errors recorded");
        }
        for (i, err) in s.connection_errors.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, err);
        }
        let _ = write!(out, "===========================");

        out
    }

    /// Shift the session start back in time
    #[cfg(test)]
    pub(crate) fn rewind_connection_start(&self, by: chrono::Duration) {
        let mut s = self.inner.lock();
        if let Some(started) = s.connection_started_at {
            s.connection_started_at = Some(started - by);
        }
    }
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.inner.lock();
        f.debug_struct("ConnectionState")
            .field("connected", &s.connected)
            .field("generation", &s.generation)
            .field("username", &s.username)
            .field("client_identity", &s.client_identity)
            .field("current_room", &s.current_room)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
