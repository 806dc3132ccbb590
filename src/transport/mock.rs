//! Mock transport for testing
//!
//! Provides scriptable implementations of [`Transport`] and [`Session`]: connect
//! failures on demand, a record of every emitted event, and an injector for
//! inbound server events.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

use crate::error::{Error, Result};

use super::{Connection, InboundEvent, Session, SessionHandle, Transport, INBOUND_QUEUE_SIZE};

// ─────────────────────────────────────────────────────────────────
// Mock Session
// ─────────────────────────────────────────────────────────────────

/// In-memory session that records emits
pub struct MockSession {
    emitted: RwLock<Vec<(String, Value)>>,
    fail_emits: AtomicBool,
    open: AtomicBool,
    inbound_tx: Mutex<Option<mpsc::Sender<InboundEvent>>>,
}

impl MockSession {
    /// Standalone session with no inbound channel
    pub fn new() -> Self {
        Self {
            emitted: RwLock::new(Vec::new()),
            fail_emits: AtomicBool::new(false),
            open: AtomicBool::new(true),
            inbound_tx: Mutex::new(None),
        }
    }

    /// Session wired to an inbound event channel
    pub fn with_channel() -> (Self, mpsc::Receiver<InboundEvent>) {
        let (tx, rx) = mpsc::channel(INBOUND_QUEUE_SIZE);
        let session = Self::new();
        *session.inbound_tx.lock() = Some(tx);
        (session, rx)
    }

    /// Make every following emit fail (or succeed again)
    pub fn set_fail_emits(&self, fail: bool) {
        self.fail_emits.store(fail, Ordering::SeqCst);
    }

    /// Every emitted `(event, payload)` pair, in order
    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.emitted.read().clone()
    }

    /// Names of emitted events, in order
    pub fn emitted_names(&self) -> Vec<String> {
        self.emitted.read().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Payloads emitted under `event`
    pub fn payloads_for(&self, event: &str) -> Vec<Value> {
        self.emitted
            .read()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Deliver an event as if the server had sent it
    pub fn inject(&self, name: &str, payload: Value) -> bool {
        match self.inbound_tx.lock().as_ref() {
            Some(tx) => tx.try_send(InboundEvent::new(name, payload)).is_ok(),
            None => false,
        }
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Session for MockSession {
    async fn emit(&self, event: &str, payload: Value) -> Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(Error::ConnectionLost {
                message: "session closed".to_string(),
            });
        }
        if self.fail_emits.load(Ordering::SeqCst) {
            return Err(Error::emit_failed(event, "mock emit failure"));
        }
        self.emitted.write().push((event.to_string(), payload));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            if let Some(tx) = self.inbound_tx.lock().take() {
                let _ = tx.try_send(InboundEvent::new("disconnect", json!({"reason": "client close"})));
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────────────────────────
// Mock Transport
// ─────────────────────────────────────────────────────────────────

/// Configuration for mock transport behavior
#[derive(Debug, Clone)]
pub struct MockTransportConfig {
    /// Number of connect calls that fail before one succeeds (`u32::MAX` = always)
    pub failing_connects: u32,

    /// Error text for failing connects
    pub failure_message: String,

    /// Queue a `connect` event with a generated identity on every new session
    pub announce_connect: bool,
}

impl Default for MockTransportConfig {
    fn default() -> Self {
        Self {
            failing_connects: 0,
            failure_message: "connection refused".to_string(),
            announce_connect: true,
        }
    }
}

/// Transport whose sessions are [`MockSession`]s
pub struct MockTransport {
    config: MockTransportConfig,
    failures_left: AtomicU32,
    attempts: RwLock<Vec<(Instant, Url)>>,
    sessions: RwLock<Vec<Arc<MockSession>>>,
}

impl MockTransport {
    /// Create a transport that always connects
    pub fn new() -> Self {
        Self::with_config(MockTransportConfig::default())
    }

    /// Create a transport whose connects always fail
    pub fn always_failing() -> Self {
        Self::with_config(MockTransportConfig {
            failing_connects: u32::MAX,
            ..Default::default()
        })
    }

    pub fn with_config(config: MockTransportConfig) -> Self {
        Self {
            failures_left: AtomicU32::new(config.failing_connects),
            config,
            attempts: RwLock::new(Vec::new()),
            sessions: RwLock::new(Vec::new()),
        }
    }

    /// Number of connect calls so far
    pub fn attempt_count(&self) -> usize {
        self.attempts.read().len()
    }

    /// When each connect call happened
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.read().iter().map(|(at, _)| *at).collect()
    }

    /// URLs passed to connect, in order
    pub fn attempt_urls(&self) -> Vec<Url> {
        self.attempts.read().iter().map(|(_, url)| url.clone()).collect()
    }

    /// Sessions handed out so far
    pub fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.sessions.read().clone()
    }

    /// Most recently created session
    pub fn last_session(&self) -> Option<Arc<MockSession>> {
        self.sessions.read().last().cloned()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, url: &Url) -> Result<Connection> {
        self.attempts.write().push((Instant::now(), url.clone()));

        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            if left != u32::MAX {
                self.failures_left.store(left - 1, Ordering::SeqCst);
            }
            return Err(Error::connection_failed(url.as_str(), self.config.failure_message.clone()));
        }

        let (session, events) = MockSession::with_channel();
        let session = Arc::new(session);
        if self.config.announce_connect {
            let id = format!("mock-{}", &uuid::Uuid::new_v4().to_string()[..8]);
            session.inject("connect", json!({ "id": id }));
        }
        self.sessions.write().push(session.clone());

        let handle: SessionHandle = session;
        Ok(Connection {
            session: handle,
            events,
        })
    }
}
