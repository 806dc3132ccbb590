//! Event transport capability
//!
//! The client core never touches the wire directly. It talks to a [`Transport`]
//! that opens sessions, and to the [`Session`] handles those produce:
//! - `connect` establishes a session and hands back its inbound event stream
//! - `emit` sends one named event, fire-and-return
//! - `close` tears the session down
//!
//! Inbound events are delivered on an `mpsc` channel and dispatched by the
//! [`EventRouter`](crate::events::EventRouter).

pub mod mock;
mod ws;

pub use ws::*;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{Error, Result};

/// Capacity of a session's inbound event queue
pub const INBOUND_QUEUE_SIZE: usize = 256;

// ─────────────────────────────────────────────────────────────────
// Events & Frames
// ─────────────────────────────────────────────────────────────────

/// A named event received from the server
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub name: String,
    pub payload: Value,
}

impl InboundEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Wire frame: `{"event": "<name>", "message": <payload>}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,

    #[serde(default)]
    pub message: Value,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, message: Value) -> Self {
        Self {
            event: event.into(),
            message,
        }
    }

    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON text frame
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::ProtocolMalformed {
            message: e.to_string(),
        })
    }

    /// Parse a JSON binary frame
    pub fn from_json_bytes(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| Error::ProtocolMalformed {
            message: e.to_string(),
        })
    }
}

impl From<EventFrame> for InboundEvent {
    fn from(frame: EventFrame) -> Self {
        InboundEvent::new(frame.event, frame.message)
    }
}

// ─────────────────────────────────────────────────────────────────
// Capability Traits
// ─────────────────────────────────────────────────────────────────

/// An established session with the server
#[async_trait]
pub trait Session: Send + Sync {
    /// Send one named event
    async fn emit(&self, event: &str, payload: Value) -> Result<()>;

    /// Close the session; later emits fail
    async fn close(&self) -> Result<()>;

    /// Whether the session still accepts emits
    fn is_open(&self) -> bool;
}

/// Shared handle to the active session
pub type SessionHandle = Arc<dyn Session>;

/// Result of a successful connect
pub struct Connection {
    pub session: SessionHandle,
    pub events: mpsc::Receiver<InboundEvent>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("open", &self.session.is_open())
            .finish_non_exhaustive()
    }
}

/// Opens sessions against a server URL
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Connection>;
}

// ─────────────────────────────────────────────────────────────────
// Server Endpoint
// ─────────────────────────────────────────────────────────────────

/// Where the server lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub secure: bool,
}

impl ServerEndpoint {
    /// Connect URL carrying the username as a query parameter
    pub fn url_for(&self, username: &str) -> Result<Url> {
        let scheme = if self.secure { "wss" } else { "ws" };
        let mut url = Url::parse(&format!("{}://{}:{}{}", scheme, self.host, self.port, self.path))?;
        url.query_pairs_mut()
            .append_pair("transport", "websocket")
            .append_pair("username", username);
        Ok(url)
    }
}

impl std::fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
