//! Event Router
//!
//! Maps inbound event names to handlers and pumps a session's event stream
//! through them.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::console::{Console, ConsoleHandle};
use crate::state::ConnectionState;
use crate::transport::InboundEvent;

/// Events that change session lifecycle; dropped when they come from a
/// replaced session
pub const LIFECYCLE_EVENTS: &[&str] = &["connect", "disconnect", "error"];

// ─────────────────────────────────────────────────────────────────
// Handler Types
// ─────────────────────────────────────────────────────────────────

/// What a handler sees while it runs
pub struct HandlerContext<'a> {
    pub state: &'a ConnectionState,
    pub console: &'a dyn Console,
    pub payload: &'a Value,
    pub generation: u64,
}

/// An outbound event a handler asks the router to send
#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    pub event: String,
    pub payload: Value,
}

impl Announcement {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// Result of running a handler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerOutcome {
    pub announcements: Vec<Announcement>,
}

impl HandlerOutcome {
    /// Nothing to send
    pub fn done() -> Self {
        Self::default()
    }

    pub fn announce(mut self, event: impl Into<String>, payload: Value) -> Self {
        self.announcements.push(Announcement::new(event, payload));
        self
    }
}

/// Synchronous event handler
pub type Handler = Box<dyn Fn(&HandlerContext<'_>) -> HandlerOutcome + Send + Sync>;

/// How a dispatched event was treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    Unbound,
    Stale,
}

// ─────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────

/// Dispatches inbound events to registered handlers
pub struct EventRouter {
    state: Arc<ConnectionState>,
    console: ConsoleHandle,
    handlers: HashMap<String, Handler>,
}

impl EventRouter {
    /// Router with no bindings
    pub fn new(state: Arc<ConnectionState>, console: ConsoleHandle) -> Self {
        Self {
            state,
            console,
            handlers: HashMap::new(),
        }
    }

    /// Bind `name` to `handler`, replacing any previous binding
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&HandlerContext<'_>) -> HandlerOutcome + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Box::new(handler));
    }

    /// Bind the same handler to several event names
    pub fn register_all<F>(&mut self, names: &[&str], handler: F)
    where
        F: Fn(&HandlerContext<'_>) -> HandlerOutcome + Clone + Send + Sync + 'static,
    {
        for name in names {
            self.register(*name, handler.clone());
        }
    }

    /// Bound event names, sorted
    pub fn bound_events(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn state(&self) -> &Arc<ConnectionState> {
        &self.state
    }

    /// Run the handler for one event from the session of `generation`
    pub async fn dispatch(&self, generation: u64, event: InboundEvent) -> Dispatch {
        if LIFECYCLE_EVENTS.contains(&event.name.as_str()) && !self.state.is_current_generation(generation) {
            debug!(event = %event.name, generation, "Dropping lifecycle event from replaced session");
            return Dispatch::Stale;
        }

        let Some(handler) = self.handlers.get(&event.name) else {
            debug!(event = %event.name, payload = %event.payload, "Ignoring unbound event");
            return Dispatch::Unbound;
        };

        let ctx = HandlerContext {
            state: &self.state,
            console: self.console.as_ref(),
            payload: &event.payload,
            generation,
        };
        let outcome = handler(&ctx);

        if !outcome.announcements.is_empty() {
            self.announce(generation, outcome.announcements).await;
        }

        Dispatch::Handled
    }

    async fn announce(&self, generation: u64, announcements: Vec<Announcement>) {
        if !self.state.is_current_generation(generation) {
            return;
        }
        let Some(session) = self.state.session() else {
            return;
        };

        for Announcement { event, payload } in announcements {
            match session.emit(&event, payload).await {
                Ok(()) => {
                    self.state.track_message_sent();
                    debug!(event = %event, "Announcement sent");
                }
                Err(e) => {
                    warn!(event = %event, error = %e, "Announcement failed");
                    self.state.add_connection_error(format!("Failed to send {}: {}", event, e));
                }
            }
        }
    }

    /// Dispatch every event from `events` until the stream closes
    pub fn spawn_pump(self: &Arc<Self>, generation: u64, mut events: mpsc::Receiver<InboundEvent>) -> JoinHandle<()> {
        let router = Arc::clone(self);
        tokio::spawn(async move {
            debug!(generation, "Event pump started");
            while let Some(event) = events.recv().await {
                router.dispatch(generation, event).await;
            }
            info!(generation, "Event stream closed");
        })
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("bound_events", &self.bound_events())
            .finish_non_exhaustive()
    }
}
