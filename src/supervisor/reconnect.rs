//! Reconnection Manager
//!
//! Establishes a session with a bounded number of fixed-delay attempts. Never
//! schedules itself: it runs once at startup and again on explicit request.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::events::EventRouter;
use crate::state::{format_duration, ConnectionState};
use crate::transport::{Connection, ServerEndpoint, Transport};

/// Retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectSettings {
    pub max_attempts: u32,

    /// Pause between attempts (none after the last)
    pub delay: Duration,

    /// How long to wait for the server to assign an identity
    pub settle_timeout: Duration,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
            settle_timeout: Duration::from_secs(3),
        }
    }
}

/// Result of a successful connect sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// The server confirmed the session with an identity
    Confirmed { generation: u64, client_id: String },
    /// Transport is up but no `connect` arrived within the settle timeout
    Unconfirmed { generation: u64 },
}

impl ReconnectOutcome {
    pub fn generation(&self) -> u64 {
        match self {
            ReconnectOutcome::Confirmed { generation, .. } | ReconnectOutcome::Unconfirmed { generation } => {
                *generation
            }
        }
    }
}

/// Owns session establishment and teardown
pub struct ReconnectionManager {
    transport: Arc<dyn Transport>,
    router: Arc<EventRouter>,
    state: Arc<ConnectionState>,
    pub(crate) endpoint: ServerEndpoint,
    settings: ReconnectSettings,
    pumps: Mutex<Vec<JoinHandle<()>>>,
}

impl ReconnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        router: Arc<EventRouter>,
        endpoint: ServerEndpoint,
        settings: ReconnectSettings,
    ) -> Self {
        Self {
            state: router.state().clone(),
            transport,
            router,
            endpoint,
            settings,
            pumps: Mutex::new(Vec::new()),
        }
    }

    /// Drop the current session (if any) and establish a new one
    pub async fn reconnect(&self) -> Result<ReconnectOutcome> {
        if self.state.session().is_some() {
            info!(connected = self.state.is_connected(), "Closing current session before reconnecting");
            self.close_session().await;
        }

        let url = self.endpoint.url_for(&self.state.username())?;
        let attempts = self.settings.max_attempts.max(1);
        let mut backoff = Constant::new(self.settings.delay);
        let mut attempt = 0;

        let connection = loop {
            attempt += 1;
            self.state.set_last_reconnect_attempt(Utc::now());
            info!(attempt, max = attempts, server = %self.endpoint, "Connecting to server");

            match self.transport.connect(&url).await {
                Ok(connection) => break connection,
                Err(e) if attempt >= attempts || !e.is_retryable() => {
                    error!(attempts = attempt, error = %e.format_for_log(), "Reconnection failed");
                    self.state
                        .add_connection_error(format!("Reconnection failed after {} attempts: {}", attempt, e));
                    return Err(Error::ReconnectExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = backoff.next_backoff().unwrap_or(self.settings.delay);
                    warn!(
                        attempt,
                        error = %e.format_for_log(),
                        delay_ms = delay.as_millis() as u64,
                        "Connection attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        Ok(self.install(connection).await)
    }

    async fn install(&self, connection: Connection) -> ReconnectOutcome {
        let Connection { session, events } = connection;

        let generation = self.state.install_session(session);
        let mut identity = self.state.subscribe_identity();
        self.state.set_connected(true);

        {
            let mut pumps = self.pumps.lock();
            pumps.retain(|pump| !pump.is_finished());
            pumps.push(self.router.spawn_pump(generation, events));
        }

        let wait = async {
            loop {
                let current = (*identity.borrow_and_update()).clone();
                if !current.is_empty() {
                    return Some(current);
                }
                if identity.changed().await.is_err() {
                    return None;
                }
            }
        };

        match tokio::time::timeout(self.settings.settle_timeout, wait).await {
            Ok(Some(client_id)) => {
                info!(generation, client_id = %client_id, "Session established");
                ReconnectOutcome::Confirmed { generation, client_id }
            }
            _ => {
                warn!(generation, "Server did not confirm the session in time");
                self.state.add_connection_error(format!(
                    "Reconnect not confirmed after {}",
                    format_duration(self.settings.settle_timeout)
                ));
                ReconnectOutcome::Unconfirmed { generation }
            }
        }
    }

    /// Mark disconnected, then close and drop the current session
    async fn close_session(&self) {
        self.state.set_connected(false);
        if let Some(session) = self.state.take_session() {
            if let Err(e) = session.close().await {
                debug!(error = %e, "Error while closing session");
            }
        }
    }

    /// Close the session and wait for event pumps to drain
    pub async fn shutdown(&self) {
        self.close_session().await;

        let pumps: Vec<_> = self.pumps.lock().drain(..).collect();
        for pump in pumps {
            if tokio::time::timeout(Duration::from_secs(2), pump).await.is_err() {
                debug!("Event pump did not finish in time");
            }
        }
    }
}

impl std::fmt::Debug for ReconnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectionManager")
            .field("endpoint", &self.endpoint)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::console::BufferConsole;
    use crate::transport::mock::{MockTransport, MockTransportConfig};
    use crate::transport::Session;

    fn endpoint() -> ServerEndpoint {
        ServerEndpoint {
            host: "127.0.0.1".to_string(),
            port: 8000,
            path: "/socket.io/".to_string(),
            secure: false,
        }
    }

    fn manager(transport: Arc<MockTransport>) -> (ReconnectionManager, Arc<ConnectionState>) {
        let state = Arc::new(ConnectionState::new("alice"));
        let router = Arc::new(EventRouter::with_default_bindings(
            state.clone(),
            Arc::new(BufferConsole::new()),
            None,
        ));
        let manager = ReconnectionManager::new(transport, router, endpoint(), ReconnectSettings::default());
        (manager, state)
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_makes_three_spaced_attempts() {
        let transport = Arc::new(MockTransport::always_failing());
        let (manager, state) = manager(transport.clone());

        let err = manager.reconnect().await.unwrap_err();
        match &err {
            Error::ReconnectExhausted { attempts, source } => {
                assert_eq!(*attempts, 3);
                assert!(matches!(**source, Error::ConnectionFailed { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let times = transport.attempt_times();
        assert_eq!(times.len(), 3);
        for pair in times.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_secs(2) && gap < Duration::from_millis(2100), "{gap:?}");
        }

        assert!(!state.is_connected());
        let errors = state.connection_errors();
        assert!(errors.last().unwrap().contains("Reconnection failed after 3 attempts"));
        assert!(state.stats().since_reconnect_attempt_secs.is_some());
    }

    /// Fails every connect with a fixed error
    struct RefusingTransport {
        error: fn() -> Error,
        attempts: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl Transport for RefusingTransport {
        async fn connect(&self, _url: &url::Url) -> Result<Connection> {
            self.attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err((self.error)())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_after_first_attempt() {
        let transport = Arc::new(RefusingTransport {
            error: || Error::ProtocolMalformed {
                message: "bad handshake".into(),
            },
            attempts: Default::default(),
        });
        let state = Arc::new(ConnectionState::new("alice"));
        let router = Arc::new(EventRouter::with_default_bindings(
            state.clone(),
            Arc::new(BufferConsole::new()),
            None,
        ));
        let manager = ReconnectionManager::new(transport.clone(), router, endpoint(), ReconnectSettings::default());

        let started = tokio::time::Instant::now();
        let err = manager.reconnect().await.unwrap_err();
        assert!(matches!(
            err,
            Error::ReconnectExhausted { attempts: 1, ref source } if matches!(**source, Error::ProtocolMalformed { .. })
        ));
        assert_eq!(transport.attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(state.connection_errors()[0].contains("Reconnection failed after 1 attempts"));
    }

    #[tokio::test]
    async fn test_connect_confirms_identity_and_announces() {
        let transport = Arc::new(MockTransport::new());
        let (manager, state) = manager(transport.clone());

        let outcome = manager.reconnect().await.unwrap();
        let ReconnectOutcome::Confirmed { client_id, .. } = outcome else {
            panic!("expected confirmation, got {outcome:?}");
        };
        assert!(client_id.starts_with("mock-"));
        assert!(state.is_connected());
        assert_eq!(state.client_identity(), client_id);

        // The set_username announcement follows the identity update
        tokio::time::sleep(Duration::from_millis(50)).await;
        let session = transport.last_session().unwrap();
        assert_eq!(session.payloads_for("set_username"), vec![serde_json::json!("alice")]);

        let url = &transport.attempt_urls()[0];
        assert!(url.query_pairs().any(|(k, v)| k == "username" && v == "alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let transport = Arc::new(MockTransport::with_config(MockTransportConfig {
            failing_connects: 2,
            ..Default::default()
        }));
        let (manager, state) = manager(transport.clone());

        assert!(manager.reconnect().await.is_ok());
        assert_eq!(transport.attempt_count(), 3);
        assert!(state.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_session_is_advisory() {
        let transport = Arc::new(MockTransport::with_config(MockTransportConfig {
            announce_connect: false,
            ..Default::default()
        }));
        let (manager, state) = manager(transport);

        let outcome = manager.reconnect().await.unwrap();
        assert!(matches!(outcome, ReconnectOutcome::Unconfirmed { .. }));
        assert!(state.connection_errors()[0].contains("Reconnect not confirmed after 3s"));
    }

    #[tokio::test]
    async fn test_forced_reconnect_replaces_session() {
        let transport = Arc::new(MockTransport::new());
        let (manager, state) = manager(transport.clone());

        let first = manager.reconnect().await.unwrap();
        state.set_current_room("group-1");
        let second = manager.reconnect().await.unwrap();

        assert_eq!(second.generation(), first.generation() + 1);
        let sessions = transport.sessions();
        assert_eq!(sessions.len(), 2);
        assert!(!sessions[0].is_open());
        assert!(sessions[1].is_open());

        // The old session's disconnect was expected and stale
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(state.is_connected());
        assert!(state.current_room().is_empty());
        assert!(!state
            .connection_errors()
            .iter()
            .any(|e| e.contains("Unexpected disconnection")));
    }

    #[tokio::test]
    async fn test_shutdown_closes_session() {
        let transport = Arc::new(MockTransport::new());
        let (manager, state) = manager(transport.clone());
        manager.reconnect().await.unwrap();

        manager.shutdown().await;
        assert!(!state.is_connected());
        assert!(state.session().is_none());
        assert!(!transport.last_session().unwrap().is_open());
    }
}
