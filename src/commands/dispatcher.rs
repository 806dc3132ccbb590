//! Command Dispatcher
//!
//! Turns user lines into protocol actions. Send-type commands check the session
//! before anything else; argument problems stay local and never reach the
//! transport or the error history.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::console::ConsoleHandle;
use crate::error::Error;
use crate::state::ConnectionState;
use crate::supervisor::{ReconnectOutcome, ReconnectionManager};
use crate::transport::SessionHandle;

use super::help::{unknown_command_hint, HELP_TEXT};
use super::parse::{line_requires_connection, validate_username, Command, ParseError};

/// Whether the input loop should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    Quit,
}

/// Executes user commands against the shared state
pub struct CommandDispatcher {
    state: Arc<ConnectionState>,
    console: ConsoleHandle,
    reconnector: Arc<ReconnectionManager>,
}

impl CommandDispatcher {
    pub fn new(state: Arc<ConnectionState>, console: ConsoleHandle, reconnector: Arc<ReconnectionManager>) -> Self {
        Self {
            state,
            console,
            reconnector,
        }
    }

    /// Handle one input line
    pub async fn dispatch(&self, line: &str) -> CommandOutcome {
        if line_requires_connection(line) && self.live_session().is_none() {
            return CommandOutcome::Continue;
        }

        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(ParseError::Empty) => return CommandOutcome::Continue,
            Err(ParseError::Usage(usage)) => {
                self.console.line(usage);
                return CommandOutcome::Continue;
            }
            Err(ParseError::RoomKind(kind)) => {
                self.console.line(&format!("Room type must be 'group' or 'guild' (got '{}')", kind));
                return CommandOutcome::Continue;
            }
            Err(ParseError::Unknown(token)) => {
                self.console.line(&unknown_command_hint(&token));
                return CommandOutcome::Continue;
            }
        };

        debug!(command = ?command, "Dispatching command");
        self.execute(command).await
    }

    async fn execute(&self, command: Command) -> CommandOutcome {
        match command {
            Command::Heartbeat => self.send_heartbeat().await,
            Command::Username(name) => self.change_username(name).await,
            Command::Stats => {
                self.console.line("Client Statistics:");
                self.console.line(&self.state.stats().to_string());
            }
            Command::Debug => self.console.block(&self.state.debug_report()),
            Command::Errors => self.show_errors(),
            Command::ForceReconnect => self.force_reconnect().await,
            Command::Help => self.console.block(HELP_TEXT),
            Command::Quit => {
                self.console.line("Disconnecting...");
                return CommandOutcome::Quit;
            }
            send => self.send(send).await,
        }
        CommandOutcome::Continue
    }

    /// Session handle, or print the precondition failure
    fn live_session(&self) -> Option<SessionHandle> {
        let session = self.state.live_session();
        if session.is_none() {
            self.console.line("Error: Not connected to server");
            self.console.line("   Use /forcereconnect to attempt reconnection");
        }
        session
    }

    // ─── Sends ──────────────────────────────────────────────────

    async fn send(&self, command: Command) {
        let Some((event, payload)) = command.outbound(&self.state.username()) else {
            return;
        };
        let Some(session) = self.live_session() else {
            return;
        };

        match session.emit(event, payload).await {
            Ok(()) => {
                self.state.track_message_sent();
                info!(event, "Sent");
                self.console.line(&confirmation(&command));
            }
            Err(e) => self.report_emit_failure(event, &e),
        }
    }

    async fn send_heartbeat(&self) {
        let Some(session) = self.live_session() else {
            return;
        };

        let username = self.state.username();
        let payload = json!({
            "clientId": self.state.client_identity(),
            "username": username,
            "timestamp": Utc::now().to_rfc3339(),
            "message": format!("Manual heartbeat from {}", username),
        });

        match session.emit("client_heartbeat", payload).await {
            Ok(()) => {
                self.state.track_heartbeat_sent();
                self.console.line("Manual heartbeat sent");
            }
            Err(e) => self.report_emit_failure("client_heartbeat", &e),
        }
    }

    fn report_emit_failure(&self, event: &str, error: &Error) {
        warn!(event, error = %error, "Emit failed");
        self.console.line(&format!("Error sending {}: {}", event, error));
        self.state.add_connection_error(format!("Failed to send {}: {}", event, error));
    }

    // ─── Local Commands ─────────────────────────────────────────

    async fn change_username(&self, name: String) {
        if let Err(reason) = validate_username(&name) {
            self.console.line(&format!("Invalid username: {}", reason));
            return;
        }

        let old = self.state.username();
        self.state.set_username(name.clone());
        info!(old = %old, new = %name, "Username changed");
        self.console.line(&format!("Username changed to: {}", name));

        let Some(session) = self.state.live_session() else {
            return;
        };
        match session.emit("set_username", json!(name)).await {
            Ok(()) => self.state.track_message_sent(),
            Err(e) => self.report_emit_failure("set_username", &e),
        }
    }

    fn show_errors(&self) {
        let errors = self.state.connection_errors();
        self.console.line("==== Connection Error History ====");
        if errors.is_empty() {
            self.console.line("No connection errors recorded");
        }
        for (i, err) in errors.iter().enumerate() {
            self.console.line(&format!("{}. {}", i + 1, err));
        }
        self.console.line("==================================");
    }

    async fn force_reconnect(&self) {
        self.console.line(&format!(
            "Attempting to reconnect to {}...",
            self.reconnector.endpoint
        ));

        match self.reconnector.reconnect().await {
            Ok(ReconnectOutcome::Confirmed { client_id, .. }) => {
                self.console.line(&format!("Successfully reconnected (client ID: {})", client_id));
            }
            Ok(ReconnectOutcome::Unconfirmed { .. }) => {
                self.console.line("Reconnection attempt in progress - check status with /debug");
            }
            Err(e) => {
                self.console.line(&format!("Reconnection failed: {}", e));
            }
        }
    }
}

/// Success line for a send-type command
fn confirmation(command: &Command) -> String {
    match command {
        Command::Global(_) => "Global message sent".to_string(),
        Command::Group { group_id, .. } => format!("Group message sent to {}", group_id),
        Command::Guild { guild_id, .. } => format!("Guild message sent to {}", guild_id),
        Command::Private { user_id, .. } => format!("Private message sent to {}", user_id),
        Command::CreateRoom { kind, name } => format!("Room creation request sent for {}: {}", kind, name),
        Command::JoinRoom(room) => format!("Join request sent for room: {}", room),
        Command::ListRooms(kind) => format!("Room list requested for type: {}", kind),
        Command::Ping => "Ping sent".to_string(),
        Command::TestEvent => "Test event sent".to_string(),
        _ => "Sent".to_string(),
    }
}
