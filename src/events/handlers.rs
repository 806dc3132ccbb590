//! Default event bindings
//!
//! Every handler here is synchronous: it updates [`ConnectionState`], prints
//! through the console and at most asks the router to send announcements.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::console::ConsoleHandle;
use crate::state::ConnectionState;

use super::payload::{payload_text, ChatMessage, RoomInfo, UserInfo};
use super::router::{EventRouter, HandlerContext, HandlerOutcome};

/// Events whose arrival proves the server is alive
pub const HEARTBEAT_EVENTS: &[&str] = &["server_heartbeat", "heartbeat", "pong"];

impl EventRouter {
    /// Router with the full client binding set.
    ///
    /// `greeting`, when set, is sent to global chat right after `connect`.
    pub fn with_default_bindings(
        state: Arc<ConnectionState>,
        console: ConsoleHandle,
        greeting: Option<String>,
    ) -> Self {
        let mut router = EventRouter::new(state, console);

        // Lifecycle
        router.register("connect", move |ctx| on_connect(ctx, greeting.as_deref()));
        router.register("disconnect", on_disconnect);
        router.register("error", on_error);

        // Chat traffic
        router.register("chat_message", |ctx| render_message(ctx, ""));
        router.register("message", |ctx| render_message(ctx, ""));
        router.register("global_message", |ctx| render_message(ctx, "GLOBAL"));
        router.register("group_message", |ctx| render_message(ctx, "GROUP"));
        router.register("guild_message", |ctx| render_message(ctx, "GUILD"));
        router.register("private_message", |ctx| render_message(ctx, "PRIVATE"));

        // Liveness
        router.register_all(HEARTBEAT_EVENTS, |ctx| {
            ctx.state.track_heartbeat_received();
            debug!(payload = %ctx.payload, "Heartbeat response received");
            HandlerOutcome::done()
        });

        // Rooms
        router.register("room_joined", on_room_joined);
        router.register("room_left", on_room_left);
        router.register("rooms_list", on_rooms_list);
        router.register("room_created", on_room_created);
        router.register("user_joined", |ctx| on_presence(ctx, "joined"));
        router.register("user_left", |ctx| on_presence(ctx, "left"));

        // Server complaints
        router.register("rate_limit_warning", |ctx| {
            record_problem(ctx, "Rate limit warning", "Rate Limit Warning")
        });
        router.register("server_error", |ctx| record_problem(ctx, "Server error", "Server Error"));
        router.register("authentication_failed", |ctx| {
            record_problem(ctx, "Authentication failed", "Authentication failed")
        });

        // Everything else the server may tell us
        router.register("test_event", |ctx| {
            ctx.state.track_message_received();
            info!(payload = %ctx.payload, "Test event received");
            HandlerOutcome::done()
        });
        router.register("username_updated", on_username_updated);
        router.register("username_suggestion", |ctx| {
            ctx.console.line(&format!("Suggested Username: {}", payload_text(ctx.payload)));
            HandlerOutcome::done()
        });
        router.register("connection_status", on_connection_status);
        router.register("authentication_required", |ctx| {
            ctx.console.line("Authentication is required to continue");
            HandlerOutcome::done()
        });
        router.register("authentication_success", |ctx| {
            ctx.console.line("Authentication successful");
            HandlerOutcome::done()
        });

        router
    }
}

// ─────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────

fn on_connect(ctx: &HandlerContext<'_>, greeting: Option<&str>) -> HandlerOutcome {
    let identity = match ctx.payload {
        Value::String(id) if !id.is_empty() => id.clone(),
        Value::Object(map) => map
            .get("id")
            .or_else(|| map.get("sid"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("session-{}", ctx.generation)),
        _ => format!("session-{}", ctx.generation),
    };

    if !ctx.state.confirm_session(ctx.generation, identity.clone()) {
        debug!(client_id = %identity, generation = ctx.generation, "Ignoring connect from replaced session");
        return HandlerOutcome::done();
    }
    info!(client_id = %identity, "Connected to server");
    ctx.console.line(&format!("Connected to server (client ID: {})", identity));

    let mut outcome = HandlerOutcome::done().announce("set_username", json!(ctx.state.username()));
    if let Some(text) = greeting.filter(|t| !t.is_empty()) {
        outcome = outcome.announce("global_message", json!(text));
    }
    outcome
}

fn on_disconnect(ctx: &HandlerContext<'_>) -> HandlerOutcome {
    let identity = ctx.state.client_identity();
    let Some(was_connected) = ctx.state.set_connected_for(ctx.generation, false) else {
        debug!(client_id = %identity, generation = ctx.generation, "Ignoring disconnect from replaced session");
        return HandlerOutcome::done();
    };

    if was_connected {
        warn!(client_id = %identity, reason = %payload_text(ctx.payload), "Unexpected disconnection");
        ctx.state.add_connection_error(format!("Unexpected disconnection from {}", identity));
        ctx.console.line("Disconnected from server. Use /forcereconnect to reconnect");
    } else {
        debug!(client_id = %identity, "Expected disconnection");
    }
    HandlerOutcome::done()
}

fn on_error(ctx: &HandlerContext<'_>) -> HandlerOutcome {
    let description = payload_text(ctx.payload);
    warn!(client_id = %ctx.state.client_identity(), error = %description, "Socket error");
    ctx.state.add_connection_error(format!("Socket error: {}", description));
    HandlerOutcome::done()
}

// ─────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────

/// Count and print a chat message. `label` is the bracket tag; empty means
/// use the message's own type.
fn render_message(ctx: &HandlerContext<'_>, label: &str) -> HandlerOutcome {
    let msg = ChatMessage::from_payload(ctx.payload);
    ctx.state.track_message_received();
    debug!(id = %msg.id, kind = %msg.kind, sender = %msg.sender, "Message received");

    let tag = match label {
        "" => msg.kind.clone(),
        "GROUP" | "GUILD" if !msg.scope().is_empty() => format!("{}:{}", label, msg.scope()),
        other => other.to_string(),
    };
    let line = if tag.is_empty() {
        format!("{}: {}", msg.sender_or_unknown(), msg.content)
    } else {
        format!("[{}] {}: {}", tag, msg.sender_or_unknown(), msg.content)
    };
    ctx.console.line(&line);
    HandlerOutcome::done()
}

// ─────────────────────────────────────────────────────────────────
// Rooms
// ─────────────────────────────────────────────────────────────────

fn on_room_joined(ctx: &HandlerContext<'_>) -> HandlerOutcome {
    let room = RoomInfo::from_payload(ctx.payload);
    let key = room.key().to_string();
    if key.is_empty() {
        debug!(payload = %ctx.payload, "room_joined without a room");
        return HandlerOutcome::done();
    }
    ctx.state.set_current_room(key.clone());
    ctx.console.line(&format!("Joined room: {}", key));
    HandlerOutcome::done()
}

fn on_room_left(ctx: &HandlerContext<'_>) -> HandlerOutcome {
    let room = RoomInfo::from_payload(ctx.payload);
    if ctx.state.clear_room_if(room.key()) {
        ctx.console.line(&format!("Left room: {}", room.key()));
    } else {
        debug!(room = %room.key(), "Left a room other than the current one");
    }
    HandlerOutcome::done()
}

fn on_rooms_list(ctx: &HandlerContext<'_>) -> HandlerOutcome {
    let rooms = RoomInfo::list_from_payload(ctx.payload);
    info!(count = rooms.len(), "Room list received");

    ctx.console.line("Available Rooms:");
    if rooms.is_empty() {
        ctx.console.line("  (none)");
    }
    for (i, room) in rooms.iter().enumerate() {
        ctx.console.line(&format!(
            "  {}. {} (ID: {}, Type: {}, Members: {})",
            i + 1,
            room.name,
            room.id,
            room.kind,
            room.members.len()
        ));
    }
    ctx.state.track_message_received();
    HandlerOutcome::done()
}

fn on_room_created(ctx: &HandlerContext<'_>) -> HandlerOutcome {
    let room = RoomInfo::from_payload(ctx.payload);
    ctx.state.track_message_received();
    ctx.console.line(&format!(
        "Room Created: {} (ID: {}, Type: {})",
        room.name, room.id, room.kind
    ));
    HandlerOutcome::done()
}

fn on_presence(ctx: &HandlerContext<'_>, verb: &str) -> HandlerOutcome {
    let user = UserInfo::from_payload(ctx.payload);
    ctx.state.track_message_received();
    ctx.console.line(&format!("{} {} the room", user.username, verb));
    HandlerOutcome::done()
}

// ─────────────────────────────────────────────────────────────────
// Server Notices
// ─────────────────────────────────────────────────────────────────

/// Record a server-reported problem in the error history and print it
fn record_problem(ctx: &HandlerContext<'_>, history_label: &str, display_label: &str) -> HandlerOutcome {
    let text = payload_text(ctx.payload);
    warn!(problem = %history_label, detail = %text, "Server reported a problem");
    ctx.state.add_connection_error(format!("{}: {}", history_label, text));
    ctx.console.line(&format!("{}: {}", display_label, text));
    HandlerOutcome::done()
}

fn on_username_updated(ctx: &HandlerContext<'_>) -> HandlerOutcome {
    let user = UserInfo::from_payload(ctx.payload);
    ctx.state.track_message_received();
    if user.username.is_empty() {
        return HandlerOutcome::done();
    }

    info!(old = %ctx.state.username(), new = %user.username, user_id = %user.id, "Username updated");
    ctx.state.set_username(user.username.clone());
    ctx.console.line(&format!("Username updated: {}", user.username));
    HandlerOutcome::done()
}

fn on_connection_status(ctx: &HandlerContext<'_>) -> HandlerOutcome {
    ctx.console.line("Connection Status:");
    match ctx.payload {
        Value::Object(map) => {
            for (key, value) in map {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                ctx.console.line(&format!("  {}: {}", key, value));
            }
        }
        other => ctx.console.line(&format!("  {}", payload_text(other))),
    }
    HandlerOutcome::done()
}
