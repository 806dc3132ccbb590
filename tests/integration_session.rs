//! Integration tests for a live websocket session
//!
//! Runs a local chat server and drives the client through connect, chat,
//! heartbeat, rooms, server-side drops, and forced reconnection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage};
use uuid::Uuid;

use chat_client::commands::CommandDispatcher;
use chat_client::console::BufferConsole;
use chat_client::error::Error;
use chat_client::events::EventRouter;
use chat_client::state::ConnectionState;
use chat_client::supervisor::{
    HeartbeatSettings, HeartbeatSupervisor, ReconnectOutcome, ReconnectSettings, ReconnectionManager, TickOutcome,
};
use chat_client::transport::{ServerEndpoint, WsTransport};

// ─────────────────────────────────────────────────────────────────
// Test Chat Server
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum ServerPush {
    Frame(Value),
    Close,
}

/// Minimal chat server speaking `{"event", "message"}` frames
struct ChatServer {
    addr: SocketAddr,
    received: Arc<RwLock<Vec<(String, Value)>>>,
    connections: Arc<AtomicUsize>,
    push_tx: broadcast::Sender<ServerPush>,
}

impl ChatServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(RwLock::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let (push_tx, _) = broadcast::channel(16);

        let accept_received = received.clone();
        let accept_connections = connections.clone();
        let accept_push = push_tx.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let received = accept_received.clone();
                let push_rx = accept_push.subscribe();
                accept_connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    if let Ok(ws_stream) = accept_async(stream).await {
                        handle_connection(ws_stream, received, push_rx).await;
                    }
                });
            }
        });

        Self {
            addr,
            received,
            connections,
            push_tx,
        }
    }

    fn endpoint(&self) -> ServerEndpoint {
        ServerEndpoint {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            path: "/socket.io/".to_string(),
            secure: false,
        }
    }

    fn received(&self, event: &str) -> Vec<Value> {
        self.received
            .read()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    fn push(&self, event: &str, message: Value) {
        let _ = self.push_tx.send(ServerPush::Frame(json!({"event": event, "message": message})));
    }

    fn drop_clients(&self) {
        let _ = self.push_tx.send(ServerPush::Close);
    }
}

async fn handle_connection<S>(
    ws_stream: S,
    received: Arc<RwLock<Vec<(String, Value)>>>,
    mut push_rx: broadcast::Receiver<ServerPush>,
) where
    S: StreamExt<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + SinkExt<WsMessage> + Unpin,
{
    let (mut write, mut read) = ws_stream.split();

    let session_id = format!("srv-{}", &Uuid::new_v4().simple().to_string()[..8]);
    let hello = json!({"event": "connect", "message": {"id": session_id}});
    if write.send(WsMessage::Text(hello.to_string())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = read.next() => {
                let text = match msg {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(_)) => continue,
                    _ => break,
                };
                let frame: Value = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(_) => continue,
                };
                let event = frame["event"].as_str().unwrap_or_default().to_string();
                let message = frame["message"].clone();
                received.write().push((event.clone(), message.clone()));

                let reply = match event.as_str() {
                    "client_heartbeat" => Some(json!({"event": "server_heartbeat", "message": {"status": "ok"}})),
                    "ping" => Some(json!({"event": "pong", "message": "pong"})),
                    "join_room" => Some(json!({
                        "event": "room_joined",
                        "message": {"roomId": message, "name": "Lobby"}
                    })),
                    "get_rooms" => Some(json!({
                        "event": "rooms_list",
                        "message": [
                            {"id": "lobby", "name": "Lobby", "type": message, "members": ["a", "b"]},
                            {"id": "dev", "name": "Dev Talk", "type": message, "members": []}
                        ]
                    })),
                    "global_message" => Some(json!({
                        "event": "global_message",
                        "message": {"username": "echo", "content": message}
                    })),
                    _ => None,
                };
                if let Some(reply) = reply {
                    if write.send(WsMessage::Text(reply.to_string())).await.is_err() {
                        break;
                    }
                }
            }

            push = push_rx.recv() => {
                match push {
                    Ok(ServerPush::Frame(frame)) => {
                        if write.send(WsMessage::Text(frame.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Ok(ServerPush::Close) | Err(_) => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Client Harness
// ─────────────────────────────────────────────────────────────────

struct Client {
    state: Arc<ConnectionState>,
    console: Arc<BufferConsole>,
    manager: Arc<ReconnectionManager>,
    dispatcher: CommandDispatcher,
}

fn fast_settings() -> ReconnectSettings {
    ReconnectSettings {
        max_attempts: 2,
        delay: Duration::from_millis(20),
        settle_timeout: Duration::from_secs(3),
    }
}

fn client_for(endpoint: ServerEndpoint, greeting: Option<&str>) -> Client {
    let state = Arc::new(ConnectionState::new("alice"));
    let console = Arc::new(BufferConsole::new());
    let router = Arc::new(EventRouter::with_default_bindings(
        state.clone(),
        console.clone(),
        greeting.map(str::to_string),
    ));
    let transport = Arc::new(WsTransport::new(Duration::from_secs(5)));
    let manager = Arc::new(ReconnectionManager::new(transport, router, endpoint, fast_settings()));
    let dispatcher = CommandDispatcher::new(state.clone(), console.clone(), manager.clone());
    Client {
        state,
        console,
        manager,
        dispatcher,
    }
}

/// Poll until `condition` holds, failing the test after five seconds
async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ─────────────────────────────────────────────────────────────────
// Session Tests
// ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_announces_username_and_greeting() {
    let server = ChatServer::start().await;
    let client = client_for(server.endpoint(), Some("hello everyone"));

    let outcome = client.manager.reconnect().await.unwrap();
    let client_id = match outcome {
        ReconnectOutcome::Confirmed { client_id, .. } => client_id,
        other => panic!("expected confirmed session, got {:?}", other),
    };
    assert!(client_id.starts_with("srv-"));
    assert!(client.state.is_connected());
    assert_eq!(client.state.client_identity(), client_id);
    assert!(client.console.contains(&format!("Connected to server (client ID: {})", client_id)));

    wait_for("set_username", || !server.received("set_username").is_empty()).await;
    assert_eq!(server.received("set_username"), vec![json!("alice")]);
    wait_for("greeting", || !server.received("global_message").is_empty()).await;
    assert_eq!(server.received("global_message"), vec![json!("hello everyone")]);
    assert_eq!(client.state.stats().messages_sent, 2);

    client.manager.shutdown().await;
    assert!(!client.state.is_connected());
}

#[tokio::test]
async fn test_chat_round_trip() {
    let server = ChatServer::start().await;
    let client = client_for(server.endpoint(), None);
    client.manager.reconnect().await.unwrap();

    client.dispatcher.dispatch("/global hi there").await;
    client.dispatcher.dispatch("/private bob see you").await;

    wait_for("echo", || client.console.contains("[GLOBAL] echo: hi there")).await;
    assert_eq!(
        server.received("private_message"),
        vec![json!({"userId": "bob", "message": "see you"})]
    );

    let stats = client.state.stats();
    // set_username plus the two sends
    assert_eq!(stats.messages_sent, 3);
    assert_eq!(stats.messages_received, 1);

    client.manager.shutdown().await;
}

#[tokio::test]
async fn test_heartbeat_is_answered() {
    let server = ChatServer::start().await;
    let client = client_for(server.endpoint(), None);
    client.manager.reconnect().await.unwrap();

    let supervisor = HeartbeatSupervisor::new(client.state.clone(), HeartbeatSettings::default());
    assert_eq!(supervisor.tick().await, TickOutcome::Sent { stale: false });

    wait_for("server heartbeat", || client.state.stats().heartbeats_received == 1).await;
    let beat = &server.received("client_heartbeat")[0];
    assert_eq!(beat["username"], "alice");
    assert_eq!(beat["clientId"], json!(client.state.client_identity()));
    assert_eq!(client.state.stats().heartbeats_sent, 1);

    client.dispatcher.dispatch("/ping").await;
    wait_for("pong", || client.state.stats().heartbeats_received == 2).await;

    client.manager.shutdown().await;
}

#[tokio::test]
async fn test_rooms_follow_server_confirmation() {
    let server = ChatServer::start().await;
    let client = client_for(server.endpoint(), None);
    client.manager.reconnect().await.unwrap();

    client.dispatcher.dispatch("/join lobby").await;
    wait_for("room_joined", || client.state.current_room() == "lobby").await;

    client.dispatcher.dispatch("/list groups").await;
    wait_for("rooms_list", || client.console.contains("Available Rooms:")).await;
    wait_for("second room", || client.console.contains("2. Dev Talk")).await;
    assert!(client.console.contains("1. Lobby (ID: lobby, Type: group, Members: 2)"));
    assert_eq!(server.received("get_rooms"), vec![json!("group")]);

    server.push("room_left", json!({"roomId": "lobby"}));
    wait_for("room_left", || client.state.current_room().is_empty()).await;

    client.manager.shutdown().await;
}

#[tokio::test]
async fn test_server_drop_then_forced_reconnect() {
    let server = ChatServer::start().await;
    let client = client_for(server.endpoint(), None);
    let first = client.manager.reconnect().await.unwrap();

    server.drop_clients();
    wait_for("disconnect", || !client.state.is_connected()).await;
    wait_for("error history", || {
        client
            .state
            .connection_errors()
            .iter()
            .any(|e| e.contains("Unexpected disconnection"))
    })
    .await;

    client.dispatcher.dispatch("/global anyone?").await;
    assert!(client.console.contains("Error: Not connected to server"));

    client.dispatcher.dispatch("/forcereconnect").await;
    assert!(client.console.contains("Successfully reconnected"));
    assert!(client.state.is_connected());
    assert!(client.state.generation() > first.generation());
    assert_eq!(server.connection_count(), 2);

    client.dispatcher.dispatch("/global back again").await;
    wait_for("echo after reconnect", || client.console.contains("[GLOBAL] echo: back again")).await;

    client.manager.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_exhausts_against_closed_port() {
    // Bind then drop to find a port nobody listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let endpoint = ServerEndpoint {
        host: "127.0.0.1".to_string(),
        port,
        path: "/socket.io/".to_string(),
        secure: false,
    };
    let client = client_for(endpoint, None);

    match client.manager.reconnect().await {
        Err(Error::ReconnectExhausted { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("expected exhausted retries, got {:?}", other),
    }
    assert!(!client.state.is_connected());
    assert!(client
        .state
        .connection_errors()
        .iter()
        .any(|e| e.contains("Reconnection failed after 2 attempts")));
}
