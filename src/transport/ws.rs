//! WebSocket transport
//!
//! Sessions exchange JSON event frames over a single websocket:
//! - A reader task turns frames into [`InboundEvent`]s and answers pings
//! - Read errors surface as an `error` event, stream end as `disconnect`
//! - Emits are written under an async lock on the sink half

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{Error, Result};

use super::{Connection, EventFrame, InboundEvent, Session, Transport, INBOUND_QUEUE_SIZE};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

// ─────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────

/// Opens websocket sessions
#[derive(Debug, Clone)]
pub struct WsTransport {
    connect_timeout: Duration,
}

impl WsTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &Url) -> Result<Connection> {
        info!(url = %url, "Opening websocket session");

        let (ws_stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| Error::ConnectionTimeout {
                url: url.to_string(),
                timeout_secs: self.connect_timeout.as_secs(),
            })?
            .map_err(|e| Error::connection_failed(url.as_str(), e.to_string()))?;

        debug!("WebSocket handshake complete");

        let (write, read) = ws_stream.split();
        let sink = Arc::new(tokio::sync::Mutex::new(write));
        let open = Arc::new(AtomicBool::new(true));
        let (event_tx, event_rx) = mpsc::channel(INBOUND_QUEUE_SIZE);

        let reader = tokio::spawn(read_loop(read, sink.clone(), event_tx, open.clone()));

        let session = WsSession {
            sink,
            open,
            reader: parking_lot::Mutex::new(Some(reader)),
        };

        Ok(Connection {
            session: Arc::new(session),
            events: event_rx,
        })
    }
}

// ─────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────

/// Live websocket session
pub struct WsSession {
    sink: Arc<tokio::sync::Mutex<WsSink>>,
    open: Arc<AtomicBool>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl Session for WsSession {
    async fn emit(&self, event: &str, payload: Value) -> Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(Error::ConnectionLost {
                message: "session closed".to_string(),
            });
        }

        let json = EventFrame::new(event, payload).to_json()?;
        self.sink
            .lock()
            .await
            .send(WsMessage::Text(json))
            .await
            .map_err(|e| Error::emit_failed(event, e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let result = {
            let mut sink = self.sink.lock().await;
            let _ = sink.send(WsMessage::Close(None)).await;
            sink.close().await
        };

        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }

        result.map_err(Error::from)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Reader Loop
// ─────────────────────────────────────────────────────────────────

async fn read_loop<R>(
    mut read: R,
    sink: Arc<tokio::sync::Mutex<WsSink>>,
    event_tx: mpsc::Sender<InboundEvent>,
    open: Arc<AtomicBool>,
) where
    R: StreamExt<Item = std::result::Result<WsMessage, WsError>> + Unpin,
{
    let reason = loop {
        let frame = match read.next().await {
            Some(Ok(WsMessage::Text(text))) => EventFrame::from_json(&text),
            Some(Ok(WsMessage::Binary(data))) => EventFrame::from_json_bytes(&data),
            Some(Ok(WsMessage::Ping(data))) => {
                if let Err(e) = sink.lock().await.send(WsMessage::Pong(data)).await {
                    warn!(error = %e, "Failed to answer ping");
                }
                continue;
            }
            Some(Ok(WsMessage::Close(frame))) => {
                info!(frame = ?frame, "Received close frame");
                break "server closed the connection".to_string();
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                let _ = event_tx
                    .send(InboundEvent::new("error", json!({ "message": e.to_string() })))
                    .await;
                break e.to_string();
            }
            None => {
                info!("WebSocket stream ended");
                break "stream ended".to_string();
            }
        };

        match frame {
            Ok(frame) => {
                if event_tx.send(frame.into()).await.is_err() {
                    debug!("Inbound event receiver dropped");
                    break "receiver dropped".to_string();
                }
            }
            Err(e) => warn!(error = %e, "Failed to parse frame"),
        }
    };

    open.store(false, Ordering::SeqCst);
    let _ = event_tx
        .send(InboundEvent::new("disconnect", json!({ "reason": reason })))
        .await;
}
