//! Chat Client - long-lived real-time chat session
//!
//! The client keeps one supervised websocket session to a chat server:
//!
//! - [`state`]: shared connection state and statistics
//! - [`events`]: inbound event routing and the default handler bindings
//! - [`supervisor`]: heartbeat, stats reporting, and reconnection
//! - [`commands`]: user command parsing and dispatch
//! - [`transport`]: the websocket transport and an in-memory mock

pub mod cli;
pub mod commands;
pub mod config;
pub mod console;
pub mod error;
pub mod events;
pub mod logging;
pub mod state;
pub mod supervisor;
pub mod transport;
pub mod version;

pub use config::ClientConfig;
pub use error::{Error, ErrorCode, Result};
