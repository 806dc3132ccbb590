//! Inbound event dispatch
//!
//! The [`EventRouter`] binds server event names to synchronous handlers. A pump
//! task per session feeds it the session's inbound stream.

mod handlers;
pub mod payload;
mod router;

pub use handlers::HEARTBEAT_EVENTS;
pub use router::*;
