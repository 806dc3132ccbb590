//! Connection state tracking
//!
//! The single source of truth for session health, shared by every task.

mod connection;
mod stats;

pub use connection::*;
pub use stats::*;
