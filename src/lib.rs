//! Instant: a multi-room chat server.
//!
//! Clients connect over long-lived WebSocket sessions, join rooms by URL,
//! and exchange server-stamped JSON envelopes; a secondary HTTP surface
//! serves the static web client and signed identity cookies.

pub mod common;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logger;
pub mod ui;
pub mod usecase;

// Re-export entry points
pub use config::{Cli, ServerConfig};
pub use logger::setup_logger;
pub use ui::runner::{RunError, Server, run as run_server};
