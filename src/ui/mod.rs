//! UI layer: the HTTP and WebSocket surface.

pub mod cookies;
pub mod handler;
pub mod hooks;
pub mod http_log;
pub mod router;
pub mod runner;
pub mod signal;
pub mod state;

pub use runner::{RunError, Server, run};
