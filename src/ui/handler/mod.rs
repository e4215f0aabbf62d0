//! Request handlers: the REST surface and the WebSocket endpoints.

pub mod http;
pub mod websocket;
