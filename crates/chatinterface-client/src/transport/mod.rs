//! Transports for the chat socket.
//!
//! - [`websocket`]: `ws://` / `wss://` via tokio-tungstenite
//! - `memory` (tests only): an in-process link with scripted failures

pub mod websocket;

#[cfg(test)]
pub(crate) mod memory;

pub use websocket::WebSocketConnector;
