//! chatinterface-client: session layer for the chatinterface chat client.
//!
//! Keeps a conversation consistent across an unreliable socket: connects and
//! reconnects with backoff, dispatches inbound events per peer in arrival
//! order, reconciles sent messages with server completions, and maintains the
//! per-peer conversation cache the renderer draws from.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use chatinterface_client::{
//!     CoordinatorConfig, HttpChatApi, Renderer, Session, SessionCoordinator,
//!     WebSocketConnector, REQUEST_TIMEOUT,
//! };
//!
//! # async fn example(renderer: Arc<dyn Renderer>) -> chatinterface_client::ChatResult<()> {
//! let session = Session::new("https://chat.example.com", "my-token")?;
//! let api = HttpChatApi::new(&session.http_origin, Some(&session.credential), REQUEST_TIMEOUT)?;
//!
//! let coordinator = SessionCoordinator::new(
//!     session,
//!     Arc::new(api),
//!     Arc::new(WebSocketConnector::default()),
//!     renderer,
//!     CoordinatorConfig::default(),
//! );
//! coordinator.start().await?;
//!
//! coordinator.select_peer("alice");
//! coordinator.send_message("hello").await?;
//!
//! coordinator.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod connection;
pub mod coordinator;
pub mod correlator;
pub mod dispatcher;
pub mod render;
pub mod secrets;
pub mod session;
pub mod state;
pub mod store;
pub mod transport;

// Re-export primary public types.
pub use api::{ChatApi, HttpChatApi, TokenInfo, REQUEST_TIMEOUT};
pub use connection::{ConnectionManager, ConnectionState};
pub use coordinator::{
    CoordinatorConfig, LoadReport, ReconnectPolicy, SessionCoordinator, SessionPhase,
};
pub use correlator::{MessageCorrelator, PendingMessage, PendingMessages};
pub use render::{Renderer, Severity};
pub use secrets::{FileSecretStore, MemorySecretStore, SecretStore};
pub use session::Session;
pub use store::{ActivePeer, ConversationStore};
pub use transport::WebSocketConnector;

// Re-export chatinterface-core error types for convenience.
pub use chatinterface_core::{ChatError, ChatResult};
