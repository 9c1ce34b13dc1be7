//! chatinterface-core: Shared protocol library for the chatinterface client.
//!
//! Provides the JSON event frames exchanged over the chat socket, the codec,
//! the error taxonomy, and abstract transport traits.

pub mod codec;
pub mod error;
pub mod messages;
pub mod transport;

// Re-export commonly used items at crate root.
pub use codec::{decode_frame, encode_frame};
pub use error::{ChatError, ChatResult};
pub use messages::{EventType, Frame, Message};
