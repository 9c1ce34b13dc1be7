//! Abstract transport traits for the chat socket.
//!
//! The session layer only needs an authenticated, ordered, duplex stream of
//! text messages. Concrete transports (WebSocket in the client crate, an
//! in-memory pair in tests) implement these traits.

use crate::error::ChatResult;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by transport operations.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = ChatResult<T>> + Send + 'a>>;

/// Write half of an established link.
pub trait FrameSink: Send + Sync {
    /// Transmit one text message.
    fn send_text(&mut self, text: String) -> TransportFuture<'_, ()>;

    /// Close the link.
    fn close(&mut self) -> TransportFuture<'_, ()>;
}

/// Read half of an established link.
pub trait FrameSource: Send {
    /// Next text message. `None` means the peer closed the link cleanly.
    fn next_text(&mut self) -> Pin<Box<dyn Future<Output = Option<ChatResult<String>>> + Send + '_>>;
}

/// An authenticated link, split into halves.
pub struct Link {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

/// Opens links to a socket endpoint.
pub trait Connector: Send + Sync {
    /// Perform the transport and application handshake.
    ///
    /// Fails with `AuthFailed` when the server rejects the credential and
    /// `Network` for anything else that prevents the link from opening.
    fn connect<'a>(&'a self, url: &'a str, credential: &'a str) -> TransportFuture<'a, Link>;
}
