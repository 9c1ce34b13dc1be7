//! Connection manager for the chat socket.
//!
//! `ConnectionManager` owns the single duplex link to the server: it performs
//! the handshake, runs the background read loop, transmits outbound frames,
//! and reports each connection loss exactly once as a synthetic
//! `error.closed` frame. It never retries on its own; the session
//! coordinator owns the reconnect policy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use chatinterface_core::codec::{decode_frame, encode_frame};
use chatinterface_core::error::{ChatError, ChatResult};
use chatinterface_core::messages::{EventType, Frame};
use chatinterface_core::transport::{Connector, FrameSink, FrameSource};

/// Link state, owned by the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

type SharedSink = Arc<Mutex<Option<Box<dyn FrameSink>>>>;

pub struct ConnectionManager {
    /// Socket endpoint, e.g. `wss://chat.example.com/ws/chat`.
    url: String,
    connector: Arc<dyn Connector>,
    state: Arc<Mutex<ConnectionState>>,
    /// Write half of the current link.
    sink: SharedSink,
    /// Handle for the read loop of the current link.
    reader: Mutex<Option<JoinHandle<()>>>,
    /// Bumped on every connect so a stale read loop cannot clobber a newer link.
    generation: Arc<AtomicU64>,
    /// Inbound frames from every link this manager opens, in arrival order.
    inbound_tx: mpsc::UnboundedSender<Frame>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
}

impl ConnectionManager {
    pub fn new(url: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            url: url.into(),
            connector,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            sink: Arc::new(Mutex::new(None)),
            reader: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    /// Take the inbound frame stream. It spans reconnects, so it is taken once.
    pub async fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<Frame>> {
        self.inbound_rx.lock().await.take()
    }

    /// Record that the coordinator is retrying.
    pub async fn mark_reconnecting(&self) {
        *self.state.lock().await = ConnectionState::Reconnecting;
    }

    /// Open a link and start its read loop.
    pub async fn connect(&self, credential: &str) -> ChatResult<()> {
        let prior = {
            let mut state = self.state.lock().await;
            let prior = *state;
            if prior == ConnectionState::Connected {
                return Ok(());
            }
            if prior != ConnectionState::Reconnecting {
                *state = ConnectionState::Connecting;
            }
            prior
        };

        let link = match self.connector.connect(&self.url, credential).await {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(url = %self.url, "connect failed: {}", e);
                if prior != ConnectionState::Reconnecting {
                    *self.state.lock().await = ConnectionState::Disconnected;
                }
                return Err(e);
            }
        };

        if let Some(stale) = self.reader.lock().await.take() {
            stale.abort();
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.sink.lock().await = Some(link.sink);
        *self.state.lock().await = ConnectionState::Connected;

        let handle = tokio::spawn(Self::read_loop(
            link.source,
            self.inbound_tx.clone(),
            self.state.clone(),
            self.sink.clone(),
            self.generation.clone(),
            generation,
        ));
        *self.reader.lock().await = Some(handle);

        tracing::info!(url = %self.url, "chat socket connected");
        Ok(())
    }

    /// Serialize and transmit one frame. Never retries.
    pub async fn send<T: Serialize>(&self, event: EventType, payload: &T) -> ChatResult<()> {
        let frame = Frame::new(event, payload)?;
        let text = encode_frame(&frame)?;

        if *self.state.lock().await != ConnectionState::Connected {
            return Err(ChatError::NotConnected);
        }

        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(ChatError::NotConnected)?;
        sink.send_text(text).await
    }

    /// Close the link deliberately. No close notification is emitted.
    pub async fn disconnect(&self) -> ChatResult<()> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        if let Some(mut sink) = self.sink.lock().await.take() {
            sink.close().await?;
        }
        *self.state.lock().await = ConnectionState::Disconnected;
        tracing::debug!(url = %self.url, "chat socket disconnected");
        Ok(())
    }

    /// Forward decoded frames until the link ends, then report the loss once.
    async fn read_loop(
        mut source: Box<dyn FrameSource>,
        inbound: mpsc::UnboundedSender<Frame>,
        state: Arc<Mutex<ConnectionState>>,
        sink: SharedSink,
        current: Arc<AtomicU64>,
        generation: u64,
    ) {
        let reason = loop {
            match source.next_text().await {
                Some(Ok(text)) => {
                    let frame = match decode_frame(&text) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!("invalid frame: {}", e);
                            continue;
                        }
                    };
                    if frame.event == EventType::ErrorClosed.as_str() {
                        tracing::debug!("ignoring server-sent {}", frame.event);
                        continue;
                    }
                    if inbound.send(frame).is_err() {
                        tracing::debug!("inbound channel closed");
                        return;
                    }
                }
                Some(Err(e)) => {
                    tracing::error!("socket read error: {}", e);
                    break e.to_string();
                }
                None => break "connection closed by server".to_string(),
            }
        };

        if current.load(Ordering::SeqCst) != generation {
            return;
        }
        *state.lock().await = ConnectionState::Disconnected;
        sink.lock().await.take();

        tracing::warn!("chat socket closed: {}", reason);
        let _ = inbound.send(Frame::closed(reason));
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(h) = self.reader.get_mut().take() {
            h.abort();
        }
    }
}
