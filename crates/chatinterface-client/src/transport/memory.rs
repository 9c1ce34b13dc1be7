//! In-process transport used by the session tests.
//!
//! Each accepted connect hands the test a [`RemoteEnd`] that plays the server:
//! it can push frames to the client, read what the client sent, and hang up.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::time::Instant;

use chatinterface_core::codec::{decode_frame, encode_frame};
use chatinterface_core::error::{ChatError, ChatResult};
use chatinterface_core::messages::Frame;
use chatinterface_core::transport::{Connector, FrameSink, FrameSource, Link, TransportFuture};

/// Server side of an in-memory link.
pub(crate) struct RemoteEnd {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
    pub credential: String,
}

impl RemoteEnd {
    pub fn push(&self, frame: Frame) {
        let text = encode_frame(&frame).unwrap();
        self.to_client.send(text).unwrap();
    }

    pub fn push_raw(&self, text: &str) {
        self.to_client.send(text.to_string()).unwrap();
    }

    pub async fn next_frame(&mut self) -> Frame {
        let text = self.from_client.recv().await.expect("client link closed");
        decode_frame(&text).unwrap()
    }

    /// Drop the server side, which ends the client's read loop.
    pub fn hang_up(self) {}
}

pub(crate) struct MemoryConnector {
    failures: Mutex<VecDeque<ChatError>>,
    attempts: Mutex<Vec<Instant>>,
    remotes: mpsc::UnboundedSender<RemoteEnd>,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                failures: Mutex::new(VecDeque::new()),
                attempts: Mutex::new(Vec::new()),
                remotes: tx,
            },
            rx,
        )
    }

    /// Make the next connect attempt fail with `err`.
    pub fn fail_next(&self, err: ChatError) {
        self.failures.lock().unwrap().push_back(err);
    }

    /// Instants at which connect was called, successful or not.
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Connector for MemoryConnector {
    fn connect<'a>(&'a self, _url: &'a str, credential: &'a str) -> TransportFuture<'a, Link> {
        Box::pin(async move {
            self.attempts.lock().unwrap().push(Instant::now());
            if let Some(err) = self.failures.lock().unwrap().pop_front() {
                return Err(err);
            }

            let (to_client, client_rx) = mpsc::unbounded_channel();
            let (client_tx, from_client) = mpsc::unbounded_channel();
            let _ = self.remotes.send(RemoteEnd {
                to_client,
                from_client,
                credential: credential.to_string(),
            });

            Ok(Link {
                sink: Box::new(MemorySink { tx: client_tx }),
                source: Box::new(MemorySource { rx: client_rx }),
            })
        })
    }
}

struct MemorySink {
    tx: mpsc::UnboundedSender<String>,
}

impl FrameSink for MemorySink {
    fn send_text(&mut self, text: String) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.tx
                .send(text)
                .map_err(|_| ChatError::Network("remote end gone".into()))
        })
    }

    fn close(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

struct MemorySource {
    rx: mpsc::UnboundedReceiver<String>,
}

impl FrameSource for MemorySource {
    fn next_text(&mut self) -> Pin<Box<dyn Future<Output = Option<ChatResult<String>>> + Send + '_>> {
        Box::pin(async move { self.rx.recv().await.map(Ok) })
    }
}
