//! Correlation of outbound messages with server completions.
//!
//! A send is recorded as pending under a fresh UUID before it is transmitted.
//! The server later answers with `message.completed {id, recipient}`; only
//! then does the message enter the recipient's conversation log. Pending
//! entries survive socket loss so completions arriving after a reconnect
//! still match.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use chatinterface_core::error::{ChatError, ChatResult};
use chatinterface_core::messages::{EventType, Message, SendPayload};

use crate::connection::ConnectionManager;
use crate::render::Renderer;
use crate::state::SharedState;

/// A sent message awaiting completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub recipient: String,
    pub body: String,
}

/// Message id → pending message.
#[derive(Debug, Default)]
pub struct PendingMessages {
    entries: HashMap<String, PendingMessage>,
}

impl PendingMessages {
    pub fn insert(&mut self, id: String, message: PendingMessage) {
        self.entries.insert(id, message);
    }

    /// Remove and return the entry for `id`.
    pub fn take(&mut self, id: &str) -> Option<PendingMessage> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&PendingMessage> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

pub struct MessageCorrelator {
    state: SharedState,
    connection: Arc<ConnectionManager>,
    renderer: Arc<dyn Renderer>,
}

impl MessageCorrelator {
    pub fn new(
        state: SharedState,
        connection: Arc<ConnectionManager>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            state,
            connection,
            renderer,
        }
    }

    /// Send `body` to `recipient` and return the correlation id.
    ///
    /// Returns as soon as the frame is written; confirmation arrives later
    /// through [`on_completed`](Self::on_completed).
    pub async fn send(&self, recipient: &str, body: &str) -> ChatResult<String> {
        let id = Uuid::new_v4().to_string();
        self.state.lock().await.pending.insert(
            id.clone(),
            PendingMessage {
                recipient: recipient.to_string(),
                body: body.to_string(),
            },
        );

        let payload = SendPayload {
            recipient: recipient.to_string(),
            data: body.to_string(),
            id: id.clone(),
        };
        if let Err(e) = self.connection.send(EventType::MessageSend, &payload).await {
            // Never left the client, so nothing will complete it.
            self.state.lock().await.pending.take(&id);
            tracing::warn!(recipient, "send failed: {}", e);
            return Err(e);
        }

        tracing::debug!(id = %id, recipient, "message sent, awaiting completion");
        Ok(id)
    }

    /// A peer sent us a message.
    pub async fn on_received(&self, sender: &str, body: &str, timestamp: Option<String>) {
        let message = Message {
            sender: sender.to_string(),
            body: body.to_string(),
            timestamp,
        };
        self.state
            .lock()
            .await
            .record(sender, message, self.renderer.as_ref());
    }

    /// The server accepted message `id`.
    ///
    /// Fails with `UnknownCorrelation` when `id` is not pending, which happens
    /// for duplicate completions and for sends from an earlier process.
    pub async fn on_completed(&self, id: &str, recipient: &str) -> ChatResult<()> {
        let mut state = self.state.lock().await;
        let pending = state
            .pending
            .take(id)
            .ok_or_else(|| ChatError::UnknownCorrelation(id.to_string()))?;

        if pending.recipient != recipient {
            tracing::warn!(
                id,
                sent_to = %pending.recipient,
                completed_for = recipient,
                "completion recipient differs from pending entry"
            );
        }

        let message = Message::new(state.username.clone(), pending.body);
        state.record(recipient, message, self.renderer.as_ref());
        tracing::debug!(id, recipient, "message completed");
        Ok(())
    }
}
