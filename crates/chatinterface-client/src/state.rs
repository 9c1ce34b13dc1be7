//! The session-state aggregate.
//!
//! Conversation logs, pending sends, the local username and the peer whose
//! conversation is on screen all live in one `SessionState` behind a single
//! async mutex. Every mutation, and every render that depends on it, happens
//! while that lock is held.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use chatinterface_core::messages::Message;

use crate::correlator::PendingMessages;
use crate::render::Renderer;
use crate::store::ConversationStore;

pub type SharedState = Arc<Mutex<SessionState>>;

#[derive(Debug, Default)]
pub struct SessionState {
    pub conversations: ConversationStore,
    pub pending: PendingMessages,
    /// Label used for messages we sent. Filled in by the snapshot load.
    pub username: String,
    /// Peer whose conversation is currently rendered.
    pub(crate) rendered: Option<String>,
    /// Peers already handed to `Renderer::list_peer`.
    pub(crate) listed: HashSet<String>,
}

impl SessionState {
    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn rendered_peer(&self) -> Option<&str> {
        self.rendered.as_deref()
    }

    /// Add `peer` to the contact list unless it is already there.
    pub(crate) fn list(&mut self, peer: &str, renderer: &dyn Renderer) {
        if self.listed.insert(peer.to_string()) {
            renderer.list_peer(peer);
        }
    }

    /// Append to a peer's log; draw it right away if that peer is on screen.
    pub(crate) fn record(&mut self, peer: &str, message: Message, renderer: &dyn Renderer) {
        self.list(peer, renderer);
        if self.rendered.as_deref() == Some(peer) {
            renderer.render_message(&message.sender, &message.body, message.timestamp.as_deref());
        }
        self.conversations.append(peer, message);
    }

    /// Clear the screen and draw `peer`'s whole conversation.
    pub(crate) fn render_conversation(&mut self, peer: &str, renderer: &dyn Renderer) {
        renderer.show_active_peer(peer);
        renderer.clear_conversation();
        for m in self.conversations.log(peer).unwrap_or_default() {
            renderer.render_message(&m.sender, &m.body, m.timestamp.as_deref());
        }
        self.rendered = Some(peer.to_string());
    }
}
