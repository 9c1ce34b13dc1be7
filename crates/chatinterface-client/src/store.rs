//! Per-peer conversation cache and active-peer switching.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use chatinterface_core::messages::Message;

use crate::render::Renderer;
use crate::state::SharedState;

/// Ordered message log per peer.
#[derive(Debug, Default)]
pub struct ConversationStore {
    logs: HashMap<String, Vec<Message>>,
}

impl ConversationStore {
    /// (Re)initialise a peer's log from a most-recent-first history fetch.
    pub fn load(&mut self, peer: &str, most_recent_first: Vec<Message>) {
        let mut log = most_recent_first;
        log.reverse();
        self.logs.insert(peer.to_string(), log);
    }

    /// Append to the end of a peer's log, creating it on the first message.
    pub fn append(&mut self, peer: &str, message: Message) {
        self.logs.entry(peer.to_string()).or_default().push(message);
    }

    pub fn log(&self, peer: &str) -> Option<&[Message]> {
        self.logs.get(peer).map(Vec::as_slice)
    }

    pub fn contains(&self, peer: &str) -> bool {
        self.logs.contains_key(peer)
    }

    /// Known peers, sorted.
    pub fn peers(&self) -> Vec<&str> {
        let mut peers: Vec<&str> = self.logs.keys().map(String::as_str).collect();
        peers.sort_unstable();
        peers
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}

/// The user's current peer selection.
///
/// Setting it is a plain assignment plus a notification to the switch loop;
/// nothing is rendered synchronously.
#[derive(Clone)]
pub struct ActivePeer {
    current: Arc<watch::Sender<Option<String>>>,
    switches: mpsc::UnboundedSender<String>,
}

impl ActivePeer {
    /// Create a selector and the receiving end for [`run_switch_loop`].
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (switches, rx) = mpsc::unbounded_channel();
        let (current, _) = watch::channel(None);
        (
            Self {
                current: Arc::new(current),
                switches,
            },
            rx,
        )
    }

    pub fn set(&self, peer: impl Into<String>) {
        let peer = peer.into();
        self.current.send_replace(Some(peer.clone()));
        if self.switches.send(peer).is_err() {
            tracing::debug!("switch loop is not running");
        }
    }

    pub fn get(&self) -> Option<String> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.current.subscribe()
    }
}

/// Re-render the conversation once per peer switch.
///
/// Runs until every [`ActivePeer`] handle is dropped or the task is aborted.
pub async fn run_switch_loop(
    state: SharedState,
    renderer: Arc<dyn Renderer>,
    mut switches: mpsc::UnboundedReceiver<String>,
) {
    while let Some(peer) = switches.recv().await {
        let mut session = state.lock().await;
        if session.rendered_peer() == Some(peer.as_str()) {
            continue;
        }
        if !session.conversations.contains(&peer) {
            tracing::debug!(peer = %peer, "opening conversation with no history");
        }
        session.render_conversation(&peer, renderer.as_ref());
    }

    tracing::debug!("switch loop ended");
}
