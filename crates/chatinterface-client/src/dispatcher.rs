//! Inbound event dispatch.
//!
//! Frames are routed by event type to at most one registered handler.
//! Handlers run on their own tasks so a slow handler never stalls the read
//! path, but frames about the same peer go through one serial lane and are
//! therefore handled in arrival order.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use chatinterface_core::messages::{EventType, Frame};

type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Asynchronous event handler, invoked with the frame payload.
pub type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |payload| -> HandlerFuture { Box::pin(f(payload)) })
}

/// Event type → handler table. Filled once before dispatch starts.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<EventType, Handler>,
}

impl HandlerRegistry {
    /// Register a handler. A later registration for the same type wins.
    pub fn register(&mut self, event: EventType, handler: Handler) {
        if self.handlers.insert(event, handler).is_some() {
            tracing::debug!(event = %event, "replaced existing handler");
        }
    }

    pub fn get(&self, event: EventType) -> Option<&Handler> {
        self.handlers.get(&event)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// A serial queue of handler invocations for one peer.
struct Lane {
    tx: mpsc::UnboundedSender<(Handler, Value)>,
    task: JoinHandle<()>,
}

impl Lane {
    fn spawn(key: String) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(Handler, Value)>();
        let task = tokio::spawn(async move {
            while let Some((handler, payload)) = rx.recv().await {
                handler(payload).await;
            }
            tracing::trace!(lane = %key, "dispatch lane ended");
        });
        Self { tx, task }
    }
}

pub struct EventDispatcher {
    registry: HandlerRegistry,
    /// Lanes keyed by peer; frames without a peer share the `""` lane.
    lanes: Mutex<HashMap<String, Lane>>,
}

impl EventDispatcher {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Route one frame. Returns whether a handler was scheduled.
    ///
    /// Unknown event types and types without a handler are dropped; newer
    /// servers may send events this client does not understand yet.
    pub async fn dispatch(&self, frame: Frame) -> bool {
        let event = match frame.event_type() {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!("dropping frame: {}", e);
                return false;
            }
        };

        let Some(handler) = self.registry.get(event).cloned() else {
            tracing::debug!(event = %event, "no handler registered, dropping frame");
            return false;
        };

        let key = frame.peer().unwrap_or_default().to_string();
        let mut lanes = self.lanes.lock().await;
        let lane = lanes
            .entry(key.clone())
            .or_insert_with(|| Lane::spawn(key.clone()));

        if let Err(mpsc::error::SendError((handler, payload))) = lane.tx.send((handler, frame.data)) {
            // The lane task is gone (aborted); start a fresh one.
            tracing::debug!(lane = %key, "respawning dispatch lane");
            let fresh = Lane::spawn(key.clone());
            let _ = fresh.tx.send((handler, payload));
            lanes.insert(key, fresh);
        }
        true
    }

    /// Stop every lane. Queued invocations are dropped.
    pub async fn shutdown(&self) {
        let mut lanes = self.lanes.lock().await;
        for (_, lane) in lanes.drain() {
            lane.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn frame(event: &str, data: Value) -> Frame {
        Frame {
            event: event.into(),
            data,
        }
    }

    fn recorder() -> (Handler, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let h = handler(move |payload| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(payload);
            }
        });
        (h, rx)
    }

    #[tokio::test]
    async fn unknown_and_unregistered_events_are_dropped() {
        let (h, mut rx) = recorder();
        let mut registry = HandlerRegistry::default();
        registry.register(EventType::MessageReceived, h);
        let dispatcher = EventDispatcher::new(registry);

        assert!(!dispatcher.dispatch(frame("typing.started", Value::Null)).await);
        assert!(
            !dispatcher
                .dispatch(frame("message.completed", serde_json::json!({"id": "x"})))
                .await
        );
        assert!(
            dispatcher
                .dispatch(frame("message.received", serde_json::json!({"sender": "a"})))
                .await
        );

        assert_eq!(rx.recv().await.unwrap()["sender"], "a");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let (first, mut first_rx) = recorder();
        let (second, mut second_rx) = recorder();
        let mut registry = HandlerRegistry::default();
        registry.register(EventType::MessageReceived, first);
        registry.register(EventType::MessageReceived, second);
        assert_eq!(registry.len(), 1);

        let dispatcher = EventDispatcher::new(registry);
        dispatcher
            .dispatch(frame("message.received", serde_json::json!({"sender": "a"})))
            .await;

        assert!(second_rx.recv().await.is_some());
        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn same_peer_frames_are_handled_in_arrival_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registry = HandlerRegistry::default();
        registry.register(
            EventType::MessageReceived,
            handler(move |payload| {
                let tx = tx.clone();
                async move {
                    // Earlier frames take longer, so a parallel run would reorder them.
                    let delay = payload["delay"].as_u64().unwrap_or(0);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    let _ = tx.send(payload["data"].as_str().unwrap_or_default().to_string());
                }
            }),
        );
        let dispatcher = EventDispatcher::new(registry);

        for (i, delay) in [50u64, 30, 10, 0].iter().enumerate() {
            dispatcher
                .dispatch(frame(
                    "message.received",
                    serde_json::json!({"sender": "alice", "data": i.to_string(), "delay": delay}),
                ))
                .await;
        }

        let mut order = Vec::new();
        for _ in 0..4 {
            order.push(rx.recv().await.unwrap());
        }
        assert_eq!(order, vec!["0", "1", "2", "3"]);
    }

    #[tokio::test]
    async fn slow_peer_does_not_block_other_peers() {
        let gate = Arc::new(Notify::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registry = HandlerRegistry::default();
        {
            let gate = gate.clone();
            registry.register(
                EventType::MessageReceived,
                handler(move |payload| {
                    let gate = gate.clone();
                    let tx = tx.clone();
                    async move {
                        if payload["sender"] == "alice" {
                            gate.notified().await;
                        }
                        let _ = tx.send(payload["sender"].as_str().unwrap_or_default().to_string());
                    }
                }),
            );
        }
        let dispatcher = EventDispatcher::new(registry);

        dispatcher
            .dispatch(frame("message.received", serde_json::json!({"sender": "alice"})))
            .await;
        dispatcher
            .dispatch(frame("message.received", serde_json::json!({"sender": "bob"})))
            .await;

        assert_eq!(rx.recv().await.unwrap(), "bob");
        gate.notify_one();
        assert_eq!(rx.recv().await.unwrap(), "alice");
    }

    #[tokio::test]
    async fn dispatch_after_shutdown_starts_new_lane() {
        let (h, mut rx) = recorder();
        let mut registry = HandlerRegistry::default();
        registry.register(EventType::ErrorClosed, h);
        let dispatcher = EventDispatcher::new(registry);

        dispatcher.shutdown().await;
        assert!(dispatcher.dispatch(Frame::closed("eof")).await);
        assert_eq!(rx.recv().await.unwrap()["reason"], "eof");
    }
}
