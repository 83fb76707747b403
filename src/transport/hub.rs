use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::models::{decode_server_frame, EventKind, ProtocolError, ServerEvent};

/// Transport-level changes. Only binary connected/disconnected state is
/// surfaced; `ConnectError` reports a failed reconnect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
    ConnectError(String),
}

/// Everything a subscriber can receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Link(LinkEvent),
    Server(ServerEvent),
}

/// Which server events a subscription wants. Link events are always delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Only(Vec<EventKind>),
}

impl EventFilter {
    pub fn only(kinds: &[EventKind]) -> Self {
        EventFilter::Only(kinds.to_vec())
    }

    fn accepts(&self, event: &InboundEvent) -> bool {
        match (self, event) {
            (_, InboundEvent::Link(_)) => true,
            (EventFilter::All, _) => true,
            (EventFilter::Only(kinds), InboundEvent::Server(server)) => kinds.contains(&server.kind()),
        }
    }
}

struct Subscriber {
    filter: EventFilter,
    tx: mpsc::UnboundedSender<InboundEvent>,
}

/// Fan-out of inbound events to live subscriptions.
#[derive(Default)]
pub struct EventHub {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(self: &Arc<Self>, filter: EventFilter) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().insert(id, Subscriber { filter, tx });
        debug!("Subscription {} registered", id);
        Subscription {
            id,
            rx,
            hub: Arc::downgrade(self),
        }
    }

    /// Deliver an event to every subscription whose filter accepts it.
    pub fn dispatch(&self, event: InboundEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|_, sub| {
            if !sub.filter.accepts(&event) {
                return true;
            }
            sub.tx.send(event.clone()).is_ok()
        });
    }

    /// Decode a text frame and dispatch it. Frames that do not decode are
    /// returned as errors and reach no subscriber.
    pub fn dispatch_frame(&self, text: &str) -> Result<(), ProtocolError> {
        let event = decode_server_frame(text)?;
        self.dispatch(InboundEvent::Server(event));
        Ok(())
    }

    /// Drop every subscription. Receivers see the end of the stream once
    /// they have drained what was already delivered.
    pub fn close(&self) {
        let mut subscribers = self.subscribers.lock();
        if !subscribers.is_empty() {
            debug!("Closing {} subscriptions", subscribers.len());
        }
        subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn unsubscribe(&self, id: u64) {
        if self.subscribers.lock().remove(&id).is_some() {
            debug!("Subscription {} released", id);
        }
    }
}

/// A live registration on the hub. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<InboundEvent>,
    hub: Weak<EventHub>,
}

impl Subscription {
    /// Next event; `None` once the connection is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<InboundEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}
