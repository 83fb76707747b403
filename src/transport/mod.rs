//! Link to the collaboration server.
//!
//! A [`Connection`] is the handle the session talks to: typed `send`,
//! `subscribe` returning a [`Subscription`], and `close`. The WebSocket
//! implementation lives in [`websocket`], an in-process one for tests in
//! [`memory`]. Both hand back the same `Connection` type.

pub mod hub;
pub mod memory;
pub mod websocket;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::models::{ClientEvent, TransportError};

pub use hub::{EventFilter, EventHub, InboundEvent, LinkEvent, Subscription};
pub use websocket::{TransportConfig, WsConnector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
}

pub struct Connection {
    socket_id: String,
    outgoing: mpsc::Sender<ClientEvent>,
    hub: Arc<EventHub>,
    link: watch::Receiver<LinkState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Connection {
    pub(crate) fn from_parts(
        socket_id: String,
        outgoing: mpsc::Sender<ClientEvent>,
        hub: Arc<EventHub>,
        link: watch::Receiver<LinkState>,
        shutdown: oneshot::Sender<()>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            socket_id,
            outgoing,
            hub,
            link,
            shutdown: Some(shutdown),
            task,
        }
    }

    /// Id this client is known by on the server.
    pub fn socket_id(&self) -> &str {
        &self.socket_id
    }

    pub fn link_state(&self) -> LinkState {
        *self.link.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.link_state() == LinkState::Connected
    }

    /// Queue an event for the server. Fire-and-forget: nothing is queued
    /// while the link is down and no acknowledgement is awaited.
    pub fn send(&self, event: ClientEvent) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        self.outgoing.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.hub.subscribe(filter)
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    /// Close the link and wait for the background task to finish.
    pub async fn close(mut self) {
        info!("Closing connection {}", self.socket_id);
        self.release();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!("Link task ended abnormally: {}", e);
            }
        }
    }

    fn release(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.hub.close();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.release();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
