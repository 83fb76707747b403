//! In-process transport. The test side holds a [`MemoryServer`] and plays the
//! collaboration server: it sees every event the client sends and can push
//! events, raw frames and link changes back.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::warn;

use crate::models::{ClientEvent, ProtocolError, ServerEvent};
use crate::transport::{Connection, EventHub, InboundEvent, LinkEvent, LinkState};

const BUFFER: usize = 256;

pub struct MemoryServer {
    hub: Arc<EventHub>,
    link: watch::Sender<LinkState>,
    received: mpsc::Receiver<ClientEvent>,
    shutdown: oneshot::Receiver<()>,
    closed: bool,
}

/// A connected client handle and the server side that drives it.
pub fn connect(socket_id: impl Into<String>) -> (Connection, MemoryServer) {
    let hub = Arc::new(EventHub::new());
    let (out_tx, out_rx) = mpsc::channel(BUFFER);
    let (link_tx, link_rx) = watch::channel(LinkState::Connected);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let connection = Connection::from_parts(socket_id.into(), out_tx, hub.clone(), link_rx, shutdown_tx, None);
    let server = MemoryServer {
        hub,
        link: link_tx,
        received: out_rx,
        shutdown: shutdown_rx,
        closed: false,
    };
    (connection, server)
}

impl MemoryServer {
    pub fn push(&self, event: ServerEvent) {
        self.hub.dispatch(InboundEvent::Server(event));
    }

    /// Push a raw text frame the way the WebSocket reader would.
    pub fn push_frame(&self, text: &str) -> Result<(), ProtocolError> {
        self.hub.dispatch_frame(text).map_err(|e| {
            warn!("Dropping frame: {}", e);
            e
        })
    }

    pub fn drop_link(&self) {
        self.link.send_replace(LinkState::Disconnected);
        self.hub.dispatch(InboundEvent::Link(LinkEvent::Disconnected));
    }

    pub fn fail_reconnect(&self, reason: &str) {
        self.hub
            .dispatch(InboundEvent::Link(LinkEvent::ConnectError(reason.to_string())));
    }

    pub fn restore_link(&self) {
        self.link.send_replace(LinkState::Connected);
        self.hub.dispatch(InboundEvent::Link(LinkEvent::Connected));
    }

    /// Give up on the link for good, as an exhausted reconnect would.
    pub fn give_up(&self) {
        self.link.send_replace(LinkState::Disconnected);
        self.hub.close();
    }

    pub async fn next_sent(&mut self) -> Option<ClientEvent> {
        self.received.recv().await
    }

    pub fn try_next_sent(&mut self) -> Option<ClientEvent> {
        self.received.try_recv().ok()
    }

    /// Every event sent so far that has not been read yet.
    pub fn drain_sent(&mut self) -> Vec<ClientEvent> {
        let mut sent = Vec::new();
        while let Some(event) = self.try_next_sent() {
            sent.push(event);
        }
        sent
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    /// Whether the client closed or dropped its connection.
    pub fn is_closed(&mut self) -> bool {
        if !self.closed {
            self.closed = !matches!(
                self.shutdown.try_recv(),
                Err(oneshot::error::TryRecvError::Empty)
            );
        }
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JoinPayload, TransportError};
    use crate::transport::EventFilter;

    fn join() -> ClientEvent {
        ClientEvent::Join(JoinPayload {
            room_id: "r".to_string(),
            username: "u".to_string(),
        })
    }

    #[tokio::test]
    async fn test_send_reaches_server() {
        let (conn, mut server) = connect("s1");
        assert_eq!(conn.socket_id(), "s1");
        conn.send(join()).unwrap();
        assert_eq!(server.next_sent().await, Some(join()));
    }

    #[tokio::test]
    async fn test_send_while_link_down_is_rejected() {
        let (conn, mut server) = connect("s1");
        server.drop_link();
        assert_eq!(conn.send(join()), Err(TransportError::Disconnected));
        server.restore_link();
        conn.send(join()).unwrap();
        assert_eq!(server.drain_sent(), vec![join()]);
    }

    #[tokio::test]
    async fn test_close_is_observed_and_releases_subscriptions() {
        let (conn, mut server) = connect("s1");
        let _sub = conn.subscribe(EventFilter::All);
        assert_eq!(server.subscriber_count(), 1);
        assert!(!server.is_closed());

        conn.close().await;
        assert!(server.is_closed());
        assert_eq!(server.subscriber_count(), 0);
    }

    #[test]
    fn test_dropping_connection_counts_as_close() {
        let (conn, mut server) = connect("s1");
        drop(conn);
        assert!(server.is_closed());
        assert!(server.is_closed());
    }
}
