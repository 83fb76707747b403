use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::models::{encode_client_event, ClientEvent, ConnectionError, ProtocolError};
use crate::transport::{Connection, EventHub, InboundEvent, LinkEvent, LinkState};
use crate::utils::ScopeGuard;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// `ws://` or `wss://` endpoint of the collaboration server.
    pub server_url: String,
    pub reconnection_attempts: u32,
    pub reconnection_delay: Duration,
    pub connect_timeout: Duration,
    pub outgoing_buffer: usize,
}

impl TransportConfig {
    pub fn from_config(config: &Config) -> Result<Self, crate::models::ConfigError> {
        Ok(Self {
            server_url: config.websocket_url()?,
            reconnection_attempts: config.reconnection_attempts,
            reconnection_delay: Duration::from_millis(config.reconnection_delay_ms),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            outgoing_buffer: config.outgoing_buffer,
        })
    }
}

/// Opens WebSocket connections to the collaboration server.
pub struct WsConnector {
    config: TransportConfig,
}

impl WsConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Connect, retrying up to the configured number of attempts.
    ///
    /// On success the link is already open; the caller subscribes and only
    /// then sends its join request.
    pub async fn connect(&self) -> Result<Connection, ConnectionError> {
        let socket_id = Uuid::new_v4().to_string();
        let url = endpoint_url(&self.config.server_url, &socket_id)?;

        let stream = dial(&url, &self.config, |reason| {
            warn!("Socket connection error: {}", reason);
        })
        .await?;
        info!("📡 Connected to {} as {}", self.config.server_url, socket_id);

        let hub = Arc::new(EventHub::new());
        let (out_tx, out_rx) = mpsc::channel(self.config.outgoing_buffer.max(1));
        let (link_tx, link_rx) = watch::channel(LinkState::Connected);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run_link(
            stream,
            url,
            self.config.clone(),
            hub.clone(),
            out_rx,
            link_tx,
            shutdown_rx,
        ));

        Ok(Connection::from_parts(socket_id, out_tx, hub, link_rx, shutdown_tx, Some(task)))
    }
}

/// Append the socket id the server should know us by.
fn endpoint_url(server_url: &str, socket_id: &str) -> Result<String, ConnectionError> {
    if !(server_url.starts_with("ws://") || server_url.starts_with("wss://")) {
        return Err(ConnectionError::InvalidUrl(server_url.to_string()));
    }
    let separator = if server_url.contains('?') { '&' } else { '?' };
    Ok(format!("{}{}socketId={}", server_url, separator, socket_id))
}

async fn dial(
    url: &str,
    config: &TransportConfig,
    mut on_failure: impl FnMut(&str),
) -> Result<WsStream, ConnectionError> {
    let attempts = config.reconnection_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match tokio::time::timeout(config.connect_timeout, connect_async(url)).await {
            Ok(Ok((stream, _response))) => {
                if attempt > 1 {
                    info!("Connected after {} attempts", attempt);
                }
                return Ok(stream);
            }
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => last_error = format!("timed out after {:?}", config.connect_timeout),
        }
        debug!("Connect attempt {}/{} failed: {}", attempt, attempts, last_error);
        on_failure(&last_error);

        if attempt < attempts {
            tokio::time::sleep(config.reconnection_delay).await;
        }
    }

    Err(ConnectionError::Exhausted {
        attempts,
        reason: last_error,
    })
}

/// Holds back everything but JOIN until the server has been asked to
/// (re)admit this socket. Events the driver queued for a previous socket are
/// dropped, the same as sends made while disconnected.
#[derive(Debug)]
struct JoinGate {
    awaiting_join: bool,
}

impl JoinGate {
    fn closed() -> Self {
        Self { awaiting_join: true }
    }

    fn close(&mut self) {
        self.awaiting_join = true;
    }

    /// Whether `event` may go out on the socket now.
    fn admit(&mut self, event: &ClientEvent) -> bool {
        if matches!(event, ClientEvent::Join(_)) {
            self.awaiting_join = false;
            return true;
        }
        !self.awaiting_join
    }
}

/// Drop whatever is still queued for a socket that is gone.
fn discard_queued(outgoing: &mut mpsc::Receiver<ClientEvent>) -> usize {
    let mut dropped = 0;
    while let Ok(event) = outgoing.try_recv() {
        debug!("Dropping queued {} for the lost socket", event.kind());
        dropped += 1;
    }
    dropped
}

enum PumpExit {
    Shutdown,
    Lost(String),
}

/// Owns the socket for the lifetime of the connection: pumps frames both
/// ways and reconnects when the link drops.
async fn run_link(
    mut stream: WsStream,
    url: String,
    config: TransportConfig,
    hub: Arc<EventHub>,
    mut outgoing: mpsc::Receiver<ClientEvent>,
    link: watch::Sender<LinkState>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let link = Arc::new(link);
    let _teardown = {
        let hub = hub.clone();
        let link = link.clone();
        ScopeGuard::new("websocket link", move || {
            link.send_replace(LinkState::Disconnected);
            hub.close();
        })
    };

    let mut gate = JoinGate::closed();

    loop {
        match pump(&mut stream, &hub, &mut outgoing, &mut shutdown, &mut gate).await {
            PumpExit::Shutdown => {
                if let Err(e) = stream.close(None).await {
                    debug!("Error closing websocket: {}", e);
                }
                info!("WebSocket connection terminated");
                return;
            }
            PumpExit::Lost(reason) => {
                warn!("Connection lost: {}", reason);
                link.send_replace(LinkState::Disconnected);
                discard_queued(&mut outgoing);
                hub.dispatch(InboundEvent::Link(LinkEvent::Disconnected));
            }
        }

        let redial = dial(&url, &config, |reason| {
            hub.dispatch(InboundEvent::Link(LinkEvent::ConnectError(reason.to_string())));
        });
        tokio::select! {
            _ = &mut shutdown => return,
            result = redial => match result {
                Ok(fresh) => {
                    info!("Reconnected to {}", config.server_url);
                    stream = fresh;
                    discard_queued(&mut outgoing);
                    gate.close();
                    link.send_replace(LinkState::Connected);
                    hub.dispatch(InboundEvent::Link(LinkEvent::Connected));
                }
                Err(e) => {
                    error!("Giving up on {}: {}", config.server_url, e);
                    return;
                }
            }
        }
    }
}

async fn pump(
    stream: &mut WsStream,
    hub: &EventHub,
    outgoing: &mut mpsc::Receiver<ClientEvent>,
    shutdown: &mut oneshot::Receiver<()>,
    gate: &mut JoinGate,
) -> PumpExit {
    loop {
        tokio::select! {
            _ = &mut *shutdown => return PumpExit::Shutdown,
            event = outgoing.recv() => {
                let Some(event) = event else {
                    return PumpExit::Shutdown;
                };
                if !gate.admit(&event) {
                    debug!("Holding back {} until the room is rejoined", event.kind());
                    continue;
                }
                let text = match encode_client_event(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("{}", e);
                        continue;
                    }
                };
                if let Err(e) = stream.send(Message::Text(text.into())).await {
                    return PumpExit::Lost(e.to_string());
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match hub.dispatch_frame(text.as_str()) {
                    Ok(()) => {}
                    Err(ProtocolError::UnknownEvent(name)) => debug!("Ignoring unknown event '{}'", name),
                    Err(e) => warn!("Dropping frame: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => return PumpExit::Lost("closed by server".to_string()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return PumpExit::Lost(e.to_string()),
            },
        }
    }
}
