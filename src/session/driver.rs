use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::models::TransportError;
use crate::session::engine::{LocalIntent, Notice, NoticeLevel, Reaction, Reconciler};
use crate::session::presence::{visible_cursors, RenderedCursor};
use crate::session::state::SessionState;
use crate::session::terminal::TerminalFrame;
use crate::transport::{Connection, EventFilter, InboundEvent, Subscription};

/// Where the session shows itself to the local user.
pub trait Surface {
    fn notify(&mut self, notice: &Notice);
    fn render(&mut self, state: &SessionState, cursors: &[RenderedCursor]);
    fn write_terminal(&mut self, frame: TerminalFrame);
}

/// Owns the engine, the connection and the subscription for one session.
pub struct SessionDriver {
    engine: Reconciler,
    connection: Connection,
    subscription: Subscription,
}

impl SessionDriver {
    /// Subscribe to the connection, then ask to join the room.
    pub fn attach(engine: Reconciler, connection: Connection) -> Result<Self, TransportError> {
        let subscription = connection.subscribe(EventFilter::All);
        connection.send(engine.join_request())?;
        info!(
            "Joining room {} as {}",
            engine.state().room_id(),
            engine.state().username()
        );
        Ok(Self {
            engine,
            connection,
            subscription,
        })
    }

    pub fn engine(&self) -> &Reconciler {
        &self.engine
    }

    /// Run until the intent channel closes. Inbound events and intents are
    /// applied one at a time in the order they arrive.
    ///
    /// The session stays usable after the link is gone for good; edits are
    /// then applied locally only.
    pub async fn run<S: Surface>(self, mut intents: mpsc::Receiver<LocalIntent>, surface: &mut S) -> Reconciler {
        let SessionDriver {
            mut engine,
            connection,
            mut subscription,
        } = self;
        let mut link_open = true;

        present(&mut engine, surface);

        loop {
            // Remote events already delivered go before the next local intent
            let reaction = tokio::select! {
                biased;
                inbound = subscription.recv(), if link_open => match inbound {
                    Some(InboundEvent::Server(event)) => engine.apply_remote(event),
                    Some(InboundEvent::Link(event)) => engine.apply_link(&event),
                    None => {
                        link_open = false;
                        error!("Connection to the server is gone");
                        let notice = Notice::new(NoticeLevel::Error, "Connection lost. Changes stay local.");
                        surface.notify(&notice);
                        Reaction::default()
                    }
                },
                intent = intents.recv() => match intent {
                    Some(intent) => engine.apply_local(intent),
                    None => break,
                },
            };

            deliver(&connection, reaction, surface);
            present(&mut engine, surface);
        }

        drop(subscription);
        connection.close().await;
        info!("Left room {}", engine.state().room_id());
        engine
    }
}

fn deliver<S: Surface>(connection: &Connection, reaction: Reaction, surface: &mut S) {
    for event in reaction.outbound {
        let kind = event.kind();
        match connection.send(event) {
            Ok(()) => debug!("Sent {}", kind),
            Err(TransportError::Disconnected) => debug!("Not sending {} while disconnected", kind),
            Err(e) => warn!("Failed to send {}: {}", kind, e),
        }
    }
    for notice in &reaction.notices {
        match notice.level {
            NoticeLevel::Info | NoticeLevel::Success => info!("{}", notice.message),
            NoticeLevel::Warning => warn!("{}", notice.message),
            NoticeLevel::Error => error!("{}", notice.message),
        }
        surface.notify(notice);
    }
}

fn present<S: Surface>(engine: &mut Reconciler, surface: &mut S) {
    surface.render(engine.state(), &visible_cursors(engine.state()));
    if let Some(frame) = engine.take_terminal_frame() {
        surface.write_terminal(frame);
    }
}
