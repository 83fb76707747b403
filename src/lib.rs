//! Client side of a collaborative code editor: one participant's session in
//! a shared room, kept in sync with the other participants over a WebSocket
//! event protocol.

pub mod config;
pub mod console;
pub mod models;
pub mod session;
pub mod transport;
pub mod utils;
