use thiserror::Error;

/// Failure to establish (or re-establish) the link to the collaboration server.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid server url '{0}'")]
    InvalidUrl(String),
    #[error("gave up connecting after {attempts} attempts: {reason}")]
    Exhausted { attempts: u32, reason: String },
}

/// A frame that could not be turned into a known server event.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not a valid event envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    #[error("malformed payload for event '{event}': {source}")]
    Malformed {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode event '{event}': {source}")]
    Encode {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A send that the transport refused. Sends are fire-and-forget, so these are
/// logged by the caller and never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("link to the server is down")]
    Disconnected,
    #[error("outgoing buffer is full")]
    Backpressure,
    #[error("connection is closed")]
    Closed,
}

/// Remote execution failure reported by the server.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("[{username}] execution error:\n{message}")]
    Execution { username: String, message: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable error: {0}")]
    Env(#[from] envy::Error),
    #[error("unsupported server url '{0}' (expected ws://, wss://, http:// or https://)")]
    UnsupportedUrl(String),
}
