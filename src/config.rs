use serde::{Deserialize, Serialize};

use crate::models::ConfigError;

/// Prefix of every environment variable read into [`Config`].
pub const ENV_PREFIX: &str = "COLABRI_";

/// Client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Collaboration server endpoint (ws, wss, http or https)
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Log level for this crate when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Reconnect policy
    #[serde(default = "default_reconnection_attempts")]
    pub reconnection_attempts: u32,
    #[serde(default = "default_reconnection_delay_ms")]
    pub reconnection_delay_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Events queued for the server before sends are rejected
    #[serde(default = "default_outgoing_buffer")]
    pub outgoing_buffer: usize,

    /// Display name, overridden by the command line
    pub username: Option<String>,

    // File created by the first participant of an empty room
    #[serde(default = "default_file_name")]
    pub default_file_name: String,
    #[serde(default = "default_file_content")]
    pub default_file_content: String,
}

impl Config {
    /// Load configuration from environment variables or app.env file.
    ///
    /// Runs before tracing is initialised, so the caller reports the outcome.
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        envy::prefixed(ENV_PREFIX)
            .from_env::<Config>()
            .map_err(ConfigError::Env)
    }

    /// Server URL with an http(s) scheme mapped onto ws(s).
    pub fn websocket_url(&self) -> Result<String, ConfigError> {
        normalize_server_url(&self.server_url)
    }

    /// Default tracing filter: our crate at `log_level`, dependencies at warn.
    pub fn log_filter(&self) -> String {
        format!("colabri_code={},warn", self.log_level.trim())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            log_level: default_log_level(),
            reconnection_attempts: default_reconnection_attempts(),
            reconnection_delay_ms: default_reconnection_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            outgoing_buffer: default_outgoing_buffer(),
            username: None,
            default_file_name: default_file_name(),
            default_file_content: default_file_content(),
        }
    }
}

pub fn normalize_server_url(url: &str) -> Result<String, ConfigError> {
    let url = url.trim();
    if url.starts_with("ws://") || url.starts_with("wss://") {
        return Ok(url.to_string());
    }
    if let Some(rest) = url.strip_prefix("http://") {
        return Ok(format!("ws://{}", rest));
    }
    if let Some(rest) = url.strip_prefix("https://") {
        return Ok(format!("wss://{}", rest));
    }
    Err(ConfigError::UnsupportedUrl(url.to_string()))
}

// Default value functions
fn default_server_url() -> String {
    "ws://localhost:5000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_reconnection_attempts() -> u32 {
    100
}

fn default_reconnection_delay_ms() -> u64 {
    1000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_outgoing_buffer() -> usize {
    256
}

fn default_file_name() -> String {
    "main.js".to_string()
}

fn default_file_content() -> String {
    "// Start coding here".to_string()
}
