use std::panic;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use colabri_code::config::Config;
use colabri_code::console::{self, ConsoleSurface, SharedView, HELP};
use colabri_code::models::ANONYMOUS;
use colabri_code::session::{DefaultFile, Reconciler, SessionDriver, SessionState};
use colabri_code::transport::{TransportConfig, WsConnector};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Join a collaborative code room from the terminal
#[derive(Parser)]
#[command(name = "colabri-code")]
#[command(version, about)]
struct Cli {
    /// Room to join
    room_id: String,

    /// Name shown to the other participants
    #[arg(short, long, env = "COLABRI_USERNAME")]
    username: Option<String>,

    /// Collaboration server (overrides COLABRI_SERVER_URL)
    #[arg(long)]
    server_url: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    let cli = Cli::parse();
    let loaded = Config::load();
    let log_filter = match &loaded {
        Ok(config) => config.log_filter(),
        Err(_) => Config::default().log_filter(),
    };

    // Initialize tracing on stderr; stdout belongs to the console
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter)))
        .init();

    let mut config = match loaded {
        Ok(config) => {
            info!("✅ Configuration loaded successfully");
            config
        }
        Err(e) => {
            error!("❌ Failed to load configuration: {}", e);
            warn!("Using default configuration");
            Config::default()
        }
    };
    if let Some(url) = cli.server_url {
        config.server_url = url;
    }

    let transport = match TransportConfig::from_config(&config) {
        Ok(transport) => transport,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let connection = match WsConnector::new(transport).connect().await {
        Ok(connection) => connection,
        Err(e) => {
            error!("Failed to connect to the server: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let username = cli
        .username
        .or_else(|| config.username.clone())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| ANONYMOUS.to_string());
    let state = SessionState::new(cli.room_id, username, connection.socket_id());
    let defaults = DefaultFile {
        name: config.default_file_name.clone(),
        content: config.default_file_content.clone(),
    };
    let engine = Reconciler::new(state, defaults);

    let driver = match SessionDriver::attach(engine, connection) {
        Ok(driver) => driver,
        Err(e) => {
            error!("Failed to join the room: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let view: SharedView = Arc::default();
    let (intents_tx, intents_rx) = mpsc::channel(config.outgoing_buffer.max(1));
    let reader = console::spawn_stdin_reader(view.clone(), intents_tx);
    println!("{}", HELP);

    let mut surface = ConsoleSurface::new(std::io::stdout(), view);
    let engine = driver.run(intents_rx, &mut surface).await;
    reader.abort();

    info!("👋 Session in room {} ended", engine.state().room_id());
    ExitCode::SUCCESS
}
