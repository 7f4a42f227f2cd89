//! chatrelay node.
//!
//! - WebSocket endpoint: /ws?ticket=...
//! - Peer relay: POST /internal/relay, GET /internal/health, GET /internal/users
//! - Config: chatrelay.yaml (or $CHATRELAY_CONFIG) + PORT / PEERS / MAX_MESSAGES / SNAPSHOT_PATH

use std::net::SocketAddr;
use std::process::ExitCode;

use tracing_subscriber::{fmt, EnvFilter};

use chatrelay_core::error::{Result, RelayError};
use chatrelay_node::{app_state, config};

#[tokio::main]
async fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "chatrelay-node stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cfg = config::load_from_env()?;
    let listen: SocketAddr = format!("{}:{}", cfg.node.host, cfg.node.port)
        .parse()
        .map_err(|e| RelayError::BadRequest(format!("node.host/port must form a socket address: {e}")))?;

    let state = app_state::AppState::new(cfg)?;

    tracing::info!(%listen, "chatrelay-node starting");
    chatrelay_node::serve(listen, state).await
}
