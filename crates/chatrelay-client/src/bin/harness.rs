//! chatrelay-harness: smoke test a running cluster.
//!
//! Connects N clients (`test0..`), lets the last one send a message, and
//! passes once every client has seen it (the sender through its optimistic
//! echo, the rest through a `chat_message` broadcast).

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

use chatrelay_client::{ClientConfig, ClientHandle, ClientSession, ClientState};
use chatrelay_core::error::{RelayError, Result};
use chatrelay_core::ServerEvent;

#[derive(Parser)]
#[command(name = "chatrelay-harness", about = "End-to-end smoke test for a chatrelay cluster")]
struct Cli {
    /// Node base URLs.
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "http://localhost:3010,http://localhost:3011,http://localhost:3012"
    )]
    nodes: Vec<String>,

    /// Number of simulated clients.
    #[arg(long, default_value_t = 3)]
    clients: usize,

    /// Delay before the last client sends.
    #[arg(long, default_value_t = 500)]
    send_delay_ms: u64,

    /// Overall deadline.
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let deadline = Instant::now() + Duration::from_secs(cli.timeout_secs);

    match tokio::time::timeout_at(deadline, run(&cli)).await {
        Ok(Ok(())) => {
            println!("PASS: all {} clients received the message", cli.clients);
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            println!("FAIL: {e}");
            ExitCode::FAILURE
        }
        Err(_) => {
            println!("FAIL: timed out after {}s", cli.timeout_secs);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    if cli.clients == 0 {
        return Err(RelayError::BadRequest("need at least one client".into()));
    }
    let cfg = ClientConfig::new(cli.nodes.clone());

    let mut handles: Vec<ClientHandle> = Vec::with_capacity(cli.clients);
    for i in 0..cli.clients {
        handles.push(ClientSession::join(cfg.clone(), &format!("test{i}"))?);
    }

    for h in &handles {
        let mut st = h.watch_state();
        st.wait_for(ClientState::is_connected)
            .await
            .map_err(|_| RelayError::NotConnected)?;
        tracing::info!(client = h.name(), state = ?h.state(), "client connected");
    }

    let mut subs: Vec<_> = handles.iter().map(ClientHandle::subscribe).collect();
    tokio::time::sleep(Duration::from_millis(cli.send_delay_ms)).await;

    let (sender, _) = handles.split_last().ok_or(RelayError::NotConnected)?;
    let echo = sender.send(&format!("hello from {}", sender.name()))?;
    tracing::info!(client = sender.name(), id = %echo.id, "message sent");
    subs.pop();

    for (i, sub) in subs.iter_mut().enumerate() {
        loop {
            match sub.recv().await {
                Ok(ServerEvent::ChatMessage(env)) => {
                    tracing::info!(client = %format!("test{i}"), id = %env.id, "broadcast received");
                    break;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => {
                    return Err(RelayError::Internal(format!("test{i} event stream closed")));
                }
            }
        }
    }
    Ok(())
}
