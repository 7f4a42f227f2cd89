//! chatrelay-ctl: start / stop / inspect a local three-node cluster.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use chatrelay_core::error::{Result, RelayError};
use chatrelay_node::supervisor::{
    check_health, sibling_node_bin, ProcStatus, Supervisor, DEFAULT_PID_FILE, DEFAULT_PORTS,
};

#[derive(Parser)]
#[command(name = "chatrelay-ctl", about = "Manage a local chatrelay cluster")]
struct Cli {
    /// Ports to run nodes on.
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_PORTS)]
    ports: Vec<u16>,

    /// Where started pids are recorded.
    #[arg(long, default_value = DEFAULT_PID_FILE)]
    pid_file: PathBuf,

    /// Node binary to launch (defaults to the one next to this executable).
    #[arg(long)]
    node_bin: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Launch every node that is not already recorded.
    Start,
    /// SIGTERM every recorded node.
    Stop,
    /// Stop, then start.
    Restart,
    /// Show whether each recorded pid is alive.
    Status,
    /// Restart the cluster, then query each node's health endpoint.
    Check {
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,

        /// Grace period between restart and the first probe.
        #[arg(long, default_value_t = 1000)]
        settle_ms: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "chatrelay-ctl failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let node_bin = match cli.node_bin {
        Some(p) => p,
        None => sibling_node_bin()
            .map_err(|e| RelayError::Internal(format!("cannot locate node binary: {e}")))?,
    };
    let sup = Supervisor::new(cli.ports, cli.pid_file, node_bin);

    match cli.command {
        Cmd::Start => {
            let started = sup.start()?;
            println!("started: {started:?}");
        }
        Cmd::Stop => {
            let stopped = sup.stop()?;
            println!("stopped: {stopped:?}");
        }
        Cmd::Restart => {
            let started = sup.restart()?;
            println!("restarted: {started:?}");
        }
        Cmd::Status => {
            for (port, st) in sup.status() {
                match st {
                    ProcStatus::NotRunning => println!("{port}: not running"),
                    ProcStatus::Running(pid) => println!("{port}: running (pid {pid})"),
                    ProcStatus::Dead(pid) => println!("{port}: dead (stale pid {pid})"),
                }
            }
        }
        Cmd::Check { timeout_ms, settle_ms } => {
            sup.restart()?;
            tokio::time::sleep(Duration::from_millis(settle_ms)).await;

            let mut healthy = true;
            for (port, res) in check_health(sup.ports(), Duration::from_millis(timeout_ms)).await {
                match res {
                    Ok(body) => println!("{port}: {body}"),
                    Err(e) => {
                        healthy = false;
                        println!("{port}: {e}");
                    }
                }
            }
            if !healthy {
                return Err(RelayError::Internal("one or more nodes unhealthy".into()));
            }
        }
    }
    Ok(())
}
