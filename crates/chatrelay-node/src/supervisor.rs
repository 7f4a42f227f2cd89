//! Process supervisor for a fixed local cluster of nodes.
//!
//! Starts one `chatrelay-node` per port with `PORT` and `PEERS` set so every
//! node relays to all the others, remembers the pids in a JSON file, and
//! stops / probes them through the `kill` utility. Health is polled over
//! `GET /internal/health`.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use chatrelay_core::error::{Result, RelayError};

pub const DEFAULT_PORTS: [u16; 3] = [3010, 3011, 3012];
pub const DEFAULT_PID_FILE: &str = ".server_pids.json";

/// port -> pid
pub type PidTable = BTreeMap<u16, u32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcStatus {
    NotRunning,
    Running(u32),
    Dead(u32),
}

pub struct Supervisor {
    ports: Vec<u16>,
    pid_file: PathBuf,
    node_bin: PathBuf,
}

/// `PEERS` value for the node on `port`: every other port on localhost.
pub fn peers_for(port: u16, ports: &[u16]) -> String {
    ports
        .iter()
        .filter(|p| **p != port)
        .map(|p| format!("http://localhost:{p}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// The node binary next to the running executable.
pub fn sibling_node_bin() -> io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    Ok(exe.with_file_name(format!("chatrelay-node{}", std::env::consts::EXE_SUFFIX)))
}

impl Supervisor {
    pub fn new(ports: Vec<u16>, pid_file: impl Into<PathBuf>, node_bin: impl Into<PathBuf>) -> Self {
        Self {
            ports,
            pid_file: pid_file.into(),
            node_bin: node_bin.into(),
        }
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    /// Missing or unreadable pid files count as empty.
    pub fn load_pids(&self) -> PidTable {
        read_pids(&self.pid_file)
    }

    pub fn save_pids(&self, pids: &PidTable) -> Result<()> {
        let body = serde_json::to_string_pretty(pids)
            .map_err(|e| RelayError::Internal(format!("encode pid file failed: {e}")))?;
        std::fs::write(&self.pid_file, body)
            .map_err(|e| RelayError::Internal(format!("write pid file failed: {e}")))
    }

    /// Spawn every node not already recorded. Returns the ports started.
    pub fn start(&self) -> Result<Vec<u16>> {
        let mut pids = self.load_pids();
        let mut started = Vec::new();

        for &port in &self.ports {
            if let Some(pid) = pids.get(&port) {
                tracing::info!(port, pid, "node already started");
                continue;
            }
            let child = Command::new(&self.node_bin)
                .env("PORT", port.to_string())
                .env("PEERS", peers_for(port, &self.ports))
                .stdin(Stdio::null())
                .spawn();
            match child {
                Ok(child) => {
                    tracing::info!(port, pid = child.id(), "node started");
                    pids.insert(port, child.id());
                    started.push(port);
                }
                Err(e) => {
                    tracing::warn!(port, bin = %self.node_bin.display(), error = %e, "failed to start node");
                }
            }
        }

        self.save_pids(&pids)?;
        Ok(started)
    }

    /// SIGTERM every recorded node. Returns the ports stopped.
    pub fn stop(&self) -> Result<Vec<u16>> {
        let mut pids = self.load_pids();
        let mut stopped = Vec::new();

        for (port, pid) in std::mem::take(&mut pids) {
            match signal(pid, "-TERM") {
                Ok(true) => {
                    tracing::info!(port, pid, "node stopped");
                    stopped.push(port);
                }
                Ok(false) => tracing::warn!(port, pid, "node was not running"),
                Err(e) => tracing::warn!(port, pid, error = %e, "could not signal node"),
            }
        }

        self.save_pids(&pids)?;
        Ok(stopped)
    }

    pub fn restart(&self) -> Result<Vec<u16>> {
        self.stop()?;
        self.start()
    }

    pub fn status(&self) -> Vec<(u16, ProcStatus)> {
        let pids = self.load_pids();
        self.ports
            .iter()
            .map(|&port| {
                let st = match pids.get(&port) {
                    None => ProcStatus::NotRunning,
                    Some(&pid) => match signal(pid, "-0") {
                        Ok(true) => ProcStatus::Running(pid),
                        _ => ProcStatus::Dead(pid),
                    },
                };
                (port, st)
            })
            .collect()
    }
}

/// Poll `GET /internal/health` on every port. Each entry is the response
/// body, or the reason the node did not answer.
pub async fn check_health(ports: &[u16], timeout: Duration) -> Vec<(u16, Result<String>)> {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(c) => c,
        Err(e) => {
            let msg = format!("http client init failed: {e}");
            return ports
                .iter()
                .map(|&p| (p, Err(RelayError::Internal(msg.clone()))))
                .collect();
        }
    };

    let mut out = Vec::with_capacity(ports.len());
    for &port in ports {
        let url = format!("http://localhost:{port}/internal/health");
        let res = async {
            let resp = client
                .get(&url)
                .send()
                .await
                .map_err(|e| RelayError::Internal(format!("not responding: {e}")))?;
            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| RelayError::Internal(format!("bad body: {e}")))?;
            Ok(format!("{status} {body}"))
        }
        .await;
        out.push((port, res));
    }
    out
}

fn read_pids(path: &Path) -> PidTable {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

/// `kill <sig> <pid>`; `Ok(false)` when the process does not exist.
fn signal(pid: u32, sig: &str) -> io::Result<bool> {
    let status = Command::new("kill")
        .arg(sig)
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    Ok(status.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peers_exclude_own_port() {
        assert_eq!(
            peers_for(3011, &DEFAULT_PORTS),
            "http://localhost:3010,http://localhost:3012"
        );
        assert_eq!(peers_for(4000, &[4000]), "");
    }

    #[test]
    fn pid_table_round_trips_and_tolerates_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("pids.json");
        let sup = Supervisor::new(vec![3010], &file, "chatrelay-node");

        assert!(sup.load_pids().is_empty());

        let pids = PidTable::from([(3010, 4242), (3011, 4343)]);
        sup.save_pids(&pids).unwrap();
        assert_eq!(sup.load_pids(), pids);

        std::fs::write(&file, "not json").unwrap();
        assert!(sup.load_pids().is_empty());
    }

    #[test]
    fn unrecorded_ports_report_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let sup = Supervisor::new(vec![3010, 3011], dir.path().join("pids.json"), "chatrelay-node");
        assert_eq!(
            sup.status(),
            vec![(3010, ProcStatus::NotRunning), (3011, ProcStatus::NotRunning)]
        );
    }

    #[test]
    fn start_with_missing_binary_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sup = Supervisor::new(
            vec![3010],
            dir.path().join("pids.json"),
            dir.path().join("no-such-binary"),
        );
        assert!(sup.start().unwrap().is_empty());
        assert!(sup.load_pids().is_empty());
    }
}
