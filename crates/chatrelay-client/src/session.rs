//! Client session: random node pick, failover loop, optimistic echo.
//!
//! State machine:
//! `Disconnected -> Connecting{addr} -> Connected{addr} -> (link lost) ->
//! Disconnected -> (retry_delay) -> Connecting{other addr} -> ...`
//!
//! Retries are unbounded with a fixed delay. Each (re)connect announces the
//! display name with `set_username` before anything else is sent.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::seq::SliceRandom;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use chatrelay_core::error::{RelayError, Result};
use chatrelay_core::protocol::event::encode;
use chatrelay_core::{ChatPayload, ClientEvent, Envelope, ServerEvent, UserEntry};

use crate::view::ChatView;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Server events buffered per subscriber.
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Node base URLs (`http://host:port`).
    pub nodes: Vec<String>,
    pub retry_delay: Duration,
}

impl ClientConfig {
    pub fn new(nodes: Vec<String>) -> Self {
        Self {
            nodes,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting { addr: String },
    Connected { addr: String },
}

impl ClientState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ClientState::Connected { .. })
    }
}

/// `http://h:p` -> `ws://h:p/ws`, `https://` -> `wss://`.
pub fn ws_url(addr: &str) -> Result<String> {
    let base = addr.trim().trim_end_matches('/');
    let swapped = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(RelayError::BadRequest(format!("node address must be http(s): {addr}")));
    };
    Ok(format!("{swapped}/ws"))
}

/// Uniform random pick, avoiding `last` when there is any alternative.
pub fn pick_node<R: rand::Rng + ?Sized>(nodes: &[String], last: Option<&str>, rng: &mut R) -> Option<String> {
    let candidates: Vec<&String> = match last {
        Some(last) if nodes.len() > 1 => nodes.iter().filter(|n| n.as_str() != last).collect(),
        _ => nodes.iter().collect(),
    };
    let pool: Vec<&String> = if candidates.is_empty() { nodes.iter().collect() } else { candidates };
    pool.choose(rng).map(|n| n.to_string())
}

/// Presence fallback: `GET <addr>/internal/users`.
pub async fn fetch_users(addr: &str) -> Result<Vec<UserEntry>> {
    let url = format!("{}/internal/users", addr.trim_end_matches('/'));
    let resp = reqwest::get(&url)
        .await
        .map_err(|e| RelayError::Internal(format!("GET {url} failed: {e}")))?;
    resp.json::<Vec<UserEntry>>()
        .await
        .map_err(|e| RelayError::Internal(format!("invalid users body from {url}: {e}")))
}

/// State shared between the handle and the connection task.
struct Shared {
    view: Mutex<ChatView>,
    events: broadcast::Sender<ServerEvent>,
}

impl Shared {
    fn view(&self) -> MutexGuard<'_, ChatView> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, ev: ServerEvent) {
        self.view().apply(&ev);
        // no subscribers is fine
        let _ = self.events.send(ev);
    }
}

pub struct ClientSession;

impl ClientSession {
    /// Start a session under `name`. Must run inside a tokio runtime.
    pub fn join(cfg: ClientConfig, name: &str) -> Result<ClientHandle> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RelayError::BadRequest("display name is required".into()));
        }
        if cfg.nodes.is_empty() {
            return Err(RelayError::BadRequest("at least one node address is required".into()));
        }
        for n in &cfg.nodes {
            ws_url(n)?;
        }

        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let shared = Arc::new(Shared {
            view: Mutex::new(ChatView::default()),
            events,
        });
        let (state_tx, state_rx) = watch::channel(ClientState::Disconnected);
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_loop(
            cfg,
            name.to_string(),
            Arc::clone(&shared),
            out_rx,
            state_tx,
        ));

        Ok(ClientHandle {
            name: name.to_string(),
            shared,
            state: state_rx,
            outbound: out_tx,
            task,
        })
    }
}

/// Caller-side handle. Dropping it ends the session.
pub struct ClientHandle {
    name: String,
    shared: Arc<Shared>,
    state: watch::Receiver<ClientState>,
    outbound: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl ClientHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ClientState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ClientState> {
        self.state.clone()
    }

    pub fn view(&self) -> ChatView {
        self.shared.view().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.shared.events.subscribe()
    }

    /// Wait until the session reports `Connected`, up to `timeout`.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.state.clone();
        let connected = matches!(
            tokio::time::timeout(timeout, rx.wait_for(ClientState::is_connected)).await,
            Ok(Ok(_))
        );
        connected
    }

    /// Send `{from, text}` to the current node and append an optimistic
    /// copy to the local view. The returned envelope is that local copy.
    pub fn send(&self, text: &str) -> Result<Envelope> {
        if !self.state.borrow().is_connected() {
            return Err(RelayError::NotConnected);
        }
        let payload = ChatPayload::new(self.name.clone(), text);
        payload.validate()?;

        let frame = encode(&ClientEvent::ChatMessage(payload.clone()))?;
        self.outbound.send(frame).map_err(|_| RelayError::NotConnected)?;

        let echo = payload.into_envelope(None);
        self.shared.view().echo(echo.clone());
        Ok(echo)
    }

    pub fn leave(self) {
        // Drop aborts the task.
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn choose_next(nodes: &[String], last: Option<&str>) -> Option<String> {
    pick_node(nodes, last, &mut rand::thread_rng())
}

async fn run_loop(
    cfg: ClientConfig,
    name: String,
    shared: Arc<Shared>,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    state_tx: watch::Sender<ClientState>,
) {
    let mut last: Option<String> = None;

    loop {
        let Some(addr) = choose_next(&cfg.nodes, last.as_deref()) else {
            break;
        };
        state_tx.send_replace(ClientState::Connecting { addr: addr.clone() });

        match connect_once(&addr, &name, &shared, &mut out_rx, &state_tx).await {
            Ok(()) => tracing::info!(node = %addr, "connection closed, failing over"),
            Err(e) => tracing::warn!(node = %addr, error = %e, "connection failed, failing over"),
        }

        state_tx.send_replace(ClientState::Disconnected);
        last = Some(addr);
        tokio::time::sleep(cfg.retry_delay).await;
    }
}

async fn connect_once(
    addr: &str,
    name: &str,
    shared: &Shared,
    out_rx: &mut mpsc::UnboundedReceiver<String>,
    state_tx: &watch::Sender<ClientState>,
) -> Result<()> {
    let url = ws_url(addr)?;
    let (ws, _resp) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| RelayError::Internal(format!("connect {url} failed: {e}")))?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let hello = encode(&ClientEvent::SetUsername(name.to_string()))?;
    ws_tx
        .send(Message::Text(hello))
        .await
        .map_err(|e| RelayError::Internal(format!("send set_username failed: {e}")))?;

    // frames queued while offline belong to a previous link
    while out_rx.try_recv().is_ok() {}

    state_tx.send_replace(ClientState::Connected { addr: addr.to_string() });
    tracing::info!(node = %addr, user = %name, "connected");

    loop {
        tokio::select! {
            out = out_rx.recv() => {
                let Some(frame) = out else { return Ok(()) };
                ws_tx
                    .send(Message::Text(frame))
                    .await
                    .map_err(|e| RelayError::Internal(format!("send failed: {e}")))?;
            }
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(s))) => match ServerEvent::decode(&s) {
                    Ok(ev) => shared.apply(ev),
                    Err(e) => tracing::warn!(error = %e, "ignoring undecodable server frame"),
                },
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(RelayError::Internal(format!("read failed: {e}"))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn nodes() -> Vec<String> {
        vec![
            "http://localhost:3010".into(),
            "http://localhost:3011".into(),
            "http://localhost:3012".into(),
        ]
    }

    #[test]
    fn ws_url_swaps_scheme_and_appends_path() {
        assert_eq!(ws_url("http://localhost:3010").unwrap(), "ws://localhost:3010/ws");
        assert_eq!(ws_url("https://chat.example/").unwrap(), "wss://chat.example/ws");
        assert!(ws_url("localhost:3010").is_err());
    }

    #[test]
    fn failover_never_repeats_the_lost_node() {
        let nodes = nodes();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let next = pick_node(&nodes, Some("http://localhost:3011"), &mut rng).unwrap();
            assert_ne!(next, "http://localhost:3011");
        }
    }

    #[test]
    fn single_node_is_retried() {
        let one = vec!["http://localhost:3010".to_string()];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            pick_node(&one, Some("http://localhost:3010"), &mut rng).as_deref(),
            Some("http://localhost:3010")
        );
        assert_eq!(pick_node(&[], None, &mut rng), None);
    }

    #[test]
    fn first_pick_covers_every_node() {
        let nodes = nodes();
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(pick_node(&nodes, None, &mut rng).unwrap());
        }
        assert_eq!(seen.len(), nodes.len());
    }

    #[tokio::test]
    async fn join_requires_a_name_and_nodes() {
        let cfg = ClientConfig::new(nodes());
        assert!(ClientSession::join(cfg.clone(), "  ").is_err());
        assert!(ClientSession::join(ClientConfig::new(vec![]), "alice").is_err());
        assert!(ClientSession::join(ClientConfig::new(vec!["ftp://x".into()]), "alice").is_err());
    }

    #[tokio::test]
    async fn send_before_connect_is_rejected() {
        // port 9 (discard) refuses connections, so the session never connects
        let cfg = ClientConfig::new(vec!["http://127.0.0.1:9".into()])
            .with_retry_delay(Duration::from_millis(50));
        let handle = ClientSession::join(cfg, "alice").unwrap();
        assert!(matches!(handle.send("hi"), Err(RelayError::NotConnected)));
        assert!(handle.view().messages.is_empty());
        handle.leave();
    }

    #[tokio::test]
    async fn wait_connected_gives_up_after_timeout() {
        let cfg = ClientConfig::new(vec!["http://127.0.0.1:9".into()])
            .with_retry_delay(Duration::from_millis(20));
        let handle = ClientSession::join(cfg, "alice").unwrap();
        assert!(!handle.wait_connected(Duration::from_millis(200)).await);
        assert!(!handle.state().is_connected());
    }
}
