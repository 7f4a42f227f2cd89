//! WebSocket handler: one `NodeSession` per connection.
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS, resolve the caller's identity from `?ticket=`
//! - Register the connection with the realtime core (log seed + presence)
//! - Decode-once each frame, route `set_username` / `chat_message`
//! - Hand newly stored local envelopes to the peer relay
//! - Lifecycle: ping + idle timeout, node shutdown, presence cleanup on exit
//!
//! A malformed frame only earns the sender an `error` event; the
//! connection stays open.

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, Query, State},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::Instrument;

use chatrelay_core::error::Result;
use chatrelay_core::protocol::event::{encode, ClientEvent, ErrorBody, ServerEvent};

use crate::app_state::AppState;
use crate::realtime::ConnectionId;
use crate::transport::codec::{decode, Inbound};

/// Per-connection outbound queue depth.
const OUTBOUND_QUEUE: usize = 1024;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub ticket: Option<String>,
}

pub async fn ws_upgrade(
    State(app): State<AppState>,
    ws: WebSocketUpgrade,
    Query(q): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = run_session(app, q, socket).await {
            tracing::debug!(error = %e, "session ended with error");
        }
    })
}

async fn run_session(app: AppState, q: WsQuery, mut socket: WebSocket) -> Result<()> {
    let identity = match app.identity().resolve(q.ticket.as_deref()).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "connection refused by identity resolver");
            if let Ok(frame) = encode(&ServerEvent::Error(ErrorBody::from_error(&e))) {
                let _ = socket.send(Message::Text(frame)).await;
            }
            let _ = socket.close().await;
            return Err(e);
        }
    };

    let (out_tx, out_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);
    let core = app.realtime();
    let conn = core.connect(out_tx);

    let span = tracing::info_span!("session", conn = %conn, user = %identity.user_id);
    let res = session_loop(&app, conn, socket, out_rx).instrument(span).await;

    core.disconnect(conn);
    res
}

async fn session_loop(
    app: &AppState,
    conn: ConnectionId,
    socket: WebSocket,
    mut out_rx: mpsc::Receiver<Message>,
) -> Result<()> {
    let core = app.realtime();
    let relay = app.relay();
    let node = &app.cfg().node;

    let (mut ws_tx, mut ws_rx) = socket.split();

    let ping_every = Duration::from_millis(node.ping_interval_ms);
    let idle_timeout = Duration::from_millis(node.idle_timeout_ms);
    let mut ping_tick = tokio::time::interval(ping_every);
    ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut last_activity = Instant::now();
    let mut shutdown = app.shutdown_signal();

    loop {
        tokio::select! {
            // outbound writer
            maybe_out = out_rx.recv() => {
                let Some(m) = maybe_out else { break };
                if ws_tx.send(m).await.is_err() {
                    break;
                }
            }

            // inbound reader
            incoming = ws_rx.next() => {
                let Some(Ok(msg)) = incoming else { break };
                last_activity = Instant::now();

                match decode(msg, node.max_frame_bytes) {
                    Ok(Inbound::Event(ClientEvent::SetUsername(name))) => {
                        core.set_name(conn, &name);
                    }
                    Ok(Inbound::Event(ClientEvent::ChatMessage(payload))) => {
                        if let Some(env) = core.accept_local(conn, payload) {
                            relay.forward(&env);
                        }
                    }
                    // tungstenite answers pings itself
                    Ok(Inbound::Control) => {}
                    Ok(Inbound::Close) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "ignoring malformed frame");
                        core.send_error(conn, &e);
                    }
                }
            }

            // ping
            _ = ping_tick.tick() => {
                if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }

            // node shutdown
            _ = async { shutdown.wait_for(|stop| *stop).await.map(|_| ()) } => {
                tracing::info!("node shutting down, closing session");
                break;
            }

            // idle timeout
            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                if last_activity.elapsed() >= idle_timeout {
                    tracing::info!("idle timeout");
                    break;
                }
            }
        }
    }

    let _ = ws_tx.close().await;
    Ok(())
}
