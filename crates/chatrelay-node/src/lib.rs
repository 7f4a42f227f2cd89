//! chatrelay node library entry.
//!
//! This crate wires the message store, presence tracking, realtime dispatch,
//! peer relay and the WebSocket/HTTP transport into one node. It is consumed
//! by the node binary (`main.rs`), the supervisor binary, and integration
//! tests.

pub mod app_state;
pub mod config;
pub mod identity;
pub mod obs;
pub mod ops;
pub mod realtime;
pub mod relay;
pub mod router;
pub mod store;
pub mod supervisor;
pub mod transport;

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;

use chatrelay_core::error::{Result, RelayError};

/// Bind `addr` and serve `state` until ctrl-c.
pub async fn serve(addr: SocketAddr, state: app_state::AppState) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| RelayError::Internal(format!("bind {addr} failed: {e}")))?;
    serve_with_shutdown(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Serve on an already bound listener (lets tests bind port 0 first).
pub async fn serve_on(listener: TcpListener, state: app_state::AppState) -> Result<()> {
    serve_with_shutdown(listener, state, std::future::pending()).await
}

/// Serve until `signal` resolves. Then the listener stops accepting and
/// every live WebSocket session is closed.
pub async fn serve_with_shutdown<F>(listener: TcpListener, state: app_state::AppState, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let stopper = state.clone();
    let app = router::build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            stopper.begin_shutdown();
        })
        .await
        .map_err(|e| RelayError::Internal(format!("server failed: {e}")))
}
