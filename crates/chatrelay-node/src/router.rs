//! Axum router wiring (client WS upgrade + internal node endpoints).

use axum::{
    routing::{get, post},
    Router,
};

use crate::{app_state::AppState, ops, relay::RELAY_PATH, transport};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(transport::ws::ws_upgrade))
        .route(RELAY_PATH, post(ops::relay))
        .route("/internal/health", get(ops::health))
        .route("/internal/users", get(ops::users))
        .route("/metrics", get(ops::metrics))
        .with_state(state)
}
