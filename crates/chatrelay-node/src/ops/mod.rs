//! Internal and operational HTTP endpoints.
//!
//! - `POST /internal/relay`  : envelope from a peer node
//! - `GET  /internal/health` : liveness + peer list
//! - `GET  /internal/users`  : presence snapshot (polling fallback)
//! - `GET  /metrics`         : Prometheus text format

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use chatrelay_core::error::RelayError;
use chatrelay_core::UserEntry;

use crate::app_state::AppState;

/// `RelayError` rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub RelayError);

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if !self.0.is_caller_fault() {
            tracing::error!(error = %self.0, "request failed");
        }
        let status = match self.0 {
            RelayError::BadRequest(_) | RelayError::UnsupportedVersion => StatusCode::BAD_REQUEST,
            RelayError::AuthFailed => StatusCode::UNAUTHORIZED,
            RelayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::NotConnected | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "error": self.0.client_code().as_str(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct RelayAck {
    pub ok: bool,
    pub stored: bool,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub ok: bool,
    pub port: u16,
    pub peers: Vec<String>,
}

/// Body is taken raw; any content type is accepted and every parse failure
/// is answered as `ApiError`.
pub async fn relay(State(state): State<AppState>, body: Bytes) -> Result<Json<RelayAck>, ApiError> {
    let body: Value = serde_json::from_slice(&body)
        .map_err(|e| RelayError::BadRequest(format!("relay body is not json: {e}")))?;
    let stored = state.relay().receive(&state.realtime(), body)?;
    Ok(Json(RelayAck { ok: true, stored }))
}

pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        ok: true,
        port: state.cfg().node.port,
        peers: state.relay().peers().to_vec(),
    })
}

pub async fn users(State(state): State<AppState>) -> Json<Vec<UserEntry>> {
    Json(state.realtime().users())
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let body = state.metrics().render();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}
