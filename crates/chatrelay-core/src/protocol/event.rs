//! Channel events (JSON text frames).
//!
//! Every frame is `{"event": "<name>", "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::protocol::envelope::{ChatPayload, Envelope};

/// Client -> node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    SetUsername(String),
    ChatMessage(ChatPayload),
}

/// Node -> client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Most recent envelopes, sent once per connection.
    MessageLog(Vec<Envelope>),
    /// Presence snapshot, pushed on every membership or name change.
    Users(Vec<UserEntry>),
    /// One newly accepted envelope (local or relayed).
    ChatMessage(Envelope),
    /// A frame from this connection was rejected.
    Error(ErrorBody),
}

/// One row of a presence snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub msg: String,
}

impl ErrorBody {
    pub fn from_error(err: &RelayError) -> Self {
        Self {
            code: err.client_code().as_str().to_string(),
            msg: err.to_string(),
        }
    }
}

impl ClientEvent {
    /// Decode one text frame. Semantic checks (empty name, missing text)
    /// are applied here so callers only see well-formed events.
    pub fn decode(s: &str) -> Result<Self> {
        let ev: ClientEvent = serde_json::from_str(s)
            .map_err(|e| RelayError::BadRequest(format!("invalid event json: {e}")))?;
        let checked = match &ev {
            ClientEvent::SetUsername(name) if name.trim().is_empty() => {
                Err(RelayError::BadRequest("set_username requires a name".into()))
            }
            ClientEvent::ChatMessage(p) => p.validate(),
            _ => Ok(()),
        };
        checked.map(|_| ev)
    }
}

/// Encode any event as a text frame.
pub fn encode<T: Serialize>(ev: &T) -> Result<String> {
    serde_json::to_string(ev).map_err(|e| RelayError::Internal(format!("json encode failed: {e}")))
}

impl ServerEvent {
    pub fn decode(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| RelayError::BadRequest(format!("invalid event json: {e}")))
    }
}
