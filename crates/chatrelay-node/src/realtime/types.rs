use axum::extract::ws::Message;

use chatrelay_core::error::Result;
use chatrelay_core::protocol::event::{encode, ServerEvent};

/// Prepared frame cached for broadcasting (serialize once, send N times).
#[derive(Debug, Clone)]
pub struct PreparedMsg(String);

impl PreparedMsg {
    pub fn prepare(ev: &ServerEvent) -> Result<Self> {
        encode(ev).map(PreparedMsg)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to axum::ws::Message for transport.
    pub fn to_ws_message(&self) -> Message {
        Message::Text(self.0.clone())
    }
}
