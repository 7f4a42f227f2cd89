//! Decode-once codec for the client channel.
//!
//! - Text frames => `ClientEvent` (after a cheap length check)
//! - Binary frames are not part of the protocol and are rejected
//! - Ping/Pong/Close are surfaced for lifecycle management

use axum::extract::ws::Message;
use chatrelay_core::{
    error::{Result, RelayError},
    protocol::event::ClientEvent,
};

#[derive(Debug)]
pub enum Inbound {
    Event(ClientEvent),
    Control,
    Close,
}

/// Cheap frame length (checked before any parsing).
pub fn frame_len(msg: &Message) -> usize {
    match msg {
        Message::Text(s) => s.len(),
        Message::Binary(b) => b.len(),
        Message::Ping(v) => v.len(),
        Message::Pong(v) => v.len(),
        Message::Close(_) => 0,
    }
}

pub fn decode(msg: Message, max_frame_bytes: usize) -> Result<Inbound> {
    if frame_len(&msg) > max_frame_bytes {
        return Err(RelayError::PayloadTooLarge);
    }
    match msg {
        Message::Text(s) => ClientEvent::decode(&s).map(Inbound::Event),
        Message::Binary(_) => Err(RelayError::BadRequest("binary frames are not supported".into())),
        Message::Ping(_) | Message::Pong(_) => Ok(Inbound::Control),
        Message::Close(_) => Ok(Inbound::Close),
    }
}
