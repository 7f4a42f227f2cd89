//! Realtime runtime (dispatch + egress) for a chatrelay node.

pub mod core;
pub mod types;

pub use self::core::{ConnectionId, PresenceTracker, RealtimeCore, SessionRegistry};
pub use types::PreparedMsg;
