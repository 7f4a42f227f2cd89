//! Realtime core components for the node runtime.
//!
//! Connection registry, presence tracking, and the serialized dispatch core
//! that owns the message store.

mod presence;
mod realtime;
mod session_registry;

pub use presence::{ConnectionId, PresenceTracker};
pub use realtime::RealtimeCore;
pub use session_registry::{Connection, SessionRegistry};
