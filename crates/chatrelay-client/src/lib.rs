//! chatrelay client: a failover-capable chat session against a set of nodes.
//!
//! A session picks one node at random, keeps a live WebSocket to it, and
//! moves to another node whenever the link drops. The local chat view is
//! rebuilt from each node's `message_log` seed and extended by broadcasts.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod session;
pub mod view;

pub use session::{fetch_users, pick_node, ws_url, ClientConfig, ClientHandle, ClientSession, ClientState};
pub use view::ChatView;
