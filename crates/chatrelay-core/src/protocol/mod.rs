//! Protocol modules (envelopes + channel events).
//!
//! - `envelope`: the immutable chat unit relayed between nodes, and the
//!   client-side payload it is built from.
//! - `event`: adjacently tagged JSON events carried over the persistent
//!   client channel.
//!
//! Decoding is panic-free: malformed input is reported as `RelayError`.

pub mod envelope;
pub mod event;
