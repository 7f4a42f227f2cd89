//! chatrelay core: transport-agnostic wire contracts, ids, and error types.
//!
//! This crate defines the envelope and event shapes shared by the node, the
//! client, and the operational tooling. It carries no transport or runtime
//! dependencies so both sides of the wire can reuse it.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed input surfaces as `RelayError`/`Result`, never as a crash.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ClientCode, RelayError, Result};
pub use protocol::envelope::{ChatPayload, Envelope};
pub use protocol::event::{ClientEvent, ErrorBody, ServerEvent, UserEntry};
