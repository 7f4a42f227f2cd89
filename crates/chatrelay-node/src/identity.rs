//! Identity seam.
//!
//! Credential checks live outside the node. A resolver turns whatever the
//! connecting client presented (an opaque ticket) into a verified user id,
//! which the node only uses to label its logs.

use std::collections::HashMap;

use async_trait::async_trait;

use chatrelay_core::error::{Result, RelayError};

/// Verified identity handed to the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
}

/// User id given to every connection when no tickets are configured.
pub const GUEST: &str = "guest";

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, ticket: Option<&str>) -> Result<Identity>;
}

/// Static ticket table from config. An empty table admits everyone.
#[derive(Debug, Default)]
pub struct TicketTable {
    tickets: HashMap<String, String>,
}

impl TicketTable {
    pub fn new(tickets: HashMap<String, String>) -> Self {
        Self { tickets }
    }
}

#[async_trait]
impl IdentityResolver for TicketTable {
    async fn resolve(&self, ticket: Option<&str>) -> Result<Identity> {
        if self.tickets.is_empty() {
            return Ok(Identity { user_id: GUEST.to_string() });
        }
        let ticket = ticket.ok_or(RelayError::AuthFailed)?;
        self.tickets
            .get(ticket)
            .map(|user_id| Identity { user_id: user_id.clone() })
            .ok_or(RelayError::AuthFailed)
    }
}
