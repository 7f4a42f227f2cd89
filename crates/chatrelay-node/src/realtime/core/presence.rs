use std::collections::BTreeMap;
use std::fmt;

use chatrelay_core::protocol::envelope::ANONYMOUS;
use chatrelay_core::UserEntry;

/// Transport-assigned id of one open connection. Ids grow monotonically,
/// so ordering by id is connect order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Locally connected clients and their display names.
#[derive(Default)]
pub struct PresenceTracker {
    clients: BTreeMap<ConnectionId, Option<String>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(&mut self, conn: ConnectionId) {
        self.clients.insert(conn, None);
    }

    /// Returns false when the connection is unknown (already gone).
    pub fn on_set_name(&mut self, conn: ConnectionId, name: &str) -> bool {
        match self.clients.get_mut(&conn) {
            Some(slot) => {
                *slot = Some(name.to_string());
                true
            }
            None => false,
        }
    }

    pub fn on_disconnect(&mut self, conn: ConnectionId) -> bool {
        self.clients.remove(&conn).is_some()
    }

    /// Current display name, if the client ever set one.
    pub fn display_name(&self, conn: ConnectionId) -> Option<&str> {
        self.clients.get(&conn).and_then(|n| n.as_deref())
    }

    /// True when the client still shows up as anonymous.
    pub fn is_unnamed(&self, conn: ConnectionId) -> bool {
        match self.display_name(conn) {
            None => true,
            Some(n) => n == ANONYMOUS,
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Exactly the connected set, in connect order.
    pub fn snapshot(&self) -> Vec<UserEntry> {
        self.clients
            .iter()
            .map(|(id, name)| UserEntry {
                id: id.to_string(),
                username: name.clone().unwrap_or_else(|| ANONYMOUS.to_string()),
            })
            .collect()
    }
}
