//! Facade for chatrelay: one dependency for the wire types, the node and the client.

pub mod core {
    pub use chatrelay_core::*;
}

pub mod node {
    pub use chatrelay_node::*;
}

pub mod client {
    pub use chatrelay_client::*;
}
