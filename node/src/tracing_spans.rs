//! Span constructors shared by the node loop and the simulation harness.

use fedchain_messages::MessageType;
use fedchain_types::{Hash, Timestamp};
use tracing::{debug_span, info_span, Span};

/// Handling of one inbound message, from replay check to execution.
pub fn message_span(msg_type: MessageType, hash: &Hash) -> Span {
    debug_span!("message", msg_type = %msg_type, hash = %hash.short())
}

/// Sealing and committing one directory-block height.
pub fn height_span(db_height: u32) -> Span {
    info_span!("height", db_height)
}

pub fn timer_span(at: Timestamp) -> Span {
    debug_span!("timer", at = at.as_millis())
}

/// The whole lifetime of one node task.
pub fn node_span(name: &str) -> Span {
    info_span!("node", name = %name)
}
