//! Consensus messages for fedchain node-to-node communication.
//!
//! [`Message`] is a closed sum type; every variant is `[type][fields]` on the
//! wire and the type byte is authoritative. Signed variants implement
//! [`SignedPayload`]: the signature covers the encoding up to, but not
//! including, the signature field.

pub mod kind;
pub mod message;
pub mod payloads;
pub mod signed;

pub use fedchain_blocks::AdminBlockEntry;
pub use kind::MessageType;
pub use message::Message;
pub use payloads::{
    Acknowledgement, DBStateMessage, EndOfMinute, FaultReport, HeartBeat, RequestBlock,
};
pub use signed::SignedPayload;
