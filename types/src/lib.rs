//! Fundamental types for the fedchain node.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! hashes, timestamps, network identifiers, node modes, keys, block kinds and the
//! fixed protocol parameters of the block/minute cadence.

pub mod block_kind;
pub mod error;
pub mod hash;
pub mod keys;
pub mod mode;
pub mod network;
pub mod params;
pub mod time;

pub use block_kind::BlockKind;
pub use error::TypesError;
pub use hash::Hash;
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use mode::NodeMode;
pub use network::NetworkId;
pub use params::{MinuteNumber, LAST_MINUTE, MINUTES_PER_BLOCK};
pub use time::Timestamp;
