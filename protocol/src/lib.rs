//! Wire protocol primitives.
//!
//! Every entity on the wire is `[type: 1 byte][fields in declared order]`.
//! This crate supplies the field-level building blocks: the [`Encode`] and
//! [`Decode`] traits, a bounds-checked [`WireReader`] that consumes a prefix
//! and hands back the remainder, and the error types.

pub mod codec;
pub mod error;
pub mod version;

pub use codec::{decode_exact, Decode, Encode, WireReader, MAX_FIELD_SIZE};
pub use error::{DecodeError, EncodeError};
pub use version::PROTOCOL_VERSION;
