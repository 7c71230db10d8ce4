//! Cryptographic primitives for the fedchain node.
//!
//! - **Ed25519** for signing and verifying consensus messages
//! - **SHA-256** for message hashes, block key-MRs and server identities
//!
//! The consensus core treats all of these as opaque calls.

pub mod hash;
pub mod keys;
pub mod sign;

pub use hash::{identity_of, sha256, sha256_multi};
pub use keys::{
    generate_keypair, keypair_from_hex, keypair_from_private, keypair_from_seed,
    public_from_private, public_key_from_hex, KeyError,
};
pub use sign::{sign_message, verify_signature};
