//! Ed25519 key generation and parsing.

use ed25519_dalek::SigningKey;
use fedchain_types::{KeyPair, PrivateKey, PublicKey};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("key is not valid hex: {0}")]
    InvalidHex(String),

    #[error("key must be 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("bytes are not a valid Ed25519 public key")]
    InvalidPublicKey,
}

/// Generate a new Ed25519 key pair from the thread-local CSPRNG.
pub fn generate_keypair() -> KeyPair {
    let seed: [u8; 32] = rand::random();
    keypair_from_seed(&seed)
}

/// Derive the public key from a private key.
pub fn public_from_private(private: &PrivateKey) -> PublicKey {
    let signing_key = SigningKey::from_bytes(&private.0);
    PublicKey(signing_key.verifying_key().to_bytes())
}

/// Reconstruct a full key pair from a private key.
pub fn keypair_from_private(private: PrivateKey) -> KeyPair {
    let public = public_from_private(&private);
    KeyPair { public, private }
}

/// Derive a key pair from a 32-byte seed (deterministic).
///
/// Simulated networks derive every server's key this way.
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    let signing_key = SigningKey::from_bytes(seed);
    KeyPair {
        public: PublicKey(signing_key.verifying_key().to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

/// Parse a hex-encoded 32-byte private key, as found in node configuration.
pub fn keypair_from_hex(private_hex: &str) -> Result<KeyPair, KeyError> {
    let seed = decode_32(private_hex)?;
    Ok(keypair_from_seed(&seed))
}

/// Parse a hex-encoded 32-byte public key and check that it is a curve point.
pub fn public_key_from_hex(public_hex: &str) -> Result<PublicKey, KeyError> {
    let bytes = decode_32(public_hex)?;
    ed25519_dalek::VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
    Ok(PublicKey(bytes))
}

fn decode_32(s: &str) -> Result<[u8; 32], KeyError> {
    let bytes = hex::decode(s.trim()).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| KeyError::InvalidLength(len))
}
