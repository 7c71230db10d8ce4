//! Signing and verification shared by the signed message variants.

use fedchain_crypto::{sha256, sign_message, verify_signature};
use fedchain_protocol::codec::put_signature;
use fedchain_protocol::EncodeError;
use fedchain_types::{Hash, KeyPair, PublicKey, Signature};

/// A message variant carrying `signer` and `signature` as its last two fields.
pub trait SignedPayload {
    /// Write the tag and every field up to, not including, the signature.
    fn write_signable(&self, out: &mut Vec<u8>) -> Result<(), EncodeError>;

    fn signer(&self) -> &PublicKey;

    fn signature(&self) -> &Signature;

    fn set_signature(&mut self, signer: PublicKey, signature: Signature);

    fn signable_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::new();
        self.write_signable(&mut out)?;
        Ok(out)
    }

    /// SHA-256 of the signable prefix.
    fn signature_hash(&self) -> Result<Hash, EncodeError> {
        Ok(sha256(&self.signable_bytes()?))
    }

    /// Install `key.public` as the signer and sign the resulting prefix.
    fn sign(&mut self, key: &KeyPair) -> Result<(), EncodeError> {
        self.set_signature(key.public, Signature::ZERO);
        let bytes = self.signable_bytes()?;
        self.set_signature(key.public, sign_message(&bytes, &key.private));
        Ok(())
    }

    fn verify(&self) -> bool {
        match self.signable_bytes() {
            Ok(bytes) => verify_signature(&bytes, self.signature(), self.signer()),
            Err(_) => false,
        }
    }

    fn write_signed(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        self.write_signable(out)?;
        put_signature(out, self.signature());
        Ok(())
    }
}
