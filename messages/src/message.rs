//! The closed [`Message`] sum type.

use crate::{
    Acknowledgement, DBStateMessage, EndOfMinute, FaultReport, HeartBeat, MessageType,
    RequestBlock, SignedPayload,
};
use fedchain_crypto::sha256;
use fedchain_protocol::{Decode, DecodeError, Encode, EncodeError};
use fedchain_types::{Hash, PublicKey, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    EndOfMinute(EndOfMinute),
    RequestBlock(RequestBlock),
    Acknowledgement(Acknowledgement),
    DBState(DBStateMessage),
    HeartBeat(HeartBeat),
    FaultReport(FaultReport),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::EndOfMinute(_) => MessageType::EndOfMinute,
            Self::RequestBlock(_) => MessageType::RequestBlock,
            Self::Acknowledgement(_) => MessageType::Acknowledgement,
            Self::DBState(_) => MessageType::DBState,
            Self::HeartBeat(_) => MessageType::HeartBeat,
            Self::FaultReport(_) => MessageType::FaultReport,
        }
    }

    /// Origin timestamp.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::EndOfMinute(m) => m.timestamp,
            Self::RequestBlock(m) => m.timestamp,
            Self::Acknowledgement(m) => m.timestamp,
            Self::DBState(m) => m.timestamp,
            Self::HeartBeat(m) => m.timestamp,
            Self::FaultReport(m) => m.timestamp,
        }
    }

    /// Content hash: SHA-256 of the full encoding.
    pub fn hash(&self) -> Result<Hash, EncodeError> {
        Ok(sha256(&self.encode()?))
    }

    /// SHA-256 of the signable prefix. Unsigned variants sign nothing, so
    /// this equals the content hash for them.
    pub fn signature_hash(&self) -> Result<Hash, EncodeError> {
        match self.as_signed() {
            Some(signed) => signed.signature_hash(),
            None => self.hash(),
        }
    }

    pub fn as_signed(&self) -> Option<&dyn SignedPayload> {
        match self {
            Self::EndOfMinute(m) => Some(m),
            Self::Acknowledgement(m) => Some(m),
            Self::HeartBeat(m) => Some(m),
            Self::FaultReport(m) => Some(m),
            Self::RequestBlock(_) | Self::DBState(_) => None,
        }
    }

    pub fn signer(&self) -> Option<&PublicKey> {
        self.as_signed().map(|s| s.signer())
    }

    /// Signature check. Unsigned variants always pass.
    pub fn verify(&self) -> bool {
        self.as_signed().map_or(true, |s| s.verify())
    }
}

impl Encode for Message {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        match self {
            Self::EndOfMinute(m) => m.encode_into(out),
            Self::RequestBlock(m) => m.encode_into(out),
            Self::Acknowledgement(m) => m.encode_into(out),
            Self::DBState(m) => m.encode_into(out),
            Self::HeartBeat(m) => m.encode_into(out),
            Self::FaultReport(m) => m.encode_into(out),
        }
    }
}

impl Decode for Message {
    /// Dispatch on the leading type byte. An unknown tag is a malformed type
    /// field.
    fn decode_prefix(data: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let tag = *data.first().ok_or(DecodeError::Truncated {
            field: "type",
            needed: 1,
            remaining: 0,
        })?;
        let kind = MessageType::from_tag(tag)
            .ok_or_else(|| DecodeError::malformed("type", format!("unknown message type {tag}")))?;
        match kind {
            MessageType::EndOfMinute => {
                EndOfMinute::decode_prefix(data).map(|(m, rest)| (Self::EndOfMinute(m), rest))
            }
            MessageType::Acknowledgement => Acknowledgement::decode_prefix(data)
                .map(|(m, rest)| (Self::Acknowledgement(m), rest)),
            MessageType::FaultReport => {
                FaultReport::decode_prefix(data).map(|(m, rest)| (Self::FaultReport(m), rest))
            }
            MessageType::HeartBeat => {
                HeartBeat::decode_prefix(data).map(|(m, rest)| (Self::HeartBeat(m), rest))
            }
            MessageType::RequestBlock => {
                RequestBlock::decode_prefix(data).map(|(m, rest)| (Self::RequestBlock(m), rest))
            }
            MessageType::DBState => {
                DBStateMessage::decode_prefix(data).map(|(m, rest)| (Self::DBState(m), rest))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedchain_crypto::keypair_from_seed;
    use fedchain_protocol::decode_exact;

    #[test]
    fn dispatches_on_tag() {
        let msg = Message::RequestBlock(RequestBlock {
            timestamp: Timestamp::from_secs(5),
        });
        let bytes = msg.encode().unwrap();
        assert_eq!(decode_exact::<Message>(&bytes).unwrap(), msg);
    }

    #[test]
    fn unknown_tag_is_malformed() {
        assert!(matches!(
            Message::decode_prefix(&[0xEE, 0, 0]),
            Err(DecodeError::MalformedField { field: "type", .. })
        ));
    }

    #[test]
    fn empty_input_is_truncated() {
        assert!(matches!(
            Message::decode_prefix(&[]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn hash_changes_with_signature_but_signature_hash_does_not() {
        let key = keypair_from_seed(&[3; 32]);
        let mut eom = EndOfMinute::new(Timestamp::from_secs(1), 0, 0, 0, 0);
        eom.sign(&key).unwrap();
        let signed = Message::EndOfMinute(eom.clone());

        let mut other = eom;
        other.signature = fedchain_types::Signature([1; 64]);
        let forged = Message::EndOfMinute(other);

        assert_ne!(signed.hash().unwrap(), forged.hash().unwrap());
        assert_eq!(
            signed.signature_hash().unwrap(),
            forged.signature_hash().unwrap()
        );
        assert!(signed.verify());
        assert!(!forged.verify());
    }

    #[test]
    fn unsigned_variants_verify() {
        let msg = Message::RequestBlock(RequestBlock {
            timestamp: Timestamp::from_secs(5),
        });
        assert!(msg.verify());
        assert!(msg.signer().is_none());
        assert_eq!(msg.signature_hash().unwrap(), msg.hash().unwrap());
    }
}
