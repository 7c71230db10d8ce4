//! The concrete message variants and their wire encodings.

use crate::{MessageType, SignedPayload};
use fedchain_blocks::{AdminBlock, DirectoryBlock, EntryCreditBlock, FactoidBlock};
use fedchain_protocol::codec::{
    put_hash, put_nested, put_public_key, put_timestamp, put_u32, put_u8,
};
use fedchain_protocol::{Decode, DecodeError, Encode, EncodeError, WireReader};
use fedchain_types::{Hash, MinuteNumber, PublicKey, Signature, Timestamp};
use serde::{Deserialize, Serialize};

/// Closes a minute. Sent by the in-charge leader; `message_count` is the number
/// of messages the leader ordered into that minute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndOfMinute {
    pub timestamp: Timestamp,
    pub minute: MinuteNumber,
    pub db_height: u32,
    pub server_index: u32,
    pub message_count: u32,
    pub signer: PublicKey,
    pub signature: Signature,
}

/// A leader's ordering decision: `message_hash` goes at `position` of `minute`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub timestamp: Timestamp,
    pub db_height: u32,
    pub minute: MinuteNumber,
    pub position: u32,
    pub message_hash: Hash,
    pub serial_hash: Hash,
    pub signer: PublicKey,
    pub signature: Signature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultReport {
    pub timestamp: Timestamp,
    pub db_height: u32,
    pub minute: MinuteNumber,
    pub faulted: Hash,
    pub reporter: Hash,
    pub signer: PublicKey,
    pub signature: Signature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartBeat {
    pub timestamp: Timestamp,
    pub db_height: u32,
    pub identity: Hash,
    pub dblock_key_mr: Hash,
    pub signer: PublicKey,
    pub signature: Signature,
}

/// The orderable application message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestBlock {
    pub timestamp: Timestamp,
}

/// A complete sealed height, used for catch-up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DBStateMessage {
    pub timestamp: Timestamp,
    pub directory: DirectoryBlock,
    pub admin: AdminBlock,
    pub factoid: FactoidBlock,
    pub entry_credit: EntryCreditBlock,
}

const UNSIGNED: PublicKey = PublicKey([0u8; 32]);

impl EndOfMinute {
    pub fn new(
        timestamp: Timestamp,
        minute: MinuteNumber,
        db_height: u32,
        server_index: u32,
        message_count: u32,
    ) -> Self {
        Self {
            timestamp,
            minute,
            db_height,
            server_index,
            message_count,
            signer: UNSIGNED,
            signature: Signature::ZERO,
        }
    }
}

impl Acknowledgement {
    pub fn new(
        timestamp: Timestamp,
        db_height: u32,
        minute: MinuteNumber,
        position: u32,
        message_hash: Hash,
        serial_hash: Hash,
    ) -> Self {
        Self {
            timestamp,
            db_height,
            minute,
            position,
            message_hash,
            serial_hash,
            signer: UNSIGNED,
            signature: Signature::ZERO,
        }
    }
}

impl FaultReport {
    pub fn new(
        timestamp: Timestamp,
        db_height: u32,
        minute: MinuteNumber,
        faulted: Hash,
        reporter: Hash,
    ) -> Self {
        Self {
            timestamp,
            db_height,
            minute,
            faulted,
            reporter,
            signer: UNSIGNED,
            signature: Signature::ZERO,
        }
    }
}

impl HeartBeat {
    pub fn new(timestamp: Timestamp, db_height: u32, identity: Hash, dblock_key_mr: Hash) -> Self {
        Self {
            timestamp,
            db_height,
            identity,
            dblock_key_mr,
            signer: UNSIGNED,
            signature: Signature::ZERO,
        }
    }
}

macro_rules! signed_fields {
    () => {
        fn signer(&self) -> &PublicKey {
            &self.signer
        }

        fn signature(&self) -> &Signature {
            &self.signature
        }

        fn set_signature(&mut self, signer: PublicKey, signature: Signature) {
            self.signer = signer;
            self.signature = signature;
        }
    };
}

impl SignedPayload for EndOfMinute {
    fn write_signable(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_u8(out, MessageType::EndOfMinute.tag());
        put_timestamp(out, "timestamp", self.timestamp)?;
        put_u8(out, self.minute);
        put_u32(out, self.db_height);
        put_u32(out, self.server_index);
        put_u32(out, self.message_count);
        put_public_key(out, &self.signer);
        Ok(())
    }

    signed_fields!();
}

impl SignedPayload for Acknowledgement {
    fn write_signable(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_u8(out, MessageType::Acknowledgement.tag());
        put_timestamp(out, "timestamp", self.timestamp)?;
        put_u32(out, self.db_height);
        put_u8(out, self.minute);
        put_u32(out, self.position);
        put_hash(out, &self.message_hash);
        put_hash(out, &self.serial_hash);
        put_public_key(out, &self.signer);
        Ok(())
    }

    signed_fields!();
}

impl SignedPayload for FaultReport {
    fn write_signable(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_u8(out, MessageType::FaultReport.tag());
        put_timestamp(out, "timestamp", self.timestamp)?;
        put_u32(out, self.db_height);
        put_u8(out, self.minute);
        put_hash(out, &self.faulted);
        put_hash(out, &self.reporter);
        put_public_key(out, &self.signer);
        Ok(())
    }

    signed_fields!();
}

impl SignedPayload for HeartBeat {
    fn write_signable(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_u8(out, MessageType::HeartBeat.tag());
        put_timestamp(out, "timestamp", self.timestamp)?;
        put_u32(out, self.db_height);
        put_hash(out, &self.identity);
        put_hash(out, &self.dblock_key_mr);
        put_public_key(out, &self.signer);
        Ok(())
    }

    signed_fields!();
}

macro_rules! encode_signed {
    ($($name:ident),*) => {
        $(
            impl Encode for $name {
                fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
                    self.write_signed(out)
                }
            }
        )*
    };
}

encode_signed!(EndOfMinute, Acknowledgement, FaultReport, HeartBeat);

impl Decode for EndOfMinute {
    fn decode_prefix(data: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let mut r = WireReader::new(data);
        r.expect_tag(MessageType::EndOfMinute.tag())?;
        let msg = Self {
            timestamp: r.read_timestamp("timestamp")?,
            minute: r.read_minute("minute")?,
            db_height: r.read_u32("db_height")?,
            server_index: r.read_u32("server_index")?,
            message_count: r.read_u32("message_count")?,
            signer: r.read_public_key("signer")?,
            signature: r.read_signature("signature")?,
        };
        Ok((msg, r.rest()))
    }
}

impl Decode for Acknowledgement {
    fn decode_prefix(data: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let mut r = WireReader::new(data);
        r.expect_tag(MessageType::Acknowledgement.tag())?;
        let msg = Self {
            timestamp: r.read_timestamp("timestamp")?,
            db_height: r.read_u32("db_height")?,
            minute: r.read_minute("minute")?,
            position: r.read_u32("position")?,
            message_hash: r.read_hash("message_hash")?,
            serial_hash: r.read_hash("serial_hash")?,
            signer: r.read_public_key("signer")?,
            signature: r.read_signature("signature")?,
        };
        Ok((msg, r.rest()))
    }
}

impl Decode for FaultReport {
    fn decode_prefix(data: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let mut r = WireReader::new(data);
        r.expect_tag(MessageType::FaultReport.tag())?;
        let msg = Self {
            timestamp: r.read_timestamp("timestamp")?,
            db_height: r.read_u32("db_height")?,
            minute: r.read_minute("minute")?,
            faulted: r.read_hash("faulted")?,
            reporter: r.read_hash("reporter")?,
            signer: r.read_public_key("signer")?,
            signature: r.read_signature("signature")?,
        };
        Ok((msg, r.rest()))
    }
}

impl Decode for HeartBeat {
    fn decode_prefix(data: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let mut r = WireReader::new(data);
        r.expect_tag(MessageType::HeartBeat.tag())?;
        let msg = Self {
            timestamp: r.read_timestamp("timestamp")?,
            db_height: r.read_u32("db_height")?,
            identity: r.read_hash("identity")?,
            dblock_key_mr: r.read_hash("dblock_key_mr")?,
            signer: r.read_public_key("signer")?,
            signature: r.read_signature("signature")?,
        };
        Ok((msg, r.rest()))
    }
}

impl Encode for RequestBlock {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_u8(out, MessageType::RequestBlock.tag());
        put_timestamp(out, "timestamp", self.timestamp)
    }
}

impl Decode for RequestBlock {
    fn decode_prefix(data: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let mut r = WireReader::new(data);
        r.expect_tag(MessageType::RequestBlock.tag())?;
        let msg = Self {
            timestamp: r.read_timestamp("timestamp")?,
        };
        Ok((msg, r.rest()))
    }
}

impl Encode for DBStateMessage {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_u8(out, MessageType::DBState.tag());
        put_timestamp(out, "timestamp", self.timestamp)?;
        put_nested(out, "directory", &self.directory)?;
        put_nested(out, "admin", &self.admin)?;
        put_nested(out, "factoid", &self.factoid)?;
        put_nested(out, "entry_credit", &self.entry_credit)
    }
}

impl Decode for DBStateMessage {
    fn decode_prefix(data: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let mut r = WireReader::new(data);
        r.expect_tag(MessageType::DBState.tag())?;
        let msg = Self {
            timestamp: r.read_timestamp("timestamp")?,
            directory: r.read_nested("directory")?,
            admin: r.read_nested("admin")?,
            factoid: r.read_nested("factoid")?,
            entry_credit: r.read_nested("entry_credit")?,
        };
        Ok((msg, r.rest()))
    }
}
