//! Admin-block entries.
//!
//! Each entry is `[type][payload]`. The end-of-minute marker is exactly two
//! bytes: `[0x00][minute]`.

use fedchain_crypto::sha256;
use fedchain_protocol::codec::{put_hash, put_public_key, put_u32, put_u8};
use fedchain_protocol::{Decode, DecodeError, Encode, EncodeError, WireReader};
use fedchain_types::{Hash, MinuteNumber, PublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire tag of an admin-block entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AdminEntryType {
    EndOfMinute = 0,
    AddFederatedServer = 5,
    AddAuditServer = 6,
    RemoveFederatedServer = 7,
    AddServerSigningKey = 8,
    ServerFault = 10,
}

impl AdminEntryType {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::EndOfMinute),
            5 => Some(Self::AddFederatedServer),
            6 => Some(Self::AddAuditServer),
            7 => Some(Self::RemoveFederatedServer),
            8 => Some(Self::AddServerSigningKey),
            10 => Some(Self::ServerFault),
            _ => None,
        }
    }
}

/// A single entry in an admin block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdminBlockEntry {
    EndOfMinute {
        minute: MinuteNumber,
    },
    AddFederatedServer {
        identity: Hash,
        db_height: u32,
    },
    AddAuditServer {
        identity: Hash,
        db_height: u32,
    },
    RemoveFederatedServer {
        identity: Hash,
        db_height: u32,
    },
    AddServerSigningKey {
        identity: Hash,
        public_key: PublicKey,
        db_height: u32,
    },
    /// `faulted` was replaced in the federated list by `promoted`.
    ServerFault {
        faulted: Hash,
        promoted: Hash,
        db_height: u32,
        minute: MinuteNumber,
    },
}

impl AdminBlockEntry {
    pub fn entry_type(&self) -> AdminEntryType {
        match self {
            Self::EndOfMinute { .. } => AdminEntryType::EndOfMinute,
            Self::AddFederatedServer { .. } => AdminEntryType::AddFederatedServer,
            Self::AddAuditServer { .. } => AdminEntryType::AddAuditServer,
            Self::RemoveFederatedServer { .. } => AdminEntryType::RemoveFederatedServer,
            Self::AddServerSigningKey { .. } => AdminEntryType::AddServerSigningKey,
            Self::ServerFault { .. } => AdminEntryType::ServerFault,
        }
    }

    /// SHA-256 of the entry's encoding.
    pub fn hash(&self) -> Result<Hash, EncodeError> {
        Ok(sha256(&self.encode()?))
    }

    /// Human-readable one-liner.
    pub fn interpret(&self) -> String {
        match self {
            Self::EndOfMinute { minute } => format!("End of Minute {minute}"),
            Self::AddFederatedServer {
                identity,
                db_height,
            } => format!("Add Federated Server {} at height {db_height}", identity.short()),
            Self::AddAuditServer {
                identity,
                db_height,
            } => format!("Add Audit Server {} at height {db_height}", identity.short()),
            Self::RemoveFederatedServer {
                identity,
                db_height,
            } => format!("Remove Federated Server {} at height {db_height}", identity.short()),
            Self::AddServerSigningKey {
                identity,
                db_height,
                ..
            } => format!("Add Signing Key for {} at height {db_height}", identity.short()),
            Self::ServerFault {
                faulted,
                promoted,
                db_height,
                minute,
            } => format!(
                "Server Fault at height {db_height} minute {minute}: {} replaced by {}",
                faulted.short(),
                promoted.short()
            ),
        }
    }

    /// JSON view of the entry.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for AdminBlockEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.interpret())
    }
}

impl Encode for AdminBlockEntry {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_u8(out, self.entry_type().tag());
        match self {
            Self::EndOfMinute { minute } => put_u8(out, *minute),
            Self::AddFederatedServer {
                identity,
                db_height,
            }
            | Self::AddAuditServer {
                identity,
                db_height,
            }
            | Self::RemoveFederatedServer {
                identity,
                db_height,
            } => {
                put_hash(out, identity);
                put_u32(out, *db_height);
            }
            Self::AddServerSigningKey {
                identity,
                public_key,
                db_height,
            } => {
                put_hash(out, identity);
                put_public_key(out, public_key);
                put_u32(out, *db_height);
            }
            Self::ServerFault {
                faulted,
                promoted,
                db_height,
                minute,
            } => {
                put_hash(out, faulted);
                put_hash(out, promoted);
                put_u32(out, *db_height);
                put_u8(out, *minute);
            }
        }
        Ok(())
    }
}

impl Decode for AdminBlockEntry {
    fn decode_prefix(data: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let mut r = WireReader::new(data);
        let tag = r.read_u8("type")?;
        let entry_type = AdminEntryType::from_tag(tag)
            .ok_or_else(|| DecodeError::malformed("type", format!("unknown admin entry type {tag}")))?;
        let entry = match entry_type {
            AdminEntryType::EndOfMinute => Self::EndOfMinute {
                minute: r.read_minute("minute")?,
            },
            AdminEntryType::AddFederatedServer => Self::AddFederatedServer {
                identity: r.read_hash("identity")?,
                db_height: r.read_u32("db_height")?,
            },
            AdminEntryType::AddAuditServer => Self::AddAuditServer {
                identity: r.read_hash("identity")?,
                db_height: r.read_u32("db_height")?,
            },
            AdminEntryType::RemoveFederatedServer => Self::RemoveFederatedServer {
                identity: r.read_hash("identity")?,
                db_height: r.read_u32("db_height")?,
            },
            AdminEntryType::AddServerSigningKey => Self::AddServerSigningKey {
                identity: r.read_hash("identity")?,
                public_key: r.read_public_key("public_key")?,
                db_height: r.read_u32("db_height")?,
            },
            AdminEntryType::ServerFault => Self::ServerFault {
                faulted: r.read_hash("faulted")?,
                promoted: r.read_hash("promoted")?,
                db_height: r.read_u32("db_height")?,
                minute: r.read_minute("minute")?,
            },
        };
        Ok((entry, r.rest()))
    }
}

/// Decode an entry of a known type, failing with `TypeMismatch` when the
/// leading byte names a different entry type.
pub fn decode_expecting(
    expected: AdminEntryType,
    data: &[u8],
) -> Result<(AdminBlockEntry, &[u8]), DecodeError> {
    let found = *data.first().ok_or(DecodeError::Truncated {
        field: "type",
        needed: 1,
        remaining: 0,
    })?;
    if found != expected.tag() {
        return Err(DecodeError::TypeMismatch {
            expected: expected.tag(),
            found,
        });
    }
    AdminBlockEntry::decode_prefix(data)
}
