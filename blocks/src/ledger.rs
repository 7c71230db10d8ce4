//! Factoid and entry-credit blocks.
//!
//! The consensus core sequences these as opaque bodies; their contents are
//! the business of the sub-ledgers that produce them.

use fedchain_crypto::sha256;
use fedchain_protocol::codec::{put_hash, put_u32, put_u8, put_var_bytes};
use fedchain_protocol::{Decode, DecodeError, Encode, EncodeError, WireReader};
use fedchain_types::{BlockKind, Hash};
use serde::{Deserialize, Serialize};

macro_rules! ledger_block {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            pub db_height: u32,
            pub prev_hash: Hash,
            pub body: Vec<u8>,
        }

        impl $name {
            pub const KIND: BlockKind = $kind;

            pub fn new(db_height: u32, prev_hash: Hash, body: Vec<u8>) -> Self {
                Self {
                    db_height,
                    prev_hash,
                    body,
                }
            }

            /// SHA-256 of the block's encoding.
            pub fn key_mr(&self) -> Result<Hash, EncodeError> {
                Ok(sha256(&self.encode()?))
            }
        }

        impl Encode for $name {
            fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
                put_u8(out, Self::KIND.tag());
                put_u32(out, self.db_height);
                put_hash(out, &self.prev_hash);
                put_var_bytes(out, "body", &self.body)
            }
        }

        impl Decode for $name {
            fn decode_prefix(data: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
                let mut r = WireReader::new(data);
                r.expect_tag(Self::KIND.tag())?;
                let block = Self {
                    db_height: r.read_u32("db_height")?,
                    prev_hash: r.read_hash("prev_hash")?,
                    body: r.read_var_bytes("body")?.to_vec(),
                };
                Ok((block, r.rest()))
            }
        }
    };
}

ledger_block!(
    /// Factoid (value transfer) block.
    FactoidBlock,
    BlockKind::Factoid
);

ledger_block!(
    /// Entry-credit block.
    EntryCreditBlock,
    BlockKind::EntryCredit
);
