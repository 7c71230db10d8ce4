//! Admin blocks: the sealed admin-entry sequence of one height.

use crate::AdminBlockEntry;
use fedchain_crypto::sha256;
use fedchain_protocol::codec::{put_hash, put_u32, put_u8};
use fedchain_protocol::{Decode, DecodeError, Encode, EncodeError, WireReader};
use fedchain_types::{BlockKind, Hash};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminHeader {
    pub prev_hash: Hash,
    pub db_height: u32,
    pub entry_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminBlock {
    pub header: AdminHeader,
    pub entries: Vec<AdminBlockEntry>,
}

impl AdminBlock {
    pub fn new(prev_hash: Hash, db_height: u32, entries: Vec<AdminBlockEntry>) -> Self {
        Self {
            header: AdminHeader {
                prev_hash,
                db_height,
                entry_count: entries.len() as u32,
            },
            entries,
        }
    }

    pub fn db_height(&self) -> u32 {
        self.header.db_height
    }

    /// SHA-256 of the block's encoding.
    pub fn hash(&self) -> Result<Hash, EncodeError> {
        Ok(sha256(&self.encode()?))
    }
}

impl Encode for AdminBlock {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_u8(out, BlockKind::Admin.tag());
        put_hash(out, &self.header.prev_hash);
        put_u32(out, self.header.db_height);
        put_u32(out, self.header.entry_count);
        for entry in &self.entries {
            entry.encode_into(out)?;
        }
        Ok(())
    }
}

impl Decode for AdminBlock {
    fn decode_prefix(data: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let mut r = WireReader::new(data);
        r.expect_tag(BlockKind::Admin.tag())?;
        let header = AdminHeader {
            prev_hash: r.read_hash("prev_hash")?,
            db_height: r.read_u32("db_height")?,
            entry_count: r.read_u32("entry_count")?,
        };
        // Smallest entry is two bytes.
        let count = header.entry_count as usize;
        if count.saturating_mul(2) > r.remaining() {
            return Err(DecodeError::malformed(
                "entry_count",
                format!("{count} entries exceed {} remaining bytes", r.remaining()),
            ));
        }
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(r.read::<AdminBlockEntry>()?);
        }
        Ok((Self { header, entries }, r.rest()))
    }
}
