//! Directory blocks: the spine of the chain.
//!
//! A directory block links to its predecessor through `prev_key_mr` and
//! references the admin, entry-credit and factoid blocks of its height by
//! key-MR, in that order.

use fedchain_crypto::sha256;
use fedchain_protocol::codec::{put_hash, put_timestamp, put_u32, put_u8};
use fedchain_protocol::{Decode, DecodeError, Encode, EncodeError, WireReader};
use fedchain_types::params::DIRECTORY_BLOCK_VERSION;
use fedchain_types::{BlockKind, Hash, NetworkId, Timestamp};
use serde::{Deserialize, Serialize};

/// Encoded size of one [`DBEntry`].
const ENTRY_SIZE: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryHeader {
    pub version: u8,
    pub network_number: u32,
    pub prev_key_mr: Hash,
    pub timestamp: Timestamp,
    pub db_height: u32,
    pub entry_count: u32,
}

/// Reference from a directory block to one sub-block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DBEntry {
    pub chain_id: Hash,
    pub key_mr: Hash,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryBlock {
    pub header: DirectoryHeader,
    pub entries: Vec<DBEntry>,
}

impl DirectoryBlock {
    /// Build the directory block for `db_height` from the key-MRs of its
    /// three sub-blocks.
    pub fn build(
        network: NetworkId,
        prev_key_mr: Hash,
        timestamp: Timestamp,
        db_height: u32,
        admin_key_mr: Hash,
        entry_credit_key_mr: Hash,
        factoid_key_mr: Hash,
    ) -> Self {
        let entries = [
            (BlockKind::Admin, admin_key_mr),
            (BlockKind::EntryCredit, entry_credit_key_mr),
            (BlockKind::Factoid, factoid_key_mr),
        ]
        .into_iter()
        .filter_map(|(kind, key_mr)| kind.chain_id().map(|chain_id| DBEntry { chain_id, key_mr }))
        .collect::<Vec<_>>();

        Self {
            header: DirectoryHeader {
                version: DIRECTORY_BLOCK_VERSION,
                network_number: network.number(),
                prev_key_mr,
                timestamp,
                db_height,
                entry_count: entries.len() as u32,
            },
            entries,
        }
    }

    pub fn db_height(&self) -> u32 {
        self.header.db_height
    }

    pub fn prev_key_mr(&self) -> Hash {
        self.header.prev_key_mr
    }

    /// SHA-256 of the block's encoding.
    pub fn key_mr(&self) -> Result<Hash, EncodeError> {
        Ok(sha256(&self.encode()?))
    }

    /// The entry referencing the sub-block of `kind`, found by chain id.
    pub fn entry_for(&self, kind: BlockKind) -> Option<&DBEntry> {
        let chain_id = kind.chain_id()?;
        self.entries.iter().find(|e| e.chain_id == chain_id)
    }

    pub fn admin_key_mr(&self) -> Option<Hash> {
        self.entry_for(BlockKind::Admin).map(|e| e.key_mr)
    }

    pub fn entry_credit_key_mr(&self) -> Option<Hash> {
        self.entry_for(BlockKind::EntryCredit).map(|e| e.key_mr)
    }

    pub fn factoid_key_mr(&self) -> Option<Hash> {
        self.entry_for(BlockKind::Factoid).map(|e| e.key_mr)
    }
}

impl Encode for DirectoryBlock {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        let h = &self.header;
        put_u8(out, BlockKind::Directory.tag());
        put_u8(out, h.version);
        put_u32(out, h.network_number);
        put_hash(out, &h.prev_key_mr);
        put_timestamp(out, "timestamp", h.timestamp)?;
        put_u32(out, h.db_height);
        put_u32(out, h.entry_count);
        for entry in &self.entries {
            put_hash(out, &entry.chain_id);
            put_hash(out, &entry.key_mr);
        }
        Ok(())
    }
}

impl Decode for DirectoryBlock {
    fn decode_prefix(data: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let mut r = WireReader::new(data);
        r.expect_tag(BlockKind::Directory.tag())?;
        let header = DirectoryHeader {
            version: r.read_u8("version")?,
            network_number: r.read_u32("network_number")?,
            prev_key_mr: r.read_hash("prev_key_mr")?,
            timestamp: r.read_timestamp("timestamp")?,
            db_height: r.read_u32("db_height")?,
            entry_count: r.read_u32("entry_count")?,
        };
        let count = header.entry_count as usize;
        if count.saturating_mul(ENTRY_SIZE) > r.remaining() {
            return Err(DecodeError::malformed(
                "entry_count",
                format!("{count} entries exceed {} remaining bytes", r.remaining()),
            ));
        }
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(DBEntry {
                chain_id: r.read_hash("chain_id")?,
                key_mr: r.read_hash("key_mr")?,
            });
        }
        Ok((Self { header, entries }, r.rest()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedchain_protocol::decode_exact;

    fn sample() -> DirectoryBlock {
        DirectoryBlock::build(
            NetworkId::Local,
            Hash::ZERO,
            Timestamp::from_secs(1_700_000_000),
            0,
            Hash::new([1; 32]),
            Hash::new([2; 32]),
            Hash::new([3; 32]),
        )
    }

    #[test]
    fn build_orders_admin_ec_factoid() {
        let block = sample();
        assert_eq!(block.header.entry_count, 3);
        assert_eq!(block.entries[0].chain_id, Hash::from_low_byte(0x0a));
        assert_eq!(block.entries[1].chain_id, Hash::from_low_byte(0x0c));
        assert_eq!(block.entries[2].chain_id, Hash::from_low_byte(0x0f));
        assert_eq!(block.admin_key_mr(), Some(Hash::new([1; 32])));
        assert_eq!(block.entry_credit_key_mr(), Some(Hash::new([2; 32])));
        assert_eq!(block.factoid_key_mr(), Some(Hash::new([3; 32])));
        assert_eq!(block.header.network_number, 2);
    }

    #[test]
    fn round_trip() {
        let block = sample();
        let bytes = block.encode().unwrap();
        assert_eq!(bytes[0], 0);
        assert_eq!(decode_exact::<DirectoryBlock>(&bytes).unwrap(), block);
    }

    #[test]
    fn key_mr_depends_on_prev_link() {
        let a = sample();
        let mut b = sample();
        b.header.prev_key_mr = Hash::new([9; 32]);
        assert_ne!(a.key_mr().unwrap(), b.key_mr().unwrap());
    }

    #[test]
    fn oversized_entry_count_is_malformed() {
        let mut bytes = sample().encode().unwrap();
        // entry_count sits right before the 192 entry bytes
        let at = bytes.len() - 3 * ENTRY_SIZE - 4;
        bytes[at..at + 4].copy_from_slice(&1000u32.to_be_bytes());
        assert!(matches!(
            DirectoryBlock::decode_prefix(&bytes),
            Err(DecodeError::MalformedField { field: "entry_count", .. })
        ));
    }

    #[test]
    fn admin_tag_is_type_mismatch() {
        let mut bytes = sample().encode().unwrap();
        bytes[0] = BlockKind::Admin.tag();
        assert_eq!(
            DirectoryBlock::decode_prefix(&bytes).unwrap_err(),
            DecodeError::TypeMismatch {
                expected: 0,
                found: 1
            }
        );
    }
}
