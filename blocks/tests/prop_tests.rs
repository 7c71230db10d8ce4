use fedchain_blocks::{AdminBlock, AdminBlockEntry, DirectoryBlock, EntryCreditBlock, FactoidBlock};
use fedchain_protocol::{decode_exact, Decode, DecodeError, Encode};
use fedchain_types::{Hash, NetworkId, PublicKey, Timestamp};
use proptest::prelude::*;

fn arb_hash() -> impl Strategy<Value = Hash> {
    any::<[u8; 32]>().prop_map(Hash::new)
}

fn arb_entry() -> impl Strategy<Value = AdminBlockEntry> {
    prop_oneof![
        (0u8..=9).prop_map(|minute| AdminBlockEntry::EndOfMinute { minute }),
        (arb_hash(), any::<u32>()).prop_map(|(identity, db_height)| {
            AdminBlockEntry::AddFederatedServer { identity, db_height }
        }),
        (arb_hash(), any::<u32>())
            .prop_map(|(identity, db_height)| AdminBlockEntry::AddAuditServer { identity, db_height }),
        (arb_hash(), any::<u32>()).prop_map(|(identity, db_height)| {
            AdminBlockEntry::RemoveFederatedServer { identity, db_height }
        }),
        (arb_hash(), any::<[u8; 32]>(), any::<u32>()).prop_map(|(identity, key, db_height)| {
            AdminBlockEntry::AddServerSigningKey {
                identity,
                public_key: PublicKey(key),
                db_height,
            }
        }),
        (arb_hash(), arb_hash(), any::<u32>(), 0u8..=9).prop_map(
            |(faulted, promoted, db_height, minute)| AdminBlockEntry::ServerFault {
                faulted,
                promoted,
                db_height,
                minute,
            }
        ),
    ]
}

proptest! {
    #[test]
    fn admin_entry_round_trip(entry in arb_entry()) {
        let bytes = entry.encode().unwrap();
        prop_assert_eq!(decode_exact::<AdminBlockEntry>(&bytes).unwrap(), entry);
    }

    #[test]
    fn admin_block_round_trip(
        prev in arb_hash(),
        height in any::<u32>(),
        entries in prop::collection::vec(arb_entry(), 0..20),
    ) {
        let block = AdminBlock::new(prev, height, entries);
        let bytes = block.encode().unwrap();
        prop_assert_eq!(decode_exact::<AdminBlock>(&bytes).unwrap(), block);
    }

    #[test]
    fn directory_block_round_trip(
        prev in arb_hash(),
        millis in 0u64..=Timestamp::MAX_WIRE,
        height in any::<u32>(),
        a in arb_hash(), ec in arb_hash(), f in arb_hash(),
    ) {
        let block = DirectoryBlock::build(
            NetworkId::Test, prev, Timestamp::from_millis(millis), height, a, ec, f,
        );
        let bytes = block.encode().unwrap();
        prop_assert_eq!(decode_exact::<DirectoryBlock>(&bytes).unwrap(), block);
    }

    #[test]
    fn ledger_blocks_round_trip(
        height in any::<u32>(),
        prev in arb_hash(),
        body in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let f = FactoidBlock::new(height, prev, body.clone());
        prop_assert_eq!(decode_exact::<FactoidBlock>(&f.encode().unwrap()).unwrap(), f);
        let ec = EntryCreditBlock::new(height, prev, body);
        prop_assert_eq!(decode_exact::<EntryCreditBlock>(&ec.encode().unwrap()).unwrap(), ec);
    }

    #[test]
    fn block_decoders_never_panic(data in prop::collection::vec(any::<u8>(), 0..300)) {
        let _ = DirectoryBlock::decode_prefix(&data);
        let _ = AdminBlock::decode_prefix(&data);
        let _ = FactoidBlock::decode_prefix(&data);
        let _ = EntryCreditBlock::decode_prefix(&data);
        let _ = AdminBlockEntry::decode_prefix(&data);
    }

    #[test]
    fn wrong_leading_byte_is_type_mismatch(
        entry in arb_entry(),
        tag in any::<u8>(),
    ) {
        // Admin blocks carry tag 1; anything else must be a mismatch.
        prop_assume!(tag != 1);
        let block = AdminBlock::new(Hash::ZERO, 0, vec![entry]);
        let mut bytes = block.encode().unwrap();
        bytes[0] = tag;
        prop_assert_eq!(
            AdminBlock::decode_prefix(&bytes).unwrap_err(),
            DecodeError::TypeMismatch { expected: 1, found: tag }
        );
    }
}
