//! Sub-ledger contract.
//!
//! At the end of every height the node asks the factoid and entry-credit
//! ledgers for their closing blocks. Their economic contents are outside the
//! consensus core; the default implementation closes empty blocks chained to
//! the previous ones.

use fedchain_blocks::{EntryCreditBlock, FactoidBlock};
use fedchain_types::Hash;

pub trait SubLedger: Send {
    fn close_factoid_block(&mut self, db_height: u32, prev_key_mr: Hash) -> FactoidBlock {
        FactoidBlock::new(db_height, prev_key_mr, Vec::new())
    }

    fn close_entry_credit_block(&mut self, db_height: u32, prev_key_mr: Hash) -> EntryCreditBlock {
        EntryCreditBlock::new(db_height, prev_key_mr, Vec::new())
    }
}

/// Sub-ledger with no transactions.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyLedger;

impl SubLedger for EmptyLedger {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blocks_chain_to_previous() {
        let mut ledger = EmptyLedger;
        let prev = Hash::from_low_byte(3);
        let f = ledger.close_factoid_block(4, prev);
        assert_eq!(f.prev_hash, prev);
        assert!(f.body.is_empty());
        let ec = ledger.close_entry_credit_block(4, prev);
        assert_eq!(ec.db_height, 4);
    }
}
