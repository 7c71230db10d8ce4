//! DBState pipeline: assembles, verifies and persists sealed heights.
//!
//! Sub-blocks are staged per height as they become available. `assemble`
//! checks the directory block's references and chain link; a mismatch is a
//! chain integrity violation that halts the pipeline for good.

use crate::ConsensusError;
use fedchain_blocks::{AdminBlock, DirectoryBlock, EntryCreditBlock, FactoidBlock};
use fedchain_protocol::{decode_exact, Encode};
use fedchain_store::{BlockStore, StoreError};
use fedchain_types::{BlockKind, Hash};
use std::collections::BTreeMap;
use tracing::{debug, error, info};

/// Default number of persisted DBStates kept in memory.
pub const DEFAULT_RETAIN: usize = 100;

/// A sealed height: four linked blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DBState {
    pub db_height: u32,
    pub key_mr: Hash,
    pub directory: DirectoryBlock,
    pub admin: AdminBlock,
    pub factoid: FactoidBlock,
    pub entry_credit: EntryCreditBlock,
    pub saved: bool,
}

#[derive(Default)]
struct Staged {
    directory: Option<DirectoryBlock>,
    admin: Option<AdminBlock>,
    factoid: Option<FactoidBlock>,
    entry_credit: Option<EntryCreditBlock>,
}

impl Staged {
    fn missing(&self) -> Vec<BlockKind> {
        let mut missing = Vec::new();
        if self.directory.is_none() {
            missing.push(BlockKind::Directory);
        }
        if self.admin.is_none() {
            missing.push(BlockKind::Admin);
        }
        if self.factoid.is_none() {
            missing.push(BlockKind::Factoid);
        }
        if self.entry_credit.is_none() {
            missing.push(BlockKind::EntryCredit);
        }
        missing
    }
}

pub struct DBStatePipeline {
    states: BTreeMap<u32, DBState>,
    staged: BTreeMap<u32, Staged>,
    next_height: u32,
    retain: usize,
    halted: bool,
}

impl DBStatePipeline {
    pub fn new(retain: usize) -> Self {
        Self {
            states: BTreeMap::new(),
            staged: BTreeMap::new(),
            next_height: 0,
            retain,
            halted: false,
        }
    }

    fn check_running(&self) -> Result<(), ConsensusError> {
        if self.halted {
            return Err(ConsensusError::Halted);
        }
        Ok(())
    }

    pub fn submit_directory(&mut self, block: DirectoryBlock) -> Result<(), ConsensusError> {
        self.check_running()?;
        let height = block.db_height();
        self.staged.entry(height).or_default().directory = Some(block);
        Ok(())
    }

    pub fn submit_admin(&mut self, block: AdminBlock) -> Result<(), ConsensusError> {
        self.check_running()?;
        let height = block.db_height();
        self.staged.entry(height).or_default().admin = Some(block);
        Ok(())
    }

    pub fn submit_factoid(&mut self, block: FactoidBlock) -> Result<(), ConsensusError> {
        self.check_running()?;
        let height = block.db_height;
        self.staged.entry(height).or_default().factoid = Some(block);
        Ok(())
    }

    pub fn submit_entry_credit(&mut self, block: EntryCreditBlock) -> Result<(), ConsensusError> {
        self.check_running()?;
        let height = block.db_height;
        self.staged.entry(height).or_default().entry_credit = Some(block);
        Ok(())
    }

    /// Assemble the staged blocks of `height` into an unsaved DBState.
    ///
    /// The previous directory block is looked up in memory first and in
    /// `store` otherwise; height 0 links to the zero hash.
    pub fn assemble(
        &mut self,
        height: u32,
        store: &dyn BlockStore,
    ) -> Result<&DBState, ConsensusError> {
        self.check_running()?;
        if height != self.next_height {
            return Err(ConsensusError::NonContiguousHeight {
                expected: self.next_height,
                got: height,
            });
        }
        let missing = self
            .staged
            .get(&height)
            .map_or_else(|| Staged::default().missing(), Staged::missing);
        if !missing.is_empty() {
            return Err(ConsensusError::IncompleteSubBlocks { height, missing });
        }

        let prev_key_mr = self.previous_key_mr(height, store)?;
        let Some(Staged {
            directory: Some(directory),
            admin: Some(admin),
            factoid: Some(factoid),
            entry_credit: Some(entry_credit),
        }) = self.staged.remove(&height)
        else {
            return Err(ConsensusError::IncompleteSubBlocks {
                height,
                missing: BlockKind::ALL.to_vec(),
            });
        };

        let state = match verify_linkage(height, prev_key_mr, directory, admin, factoid, entry_credit) {
            Ok(state) => state,
            Err(err) => {
                if err.is_fatal() {
                    self.halted = true;
                    self.staged.clear();
                    error!(height, %err, "DBState pipeline halted");
                }
                return Err(err);
            }
        };

        info!(height, key_mr = %state.key_mr.short(), "DBState assembled");
        self.next_height = height.saturating_add(1);
        Ok(&*self.states.entry(height).or_insert(state))
    }

    fn previous_key_mr(&self, height: u32, store: &dyn BlockStore) -> Result<Option<Hash>, ConsensusError> {
        if height == 0 {
            return Ok(Some(Hash::ZERO));
        }
        let prev = height - 1;
        if let Some(state) = self.states.get(&prev) {
            return Ok(Some(state.key_mr));
        }
        match store.get_block_by_height(BlockKind::Directory, prev)? {
            Some(bytes) => Ok(Some(decode_exact::<DirectoryBlock>(&bytes)?.key_mr()?)),
            None => Ok(None),
        }
    }

    /// Write every unsaved DBState to `store`, oldest first. A state is marked
    /// saved only after all four of its blocks were written.
    ///
    /// Allowed after a halt: every held state verified before the violation.
    pub fn persist(&mut self, store: &dyn BlockStore) -> Result<usize, ConsensusError> {
        let mut written = 0;
        for state in self.states.values_mut().filter(|s| !s.saved) {
            write_state(state, store)?;
            state.saved = true;
            written += 1;
            debug!(height = state.db_height, "DBState persisted");
        }
        self.evict();
        Ok(written)
    }

    /// Drop the oldest saved states beyond the retention count. The newest
    /// state always stays so the next height can link to it.
    fn evict(&mut self) {
        let newest = self.states.keys().next_back().copied();
        while self.states.len() > self.retain.max(1) {
            let Some((&oldest, state)) = self.states.iter().next() else {
                break;
            };
            if !state.saved || Some(oldest) == newest {
                break;
            }
            self.states.remove(&oldest);
        }
    }

    /// Rebuild saved DBStates from `store`: directory blocks by height, their
    /// sub-blocks through the directory block's references.
    pub fn load_from_store(&mut self, store: &dyn BlockStore) -> Result<usize, ConsensusError> {
        self.check_running()?;
        let Some(highest) = store.highest_height(BlockKind::Directory)? else {
            return Ok(0);
        };
        let first = highest.saturating_sub(self.retain.max(1).saturating_sub(1) as u32);
        let mut prev_key_mr = self.previous_key_mr(first, store)?;
        let mut loaded = 0;
        for height in first..=highest {
            let directory: DirectoryBlock = load(store, BlockKind::Directory, height, None)?;
            let admin: AdminBlock = load(store, BlockKind::Admin, height, directory.admin_key_mr())?;
            let entry_credit: EntryCreditBlock =
                load(store, BlockKind::EntryCredit, height, directory.entry_credit_key_mr())?;
            let factoid: FactoidBlock =
                load(store, BlockKind::Factoid, height, directory.factoid_key_mr())?;
            let mut state = match verify_linkage(height, prev_key_mr, directory, admin, factoid, entry_credit) {
                Ok(state) => state,
                Err(err) => {
                    if err.is_fatal() {
                        self.halted = true;
                        error!(height, %err, "stored chain failed verification");
                    }
                    return Err(err);
                }
            };
            state.saved = true;
            prev_key_mr = Some(state.key_mr);
            self.states.insert(height, state);
            loaded += 1;
        }
        self.next_height = highest.saturating_add(1);
        self.evict();
        info!(loaded, next_height = self.next_height, "DBStates loaded from store");
        Ok(loaded)
    }

    pub fn get(&self, height: u32) -> Option<&DBState> {
        self.states.get(&height)
    }

    pub fn latest(&self) -> Option<&DBState> {
        self.states.values().next_back()
    }

    /// Key-MR the next directory block must link to.
    pub fn last_key_mr(&self) -> Hash {
        self.latest().map_or(Hash::ZERO, |s| s.key_mr)
    }

    /// The height `assemble` expects next.
    pub fn next_height(&self) -> u32 {
        self.next_height
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn unsaved_count(&self) -> usize {
        self.states.values().filter(|s| !s.saved).count()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl Default for DBStatePipeline {
    fn default() -> Self {
        Self::new(DEFAULT_RETAIN)
    }
}

/// Check that `directory` references the three sub-blocks and links to
/// `prev_key_mr`. `None` means the predecessor is nowhere to be found.
fn verify_linkage(
    height: u32,
    prev_key_mr: Option<Hash>,
    directory: DirectoryBlock,
    admin: AdminBlock,
    factoid: FactoidBlock,
    entry_credit: EntryCreditBlock,
) -> Result<DBState, ConsensusError> {
    let violation = |reason: String| ConsensusError::ChainIntegrityViolation { height, reason };

    let Some(prev_key_mr) = prev_key_mr else {
        return Err(violation(format!("directory block {} not found", height.saturating_sub(1))));
    };
    if directory.prev_key_mr() != prev_key_mr {
        return Err(violation(format!(
            "prev_key_mr {} does not match previous directory block {}",
            directory.prev_key_mr(),
            prev_key_mr
        )));
    }
    let checks = [
        (BlockKind::Admin, directory.admin_key_mr(), admin.hash()?),
        (BlockKind::EntryCredit, directory.entry_credit_key_mr(), entry_credit.key_mr()?),
        (BlockKind::Factoid, directory.factoid_key_mr(), factoid.key_mr()?),
    ];
    for (kind, referenced, actual) in checks {
        match referenced {
            Some(referenced) if referenced == actual => {}
            Some(referenced) => {
                return Err(violation(format!(
                    "{kind} block hash {actual} does not match directory entry {referenced}"
                )))
            }
            None => return Err(violation(format!("directory block has no {kind} entry"))),
        }
    }
    Ok(DBState {
        db_height: height,
        key_mr: directory.key_mr()?,
        directory,
        admin,
        factoid,
        entry_credit,
        saved: false,
    })
}

fn write_state(state: &DBState, store: &dyn BlockStore) -> Result<(), ConsensusError> {
    let h = state.db_height;
    store.put_block(BlockKind::Admin, &state.admin.hash()?, h, &state.admin.encode()?)?;
    store.put_block(
        BlockKind::EntryCredit,
        &state.entry_credit.key_mr()?,
        h,
        &state.entry_credit.encode()?,
    )?;
    store.put_block(BlockKind::Factoid, &state.factoid.key_mr()?, h, &state.factoid.encode()?)?;
    // Directory last: its presence marks the height complete for load_from_store.
    store.put_block(BlockKind::Directory, &state.key_mr, h, &state.directory.encode()?)?;
    Ok(())
}

fn load<T: fedchain_protocol::Decode>(
    store: &dyn BlockStore,
    kind: BlockKind,
    height: u32,
    key_mr: Option<Hash>,
) -> Result<T, ConsensusError> {
    let bytes = match key_mr {
        Some(key_mr) => store.get_block_by_key_mr(kind, &key_mr)?,
        None => store.get_block_by_height(kind, height)?,
    };
    let bytes = bytes.ok_or_else(|| {
        StoreError::Corruption(format!("{kind} block of height {height} is missing"))
    })?;
    Ok(decode_exact(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedchain_blocks::AdminBlockEntry;
    use fedchain_nullables::NullStore;
    use fedchain_types::{NetworkId, Timestamp};

    struct Height {
        directory: DirectoryBlock,
        admin: AdminBlock,
        factoid: FactoidBlock,
        entry_credit: EntryCreditBlock,
    }

    fn make_height(height: u32, prev_key_mr: Hash) -> Height {
        let admin = AdminBlock::new(
            Hash::ZERO,
            height,
            (0..10).map(|minute| AdminBlockEntry::EndOfMinute { minute }).collect(),
        );
        let factoid = FactoidBlock::new(height, Hash::ZERO, vec![]);
        let entry_credit = EntryCreditBlock::new(height, Hash::ZERO, vec![]);
        let directory = DirectoryBlock::build(
            NetworkId::Local,
            prev_key_mr,
            Timestamp::from_secs(1000 + height as u64),
            height,
            admin.hash().unwrap(),
            entry_credit.key_mr().unwrap(),
            factoid.key_mr().unwrap(),
        );
        Height {
            directory,
            admin,
            factoid,
            entry_credit,
        }
    }

    fn submit(p: &mut DBStatePipeline, h: Height) {
        p.submit_directory(h.directory).unwrap();
        p.submit_admin(h.admin).unwrap();
        p.submit_factoid(h.factoid).unwrap();
        p.submit_entry_credit(h.entry_credit).unwrap();
    }

    #[test]
    fn genesis_assembles_and_persists() {
        let store = NullStore::new();
        let mut p = DBStatePipeline::new(10);
        submit(&mut p, make_height(0, Hash::ZERO));
        let state = p.assemble(0, &store).unwrap();
        assert!(!state.saved);
        assert_eq!(p.unsaved_count(), 1);
        assert_eq!(p.persist(&store).unwrap(), 1);
        assert!(p.get(0).unwrap().saved);
        assert_eq!(store.write_count(), 4);
        assert_eq!(p.next_height(), 1);
    }

    #[test]
    fn missing_blocks_reported() {
        let store = NullStore::new();
        let mut p = DBStatePipeline::new(10);
        let h = make_height(0, Hash::ZERO);
        p.submit_directory(h.directory).unwrap();
        p.submit_factoid(h.factoid).unwrap();
        match p.assemble(0, &store) {
            Err(ConsensusError::IncompleteSubBlocks { height, missing }) => {
                assert_eq!(height, 0);
                assert_eq!(missing, vec![BlockKind::Admin, BlockKind::EntryCredit]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!p.is_halted());
    }

    #[test]
    fn heights_must_be_contiguous() {
        let store = NullStore::new();
        let mut p = DBStatePipeline::new(10);
        submit(&mut p, make_height(1, Hash::ZERO));
        assert!(matches!(
            p.assemble(1, &store),
            Err(ConsensusError::NonContiguousHeight { expected: 0, got: 1 })
        ));
    }

    #[test]
    fn wrong_prev_link_halts_without_appending() {
        let store = NullStore::new();
        let mut p = DBStatePipeline::new(10);
        submit(&mut p, make_height(0, Hash::ZERO));
        p.assemble(0, &store).unwrap();

        submit(&mut p, make_height(1, Hash::new([0xEE; 32])));
        let err = p.assemble(1, &store).unwrap_err();
        assert!(matches!(err, ConsensusError::ChainIntegrityViolation { height: 1, .. }));
        assert!(err.is_fatal());
        assert!(p.get(1).is_none());
        assert_eq!(p.len(), 1);
        assert!(p.is_halted());
        assert!(matches!(p.assemble(1, &store), Err(ConsensusError::Halted)));
        assert!(matches!(
            p.submit_admin(AdminBlock::new(Hash::ZERO, 1, vec![])),
            Err(ConsensusError::Halted)
        ));
    }

    #[test]
    fn verified_states_still_persist_after_halt() {
        let store = NullStore::new();
        let mut p = DBStatePipeline::new(10);
        submit(&mut p, make_height(0, Hash::ZERO));
        p.assemble(0, &store).unwrap();

        submit(&mut p, make_height(1, Hash::new([0xEE; 32])));
        assert!(p.assemble(1, &store).unwrap_err().is_fatal());
        assert!(p.is_halted());

        assert_eq!(p.persist(&store).unwrap(), 1);
        assert!(p.get(0).unwrap().saved);
        assert_eq!(store.highest_height(BlockKind::Directory).unwrap(), Some(0));
        assert_eq!(p.persist(&store).unwrap(), 0);
    }

    #[test]
    fn mismatched_sub_block_is_violation() {
        let store = NullStore::new();
        let mut p = DBStatePipeline::new(10);
        let mut h = make_height(0, Hash::ZERO);
        h.factoid.body = b"tampered".to_vec();
        submit(&mut p, h);
        assert!(matches!(
            p.assemble(0, &store),
            Err(ConsensusError::ChainIntegrityViolation { .. })
        ));
        assert!(p.is_empty());
    }

    #[test]
    fn chain_of_heights_links() {
        let store = NullStore::new();
        let mut p = DBStatePipeline::new(10);
        for height in 0..5 {
            let prev = p.last_key_mr();
            submit(&mut p, make_height(height, prev));
            p.assemble(height, &store).unwrap();
        }
        assert_eq!(p.persist(&store).unwrap(), 5);
        assert_eq!(store.highest_height(BlockKind::Directory).unwrap(), Some(4));
    }

    #[test]
    fn failed_write_leaves_state_unsaved() {
        let store = NullStore::new();
        let mut p = DBStatePipeline::new(10);
        submit(&mut p, make_height(0, Hash::ZERO));
        p.assemble(0, &store).unwrap();
        store.fail_writes(true);
        assert!(matches!(p.persist(&store), Err(ConsensusError::Store(_))));
        assert!(!p.get(0).unwrap().saved);
        store.fail_writes(false);
        assert_eq!(p.persist(&store).unwrap(), 1);
        assert!(p.get(0).unwrap().saved);
    }

    #[test]
    fn eviction_keeps_retention_count() {
        let store = NullStore::new();
        let mut p = DBStatePipeline::new(2);
        for height in 0..5 {
            let prev = p.last_key_mr();
            submit(&mut p, make_height(height, prev));
            p.assemble(height, &store).unwrap();
            p.persist(&store).unwrap();
        }
        assert_eq!(p.len(), 2);
        assert!(p.get(2).is_none());
        assert_eq!(p.latest().unwrap().db_height, 4);
    }

    #[test]
    fn predecessor_found_in_store_after_eviction() {
        let store = NullStore::new();
        let mut p = DBStatePipeline::new(10);
        submit(&mut p, make_height(0, Hash::ZERO));
        let key_mr = p.assemble(0, &store).unwrap().key_mr;
        p.persist(&store).unwrap();

        let mut fresh = DBStatePipeline::new(10);
        assert_eq!(fresh.load_from_store(&store).unwrap(), 1);
        assert_eq!(fresh.last_key_mr(), key_mr);
        assert_eq!(fresh.next_height(), 1);
        assert!(fresh.get(0).unwrap().saved);

        submit(&mut fresh, make_height(1, key_mr));
        fresh.assemble(1, &store).unwrap();
    }

    #[test]
    fn load_from_empty_store() {
        let store = NullStore::new();
        let mut p = DBStatePipeline::default();
        assert_eq!(p.load_from_store(&store).unwrap(), 0);
        assert_eq!(p.next_height(), 0);
        assert_eq!(p.last_key_mr(), Hash::ZERO);
    }
}
