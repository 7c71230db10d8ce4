//! Nullable store: thread-safe in-memory block storage.

use fedchain_store::{BlockStore, StoreError};
use fedchain_types::{BlockKind, Hash};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    by_height: BTreeMap<(BlockKind, u32), Vec<u8>>,
    by_key_mr: HashMap<(BlockKind, Hash), u32>,
}

/// An in-memory block store.
/// Thread-safe for use with tokio's multi-threaded runtime.
#[derive(Default)]
pub struct NullStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put_block` fail with a backend error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".into()))
    }
}

impl BlockStore for NullStore {
    fn put_block(
        &self,
        kind: BlockKind,
        key_mr: &Hash,
        height: u32,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!(
                "write of {kind} block at height {height} refused"
            )));
        }
        let mut tables = self.tables()?;
        if let Some(existing) = tables.by_height.get(&(kind, height)) {
            if existing.as_slice() != bytes {
                return Err(StoreError::Conflict(format!(
                    "different {kind} block already stored at height {height}"
                )));
            }
        }
        tables.by_height.insert((kind, height), bytes.to_vec());
        tables.by_key_mr.insert((kind, *key_mr), height);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_block_by_height(&self, kind: BlockKind, height: u32) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.tables()?.by_height.get(&(kind, height)).cloned())
    }

    fn get_block_by_key_mr(&self, kind: BlockKind, key_mr: &Hash) -> Result<Option<Vec<u8>>, StoreError> {
        let tables = self.tables()?;
        Ok(tables
            .by_key_mr
            .get(&(kind, *key_mr))
            .and_then(|height| tables.by_height.get(&(kind, *height)))
            .cloned())
    }

    fn highest_height(&self, kind: BlockKind) -> Result<Option<u32>, StoreError> {
        Ok(self
            .tables()?
            .by_height
            .range((kind, 0)..=(kind, u32::MAX))
            .next_back()
            .map(|((_, height), _)| *height))
    }
}
