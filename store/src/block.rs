//! Block storage trait.

use crate::StoreError;
use fedchain_types::{BlockKind, Hash};
use std::sync::Arc;

/// Persistent storage for sealed blocks, indexed by kind and by both height
/// and key-MR. Absent blocks are `Ok(None)`, never an error.
pub trait BlockStore: Send + Sync {
    /// Store the encoded block of `kind` at `height`.
    fn put_block(
        &self,
        kind: BlockKind,
        key_mr: &Hash,
        height: u32,
        bytes: &[u8],
    ) -> Result<(), StoreError>;

    fn get_block_by_height(&self, kind: BlockKind, height: u32) -> Result<Option<Vec<u8>>, StoreError>;

    fn get_block_by_key_mr(&self, kind: BlockKind, key_mr: &Hash) -> Result<Option<Vec<u8>>, StoreError>;

    /// Highest stored height of `kind`, `None` when nothing is stored.
    fn highest_height(&self, kind: BlockKind) -> Result<Option<u32>, StoreError>;
}

impl<T: BlockStore + ?Sized> BlockStore for Arc<T> {
    fn put_block(
        &self,
        kind: BlockKind,
        key_mr: &Hash,
        height: u32,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        (**self).put_block(kind, key_mr, height, bytes)
    }

    fn get_block_by_height(&self, kind: BlockKind, height: u32) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get_block_by_height(kind, height)
    }

    fn get_block_by_key_mr(&self, kind: BlockKind, key_mr: &Hash) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get_block_by_key_mr(kind, key_mr)
    }

    fn highest_height(&self, kind: BlockKind) -> Result<Option<u32>, StoreError> {
        (**self).highest_height(kind)
    }
}
