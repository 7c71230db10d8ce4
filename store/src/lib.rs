//! Block persistence contract.
//!
//! Storage engines implement [`BlockStore`]; the consensus core depends only
//! on the trait. An in-memory implementation lives in `fedchain-nullables`.

pub mod block;
pub mod error;

pub use block::BlockStore;
pub use error::StoreError;
