//! Blocks sealed at every directory-block height.
//!
//! One height produces four blocks: the directory block, which links the chain
//! and references the other three by key-MR, the admin block carrying the
//! ordered [`AdminBlockEntry`] sequence, and the opaque factoid and
//! entry-credit blocks.

pub mod admin;
pub mod admin_entry;
pub mod directory;
pub mod ledger;

pub use admin::{AdminBlock, AdminHeader};
pub use admin_entry::{AdminBlockEntry, AdminEntryType};
pub use directory::{DBEntry, DirectoryBlock, DirectoryHeader};
pub use ledger::{EntryCreditBlock, FactoidBlock};
