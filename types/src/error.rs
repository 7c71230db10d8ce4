//! Errors for parsing the fundamental types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("unknown network identifier: {0} (expected MAIN, TEST, LOCAL or CUSTOM)")]
    UnknownNetwork(String),

    #[error("unknown node mode: {0} (expected FULL or SERVER)")]
    UnknownNodeMode(String),

    #[error("unknown block kind tag: {0}")]
    UnknownBlockKind(u8),
}
