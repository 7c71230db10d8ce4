//! The four block kinds that make up one directory-block height.

use crate::{Hash, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    Directory,
    Admin,
    Factoid,
    EntryCredit,
}

impl BlockKind {
    pub const ALL: [BlockKind; 4] = [
        BlockKind::Directory,
        BlockKind::Admin,
        BlockKind::Factoid,
        BlockKind::EntryCredit,
    ];

    pub fn tag(&self) -> u8 {
        match self {
            Self::Directory => 0,
            Self::Admin => 1,
            Self::Factoid => 2,
            Self::EntryCredit => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, TypesError> {
        match tag {
            0 => Ok(Self::Directory),
            1 => Ok(Self::Admin),
            2 => Ok(Self::Factoid),
            3 => Ok(Self::EntryCredit),
            other => Err(TypesError::UnknownBlockKind(other)),
        }
    }

    /// Well-known chain id under which a directory block references this kind.
    ///
    /// The directory chain itself has no entry and returns `None`.
    pub fn chain_id(&self) -> Option<Hash> {
        match self {
            Self::Directory => None,
            Self::Admin => Some(Hash::from_low_byte(0x0a)),
            Self::EntryCredit => Some(Hash::from_low_byte(0x0c)),
            Self::Factoid => Some(Hash::from_low_byte(0x0f)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::Admin => "admin",
            Self::Factoid => "factoid",
            Self::EntryCredit => "entry-credit",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
