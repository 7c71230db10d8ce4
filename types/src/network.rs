//! Network identifier.

use crate::TypesError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifies which network a node participates in.
///
/// The numeric tag is embedded in every directory block header, so blocks from
/// one network never validate on another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NetworkId {
    /// The production network.
    Main,
    /// The public test network.
    Test,
    /// Local development / simulation network.
    Local,
    /// A privately configured network.
    Custom,
}

impl NetworkId {
    /// The tag written into directory block headers.
    pub fn number(&self) -> u32 {
        match self {
            Self::Main => 0,
            Self::Test => 1,
            Self::Local => 2,
            Self::Custom => 3,
        }
    }

    /// Inverse of [`NetworkId::number`].
    pub fn from_number(n: u32) -> Option<Self> {
        match n {
            0 => Some(Self::Main),
            1 => Some(Self::Test),
            2 => Some(Self::Local),
            3 => Some(Self::Custom),
            _ => None,
        }
    }

    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "MAIN",
            Self::Test => "TEST",
            Self::Local => "LOCAL",
            Self::Custom => "CUSTOM",
        }
    }
}

impl FromStr for NetworkId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MAIN" => Ok(Self::Main),
            "TEST" => Ok(Self::Test),
            "LOCAL" => Ok(Self::Local),
            "CUSTOM" => Ok(Self::Custom),
            _ => Err(TypesError::UnknownNetwork(s.to_string())),
        }
    }
}
