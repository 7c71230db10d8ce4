//! Node operating mode.

use crate::TypesError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Whether a node may ever lead message ordering.
///
/// In configuration files the modes are spelled `FULL` and `SERVER`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeMode {
    /// Follows the federated servers, never issues acknowledgements.
    #[serde(rename = "FULL")]
    Follower,
    /// Leads its minutes when it is a federated server, audits otherwise.
    #[serde(rename = "SERVER")]
    Leader,
}

impl NodeMode {
    pub fn can_lead(&self) -> bool {
        matches!(self, Self::Leader)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follower => "FULL",
            Self::Leader => "SERVER",
        }
    }
}

impl FromStr for NodeMode {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FULL" | "FOLLOWER" => Ok(Self::Follower),
            "SERVER" | "LEADER" => Ok(Self::Leader),
            _ => Err(TypesError::UnknownNodeMode(s.to_string())),
        }
    }
}
