//! Names for node identities, used by reports and the simulation harness.

use fedchain_crypto::identity_of;
use fedchain_types::{Hash, NodeMode, PublicKey};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisteredNode {
    pub name: String,
    pub identity: Hash,
    pub public_key: PublicKey,
    pub mode: NodeMode,
}

/// Explicit registry of known nodes. Passed to whoever needs to resolve an
/// identity to a name; there is no global instance.
#[derive(Clone, Debug, Default)]
pub struct NodeRegistry {
    nodes: BTreeMap<Hash, RegisteredNode>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node and return its identity. Re-registering replaces the entry.
    pub fn register(&mut self, name: &str, public_key: PublicKey, mode: NodeMode) -> Hash {
        let identity = identity_of(&public_key);
        self.nodes.insert(
            identity,
            RegisteredNode {
                name: name.to_string(),
                identity,
                public_key,
                mode,
            },
        );
        identity
    }

    pub fn get(&self, identity: &Hash) -> Option<&RegisteredNode> {
        self.nodes.get(identity)
    }

    pub fn by_name(&self, name: &str) -> Option<&RegisteredNode> {
        self.nodes.values().find(|n| n.name == name)
    }

    /// The registered name, or the short hash for unknown identities.
    pub fn name_of(&self, identity: &Hash) -> String {
        self.get(identity)
            .map_or_else(|| identity.short(), |n| n.name.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedchain_crypto::keypair_from_seed;

    #[test]
    fn resolves_names_and_falls_back_to_short_hash() {
        let mut registry = NodeRegistry::new();
        let key = keypair_from_seed(&[1; 32]).public;
        let id = registry.register("fed0", key, NodeMode::Leader);
        assert_eq!(registry.name_of(&id), "fed0");
        assert_eq!(registry.by_name("fed0").unwrap().identity, id);

        let stranger = Hash::from_low_byte(9);
        assert_eq!(registry.name_of(&stranger), stranger.short());
        assert_eq!(registry.len(), 1);
    }
}
