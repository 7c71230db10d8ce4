//! Human-readable reports: one status line per node and the elections table.

use std::fmt::Write;

use fedchain_consensus::ElectionState;

use crate::{NodeRegistry, NodeState};

/// Role letter: `F` federated, `A` audit, `-` neither.
fn role(state: &NodeState) -> char {
    let id = state.identity();
    if state.election().is_federated(&id) {
        'F'
    } else if state.election().is_audit(&id) {
        'A'
    } else {
        '-'
    }
}

/// One line summarising a node.
pub fn status_line(name: &str, state: &NodeState) -> String {
    let pl = state.process_lists().current();
    let minute = pl
        .open_minute()
        .map_or_else(|| "-".to_string(), |m| m.to_string());
    format!(
        "{name:<10} {mode:<6} {role} height {height:>5} minute {minute} saved {saved:>5} held {held:>4} dblock {key_mr}",
        mode = state.mode().as_str(),
        role = role(state),
        height = pl.db_height(),
        saved = state.pipeline().next_height(),
        held = state.holding_len(),
        key_mr = state.pipeline().last_key_mr().short(),
    )
}

/// The federated and audit lists with the minutes each federated server leads.
pub fn elections_table(election: &ElectionState, registry: &NodeRegistry) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Elections at height {} ({:?})",
        election.db_height(),
        election.phase()
    );
    let _ = writeln!(out, "  Federated");
    for (index, identity) in election.federated().iter().enumerate() {
        let minutes: Vec<String> = (0..fedchain_types::MINUTES_PER_BLOCK)
            .filter(|m| election.leader_for(*m) == Some(*identity))
            .map(|m| m.to_string())
            .collect();
        let _ = writeln!(
            out,
            "    {index:>2}  {name:<10} {short}  minutes [{minutes}]",
            name = registry.name_of(identity),
            short = identity.short(),
            minutes = minutes.join(","),
        );
    }
    let _ = writeln!(out, "  Audit");
    for (index, identity) in election.audit().iter().enumerate() {
        let _ = writeln!(
            out,
            "    {index:>2}  {name:<10} {short}",
            name = registry.name_of(identity),
            short = identity.short(),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedchain_consensus::FaultQuorum;
    use fedchain_crypto::keypair_from_seed;
    use fedchain_types::NodeMode;

    #[test]
    fn table_lists_servers_by_name() {
        let keys: Vec<_> = (1..=4u8).map(|n| keypair_from_seed(&[n; 32]).public).collect();
        let mut registry = NodeRegistry::new();
        for (n, key) in keys.iter().enumerate() {
            registry.register(&format!("node{n}"), *key, NodeMode::Leader);
        }
        let election =
            ElectionState::new(0, &keys[..3], &keys[3..], FaultQuorum::FederatedMajority).unwrap();
        let table = elections_table(&election, &registry);

        assert!(table.starts_with("Elections at height 0 (Stable)"));
        assert!(table.contains("node0"));
        assert!(table.contains("minutes [0,3,6,9]"));
        let audit_section = table.split("  Audit").nth(1).unwrap();
        assert!(audit_section.contains("node3"));
    }
}
