//! Integration tests driving several nodes end-to-end.
//!
//! Most tests use a lockstep cluster: every node's outbox is encoded,
//! decoded and processed by the others until nothing is left in flight, with
//! time supplied by a `NullClock`. The async `SimNetwork` is exercised on
//! top of real tokio tasks at the end.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use fedchain_blocks::AdminBlockEntry;
use fedchain_crypto::identity_of;
use fedchain_messages::{EndOfMinute, FaultReport, Message, RequestBlock, SignedPayload};
use fedchain_node::{
    elections_table, simulated_configs, status_line, FedNode, NodeConfig, NodeError,
    NodeMetrics, NodeRegistry, NodeState, Outcome, SimNetwork,
};
use fedchain_nullables::{NullClock, NullStore};
use fedchain_protocol::{decode_exact, Encode};
use fedchain_store::BlockStore;
use fedchain_types::{BlockKind, Hash, KeyPair, NodeMode, Timestamp, LAST_MINUTE, MINUTES_PER_BLOCK};

const NOW: Timestamp = Timestamp::from_secs(1_700_000_000);

// ---------------------------------------------------------------------------
// Lockstep cluster
// ---------------------------------------------------------------------------

struct Cluster {
    names: Vec<String>,
    nodes: Vec<NodeState>,
    stores: Vec<Arc<NullStore>>,
    silenced: Vec<bool>,
    registry: NodeRegistry,
    clock: NullClock,
    minute_ms: u64,
}

impl Cluster {
    fn new(federated: usize, audit: usize, followers: usize) -> Self {
        let base = NodeConfig {
            heartbeat_timeout_ms: Some(3_000),
            ..NodeConfig::default()
        };
        Self::with_base(&base, federated, audit, followers)
    }

    fn with_base(base: &NodeConfig, federated: usize, audit: usize, followers: usize) -> Self {
        let mut cluster = Self {
            names: Vec::new(),
            nodes: Vec::new(),
            stores: Vec::new(),
            silenced: Vec::new(),
            registry: NodeRegistry::new(),
            clock: NullClock::new(1_700_000_000),
            minute_ms: base.minute_millis(),
        };
        for (name, config) in simulated_configs(base, federated, audit, followers) {
            let store = Arc::new(NullStore::new());
            let state =
                NodeState::new(&config, store.clone(), Arc::new(NodeMetrics::new())).unwrap();
            cluster
                .registry
                .register(&name, state.public_key(), config.node_mode);
            cluster.names.push(name);
            cluster.nodes.push(state);
            cluster.stores.push(store);
            cluster.silenced.push(false);
        }
        cluster
    }

    fn index_of(&self, identity: &Hash) -> usize {
        self.nodes
            .iter()
            .position(|n| &n.identity() == identity)
            .expect("identity belongs to the cluster")
    }

    fn live(&self) -> impl Iterator<Item = &NodeState> {
        self.nodes
            .iter()
            .zip(&self.silenced)
            .filter(|(_, silenced)| !**silenced)
            .map(|(n, _)| n)
    }

    /// Deliver every outbox as encoded frames until nothing is in flight.
    fn pump(&mut self) {
        loop {
            let mut moved = false;
            for from in 0..self.nodes.len() {
                let outbox = self.nodes[from].take_outbox();
                if self.silenced[from] {
                    continue;
                }
                for message in outbox {
                    moved = true;
                    let frame = message.encode().unwrap();
                    for to in (0..self.nodes.len()).filter(|to| *to != from) {
                        let decoded: Message = decode_exact(&frame).unwrap();
                        self.nodes[to].process(decoded, self.clock.now()).unwrap();
                    }
                }
            }
            if !moved {
                break;
            }
        }
    }

    /// One minute passes for everybody.
    fn tick(&mut self) {
        self.clock.advance_millis(self.minute_ms);
        let now = self.clock.now();
        for node in &mut self.nodes {
            node.on_timer(now).unwrap();
        }
        self.pump();
    }

    fn submit(&mut self, to: usize, message: Message) -> Outcome {
        let outcome = self.nodes[to].process(message, self.clock.now()).unwrap();
        self.pump();
        outcome
    }

    fn request(&self, salt: u64) -> Message {
        Message::RequestBlock(RequestBlock {
            timestamp: self.clock.now().plus_millis(salt),
        })
    }
}

fn assert_same_chain(nodes: &[&NodeState], heights: std::ops::Range<u32>) {
    for height in heights {
        let key_mrs: Vec<Hash> = nodes
            .iter()
            .map(|n| n.pipeline().get(height).expect("height assembled").key_mr)
            .collect();
        assert!(
            key_mrs.windows(2).all(|w| w[0] == w[1]),
            "key-MRs diverge at height {height}: {key_mrs:?}"
        );
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn height_ten_orders_one_request_per_minute() {
    let mut cluster = Cluster::new(3, 0, 1);
    let follower = 3;

    for _ in 0..10 * MINUTES_PER_BLOCK as usize {
        cluster.tick();
    }
    assert!(cluster.nodes.iter().all(|n| n.db_height() == 10));

    for minute in 0..MINUTES_PER_BLOCK as u64 {
        let request = cluster.request(minute);
        assert_eq!(cluster.submit(follower, request), Outcome::Held);
        cluster.tick();
    }

    for node in &cluster.nodes {
        assert_eq!(node.db_height(), 11);
        let state = node.pipeline().get(10).unwrap();
        let expected: Vec<AdminBlockEntry> = (0..=LAST_MINUTE)
            .map(|minute| AdminBlockEntry::EndOfMinute { minute })
            .collect();
        assert_eq!(state.admin.entries, expected);

        let sealed = node.process_lists().previous().unwrap();
        assert_eq!(sealed.db_height(), 10);
        for minute in 0..=LAST_MINUTE {
            assert_eq!(sealed.messages(minute).len(), 1, "minute {minute}");
        }
        assert_eq!(node.holding_len(), 0);
    }

    let nodes: Vec<&NodeState> = cluster.nodes.iter().collect();
    assert_same_chain(&nodes, 0..11);
    for store in &cluster.stores {
        assert_eq!(store.highest_height(BlockKind::Directory).unwrap(), Some(10));
    }
}

#[test]
fn silent_leader_is_replaced_by_top_audit_server() {
    let mut cluster = Cluster::new(3, 2, 0);
    for _ in 0..3 {
        cluster.tick();
    }

    let observer = &cluster.nodes[0];
    let open = observer.process_lists().current().open_minute().unwrap();
    let height = observer.db_height();
    let faulted = observer.election().leader_for(open).unwrap();
    let promoted = observer.election().audit()[0];
    let faulted_index = cluster.index_of(&faulted);
    let position = observer.election().server_index(&faulted).unwrap();
    cluster.silenced[faulted_index] = true;

    // Minutes stall until the heartbeat timeout expires and both remaining
    // federated servers have reported; the top audit server then closes the
    // stalled minute itself.
    let mut ticks = 0;
    while cluster.live().any(|n| n.election().is_federated(&faulted)) {
        cluster.tick();
        ticks += 1;
        assert!(ticks < 20, "no promotion after {ticks} ticks");
    }

    for node in cluster.live() {
        let election = node.election();
        assert_eq!(election.federated()[position], promoted);
        assert!(election.is_audit(&faulted));
        assert!(!election.is_audit(&promoted));
        assert_eq!(node.metrics().promotions.get(), 1);
    }

    // The promoted server takes over the stalled minute and the height seals.
    while cluster.live().any(|n| n.db_height() == height) {
        cluster.tick();
        ticks += 1;
        assert!(ticks < 40, "height {height} never sealed");
    }
    let live: Vec<&NodeState> = cluster.live().collect();
    for node in &live {
        let admin = &node.pipeline().get(height).unwrap().admin;
        assert!(admin.entries.contains(&AdminBlockEntry::ServerFault {
            faulted,
            promoted,
            db_height: height,
            minute: open,
        }));
        assert_eq!(
            admin
                .entries
                .iter()
                .filter(|e| matches!(e, AdminBlockEntry::EndOfMinute { .. }))
                .count(),
            MINUTES_PER_BLOCK as usize
        );
    }
    assert_same_chain(&live, 0..height + 1);

    // Rotation continues without the faulted server.
    for _ in 0..MINUTES_PER_BLOCK {
        cluster.tick();
    }
    assert!(cluster.live().all(|n| n.db_height() == height + 2));

    let table = elections_table(cluster.live().next().unwrap().election(), &cluster.registry);
    assert!(table.contains(&cluster.registry.name_of(&promoted)));
}

#[test]
fn leader_silent_from_start_is_still_replaced() {
    let mut cluster = Cluster::new(3, 2, 0);
    let faulted = cluster.nodes[0].election().leader_for(0).unwrap();
    let promoted = cluster.nodes[0].election().audit()[0];
    let faulted_index = cluster.index_of(&faulted);
    cluster.silenced[faulted_index] = true;

    let mut ticks = 0;
    while cluster.live().any(|n| n.election().is_federated(&faulted)) {
        cluster.tick();
        ticks += 1;
        assert!(ticks < 20, "never-heard leader not replaced after {ticks} ticks");
    }
    for node in cluster.live() {
        assert_eq!(node.election().federated()[0], promoted);
        assert_eq!(node.process_lists().current().open_minute(), Some(1));
        assert_eq!(node.metrics().promotions.get(), 1);
    }
}

#[test]
fn minute_long_intervals_keep_healthy_leaders() {
    let base = NodeConfig {
        directory_block_secs: 600,
        ..NodeConfig::default()
    };
    let mut cluster = Cluster::with_base(&base, 3, 1, 0);
    let federated = cluster.nodes[0].election().federated().to_vec();

    for _ in 0..2 * MINUTES_PER_BLOCK {
        cluster.tick();
    }
    for node in &cluster.nodes {
        assert_eq!(node.db_height(), 2);
        assert_eq!(node.election().federated(), federated.as_slice());
        assert_eq!(node.metrics().promotions.get(), 0);
    }
}

/// Signed end-of-minute and fault reports for minute 0 of height 0 on a
/// 3 + 2 network, plus the follower that receives them.
struct FaultRace {
    receiver: NodeConfig,
    leader_eom: Message,
    takeover_eom: Message,
    reports: Vec<Message>,
}

fn key_of(keys: &[KeyPair], identity: Hash) -> &KeyPair {
    keys.iter()
        .find(|k| identity_of(&k.public) == identity)
        .expect("identity has a key")
}

fn fault_race() -> FaultRace {
    let configs = simulated_configs(&NodeConfig::default(), 3, 2, 1);
    let keys: Vec<KeyPair> = configs.iter().map(|(_, c)| c.keypair().unwrap()).collect();
    let receiver = configs[5].1.clone();
    let election = NodeState::new(&receiver, Arc::new(NullStore::new()), Arc::new(NodeMetrics::new()))
        .unwrap()
        .election()
        .clone();
    let leader = election.leader_for(0).unwrap();
    let candidate = election.audit()[0];

    let end_of_minute = |signer: Hash| {
        let mut eom = EndOfMinute::new(NOW, 0, 0, 0, 0);
        eom.sign(key_of(&keys, signer)).unwrap();
        Message::EndOfMinute(eom)
    };
    let reports = election
        .federated()
        .iter()
        .filter(|id| **id != leader)
        .map(|reporter| {
            let mut report = FaultReport::new(NOW, 0, 0, leader, *reporter);
            report.sign(key_of(&keys, *reporter)).unwrap();
            Message::FaultReport(report)
        })
        .collect();
    FaultRace {
        receiver,
        leader_eom: end_of_minute(leader),
        takeover_eom: end_of_minute(candidate),
        reports,
    }
}

fn deliver(config: &NodeConfig, messages: &[Message]) -> NodeState {
    let mut state =
        NodeState::new(config, Arc::new(NullStore::new()), Arc::new(NodeMetrics::new())).unwrap();
    for message in messages {
        state.process(message.clone(), NOW).unwrap();
    }
    state
}

fn assert_same_election(a: &NodeState, b: &NodeState) {
    assert_eq!(a.election().federated(), b.election().federated());
    assert_eq!(a.election().audit(), b.election().audit());
    assert_eq!(
        a.process_lists().current().open_minute(),
        b.process_lists().current().open_minute()
    );
    assert_eq!(
        a.process_lists().current().admin_entries(),
        b.process_lists().current().admin_entries()
    );
    assert_eq!(a.metrics().promotions.get(), b.metrics().promotions.get());
}

#[test]
fn leader_end_of_minute_and_fault_quorum_commute() {
    let race = fault_race();
    let mut eom_first = vec![race.leader_eom.clone()];
    eom_first.extend(race.reports.iter().cloned());
    let mut reports_first = race.reports.clone();
    reports_first.push(race.leader_eom.clone());

    let a = deliver(&race.receiver, &eom_first);
    let b = deliver(&race.receiver, &reports_first);
    assert_same_election(&a, &b);
    // The leader closed its own minute: nobody is promoted.
    assert_eq!(a.metrics().promotions.get(), 0);
    assert_eq!(a.process_lists().current().open_minute(), Some(1));
    assert!(b.election().reporters(&b.election().federated()[0]).is_none());
}

#[test]
fn takeover_end_of_minute_and_fault_quorum_commute() {
    let race = fault_race();
    let mut takeover_first = vec![race.takeover_eom.clone()];
    takeover_first.extend(race.reports.iter().cloned());
    let mut reports_first = race.reports.clone();
    reports_first.push(race.takeover_eom.clone());

    let a = deliver(&race.receiver, &takeover_first);
    let b = deliver(&race.receiver, &reports_first);
    assert_same_election(&a, &b);
    assert_eq!(a.metrics().promotions.get(), 1);
    assert_eq!(a.process_lists().current().open_minute(), Some(1));
    assert_eq!(a.holding_len(), 0);
    assert!(a
        .process_lists()
        .current()
        .admin_entries()
        .iter()
        .any(|e| matches!(e, AdminBlockEntry::ServerFault { minute: 0, .. })));
}

#[test]
fn late_node_catches_up_from_dbstates_in_any_order() {
    let mut cluster = Cluster::new(1, 0, 0);
    for _ in 0..3 * MINUTES_PER_BLOCK {
        cluster.tick();
    }
    let source = &cluster.nodes[0];
    assert_eq!(source.db_height(), 3);

    let config = NodeConfig {
        node_mode: NodeMode::Follower,
        private_key: hex::encode([0xAB; 32]),
        federated_servers: vec![hex::encode(source.public_key().as_bytes())],
        ..NodeConfig::default()
    };
    let store = Arc::new(NullStore::new());
    let mut late = NodeState::new(&config, store.clone(), Arc::new(NodeMetrics::new())).unwrap();

    let now = cluster.clock.now();
    for height in [2, 1] {
        let msg = Message::DBState(source.dbstate_message(height, now).unwrap());
        assert_eq!(late.process(msg, now).unwrap(), Outcome::Held);
    }
    let first = Message::DBState(source.dbstate_message(0, now).unwrap());
    assert_eq!(late.process(first, now).unwrap(), Outcome::Executed);

    assert_eq!(late.db_height(), 3);
    assert_eq!(late.holding_len(), 0);
    assert_same_chain(&[source, &late], 0..3);
    assert_eq!(store.highest_height(BlockKind::Directory).unwrap(), Some(2));

    // An already-saved height is rejected.
    let stale = Message::DBState(source.dbstate_message(1, now.plus_millis(1)).unwrap());
    assert_eq!(late.process(stale, now).unwrap(), Outcome::Invalid);
}

#[test]
fn corrupted_dbstate_halts_the_node() {
    let mut cluster = Cluster::new(1, 0, 0);
    for _ in 0..MINUTES_PER_BLOCK {
        cluster.tick();
    }
    let now = cluster.clock.now();
    let mut state = cluster.nodes[0].dbstate_message(0, now).unwrap();
    state.admin.entries.pop();

    let config = NodeConfig {
        node_mode: NodeMode::Follower,
        private_key: hex::encode([0xCD; 32]),
        federated_servers: vec![hex::encode(cluster.nodes[0].public_key().as_bytes())],
        ..NodeConfig::default()
    };
    let mut late =
        NodeState::new(&config, Arc::new(NullStore::new()), Arc::new(NodeMetrics::new())).unwrap();
    let err = late.process(Message::DBState(state), now).unwrap_err();
    assert!(err.is_fatal());
    assert!(late.pipeline().is_halted());
    assert!(late.pipeline().is_empty());
}

#[test]
fn status_lines_describe_each_node() {
    let mut cluster = Cluster::new(2, 1, 1);
    for _ in 0..MINUTES_PER_BLOCK {
        cluster.tick();
    }
    let lines: Vec<String> = cluster
        .names
        .iter()
        .zip(&cluster.nodes)
        .map(|(name, node)| status_line(name, node))
        .collect();
    assert!(lines[0].starts_with("fed0"));
    assert!(lines[0].contains("SERVER F height     1"));
    assert!(lines[2].contains("SERVER A"));
    assert!(lines[3].contains("FULL   -"));
}

// ---------------------------------------------------------------------------
// Configuration and async network
// ---------------------------------------------------------------------------

#[test]
fn node_starts_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "node_mode = \"SERVER\"\nnetwork = \"TEST\"\ndirectory_block_secs = 1\nqueue_capacity = 16"
    )
    .unwrap();
    let config = NodeConfig::from_toml_file(file.path().to_str().unwrap()).unwrap();
    let node = FedNode::new("from-file", &config, Arc::new(NullStore::new())).unwrap();
    assert_eq!(node.minute(), Duration::from_millis(100));
    assert_eq!(node.state().network().number(), 1);
}

#[test]
fn unknown_mode_in_file_is_a_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "node_mode = \"OBSERVER\"").unwrap();
    let err = NodeConfig::from_toml_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(matches!(err, NodeError::Config(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn simulated_network_agrees_on_every_directory_block() {
    let base = NodeConfig {
        heartbeat_timeout_ms: Some(60_000),
        ..NodeConfig::default()
    };
    let network = SimNetwork::start(simulated_configs(&base, 3, 1, 1)).unwrap();
    let settle = Duration::from_millis(40);

    for minute in 0..2 * MINUTES_PER_BLOCK as u64 {
        if minute % 3 == 0 {
            let request = Message::RequestBlock(RequestBlock {
                timestamp: fedchain_types::Timestamp::now().plus_millis(minute),
            });
            network.handle("full0").unwrap().submit(request).await.unwrap();
            tokio::time::sleep(settle).await;
        }
        network.run_minutes(1, settle).await.unwrap();
    }

    let states = network.stop().await.unwrap();
    assert_eq!(states.len(), 5);
    let lowest = states.iter().map(|(_, s)| s.db_height()).min().unwrap();
    assert!(lowest >= 1, "a node never sealed a height");
    let nodes: Vec<&NodeState> = states.iter().map(|(_, s)| s).collect();
    assert_same_chain(&nodes, 0..lowest);
}

#[tokio::test]
async fn simulated_network_needs_a_federated_list() {
    let config = NodeConfig::default();
    let err = SimNetwork::start(vec![("lonely".to_string(), config)]).err().unwrap();
    assert!(matches!(err, NodeError::Config(_)));
}
