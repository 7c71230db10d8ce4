//! In-process simulated network.
//!
//! Every simulated node is a separate [`FedNode`] task over its own
//! in-memory store; nodes share nothing. One router task per node copies its
//! outbound queue to every other node's inbound queue as encoded frames, so
//! the whole wire codec is exercised on the way.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fedchain_crypto::keypair_from_seed;
use fedchain_messages::Message;
use fedchain_nullables::NullStore;
use fedchain_protocol::Encode;
use fedchain_types::{Hash, NodeMode, Timestamp};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{FedNode, NodeConfig, NodeError, NodeHandle, NodeRegistry, NodeState, ShutdownController};

struct SimNode {
    name: String,
    handle: NodeHandle,
    task: JoinHandle<Result<NodeState, NodeError>>,
}

pub struct SimNetwork {
    nodes: Vec<SimNode>,
    registry: NodeRegistry,
    silenced: Arc<Vec<AtomicBool>>,
    routers: Vec<JoinHandle<()>>,
    shutdown: ShutdownController,
}

/// Configurations for a simulated network: `federated` and `audit` servers
/// followed by `followers` full nodes, all keyed from deterministic seeds.
/// `base` supplies every other setting.
pub fn simulated_configs(
    base: &NodeConfig,
    federated: usize,
    audit: usize,
    followers: usize,
) -> Vec<(String, NodeConfig)> {
    let seed = |n: usize| {
        let mut seed = [0u8; 32];
        seed[..8].copy_from_slice(&(n as u64 + 1).to_be_bytes());
        seed
    };
    let public_hex = |n: usize| hex::encode(keypair_from_seed(&seed(n)).public.as_bytes());
    let federated_servers: Vec<String> = (0..federated).map(public_hex).collect();
    let audit_servers: Vec<String> = (federated..federated + audit).map(public_hex).collect();

    (0..federated + audit + followers)
        .map(|n| {
            let (name, mode) = if n < federated {
                (format!("fed{n}"), NodeMode::Leader)
            } else if n < federated + audit {
                (format!("audit{}", n - federated), NodeMode::Leader)
            } else {
                (format!("full{}", n - federated - audit), NodeMode::Follower)
            };
            let config = NodeConfig {
                node_mode: mode,
                private_key: hex::encode(seed(n)),
                federated_servers: federated_servers.clone(),
                audit_servers: audit_servers.clone(),
                ..base.clone()
            };
            (name, config)
        })
        .collect()
}

impl SimNetwork {
    /// Start one task per node plus its router. Must run inside a tokio runtime.
    pub fn start(nodes: Vec<(String, NodeConfig)>) -> Result<Self, NodeError> {
        let shutdown = ShutdownController::new();
        let mut registry = NodeRegistry::new();
        let mut started = Vec::with_capacity(nodes.len());
        let mut outbounds = Vec::with_capacity(nodes.len());

        for (name, config) in &nodes {
            if config.federated_servers.is_empty() {
                return Err(NodeError::Config(format!(
                    "{name}: simulated nodes need an explicit federated list"
                )));
            }
            let mut node = FedNode::new(name, config, Arc::new(NullStore::new()))?;
            registry.register(name, node.public_key(), config.node_mode);
            let outbound = node
                .take_outbound()
                .ok_or(NodeError::QueueClosed("outbound"))?;
            outbounds.push(outbound);
            let handle = node.handle();
            let task = tokio::spawn(node.run(shutdown.subscribe()));
            started.push(SimNode {
                name: name.clone(),
                handle,
                task,
            });
        }

        let silenced: Arc<Vec<AtomicBool>> =
            Arc::new((0..started.len()).map(|_| AtomicBool::new(false)).collect());
        let mut routers = Vec::with_capacity(started.len());
        for (index, mut outbound) in outbounds.into_iter().enumerate() {
            let peers: Vec<NodeHandle> = started
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != index)
                .map(|(_, n)| n.handle.clone())
                .collect();
            let silenced = Arc::clone(&silenced);
            let from = started[index].name.clone();
            routers.push(tokio::spawn(async move {
                while let Some(message) = outbound.recv().await {
                    if silenced[index].load(Ordering::Relaxed) {
                        continue;
                    }
                    route(&from, &message, &peers).await;
                }
            }));
        }

        Ok(Self {
            nodes: started,
            registry,
            silenced,
            routers,
            shutdown,
        })
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    pub fn handle(&self, name: &str) -> Option<&NodeHandle> {
        self.nodes.iter().find(|n| n.name == name).map(|n| &n.handle)
    }

    /// Drop everything `name` sends from now on. Returns `false` for unknown names.
    pub fn silence(&self, name: &str) -> bool {
        match self.nodes.iter().position(|n| n.name == name) {
            Some(index) => {
                self.silenced[index].store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Silence the node registered under `identity`.
    pub fn silence_identity(&self, identity: &Hash) -> bool {
        match self.registry.get(identity) {
            Some(node) => self.silence(&node.name),
            None => false,
        }
    }

    /// Tick every node at `at`.
    pub async fn tick_all(&self, at: Timestamp) -> Result<(), NodeError> {
        for node in &self.nodes {
            node.handle.tick(at).await?;
        }
        Ok(())
    }

    /// Drive `minutes` minutes of wall-clock time: tick every node, then give
    /// the routers `settle` to deliver what the tick produced.
    pub async fn run_minutes(&self, minutes: usize, settle: Duration) -> Result<(), NodeError> {
        for _ in 0..minutes {
            self.tick_all(Timestamp::now()).await?;
            tokio::time::sleep(settle).await;
        }
        Ok(())
    }

    /// Stop every node and return their final states in start order.
    pub async fn stop(self) -> Result<Vec<(String, NodeState)>, NodeError> {
        self.shutdown.shutdown();
        let mut states = Vec::with_capacity(self.nodes.len());
        for node in self.nodes {
            let state = node
                .task
                .await
                .map_err(|e| NodeError::TaskFailed(format!("{}: {e}", node.name)))??;
            states.push((node.name, state));
        }
        for router in self.routers {
            router.abort();
        }
        Ok(states)
    }
}

async fn route(from: &str, message: &Message, peers: &[NodeHandle]) {
    let frame = match message.encode() {
        Ok(frame) => frame,
        Err(e) => {
            warn!(from, error = %e, "outbound message not encodable");
            return;
        }
    };
    for peer in peers {
        if peer.deliver_frame(frame.clone()).await.is_err() {
            debug!(from, "peer gone, frame dropped");
        }
    }
}
