//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};

use fedchain_consensus::{FaultQuorum, DEFAULT_REPLAY_WINDOW_SECS, DEFAULT_RETAIN};
use fedchain_crypto::{keypair_from_hex, public_key_from_hex};
use fedchain_types::params::DEFAULT_DIRECTORY_BLOCK_SECS;
use fedchain_types::{KeyPair, NetworkId, NodeMode, PublicKey, MINUTES_PER_BLOCK};

use crate::{LogFormat, NodeError};

/// Development key shared by local single-server networks.
pub const LOCAL_PRIVATE_KEY: &str =
    "4c38c72fc5cdad68f13b74674d3ffb1f3d63a112710868c9b08946553448d26d";

/// Default leader-silence timeout, in minutes.
pub const HEARTBEAT_TIMEOUT_MINUTES: u64 = 3;

/// Longest accepted directory-block interval: one day.
pub const MAX_DIRECTORY_BLOCK_SECS: u64 = 86_400;

/// Configuration for a fedchain node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests and simulations). Unknown node
/// modes or networks fail parsing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// `FULL` follows the federated servers, `SERVER` may lead.
    #[serde(default = "default_node_mode")]
    pub node_mode: NodeMode,

    /// Which network this node belongs to; embedded in directory blocks.
    #[serde(default = "default_network")]
    pub network: NetworkId,

    /// Directory-block interval in seconds. A minute is a tenth of it.
    #[serde(default = "default_directory_block_secs")]
    pub directory_block_secs: u64,

    /// Hex-encoded Ed25519 private key of this node's identity.
    #[serde(default = "default_private_key")]
    pub private_key: String,

    /// Hex-encoded public keys of the initial federated servers, in rotation order.
    /// Empty means a single-server network led by this node's own key.
    #[serde(default)]
    pub federated_servers: Vec<String>,

    /// Hex-encoded public keys of the initial audit servers.
    #[serde(default)]
    pub audit_servers: Vec<String>,

    /// Capacity of each bounded message queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Replay-filter window in seconds.
    #[serde(default = "default_replay_window_secs")]
    pub replay_window_secs: u64,

    /// Silence after which a leader is reported as faulted, in milliseconds.
    /// Unset means [`HEARTBEAT_TIMEOUT_MINUTES`] minutes; a set value must
    /// exceed one minute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_timeout_ms: Option<u64>,

    /// Number of corroborating fault reports that promote an audit server.
    #[serde(default)]
    pub fault_quorum: FaultQuorum,

    /// Persisted DBStates kept in memory.
    #[serde(default = "default_dbstate_retain")]
    pub dbstate_retain: usize,

    /// Upper bound on messages held while their validity is undetermined.
    #[serde(default = "default_holding_capacity")]
    pub holding_capacity: usize,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_node_mode() -> NodeMode {
    NodeMode::Leader
}

fn default_network() -> NetworkId {
    NetworkId::Local
}

fn default_directory_block_secs() -> u64 {
    DEFAULT_DIRECTORY_BLOCK_SECS
}

fn default_private_key() -> String {
    LOCAL_PRIVATE_KEY.to_string()
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_replay_window_secs() -> u64 {
    DEFAULT_REPLAY_WINDOW_SECS
}

fn default_dbstate_retain() -> usize {
    DEFAULT_RETAIN
}

fn default_holding_capacity() -> usize {
    10_000
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("NodeConfig is always serializable to TOML")
    }

    /// Check every value the node cannot start without.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.directory_block_secs == 0 || self.directory_block_secs > MAX_DIRECTORY_BLOCK_SECS {
            return Err(NodeError::Config(format!(
                "directory_block_secs must be between 1 and {MAX_DIRECTORY_BLOCK_SECS}"
            )));
        }
        let timeout = self.heartbeat_timeout_millis();
        if timeout <= self.minute_millis() {
            return Err(NodeError::Config(format!(
                "heartbeat_timeout_ms ({timeout}) must exceed one minute ({} ms)",
                self.minute_millis()
            )));
        }
        if self.queue_capacity == 0 {
            return Err(NodeError::Config("queue_capacity must be positive".into()));
        }
        if self.dbstate_retain == 0 {
            return Err(NodeError::Config("dbstate_retain must be positive".into()));
        }
        self.log_format()?;
        self.keypair()?;
        self.federated_keys()?;
        self.audit_keys()?;
        Ok(())
    }

    /// This node's signing identity.
    pub fn keypair(&self) -> Result<KeyPair, NodeError> {
        keypair_from_hex(&self.private_key)
            .map_err(|e| NodeError::Config(format!("private_key: {e}")))
    }

    /// Initial federated servers in rotation order.
    pub fn federated_keys(&self) -> Result<Vec<PublicKey>, NodeError> {
        if self.federated_servers.is_empty() {
            return Ok(vec![self.keypair()?.public]);
        }
        parse_keys("federated_servers", &self.federated_servers)
    }

    pub fn audit_keys(&self) -> Result<Vec<PublicKey>, NodeError> {
        parse_keys("audit_servers", &self.audit_servers)
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        match self.log_format.to_ascii_lowercase().as_str() {
            "human" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            other => Err(NodeError::Config(format!("unknown log format {other:?}"))),
        }
    }

    /// Length of one minute in milliseconds.
    pub fn minute_millis(&self) -> u64 {
        self.directory_block_secs.saturating_mul(1000) / MINUTES_PER_BLOCK as u64
    }

    /// Effective leader-silence timeout in milliseconds.
    pub fn heartbeat_timeout_millis(&self) -> u64 {
        self.heartbeat_timeout_ms
            .unwrap_or_else(|| self.minute_millis().saturating_mul(HEARTBEAT_TIMEOUT_MINUTES))
    }
}

fn parse_keys(field: &str, keys: &[String]) -> Result<Vec<PublicKey>, NodeError> {
    keys.iter()
        .map(|k| {
            public_key_from_hex(k).map_err(|e| NodeError::Config(format!("{field}: {e}")))
        })
        .collect()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_mode: default_node_mode(),
            network: default_network(),
            directory_block_secs: default_directory_block_secs(),
            private_key: default_private_key(),
            federated_servers: Vec::new(),
            audit_servers: Vec::new(),
            queue_capacity: default_queue_capacity(),
            replay_window_secs: default_replay_window_secs(),
            heartbeat_timeout_ms: None,
            fault_quorum: FaultQuorum::default(),
            dbstate_retain: default_dbstate_retain(),
            holding_capacity: default_holding_capacity(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.node_mode, config.node_mode);
        assert_eq!(parsed.network, config.network);
        assert_eq!(parsed.queue_capacity, config.queue_capacity);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.node_mode, NodeMode::Leader);
        assert_eq!(config.network, NetworkId::Local);
        assert_eq!(config.directory_block_secs, 6);
        assert_eq!(config.queue_capacity, 10_000);
        assert_eq!(config.replay_window_secs, 3600);
        assert_eq!(config.fault_quorum, FaultQuorum::FederatedMajority);
        assert_eq!(config.minute_millis(), 600);
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            node_mode = "FULL"
            network = "TEST"
            directory_block_secs = 60
            fault_quorum = "total_majority"
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.node_mode, NodeMode::Follower);
        assert_eq!(config.network, NetworkId::Test);
        assert_eq!(config.minute_millis(), 6_000);
        assert_eq!(config.fault_quorum, FaultQuorum::TotalMajority);
        assert_eq!(config.log_format, "human"); // default
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = NodeConfig::from_toml_str(r#"node_mode = "LEADERISH""#).unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }

    #[test]
    fn unknown_network_is_rejected() {
        let err = NodeConfig::from_toml_str(r#"network = "MOON""#).unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }

    #[test]
    fn bad_key_material_is_rejected() {
        let err = NodeConfig::from_toml_str(r#"private_key = "zz""#).unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));

        let err = NodeConfig::from_toml_str(r#"federated_servers = ["0011"]"#).unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }

    #[test]
    fn empty_federated_list_means_self_led() {
        let config = NodeConfig::default();
        let keys = config.federated_keys().unwrap();
        assert_eq!(keys, vec![config.keypair().unwrap().public]);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "network = \"CUSTOM\"\nheartbeat_timeout_ms = 750").unwrap();
        let config = NodeConfig::from_toml_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.network, NetworkId::Custom);
        assert_eq!(config.heartbeat_timeout_ms, Some(750));
        assert_eq!(config.heartbeat_timeout_millis(), 750);
    }

    #[test]
    fn heartbeat_timeout_follows_the_block_interval() {
        let config = NodeConfig::from_toml_str("directory_block_secs = 600").unwrap();
        assert_eq!(config.minute_millis(), 60_000);
        assert_eq!(config.heartbeat_timeout_millis(), 180_000);
        assert!(!config.to_toml_string().contains("heartbeat_timeout_ms"));
    }

    #[test]
    fn heartbeat_timeout_within_a_minute_is_rejected() {
        let err = NodeConfig::from_toml_str("directory_block_secs = 600\nheartbeat_timeout_ms = 3000")
            .unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
        let err = NodeConfig::from_toml_str("heartbeat_timeout_ms = 600").unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
        assert!(NodeConfig::from_toml_str("heartbeat_timeout_ms = 601").is_ok());
    }

    #[test]
    fn oversized_block_interval_is_rejected() {
        let text = format!("directory_block_secs = {}", u64::MAX);
        assert!(matches!(
            NodeConfig::from_toml_str(&text),
            Err(NodeError::Config(_))
        ));
        let config = NodeConfig {
            directory_block_secs: u64::MAX,
            ..NodeConfig::default()
        };
        // No overflow even before validation.
        assert_eq!(config.minute_millis(), u64::MAX / 10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/fedchain.toml");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }
}
