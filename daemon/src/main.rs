//! fedchain daemon: run a single node or an in-process simulated network.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use fedchain_messages::{Message, RequestBlock};
use fedchain_node::{
    elections_table, init_logging, simulated_configs, spawn_ticker, status_line, FedNode,
    NodeConfig, ShutdownController, SimNetwork,
};
use fedchain_nullables::NullStore;
use fedchain_types::{NetworkId, NodeMode, Timestamp};

#[derive(Parser)]
#[command(name = "fedchain-daemon", about = "Federated directory-block node daemon")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "FEDCHAIN_CONFIG")]
    config: Option<PathBuf>,

    /// Network: "main", "test", "local" or "custom".
    #[arg(long, env = "FEDCHAIN_NETWORK")]
    network: Option<NetworkId>,

    /// Node mode: "FULL" or "SERVER".
    #[arg(long, env = "FEDCHAIN_NODE_MODE")]
    node_mode: Option<NodeMode>,

    /// Directory-block interval in seconds.
    #[arg(long, env = "FEDCHAIN_BLOCK_SECS")]
    block_secs: Option<u64>,

    /// Hex-encoded private key of this node's identity.
    #[arg(long, env = "FEDCHAIN_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "FEDCHAIN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "FEDCHAIN_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run one node until SIGINT or SIGTERM.
    Run,

    /// Run a simulated network in this process and print its final state.
    Simulate {
        /// Federated servers.
        #[arg(long, default_value_t = 3)]
        federated: usize,

        /// Audit servers.
        #[arg(long, default_value_t = 1)]
        audit: usize,

        /// Follower (FULL) nodes.
        #[arg(long, default_value_t = 1)]
        followers: usize,

        /// Minutes to run.
        #[arg(long, default_value_t = 30)]
        minutes: usize,

        /// Wall-clock length of a simulated minute in milliseconds.
        #[arg(long, default_value_t = 200)]
        minute_ms: u64,

        /// Silence `fed0` after this many minutes to exercise fault handling.
        #[arg(long)]
        silence_after: Option<usize>,
    },

    /// Print the effective configuration as TOML.
    Config,
}

impl Cli {
    /// File settings (or defaults) with CLI flags and env vars on top.
    fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let path = path.to_str().context("config path is not UTF-8")?;
                NodeConfig::from_toml_file(path)
                    .with_context(|| format!("loading config from {path}"))?
            }
            None => NodeConfig::default(),
        };
        if let Some(network) = self.network {
            config.network = network;
        }
        if let Some(mode) = self.node_mode {
            config.node_mode = mode;
        }
        if let Some(secs) = self.block_secs {
            config.directory_block_secs = secs;
        }
        if let Some(key) = &self.private_key {
            config.private_key = key.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.node_config()?;
    init_logging(config.log_format()?, &config.log_level);

    match cli.command {
        Command::Run => run(config).await,
        Command::Simulate {
            federated,
            audit,
            followers,
            minutes,
            minute_ms,
            silence_after,
        } => {
            simulate(
                &config,
                federated,
                audit,
                followers,
                minutes,
                Duration::from_millis(minute_ms),
                silence_after,
            )
            .await
        }
        Command::Config => {
            print!("{}", config.to_toml_string());
            Ok(())
        }
    }
}

async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let shutdown = ShutdownController::new();
    let mut node = FedNode::new("node", &config, Arc::new(NullStore::new()))?;
    tracing::info!(
        network = config.network.as_str(),
        mode = config.node_mode.as_str(),
        block_secs = config.directory_block_secs,
        "starting fedchain node"
    );

    let metrics = node.metrics();
    let ticker = spawn_ticker(node.handle(), node.minute(), shutdown.subscribe());
    // No network transport: outbound messages are logged and dropped.
    let mut outbound = node
        .take_outbound()
        .context("outbound queue already taken")?;
    let drain = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            tracing::trace!(msg_type = %message.message_type(), "outbound");
        }
    });
    let task = tokio::spawn(node.run(shutdown.subscribe()));

    shutdown.wait_for_signal().await;
    let state = task.await.context("node task panicked")??;
    if let Err(e) = ticker.await {
        tracing::warn!(error = %e, "ticker task ended abnormally");
    }
    drain.abort();

    println!("{}", status_line("node", &state));
    tracing::debug!(metrics = %metrics.encode_text(), "final metrics");
    tracing::info!("fedchain daemon exited cleanly");
    Ok(())
}

async fn simulate(
    base: &NodeConfig,
    federated: usize,
    audit: usize,
    followers: usize,
    minutes: usize,
    minute: Duration,
    silence_after: Option<usize>,
) -> anyhow::Result<()> {
    anyhow::ensure!(federated > 0, "a simulation needs at least one federated server");
    let network = SimNetwork::start(simulated_configs(base, federated, audit, followers))?;
    let submitter = network
        .names()
        .last()
        .map(str::to_string)
        .context("simulation has no nodes")?;
    tracing::info!(federated, audit, followers, minutes, "simulation started");

    for n in 0..minutes {
        if silence_after == Some(n) {
            tracing::warn!("silencing fed0");
            network.silence("fed0");
        }
        if let Some(handle) = network.handle(&submitter) {
            let request = Message::RequestBlock(RequestBlock {
                timestamp: Timestamp::now(),
            });
            handle.submit(request).await?;
        }
        network.run_minutes(1, minute).await?;
    }

    let registry = network.registry().clone();
    let states = network.stop().await?;
    for (name, state) in &states {
        println!("{}", status_line(name, state));
    }
    if let Some((_, state)) = states.iter().find(|(name, _)| name != "fed0") {
        print!("{}", elections_table(state.election(), &registry));
    }
    Ok(())
}
