//! fedchain node: queues, orchestration and the simulated network.
//!
//! - [`NodeState`] is the synchronous core: replay filter, validation,
//!   holding map, process lists, election and DBState pipeline.
//! - [`FedNode`] runs a `NodeState` behind bounded tokio queues.
//! - [`SimNetwork`] wires several nodes together in one process.

pub mod config;
pub mod error;
pub mod holding;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod queues;
pub mod registry;
pub mod report;
pub mod shutdown;
pub mod simulation;
pub mod state;
pub mod tracing_spans;

pub use config::NodeConfig;
pub use error::NodeError;
pub use holding::{HeldMessage, HoldingMap};
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::{spawn_ticker, FedNode};
pub use queues::{channels, InvalidFrame, NodeHandle, NodeQueues, TimerTick};
pub use registry::{NodeRegistry, RegisteredNode};
pub use report::{elections_table, status_line};
pub use shutdown::ShutdownController;
pub use simulation::{simulated_configs, SimNetwork};
pub use state::{NodeState, Outcome, Validity};
