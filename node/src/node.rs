//! The async node loop.
//!
//! One task per node owns its [`NodeState`]. Network receive, the timer and
//! local submitters only reach it through the bounded queues behind a
//! [`NodeHandle`]; the loop's `select!` is its only suspension point besides
//! handing produced messages to the outbound queue.

use std::sync::Arc;
use std::time::Duration;

use fedchain_messages::Message;
use fedchain_store::BlockStore;
use fedchain_types::{PublicKey, Timestamp};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use crate::queues::{channels, NodeHandle, NodeQueues};
use crate::tracing_spans::node_span;
use crate::{NodeConfig, NodeError, NodeMetrics, NodeState};

pub struct FedNode {
    name: String,
    state: NodeState,
    queues: NodeQueues,
    handle: NodeHandle,
    outbound_tx: mpsc::Sender<Message>,
    outbound_rx: Option<mpsc::Receiver<Message>>,
    metrics: Arc<NodeMetrics>,
    minute: Duration,
}

impl FedNode {
    /// Build a node over `store`. Fails on configuration errors or a stored
    /// chain that does not verify.
    pub fn new(name: &str, config: &NodeConfig, store: Arc<dyn BlockStore>) -> Result<Self, NodeError> {
        let metrics = Arc::new(NodeMetrics::new());
        let state = NodeState::new(config, store, Arc::clone(&metrics))?;
        let (handle, queues) = channels(config.queue_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.queue_capacity);
        Ok(Self {
            name: name.to_string(),
            state,
            queues,
            handle,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            metrics,
            minute: Duration::from_millis(config.minute_millis()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> NodeHandle {
        self.handle.clone()
    }

    pub fn public_key(&self) -> PublicKey {
        self.state.public_key()
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn metrics(&self) -> Arc<NodeMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Length of one minute, the natural timer period.
    pub fn minute(&self) -> Duration {
        self.minute
    }

    /// The receiving end of the outbound queue, for a network transport.
    /// If nobody takes it, outbound messages are dropped.
    pub fn take_outbound(&mut self) -> Option<mpsc::Receiver<Message>> {
        self.outbound_rx.take()
    }

    /// Run until shutdown. Returns the final state, or the fatal error that
    /// stopped the loop.
    pub async fn run(mut self, shutdown: broadcast::Receiver<()>) -> Result<NodeState, NodeError> {
        drop(self.outbound_rx.take());
        let span = node_span(&self.name);
        let Self {
            state,
            queues,
            outbound_tx,
            metrics,
            ..
        } = self;
        run_loop(state, queues, outbound_tx, metrics, shutdown)
            .instrument(span)
            .await
    }
}

async fn run_loop(
    mut state: NodeState,
    mut queues: NodeQueues,
    outbound: mpsc::Sender<Message>,
    metrics: Arc<NodeMetrics>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<NodeState, NodeError> {
    info!(height = state.db_height(), "node loop started");
    loop {
        let result = tokio::select! {
            biased;
            _ = shutdown.recv() => {
                info!("node loop shutting down");
                break;
            }
            Some(tick) = queues.timer.recv() => state.on_timer(tick.at),
            Some(frame) = queues.invalid.recv() => {
                metrics.decode_failures.inc();
                debug!(len = frame.bytes.len(), error = %frame.error, "undecodable frame discarded");
                Ok(())
            }
            Some(message) = queues.inbound.recv() => {
                state.process(message, Timestamp::now()).map(|_| ())
            }
            else => {
                info!("all queues closed");
                break;
            }
        };

        match result {
            Err(e) if e.is_fatal() => {
                error!(error = %e, "node loop stopped");
                return Err(e);
            }
            Err(e) => warn!(error = %e, "timer duty failed"),
            Ok(()) => {}
        }

        for message in state.take_outbox() {
            if outbound.send(message).await.is_err() {
                debug!("no transport attached, outbound message dropped");
            }
        }
    }

    match state.flush() {
        Ok(written) => info!(written, "unsaved DBStates flushed"),
        Err(e) => warn!(error = %e, "flush on shutdown failed"),
    }
    Ok(state)
}

/// Spawn a task that ticks `handle` every `period` until shutdown.
pub fn spawn_ticker(
    handle: NodeHandle,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    debug!("ticker shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if handle.tick(Timestamp::now()).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}
