//! The node's bounded queues.
//!
//! Producers (network receive, timer, local submission) only hold a
//! [`NodeHandle`]; the node loop owns the receiving ends. Every queue is a
//! bounded `tokio::sync::mpsc` channel, so producers wait when it is full.

use fedchain_messages::Message;
use fedchain_protocol::{decode_exact, DecodeError};
use fedchain_types::Timestamp;
use tokio::sync::mpsc;

use crate::NodeError;

/// A timer tick carrying the time it fired at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerTick {
    pub at: Timestamp,
}

/// An inbound frame that failed to decode.
#[derive(Clone, Debug)]
pub struct InvalidFrame {
    pub bytes: Vec<u8>,
    pub error: DecodeError,
}

/// Cloneable sending side of a node's queues.
#[derive(Clone)]
pub struct NodeHandle {
    inbound: mpsc::Sender<Message>,
    invalid: mpsc::Sender<InvalidFrame>,
    timer: mpsc::Sender<TimerTick>,
}

impl NodeHandle {
    /// Submit a locally produced message.
    pub async fn submit(&self, message: Message) -> Result<(), NodeError> {
        self.inbound
            .send(message)
            .await
            .map_err(|_| NodeError::QueueClosed("inbound"))
    }

    /// Decode a frame from the network. Frames that fail to decode go to the
    /// invalid sink instead of the inbound queue.
    pub async fn deliver_frame(&self, bytes: Vec<u8>) -> Result<(), NodeError> {
        match decode_exact::<Message>(&bytes) {
            Ok(message) => self.submit(message).await,
            Err(error) => self
                .invalid
                .send(InvalidFrame { bytes, error })
                .await
                .map_err(|_| NodeError::QueueClosed("invalid")),
        }
    }

    pub async fn tick(&self, at: Timestamp) -> Result<(), NodeError> {
        self.timer
            .send(TimerTick { at })
            .await
            .map_err(|_| NodeError::QueueClosed("timer"))
    }
}

/// Receiving side, owned by the node loop.
pub struct NodeQueues {
    pub inbound: mpsc::Receiver<Message>,
    pub invalid: mpsc::Receiver<InvalidFrame>,
    pub timer: mpsc::Receiver<TimerTick>,
}

/// Create the three input queues with `capacity` slots each.
pub fn channels(capacity: usize) -> (NodeHandle, NodeQueues) {
    let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
    let (invalid_tx, invalid_rx) = mpsc::channel(capacity);
    let (timer_tx, timer_rx) = mpsc::channel(capacity);
    (
        NodeHandle {
            inbound: inbound_tx,
            invalid: invalid_tx,
            timer: timer_tx,
        },
        NodeQueues {
            inbound: inbound_rx,
            invalid: invalid_rx,
            timer: timer_rx,
        },
    )
}
