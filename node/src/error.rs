use fedchain_consensus::ConsensusError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("store error: {0}")]
    Store(#[from] fedchain_store::StoreError),

    #[error("encode error: {0}")]
    Encode(#[from] fedchain_protocol::EncodeError),

    #[error("decode error: {0}")]
    Decode(#[from] fedchain_protocol::DecodeError),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0} queue is closed")]
    QueueClosed(&'static str),

    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    /// Whether the node must stop rather than drop the offending input.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Consensus(e) if e.is_fatal())
    }
}
