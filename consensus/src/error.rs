use fedchain_protocol::{DecodeError, EncodeError};
use fedchain_store::StoreError;
use fedchain_types::{BlockKind, Hash, MinuteNumber};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("invalid minute {0}, minutes run 0-9")]
    InvalidMinute(MinuteNumber),

    #[error("height {0} is already sealed")]
    HeightSealed(u32),

    #[error("minute {minute} of height {height} is closed")]
    MinuteClosed { height: u32, minute: MinuteNumber },

    #[error("cannot close minute {got}: next open minute is {expected}")]
    MinuteOutOfOrder {
        expected: MinuteNumber,
        got: MinuteNumber,
    },

    #[error("cannot seal height {height}: minute {first_open} is still open")]
    MinutesOpen {
        height: u32,
        first_open: MinuteNumber,
    },

    #[error("server {0} is not federated")]
    NotFederated(Hash),

    #[error("server {faulted} is not in charge of minute {minute}")]
    NotInCharge { faulted: Hash, minute: MinuteNumber },

    #[error("no fault quorum against {faulted} for minute {minute}")]
    NoFaultQuorum { faulted: Hash, minute: MinuteNumber },

    #[error("election is at height {current}, report is for height {got}")]
    WrongHeight { current: u32, got: u32 },

    #[error("server {0} is already listed")]
    AlreadyListed(Hash),

    #[error("height {height} is missing sub-blocks: {missing:?}")]
    IncompleteSubBlocks {
        height: u32,
        missing: Vec<BlockKind>,
    },

    #[error("chain integrity violation at height {height}: {reason}")]
    ChainIntegrityViolation { height: u32, reason: String },

    #[error("DBState pipeline halted after an integrity violation")]
    Halted,

    #[error("height {got} does not extend the chain, expected {expected}")]
    NonContiguousHeight { expected: u32, got: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ConsensusError {
    /// Integrity violations stop the node; everything else is a recoverable
    /// rejection of one input.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ChainIntegrityViolation { .. } | Self::Halted)
    }
}
