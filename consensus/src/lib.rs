//! Consensus core for a federated chain.
//!
//! A fixed set of federated servers builds one directory block per height.
//! Each height is divided into ten minutes; every minute has one federated
//! leader that orders messages into the height's process list. When a leader
//! faults, the other federated servers report it and an audit server is
//! promoted in its place.
//!
//! ## Module overview
//!
//! - [`replay`]: duplicate and stale message rejection.
//! - [`process_list`]: per-height minute slots, admin entries, sealing.
//! - [`election`]: federated/audit lists, fault reports, promotion.
//! - [`dbstate`]: assembly, verification and persistence of sealed heights.
//! - [`ledger`]: the sub-ledger contract that closes factoid and entry-credit blocks.
//! - [`error`]: consensus error types.

pub mod dbstate;
pub mod election;
pub mod error;
pub mod ledger;
pub mod process_list;
pub mod replay;

pub use dbstate::{DBState, DBStatePipeline, DEFAULT_RETAIN};
pub use election::{ElectionPhase, ElectionState, FaultOutcome, FaultQuorum};
pub use error::ConsensusError;
pub use ledger::{EmptyLedger, SubLedger};
pub use process_list::{OrderedMessage, ProcessList, ProcessLists};
pub use replay::{ReplayFilter, DEFAULT_REPLAY_WINDOW_SECS};
