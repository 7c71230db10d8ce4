//! Nullable infrastructure for deterministic testing.
//!
//! External dependencies (clock, storage) are abstracted behind traits or
//! explicit parameters. This crate provides implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Never touch the filesystem or network
//!
//! The in-memory store doubles as the node's storage when no engine is configured.

pub mod clock;
pub mod store;

pub use clock::NullClock;
pub use store::NullStore;
