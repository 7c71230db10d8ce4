//! Nullable clock: deterministic time for testing.

use fedchain_types::Timestamp;
use std::cell::Cell;

/// A deterministic millisecond clock.
///
/// Time only advances when you tell it to.
pub struct NullClock {
    current: Cell<u64>,
}

impl NullClock {
    pub fn new(initial_secs: u64) -> Self {
        Self {
            current: Cell::new(initial_secs * 1000),
        }
    }

    pub fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.current.get())
    }

    pub fn advance(&self, secs: u64) {
        self.advance_millis(secs * 1000);
    }

    pub fn advance_millis(&self, millis: u64) {
        self.current.set(self.current.get() + millis);
    }

    pub fn set(&self, secs: u64) {
        self.current.set(secs * 1000);
    }
}
