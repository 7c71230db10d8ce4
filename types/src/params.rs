//! Fixed protocol parameters of the block cadence.

/// Number of minute slots in one directory-block height.
pub const MINUTES_PER_BLOCK: u8 = 10;

/// Index of a minute slot, `0..MINUTES_PER_BLOCK`.
pub type MinuteNumber = u8;

/// The last minute of a height; closing it seals the height.
pub const LAST_MINUTE: MinuteNumber = MINUTES_PER_BLOCK - 1;

/// Version byte written into directory block headers.
pub const DIRECTORY_BLOCK_VERSION: u8 = 0;

/// Default directory-block interval in seconds.
pub const DEFAULT_DIRECTORY_BLOCK_SECS: u64 = 6;
