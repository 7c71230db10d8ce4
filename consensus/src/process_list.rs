//! Process lists: the per-height ordering of accepted messages.
//!
//! A process list owns ten minute slots. Messages land in the open minutes in
//! arrival order; minutes close strictly in sequence, each close appending an
//! end-of-minute admin entry; the height seals once all ten are closed.

use crate::ConsensusError;
use fedchain_blocks::AdminBlockEntry;
use fedchain_crypto::sha256_multi;
use fedchain_messages::Message;
use fedchain_types::{Hash, MinuteNumber, LAST_MINUTE, MINUTES_PER_BLOCK};

/// A message in its final position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderedMessage {
    pub hash: Hash,
    pub message: Message,
}

#[derive(Clone, Debug)]
pub struct ProcessList {
    db_height: u32,
    minutes: Vec<Vec<OrderedMessage>>,
    /// Index of the next minute to close; `MINUTES_PER_BLOCK` once all are closed.
    next_open: MinuteNumber,
    admin_entries: Vec<AdminBlockEntry>,
    serial_hash: Hash,
    sealed: bool,
}

impl ProcessList {
    pub fn new(db_height: u32) -> Self {
        Self {
            db_height,
            minutes: vec![Vec::new(); MINUTES_PER_BLOCK as usize],
            next_open: 0,
            admin_entries: Vec::new(),
            serial_hash: Hash::ZERO,
            sealed: false,
        }
    }

    pub fn db_height(&self) -> u32 {
        self.db_height
    }

    /// Append `message` to `minute` and return its position within the minute.
    pub fn add_message(
        &mut self,
        minute: MinuteNumber,
        message: Message,
    ) -> Result<u32, ConsensusError> {
        self.check_open(minute)?;
        let hash = message.hash()?;
        let slot = &mut self.minutes[minute as usize];
        let position = slot.len() as u32;
        slot.push(OrderedMessage { hash, message });
        self.serial_hash = self.serial_hash_with(&hash);
        Ok(position)
    }

    /// The serial hash the list would have after appending `hash`.
    pub fn serial_hash_with(&self, hash: &Hash) -> Hash {
        sha256_multi(&[self.serial_hash.as_bytes(), hash.as_bytes()])
    }

    /// Fail unless `minute` can still accept messages.
    pub fn check_open(&self, minute: MinuteNumber) -> Result<(), ConsensusError> {
        if minute > LAST_MINUTE {
            return Err(ConsensusError::InvalidMinute(minute));
        }
        if self.sealed {
            return Err(ConsensusError::HeightSealed(self.db_height));
        }
        // Minutes close in order, so a later closed minute implies this one is closed.
        if minute < self.next_open {
            return Err(ConsensusError::MinuteClosed {
                height: self.db_height,
                minute,
            });
        }
        Ok(())
    }

    /// Close `minute`, which must be the next unclosed one.
    pub fn close_minute(&mut self, minute: MinuteNumber) -> Result<(), ConsensusError> {
        if minute > LAST_MINUTE {
            return Err(ConsensusError::InvalidMinute(minute));
        }
        if self.sealed {
            return Err(ConsensusError::HeightSealed(self.db_height));
        }
        if minute != self.next_open {
            return Err(ConsensusError::MinuteOutOfOrder {
                expected: self.next_open,
                got: minute,
            });
        }
        self.admin_entries
            .push(AdminBlockEntry::EndOfMinute { minute });
        self.next_open += 1;
        Ok(())
    }

    /// Record a server-fault or registration entry in order.
    pub fn add_admin_entry(&mut self, entry: AdminBlockEntry) -> Result<(), ConsensusError> {
        if self.sealed {
            return Err(ConsensusError::HeightSealed(self.db_height));
        }
        self.admin_entries.push(entry);
        Ok(())
    }

    /// Finalize the height and return its ordered admin entries.
    pub fn seal(&mut self) -> Result<Vec<AdminBlockEntry>, ConsensusError> {
        if self.sealed {
            return Err(ConsensusError::HeightSealed(self.db_height));
        }
        if self.next_open < MINUTES_PER_BLOCK {
            return Err(ConsensusError::MinutesOpen {
                height: self.db_height,
                first_open: self.next_open,
            });
        }
        self.sealed = true;
        Ok(self.admin_entries.clone())
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// The minute currently accepting messages, `None` once every minute closed.
    pub fn open_minute(&self) -> Option<MinuteNumber> {
        (self.next_open < MINUTES_PER_BLOCK).then_some(self.next_open)
    }

    pub fn is_minute_closed(&self, minute: MinuteNumber) -> bool {
        minute < self.next_open
    }

    pub fn message_count(&self, minute: MinuteNumber) -> usize {
        self.minutes.get(minute as usize).map_or(0, Vec::len)
    }

    pub fn messages(&self, minute: MinuteNumber) -> &[OrderedMessage] {
        self.minutes
            .get(minute as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every accepted message in canonical order: by minute, then arrival.
    pub fn ordered(&self) -> impl Iterator<Item = &OrderedMessage> {
        self.minutes.iter().flatten()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.ordered().any(|m| &m.hash == hash)
    }

    /// Running hash over the ordered message hashes.
    pub fn serial_hash(&self) -> Hash {
        self.serial_hash
    }

    pub fn admin_entries(&self) -> &[AdminBlockEntry] {
        &self.admin_entries
    }
}

/// The trio of process lists around the working height.
#[derive(Clone, Debug)]
pub struct ProcessLists {
    previous: Option<ProcessList>,
    current: ProcessList,
    next: ProcessList,
}

impl ProcessLists {
    pub fn new(db_height: u32) -> Self {
        Self {
            previous: None,
            current: ProcessList::new(db_height),
            next: ProcessList::new(db_height.saturating_add(1)),
        }
    }

    pub fn current(&self) -> &ProcessList {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut ProcessList {
        &mut self.current
    }

    pub fn previous(&self) -> Option<&ProcessList> {
        self.previous.as_ref()
    }

    pub fn next(&self) -> &ProcessList {
        &self.next
    }

    pub fn next_mut(&mut self) -> &mut ProcessList {
        &mut self.next
    }

    pub fn get(&self, db_height: u32) -> Option<&ProcessList> {
        [self.previous.as_ref(), Some(&self.current), Some(&self.next)]
            .into_iter()
            .flatten()
            .find(|pl| pl.db_height == db_height)
    }

    /// Demote current to previous and open a fresh next list.
    pub fn advance(&mut self) {
        let fresh = ProcessList::new(self.next.db_height.saturating_add(1));
        let next = std::mem::replace(&mut self.next, fresh);
        let current = std::mem::replace(&mut self.current, next);
        self.previous = Some(current);
    }

    /// Jump to `db_height`, discarding every list. Used after catch-up.
    pub fn reset(&mut self, db_height: u32) {
        *self = Self::new(db_height);
    }
}
