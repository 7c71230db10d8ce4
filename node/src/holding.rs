//! Holding map: messages whose validity cannot be decided yet.
//!
//! A follower's request waits here for its acknowledgement, an end-of-minute
//! for the messages it counts, a future-height message for its height. The
//! node retries the whole map after every state change, oldest first.

use fedchain_messages::Message;
use fedchain_types::{Hash, Timestamp};
use std::collections::HashMap;

/// A message waiting in the holding map.
#[derive(Clone, Debug)]
pub struct HeldMessage {
    pub hash: Hash,
    pub message: Message,
    pub received_at: Timestamp,
    seq: u64,
}

pub struct HoldingMap {
    entries: HashMap<Hash, HeldMessage>,
    next_seq: u64,
    max_size: usize,
}

impl HoldingMap {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            next_seq: 0,
            max_size,
        }
    }

    /// Hold `message`. Returns `false` if the map is full or already holds it.
    pub fn insert(&mut self, hash: Hash, message: Message, now: Timestamp) -> bool {
        if self.entries.len() >= self.max_size || self.entries.contains_key(&hash) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            hash,
            HeldMessage {
                hash,
                message,
                received_at: now,
                seq,
            },
        );
        true
    }

    /// Put back an entry taken by [`take_all`](Self::take_all), keeping its
    /// place in arrival order.
    pub fn restore(&mut self, held: HeldMessage) {
        self.entries.insert(held.hash, held);
    }

    pub fn remove(&mut self, hash: &Hash) -> Option<Message> {
        self.entries.remove(hash).map(|h| h.message)
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Drain every held message in arrival order.
    pub fn take_all(&mut self) -> Vec<HeldMessage> {
        let mut held: Vec<HeldMessage> = self.entries.drain().map(|(_, h)| h).collect();
        held.sort_by_key(|h| h.seq);
        held
    }

    /// Drop entries received more than `max_age_millis` before `now`.
    /// Returns the number removed.
    pub fn clear_expired(&mut self, now: Timestamp, max_age_millis: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, h| h.received_at.elapsed_since(now) <= max_age_millis);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedchain_messages::RequestBlock;

    fn msg(n: u64) -> (Hash, Message) {
        let m = Message::RequestBlock(RequestBlock {
            timestamp: Timestamp::from_secs(n),
        });
        (m.hash().unwrap(), m)
    }

    #[test]
    fn take_all_preserves_arrival_order() {
        let mut map = HoldingMap::new(10);
        for n in [5, 1, 9, 3] {
            let (h, m) = msg(n);
            assert!(map.insert(h, m, Timestamp::from_secs(100)));
        }
        let order: Vec<_> = map
            .take_all()
            .into_iter()
            .map(|h| h.message.timestamp().as_secs())
            .collect();
        assert_eq!(order, vec![5, 1, 9, 3]);
        assert!(map.is_empty());
    }

    #[test]
    fn restored_entries_keep_their_place() {
        let mut map = HoldingMap::new(10);
        for n in 1..=3 {
            let (h, m) = msg(n);
            map.insert(h, m, Timestamp::from_secs(100));
        }
        let mut held = map.take_all();
        let first = held.remove(0);
        let (h, m) = msg(4);
        map.insert(h, m, Timestamp::from_secs(100));
        map.restore(first);
        let order: Vec<_> = map
            .take_all()
            .into_iter()
            .map(|h| h.message.timestamp().as_secs())
            .collect();
        assert_eq!(order, vec![1, 4]);
    }

    #[test]
    fn capacity_and_duplicates_are_refused() {
        let mut map = HoldingMap::new(1);
        let (h1, m1) = msg(1);
        let (h2, m2) = msg(2);
        assert!(map.insert(h1, m1.clone(), Timestamp::EPOCH));
        assert!(!map.insert(h1, m1, Timestamp::EPOCH));
        assert!(!map.insert(h2, m2, Timestamp::EPOCH));
        assert_eq!(map.len(), 1);
        assert!(map.remove(&h1).is_some());
        assert!(!map.contains(&h1));
    }

    #[test]
    fn expired_entries_are_cleared() {
        let mut map = HoldingMap::new(10);
        let (h1, m1) = msg(1);
        let (h2, m2) = msg(2);
        map.insert(h1, m1, Timestamp::from_secs(10));
        map.insert(h2, m2, Timestamp::from_secs(50));
        assert_eq!(map.clear_expired(Timestamp::from_secs(60), 20_000), 1);
        assert!(map.contains(&h2));
    }
}
