/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! In-memory message store implementation.
//!
//! Stores messages in a `BTreeMap` keyed by `(sequence_index, seq_num)` for
//! efficient range queries. Not persistent: all data is lost when the
//! process exits.

use crate::traits::{MessageStore, StoredMessage};
use irongate_core::error::StoreError;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// In-memory message store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Stored messages indexed by generation and sequence number.
    messages: RwLock<BTreeMap<(u32, u64), StoredMessage>>,
}

impl MemoryStore {
    /// Creates a new empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored messages across all generations.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.read().len()
    }

    /// Checks if a message is held for the given generation and sequence.
    #[must_use]
    pub fn contains(&self, sequence_index: u32, seq_num: u64) -> bool {
        self.messages
            .read()
            .contains_key(&(sequence_index, seq_num))
    }
}

impl MessageStore for MemoryStore {
    fn store(&self, message: StoredMessage) {
        let key = (message.sequence_index, message.seq_num);
        self.messages.write().insert(key, message);
    }

    fn get_range(
        &self,
        sequence_index: u32,
        begin: u64,
        end: u64,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let messages = self.messages.read();
        let end = if end == 0 { u64::MAX } else { end };

        let result: Vec<StoredMessage> = messages
            .range((sequence_index, begin)..=(sequence_index, end))
            .map(|(_, message)| message.clone())
            .collect();

        if result.is_empty() {
            return Err(StoreError::RangeNotAvailable {
                begin,
                end,
                sequence_index,
            });
        }

        Ok(result)
    }

    fn highest_seq_num(&self, sequence_index: u32) -> Option<u64> {
        let messages = self.messages.read();
        messages
            .range((sequence_index, 0)..=(sequence_index, u64::MAX))
            .next_back()
            .map(|((_, seq), _)| *seq)
    }

    fn reset(&self) {
        self.messages.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use irongate_core::message::MsgType;

    fn message(sequence_index: u32, seq_num: u64, msg_type: MsgType) -> StoredMessage {
        StoredMessage {
            seq_num,
            sequence_index,
            msg_type,
            bytes: Bytes::from(format!("msg{seq_num}")),
        }
    }

    #[test]
    fn test_store_and_contains() {
        let store = MemoryStore::new();
        store.store(message(0, 1, MsgType::NewOrderSingle));
        store.store(message(0, 2, MsgType::Heartbeat));

        assert_eq!(store.message_count(), 2);
        assert!(store.contains(0, 1));
        assert!(store.contains(0, 2));
        assert!(!store.contains(0, 3));
        assert!(!store.contains(1, 1));
    }

    #[test]
    fn test_get_range_inclusive() {
        let store = MemoryStore::new();
        for seq in 1..=5 {
            store.store(message(0, seq, MsgType::NewOrderSingle));
        }

        let range = store.get_range(0, 2, 4).unwrap();
        let seqs: Vec<u64> = range.iter().map(|m| m.seq_num).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
    }

    #[test]
    fn test_get_range_zero_end_means_through_current() {
        let store = MemoryStore::new();
        for seq in 1..=3 {
            store.store(message(0, seq, MsgType::NewOrderSingle));
        }

        let range = store.get_range(0, 2, 0).unwrap();
        let seqs: Vec<u64> = range.iter().map(|m| m.seq_num).collect();
        assert_eq!(seqs, vec![2, 3]);
    }

    #[test]
    fn test_get_range_respects_sequence_index() {
        let store = MemoryStore::new();
        store.store(message(0, 1, MsgType::NewOrderSingle));
        store.store(message(1, 1, MsgType::NewOrderSingle));

        let range = store.get_range(1, 1, 1).unwrap();
        assert_eq!(range.len(), 1);
        assert_eq!(range[0].sequence_index, 1);
    }

    #[test]
    fn test_get_range_unavailable() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_range(0, 1, 5),
            Err(StoreError::RangeNotAvailable { begin: 1, end: 5, .. })
        ));
    }

    #[test]
    fn test_highest_seq_num() {
        let store = MemoryStore::new();
        assert_eq!(store.highest_seq_num(0), None);

        store.store(message(0, 3, MsgType::NewOrderSingle));
        store.store(message(0, 7, MsgType::NewOrderSingle));
        store.store(message(1, 2, MsgType::NewOrderSingle));

        assert_eq!(store.highest_seq_num(0), Some(7));
        assert_eq!(store.highest_seq_num(1), Some(2));
    }

    #[test]
    fn test_reset() {
        let store = MemoryStore::new();
        store.store(message(0, 1, MsgType::NewOrderSingle));
        store.reset();
        assert_eq!(store.message_count(), 0);
    }
}
