/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Message store trait definition.
//!
//! The store is consulted synchronously from the session's resend path, so
//! implementations must not block. The session owns the sequence counters;
//! the store only records what was sent.

use bytes::Bytes;
use irongate_core::error::StoreError;
use irongate_core::message::MsgType;

/// A message recorded for potential resend.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    /// Session-level sequence number the message was sent with.
    pub seq_num: u64,
    /// Sequence reset generation the message belongs to.
    pub sequence_index: u32,
    /// Message type, used to coalesce admin runs into gap-fills on replay.
    pub msg_type: MsgType,
    /// The complete encoded message.
    pub bytes: Bytes,
}

impl StoredMessage {
    /// Returns true if this is an administrative message.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.msg_type.is_admin()
    }
}

/// Abstract interface for sent-message storage.
pub trait MessageStore: Send + Sync {
    /// Records an outgoing message.
    ///
    /// # Arguments
    /// * `message` - The message to record, keyed by its sequence number and
    ///   sequence index
    fn store(&self, message: StoredMessage);

    /// Retrieves messages for a resend request, in ascending sequence order.
    ///
    /// # Arguments
    /// * `sequence_index` - Generation to search
    /// * `begin` - Begin sequence number (inclusive)
    /// * `end` - End sequence number (inclusive, or 0 for "through current")
    ///
    /// # Errors
    /// Returns `StoreError::RangeNotAvailable` if no message in the range is
    /// held.
    fn get_range(
        &self,
        sequence_index: u32,
        begin: u64,
        end: u64,
    ) -> Result<Vec<StoredMessage>, StoreError>;

    /// Returns the highest sequence number stored for a generation, if any.
    fn highest_seq_num(&self, sequence_index: u32) -> Option<u64>;

    /// Clears all stored messages.
    fn reset(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_message_admin_predicate() {
        let admin = StoredMessage {
            seq_num: 1,
            sequence_index: 0,
            msg_type: MsgType::Heartbeat,
            bytes: Bytes::from_static(b"x"),
        };
        let app = StoredMessage {
            seq_num: 2,
            sequence_index: 0,
            msg_type: MsgType::NewOrderSingle,
            bytes: Bytes::from_static(b"y"),
        };

        assert!(admin.is_admin());
        assert!(!app.is_admin());
    }
}
