/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Message types for FIX protocol.
//!
//! This module provides:
//! - [`MsgType`]: the message types the session layer dispatches on
//! - [`RawMessage`]: Zero-copy view into a FIX message buffer
//! - [`OwnedMessage`]: Owned message for storage and resend replay

use crate::error::DecodeError;
use crate::field::{FieldRef, tags};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::ops::Range;

/// FIX message types the session layer inspects.
///
/// The session only dispatches on the administrative types plus a handful of
/// common application types; anything else is carried as `Custom` and treated
/// as opaque application payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MsgType {
    /// Heartbeat (0) - Session level.
    #[default]
    Heartbeat,
    /// Test Request (1) - Session level.
    TestRequest,
    /// Resend Request (2) - Session level.
    ResendRequest,
    /// Reject (3) - Session level.
    Reject,
    /// Sequence Reset (4) - Session level.
    SequenceReset,
    /// Logout (5) - Session level.
    Logout,
    /// Logon (A) - Session level.
    Logon,
    /// Execution Report (8).
    ExecutionReport,
    /// Business Message Reject (j).
    BusinessMessageReject,
    /// New Order Single (D).
    NewOrderSingle,
    /// Order Cancel Request (F).
    OrderCancelRequest,
    /// Market Data Request (V).
    MarketDataRequest,
    /// Any other message type, carried verbatim.
    Custom(String),
}

impl std::str::FromStr for MsgType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "0" => Self::Heartbeat,
            "1" => Self::TestRequest,
            "2" => Self::ResendRequest,
            "3" => Self::Reject,
            "4" => Self::SequenceReset,
            "5" => Self::Logout,
            "8" => Self::ExecutionReport,
            "A" => Self::Logon,
            "D" => Self::NewOrderSingle,
            "F" => Self::OrderCancelRequest,
            "V" => Self::MarketDataRequest,
            "j" => Self::BusinessMessageReject,
            other => Self::Custom(other.to_string()),
        })
    }
}

impl MsgType {
    /// Returns the string representation of this message type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Heartbeat => "0",
            Self::TestRequest => "1",
            Self::ResendRequest => "2",
            Self::Reject => "3",
            Self::SequenceReset => "4",
            Self::Logout => "5",
            Self::ExecutionReport => "8",
            Self::Logon => "A",
            Self::NewOrderSingle => "D",
            Self::OrderCancelRequest => "F",
            Self::MarketDataRequest => "V",
            Self::BusinessMessageReject => "j",
            Self::Custom(s) => s.as_str(),
        }
    }

    /// Returns true if this is an administrative (session-level) message.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Self::Heartbeat
                | Self::TestRequest
                | Self::ResendRequest
                | Self::Reject
                | Self::SequenceReset
                | Self::Logout
                | Self::Logon
        )
    }

    /// Returns true if this is an application message.
    #[must_use]
    pub fn is_app(&self) -> bool {
        !self.is_admin()
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Zero-copy view into a FIX message buffer.
///
/// Holds references to the original message buffer; fields are stored as
/// tag/value slices without copying. The typed header accessors cover the
/// fields the session state machine inspects on every message.
#[derive(Debug, Clone)]
pub struct RawMessage<'a> {
    /// The complete message buffer.
    buffer: &'a [u8],
    /// The parsed message type.
    msg_type: MsgType,
    /// Parsed field references (tag and value slices).
    fields: SmallVec<[FieldRef<'a>; 32]>,
}

impl<'a> RawMessage<'a> {
    /// Creates a new RawMessage from parsed components.
    #[must_use]
    pub fn new(
        buffer: &'a [u8],
        msg_type: MsgType,
        fields: SmallVec<[FieldRef<'a>; 32]>,
    ) -> Self {
        Self {
            buffer,
            msg_type,
            fields,
        }
    }

    /// Returns the complete message buffer.
    #[inline]
    #[must_use]
    pub const fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    /// Returns the message type.
    #[inline]
    #[must_use]
    pub fn msg_type(&self) -> &MsgType {
        &self.msg_type
    }

    /// Returns an iterator over all fields.
    #[inline]
    pub fn fields(&self) -> impl Iterator<Item = &FieldRef<'a>> {
        self.fields.iter()
    }

    /// Gets a field by tag number.
    ///
    /// # Returns
    /// The first field with the given tag, or `None` if not found.
    #[must_use]
    pub fn get_field(&self, tag: u32) -> Option<&FieldRef<'a>> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    /// Gets a field value as a string.
    #[must_use]
    pub fn get_field_str(&self, tag: u32) -> Option<&'a str> {
        self.get_field(tag).and_then(|f| f.as_str().ok())
    }

    /// Gets a field value parsed as the specified type.
    ///
    /// # Errors
    /// Returns `DecodeError` if the field is not found or cannot be parsed.
    pub fn get_field_as<T: std::str::FromStr>(&self, tag: u32) -> Result<T, DecodeError> {
        self.get_field(tag)
            .ok_or(DecodeError::MissingRequiredField { tag })?
            .parse()
    }

    /// Returns the MsgSeqNum (tag 34).
    ///
    /// # Errors
    /// Returns `DecodeError::MissingRequiredField` if the header lacks tag 34.
    pub fn msg_seq_num(&self) -> Result<u64, DecodeError> {
        self.get_field_as(tags::MSG_SEQ_NUM)
    }

    /// Returns true if PossDupFlag (tag 43) is set to 'Y'.
    #[must_use]
    pub fn poss_dup(&self) -> bool {
        self.get_field(tags::POSS_DUP_FLAG)
            .is_some_and(FieldRef::is_flag_set)
    }

    /// Returns the SendingTime (tag 52) as a string, if present.
    #[must_use]
    pub fn sending_time(&self) -> Option<&'a str> {
        self.get_field_str(tags::SENDING_TIME)
    }

    /// Returns the SenderCompID (tag 49), if present.
    #[must_use]
    pub fn sender_comp_id(&self) -> Option<&'a str> {
        self.get_field_str(tags::SENDER_COMP_ID)
    }

    /// Returns the TargetCompID (tag 56), if present.
    #[must_use]
    pub fn target_comp_id(&self) -> Option<&'a str> {
        self.get_field_str(tags::TARGET_COMP_ID)
    }

    /// Returns the message length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if the message is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Converts this borrowed message to an owned message.
    #[must_use]
    pub fn to_owned_message(&self) -> OwnedMessage {
        let buffer = Bytes::copy_from_slice(self.buffer);
        let base = self.buffer.as_ptr() as usize;
        let field_offsets = self
            .fields
            .iter()
            .map(|f| {
                let start = f.value.as_ptr() as usize - base;
                (f.tag, start..start + f.value.len())
            })
            .collect();

        OwnedMessage::new(buffer, self.msg_type.clone(), field_offsets)
    }
}

/// Owned FIX message for storage and resend replay.
///
/// Unlike [`RawMessage`], this struct owns its data and can be stored for
/// later replay or sent across threads.
#[derive(Debug, Clone)]
pub struct OwnedMessage {
    /// The complete message buffer.
    buffer: Bytes,
    /// The parsed message type.
    msg_type: MsgType,
    /// Field offsets: (tag, value_range).
    field_offsets: Vec<(u32, Range<usize>)>,
}

impl OwnedMessage {
    /// Creates an OwnedMessage from raw bytes and field offsets.
    #[must_use]
    pub fn new(buffer: Bytes, msg_type: MsgType, field_offsets: Vec<(u32, Range<usize>)>) -> Self {
        Self {
            buffer,
            msg_type,
            field_offsets,
        }
    }

    /// Returns the message type.
    #[inline]
    #[must_use]
    pub fn msg_type(&self) -> &MsgType {
        &self.msg_type
    }

    /// Returns the message bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Returns the message length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if the message is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Gets a field value by tag.
    #[must_use]
    pub fn get_field(&self, tag: u32) -> Option<&[u8]> {
        self.field_offsets
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, range)| &self.buffer[range.clone()])
    }

    /// Gets a field value as a string.
    #[must_use]
    pub fn get_field_str(&self, tag: u32) -> Option<&str> {
        self.get_field(tag)
            .and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Iterates over all `(tag, value)` pairs in message order.
    pub fn fields(&self) -> impl Iterator<Item = (u32, &[u8])> {
        self.field_offsets
            .iter()
            .map(|(tag, range)| (*tag, &self.buffer[range.clone()]))
    }

    /// Consumes the message and returns the underlying buffer.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_type_roundtrip() {
        assert_eq!("0".parse::<MsgType>().unwrap(), MsgType::Heartbeat);
        assert_eq!("A".parse::<MsgType>().unwrap(), MsgType::Logon);
        assert_eq!(MsgType::ResendRequest.as_str(), "2");
        assert_eq!(MsgType::SequenceReset.as_str(), "4");
    }

    #[test]
    fn test_msg_type_is_admin() {
        assert!(MsgType::Heartbeat.is_admin());
        assert!(MsgType::Logon.is_admin());
        assert!(MsgType::SequenceReset.is_admin());
        assert!(!MsgType::NewOrderSingle.is_admin());
        assert!(MsgType::Custom("XX".to_string()).is_app());
    }

    #[test]
    fn test_raw_message_header_accessors() {
        let buffer = b"8=FIX.4.4\x019=30\x0135=0\x0134=17\x0143=Y\x0152=20260127-10:00:00.000\x0110=000\x01";
        let mut fields: SmallVec<[FieldRef<'_>; 32]> = SmallVec::new();
        fields.push(FieldRef::new(8, &buffer[2..9]));
        fields.push(FieldRef::new(35, &buffer[18..19]));
        fields.push(FieldRef::new(34, &buffer[23..25]));
        fields.push(FieldRef::new(43, &buffer[29..30]));
        fields.push(FieldRef::new(52, &buffer[34..55]));
        let msg = RawMessage::new(buffer, MsgType::Heartbeat, fields);

        assert_eq!(msg.msg_seq_num().unwrap(), 17);
        assert!(msg.poss_dup());
        assert_eq!(msg.sending_time(), Some("20260127-10:00:00.000"));
    }

    #[test]
    fn test_owned_message_field_access() {
        let buffer = Bytes::from_static(b"8=FIX.4.4\x0135=D\x0149=SENDER\x01");
        let field_offsets = vec![(8, 2..9), (35, 13..14), (49, 18..24)];
        let msg = OwnedMessage::new(buffer, MsgType::NewOrderSingle, field_offsets);

        assert_eq!(msg.get_field_str(8), Some("FIX.4.4"));
        assert_eq!(msg.get_field_str(35), Some("D"));
        assert_eq!(msg.get_field_str(49), Some("SENDER"));
        assert_eq!(msg.get_field_str(999), None);

        let collected: Vec<u32> = msg.fields().map(|(tag, _)| tag).collect();
        assert_eq!(collected, vec![8, 35, 49]);
    }
}
