/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! FIX message builder.
//!
//! Builds complete FIX messages in tag=value format. BeginString, BodyLength,
//! and Checksum are stamped automatically on [`MessageBuilder::finish`]; the
//! session layer appends the standard header fields it owns (MsgType,
//! CompIDs, MsgSeqNum, SendingTime) followed by the message body.

use crate::checksum::{calculate_checksum, format_checksum};
use bytes::{BufMut, BytesMut};
use irongate_core::field::tags;
use irongate_core::types::Timestamp;

/// SOH (Start of Header) delimiter used in FIX messages.
pub const SOH: u8 = 0x01;

/// Incremental FIX message builder.
#[derive(Debug)]
pub struct MessageBuilder {
    /// Buffer for the message body (between BodyLength and Checksum).
    body: BytesMut,
    /// The BeginString value (e.g., "FIX.4.4").
    begin_string: &'static str,
}

impl MessageBuilder {
    /// Creates a new builder with the specified BeginString.
    #[must_use]
    pub fn new(begin_string: &'static str) -> Self {
        Self {
            body: BytesMut::with_capacity(256),
            begin_string,
        }
    }

    /// Appends the MsgType field (tag 35). Must be the first body field.
    #[inline]
    pub fn msg_type(&mut self, value: &str) {
        debug_assert!(self.body.is_empty(), "msg_type must be the first field");
        self.put_str(tags::MSG_TYPE, value);
    }

    /// Appends the standard header fields the session stamps on every
    /// outgoing message.
    ///
    /// # Arguments
    /// * `sender` - SenderCompID (tag 49)
    /// * `target` - TargetCompID (tag 56)
    /// * `msg_seq_num` - MsgSeqNum (tag 34)
    /// * `sending_time` - SendingTime (tag 52)
    pub fn standard_header(
        &mut self,
        sender: &str,
        target: &str,
        msg_seq_num: u64,
        sending_time: Timestamp,
    ) {
        self.put_str(tags::SENDER_COMP_ID, sender);
        self.put_str(tags::TARGET_COMP_ID, target);
        self.put_uint(tags::MSG_SEQ_NUM, msg_seq_num);
        self.put_str(tags::SENDING_TIME, sending_time.format_millis().as_str());
    }

    /// Appends a field with a string value.
    #[inline]
    pub fn put_str(&mut self, tag: u32, value: &str) {
        self.put_raw(tag, value.as_bytes());
    }

    /// Appends a field with an unsigned integer value.
    #[inline]
    pub fn put_uint(&mut self, tag: u32, value: u64) {
        let mut buf = itoa::Buffer::new();
        self.put_raw(tag, buf.format(value).as_bytes());
    }

    /// Appends a field with a signed integer value.
    #[inline]
    pub fn put_int(&mut self, tag: u32, value: i64) {
        let mut buf = itoa::Buffer::new();
        self.put_raw(tag, buf.format(value).as_bytes());
    }

    /// Appends a field with a boolean value (Y/N).
    #[inline]
    pub fn put_bool(&mut self, tag: u32, value: bool) {
        self.put_raw(tag, if value { b"Y" } else { b"N" });
    }

    /// Appends a field with raw bytes.
    #[inline]
    pub fn put_raw(&mut self, tag: u32, value: &[u8]) {
        let mut tag_buf = itoa::Buffer::new();
        self.body.put_slice(tag_buf.format(tag).as_bytes());
        self.body.put_u8(b'=');
        self.body.put_slice(value);
        self.body.put_u8(SOH);
    }

    /// Finalizes the message and returns the complete encoded bytes.
    ///
    /// Prepends BeginString (tag 8) and BodyLength (tag 9), then appends
    /// the Checksum (tag 10).
    #[must_use]
    pub fn finish(self) -> BytesMut {
        let body_len = self.body.len();

        let mut message = BytesMut::with_capacity(body_len + 40);
        message.put_slice(b"8=");
        message.put_slice(self.begin_string.as_bytes());
        message.put_u8(SOH);
        message.put_slice(b"9=");

        let mut len_buf = itoa::Buffer::new();
        message.put_slice(len_buf.format(body_len).as_bytes());
        message.put_u8(SOH);
        message.put_slice(&self.body);

        let checksum = calculate_checksum(&message);
        message.put_slice(b"10=");
        message.put_slice(&format_checksum(checksum));
        message.put_u8(SOH);

        message
    }

    /// Returns the current body length.
    #[inline]
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Clears the builder for reuse.
    #[inline]
    pub fn clear(&mut self) {
        self.body.clear();
    }
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new("FIX.4.4")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::parse_checksum;

    #[test]
    fn test_builder_basic() {
        let mut builder = MessageBuilder::new("FIX.4.4");
        builder.msg_type("0");

        let message = builder.finish();
        let text = String::from_utf8_lossy(&message);

        assert!(text.starts_with("8=FIX.4.4\x019=5\x01"));
        assert!(text.contains("35=0\x01"));
        assert!(text.contains("10="));
    }

    #[test]
    fn test_builder_standard_header() {
        let mut builder = MessageBuilder::new("FIX.4.4");
        builder.msg_type("A");
        builder.standard_header("LEFT", "RIGHT", 7, Timestamp::from_millis(0));

        let message = builder.finish();
        let text = String::from_utf8_lossy(&message);

        assert!(text.contains("35=A\x01"));
        assert!(text.contains("49=LEFT\x01"));
        assert!(text.contains("56=RIGHT\x01"));
        assert!(text.contains("34=7\x01"));
        assert!(text.contains("52=19700101-00:00:00.000\x01"));
    }

    #[test]
    fn test_builder_flags_and_ints() {
        let mut builder = MessageBuilder::new("FIX.4.4");
        builder.msg_type("4");
        builder.put_bool(123, true);
        builder.put_uint(36, 11);
        builder.put_int(58, -1);

        let message = builder.finish();
        let text = String::from_utf8_lossy(&message);

        assert!(text.contains("123=Y\x01"));
        assert!(text.contains("36=11\x01"));
        assert!(text.contains("58=-1\x01"));
    }

    #[test]
    fn test_builder_checksum_is_valid() {
        let mut builder = MessageBuilder::new("FIX.4.4");
        builder.msg_type("0");
        builder.put_str(112, "ping");

        let message = builder.finish();

        // Everything before "10=" participates in the checksum.
        let trailer_start = message.len() - 7;
        let declared = parse_checksum(&message[trailer_start + 3..trailer_start + 6]).unwrap();
        assert_eq!(declared, calculate_checksum(&message[..trailer_start]));
    }

    #[test]
    fn test_builder_clear() {
        let mut builder = MessageBuilder::new("FIX.4.4");
        builder.msg_type("0");
        assert!(builder.body_len() > 0);

        builder.clear();
        assert_eq!(builder.body_len(), 0);
    }
}
