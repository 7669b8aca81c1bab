/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Zero-copy FIX message decoder.
//!
//! Parses FIX messages without allocating memory for field values. Field
//! values are returned as references into the original buffer.

use crate::checksum::{calculate_checksum, parse_checksum};
use irongate_core::error::DecodeError;
use irongate_core::field::{FieldRef, tags};
use irongate_core::message::{MsgType, RawMessage};
use memchr::memchr;
use smallvec::SmallVec;

/// SOH (Start of Header) delimiter used in FIX messages.
pub const SOH: u8 = 0x01;

/// Equals sign delimiter between tag and value.
pub const EQUALS: u8 = b'=';

/// Zero-copy FIX message decoder.
///
/// The decoder parses FIX messages from a byte buffer, extracting fields
/// as references to the original data without copying.
#[derive(Debug)]
pub struct Decoder<'a> {
    /// Input buffer.
    input: &'a [u8],
    /// Current position in the buffer.
    offset: usize,
    /// Whether to validate checksums.
    validate_checksum: bool,
}

impl<'a> Decoder<'a> {
    /// Creates a new decoder for the given input buffer.
    #[inline]
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            offset: 0,
            validate_checksum: true,
        }
    }

    /// Sets whether to validate checksums during decoding.
    #[inline]
    #[must_use]
    pub const fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }

    /// Decodes a complete FIX message from the buffer.
    ///
    /// # Returns
    /// A `RawMessage` containing zero-copy references to the parsed fields.
    ///
    /// # Errors
    /// Returns `DecodeError` if the message is malformed or incomplete.
    pub fn decode(&mut self) -> Result<RawMessage<'a>, DecodeError> {
        let start_offset = self.offset;

        // Header must open with 8=BeginString|9=BodyLength|35=MsgType|.
        let begin_string_field = self.next_field().ok_or(DecodeError::Incomplete)?;
        if begin_string_field.tag != tags::BEGIN_STRING {
            return Err(DecodeError::InvalidBeginString);
        }

        let body_length_field = self.next_field().ok_or(DecodeError::InvalidBodyLength)?;
        if body_length_field.tag != tags::BODY_LENGTH {
            return Err(DecodeError::InvalidBodyLength);
        }
        let _body_length: usize = body_length_field
            .as_str()?
            .parse()
            .map_err(|_| DecodeError::InvalidBodyLength)?;

        let msg_type_field = self.next_field().ok_or(DecodeError::MissingMsgType)?;
        if msg_type_field.tag != tags::MSG_TYPE {
            return Err(DecodeError::MissingMsgType);
        }
        let msg_type: MsgType = msg_type_field
            .as_str()?
            .parse()
            .unwrap_or(MsgType::Heartbeat);

        let mut fields: SmallVec<[FieldRef<'a>; 32]> = SmallVec::new();
        fields.push(begin_string_field);
        fields.push(body_length_field);
        fields.push(msg_type_field);

        // Collect fields until the checksum trailer.
        let mut checksum_field: Option<FieldRef<'a>> = None;
        while let Some(field) = self.next_field() {
            if field.tag == tags::CHECK_SUM {
                checksum_field = Some(field);
                break;
            }
            fields.push(field);
        }

        if self.validate_checksum {
            let checksum_ref = checksum_field.ok_or(DecodeError::Incomplete)?;
            let declared = parse_checksum(checksum_ref.value).ok_or_else(|| {
                DecodeError::InvalidFieldValue {
                    tag: tags::CHECK_SUM,
                    reason: "invalid checksum format".to_string(),
                }
            })?;

            // Checksum covers everything before the "10=" tag bytes.
            let checksum_start =
                checksum_ref.value.as_ptr() as usize - self.input.as_ptr() as usize - 3;
            let calculated = calculate_checksum(&self.input[start_offset..checksum_start]);

            if calculated != declared {
                return Err(DecodeError::ChecksumMismatch {
                    calculated,
                    declared,
                });
            }
        }

        Ok(RawMessage::new(
            &self.input[start_offset..self.offset],
            msg_type,
            fields,
        ))
    }

    /// Parses the next field from the buffer.
    ///
    /// # Returns
    /// The next field, or `None` if the buffer is exhausted.
    #[inline]
    pub fn next_field(&mut self) -> Option<FieldRef<'a>> {
        if self.offset >= self.input.len() {
            return None;
        }

        let remaining = &self.input[self.offset..];

        let eq_pos = memchr(EQUALS, remaining)?;
        let tag = parse_tag(&remaining[..eq_pos])?;

        let value_start = eq_pos + 1;
        let soh_pos = memchr(SOH, &remaining[value_start..])?;
        let value = &remaining[value_start..value_start + soh_pos];

        self.offset += value_start + soh_pos + 1;

        Some(FieldRef::new(tag, value))
    }

    /// Returns the current offset in the buffer.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Returns true if the buffer has been fully consumed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offset >= self.input.len()
    }
}

/// Parses a tag number from ASCII bytes.
#[inline]
fn parse_tag(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > 10 {
        return None;
    }

    let mut result: u32 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        result = result.checked_mul(10)?.checked_add(u32::from(b - b'0'))?;
    }

    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::MessageBuilder;

    #[test]
    fn test_parse_tag() {
        assert_eq!(parse_tag(b"8"), Some(8));
        assert_eq!(parse_tag(b"35"), Some(35));
        assert_eq!(parse_tag(b"1409"), Some(1409));
        assert_eq!(parse_tag(b""), None);
        assert_eq!(parse_tag(b"12a"), None);
    }

    #[test]
    fn test_next_field() {
        let input = b"8=FIX.4.4\x019=5\x0135=0\x01";
        let mut decoder = Decoder::new(input);

        let field = decoder.next_field().unwrap();
        assert_eq!(field.tag, 8);
        assert_eq!(field.as_str().unwrap(), "FIX.4.4");

        let field = decoder.next_field().unwrap();
        assert_eq!(field.tag, 9);

        let field = decoder.next_field().unwrap();
        assert_eq!(field.tag, 35);
        assert_eq!(field.as_str().unwrap(), "0");

        assert!(decoder.next_field().is_none());
    }

    #[test]
    fn test_decode_roundtrip_with_builder() {
        let mut builder = MessageBuilder::new("FIX.4.4");
        builder.msg_type("1");
        builder.put_uint(34, 2);
        builder.put_str(49, "INITIATOR");
        builder.put_str(56, "ACCEPTOR");
        builder.put_str(112, "abc");
        let encoded = builder.finish();

        let mut decoder = Decoder::new(&encoded);
        let message = decoder.decode().unwrap();

        assert_eq!(message.msg_type(), &MsgType::TestRequest);
        assert_eq!(message.msg_seq_num().unwrap(), 2);
        assert_eq!(message.get_field_str(112), Some("abc"));
        assert_eq!(message.sender_comp_id(), Some("INITIATOR"));
    }

    #[test]
    fn test_decode_rejects_bad_begin_string() {
        let input = b"9=5\x0135=0\x0110=000\x01";
        let mut decoder = Decoder::new(input);
        assert!(matches!(
            decoder.decode(),
            Err(DecodeError::InvalidBeginString)
        ));
    }

    #[test]
    fn test_decode_rejects_checksum_mismatch() {
        let input = b"8=FIX.4.4\x019=5\x0135=0\x0110=000\x01";
        let mut decoder = Decoder::new(input);
        assert!(matches!(
            decoder.decode(),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_without_checksum_validation() {
        let input = b"8=FIX.4.4\x019=5\x0135=0\x0110=000\x01";
        let mut decoder = Decoder::new(input).with_checksum_validation(false);
        let message = decoder.decode().unwrap();
        assert_eq!(message.msg_type(), &MsgType::Heartbeat);
    }
}
