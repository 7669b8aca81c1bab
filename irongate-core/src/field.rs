/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Field types for FIX protocol messages.
//!
//! This module provides:
//! - [`tags`]: the tag numbers the session layer interprets
//! - [`FieldRef`]: Zero-copy reference to a field within a message buffer

use crate::error::DecodeError;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Tag numbers interpreted by the session layer.
///
/// All other tags are treated as opaque payload and pass through untouched.
pub mod tags {
    /// BeginString (8).
    pub const BEGIN_STRING: u32 = 8;
    /// BodyLength (9).
    pub const BODY_LENGTH: u32 = 9;
    /// CheckSum (10).
    pub const CHECK_SUM: u32 = 10;
    /// BeginSeqNo (7) on a ResendRequest.
    pub const BEGIN_SEQ_NO: u32 = 7;
    /// EndSeqNo (16) on a ResendRequest; 0 means "through current".
    pub const END_SEQ_NO: u32 = 16;
    /// MsgSeqNum (34).
    pub const MSG_SEQ_NUM: u32 = 34;
    /// MsgType (35).
    pub const MSG_TYPE: u32 = 35;
    /// NewSeqNo (36) on a SequenceReset.
    pub const NEW_SEQ_NO: u32 = 36;
    /// PossDupFlag (43).
    pub const POSS_DUP_FLAG: u32 = 43;
    /// SenderCompID (49).
    pub const SENDER_COMP_ID: u32 = 49;
    /// SendingTime (52).
    pub const SENDING_TIME: u32 = 52;
    /// TargetCompID (56).
    pub const TARGET_COMP_ID: u32 = 56;
    /// Text (58).
    pub const TEXT: u32 = 58;
    /// EncryptMethod (98).
    pub const ENCRYPT_METHOD: u32 = 98;
    /// HeartBtInt (108) in seconds.
    pub const HEART_BT_INT: u32 = 108;
    /// TestReqID (112).
    pub const TEST_REQ_ID: u32 = 112;
    /// OrigSendingTime (122) on a possdup replay.
    pub const ORIG_SENDING_TIME: u32 = 122;
    /// GapFillFlag (123) on a SequenceReset.
    pub const GAP_FILL_FLAG: u32 = 123;
    /// ResetSeqNumFlag (141) on a Logon.
    pub const RESET_SEQ_NUM_FLAG: u32 = 141;
    /// Username (553) on a Logon.
    pub const USERNAME: u32 = 553;
    /// Password (554) on a Logon.
    pub const PASSWORD: u32 = 554;
    /// SessionStatus (1409) on a Logout.
    pub const SESSION_STATUS: u32 = 1409;
}

/// Zero-copy reference to a field within a FIX message buffer.
///
/// Holds references into the original message buffer, avoiding allocation
/// during parsing.
#[derive(Debug, Clone, Copy)]
pub struct FieldRef<'a> {
    /// The field tag number.
    pub tag: u32,
    /// Reference to the field value bytes (without delimiters).
    pub value: &'a [u8],
}

impl<'a> FieldRef<'a> {
    /// Creates a new field reference.
    #[inline]
    #[must_use]
    pub const fn new(tag: u32, value: &'a [u8]) -> Self {
        Self { tag, value }
    }

    /// Returns the value as a string slice.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidUtf8` if the value is not valid UTF-8.
    pub fn as_str(&self) -> Result<&'a str, DecodeError> {
        std::str::from_utf8(self.value).map_err(DecodeError::from)
    }

    /// Parses the value as the specified type.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if parsing fails.
    pub fn parse<T: FromStr>(&self) -> Result<T, DecodeError> {
        let s = self.as_str()?;
        s.parse().map_err(|_| DecodeError::InvalidFieldValue {
            tag: self.tag,
            reason: format!("failed to parse '{}' as {}", s, std::any::type_name::<T>()),
        })
    }

    /// Returns the value as a u64.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the value is not a valid integer.
    pub fn as_u64(&self) -> Result<u64, DecodeError> {
        self.parse()
    }

    /// Returns the value as a u32.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the value is not a valid integer.
    pub fn as_u32(&self) -> Result<u32, DecodeError> {
        self.parse()
    }

    /// Returns the value as a Decimal for price-bearing fields.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the value is not a valid decimal.
    pub fn as_decimal(&self) -> Result<Decimal, DecodeError> {
        self.parse()
    }

    /// Returns the value as a bool (FIX uses 'Y'/'N').
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the value is not 'Y' or 'N'.
    pub fn as_bool(&self) -> Result<bool, DecodeError> {
        match self.value {
            b"Y" => Ok(true),
            b"N" => Ok(false),
            _ => Err(DecodeError::InvalidFieldValue {
                tag: self.tag,
                reason: "expected 'Y' or 'N'".to_string(),
            }),
        }
    }

    /// Returns the raw bytes of the value.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &'a [u8] {
        self.value
    }

    /// Returns true if the value equals the ASCII flag 'Y'.
    #[inline]
    #[must_use]
    pub fn is_flag_set(&self) -> bool {
        self.value == b"Y"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_ref_as_str() {
        let field = FieldRef::new(112, b"TEST123");
        assert_eq!(field.as_str().unwrap(), "TEST123");
    }

    #[test]
    fn test_field_ref_as_u64() {
        let field = FieldRef::new(34, b"12345");
        assert_eq!(field.as_u64().unwrap(), 12345);
    }

    #[test]
    fn test_field_ref_as_bool() {
        assert!(FieldRef::new(141, b"Y").as_bool().unwrap());
        assert!(!FieldRef::new(141, b"N").as_bool().unwrap());
        assert!(FieldRef::new(141, b"X").as_bool().is_err());
    }

    #[test]
    fn test_field_ref_flag() {
        assert!(FieldRef::new(43, b"Y").is_flag_set());
        assert!(!FieldRef::new(43, b"N").is_flag_set());
    }

    #[test]
    fn test_field_ref_invalid_utf8() {
        let field = FieldRef::new(1, &[0xFF, 0xFE]);
        assert!(field.as_str().is_err());
    }

    #[test]
    fn test_field_ref_as_decimal() {
        let field = FieldRef::new(44, b"101.25");
        assert_eq!(field.as_decimal().unwrap().to_string(), "101.25");
    }
}
