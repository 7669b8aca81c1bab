/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Tokio codec for FIX message framing.
//!
//! Splits a TCP byte stream into complete FIX messages, validating
//! BeginString, BodyLength, and optionally the checksum. Parsing of the
//! framed message into fields is left to `irongate-tagvalue`.

use bytes::{BufMut, BytesMut};
use irongate_core::error::{DecodeError, GatewayError};
use irongate_tagvalue::checksum::{calculate_checksum, parse_checksum};
use memchr::memchr;
use tokio_util::codec::{Decoder, Encoder};

/// SOH delimiter.
const SOH: u8 = 0x01;

/// Length of the `10=XXX|` trailer.
const TRAILER_LEN: usize = 7;

/// Tokio codec for FIX message framing.
#[derive(Debug, Clone)]
pub struct FixFramingCodec {
    /// Maximum message size in bytes.
    max_message_size: usize,
    /// Whether to validate checksums.
    validate_checksum: bool,
}

impl FixFramingCodec {
    /// Creates a new codec with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_message_size: 1024 * 1024,
            validate_checksum: true,
        }
    }

    /// Sets the maximum message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets whether to validate checksums.
    #[must_use]
    pub const fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }
}

impl Default for FixFramingCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FixFramingCodec {
    type Item = BytesMut;
    type Error = GatewayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Smallest framable message: 8=FIX.4.x|9=N|35=X|10=XXX|
        if src.len() < 20 {
            return Ok(None);
        }

        if &src[0..2] != b"8=" {
            return Err(DecodeError::InvalidBeginString.into());
        }

        let Some(first_soh) = memchr(SOH, src) else {
            return Ok(None);
        };

        let body_len_start = first_soh + 1;
        if src.len() < body_len_start + 3 {
            return Ok(None);
        }
        if &src[body_len_start..body_len_start + 2] != b"9=" {
            return Err(DecodeError::InvalidBodyLength.into());
        }

        let Some(relative_soh) = memchr(SOH, &src[body_len_start..]) else {
            return Ok(None);
        };
        let body_len_soh = body_len_start + relative_soh;

        let body_length: usize = std::str::from_utf8(&src[body_len_start + 2..body_len_soh])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(DecodeError::InvalidBodyLength)?;

        // BodyLength counts from after 9=N| up to the 10= trailer.
        let total_length = body_len_soh + 1 + body_length + TRAILER_LEN;

        if total_length > self.max_message_size {
            return Err(DecodeError::MessageTooLarge {
                size: total_length,
                max_size: self.max_message_size,
            }
            .into());
        }

        if src.len() < total_length {
            src.reserve(total_length - src.len());
            return Ok(None);
        }

        if self.validate_checksum {
            let trailer_start = total_length - TRAILER_LEN;
            let declared = parse_checksum(&src[trailer_start + 3..trailer_start + 6])
                .ok_or(DecodeError::InvalidBodyLength)?;
            let calculated = calculate_checksum(&src[..trailer_start]);

            if calculated != declared {
                return Err(DecodeError::ChecksumMismatch {
                    calculated,
                    declared,
                }
                .into());
            }
        }

        Ok(Some(src.split_to(total_length)))
    }
}

impl Encoder<&[u8]> for FixFramingCodec {
    type Error = GatewayError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(item);
        Ok(())
    }
}

impl Encoder<BytesMut> for FixFramingCodec {
    type Error = GatewayError;

    fn encode(&mut self, item: BytesMut, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(body: &str) -> Vec<u8> {
        let header = format!("8=FIX.4.4\x019={}\x01", body.len());
        let without_checksum = format!("{header}{body}");
        let checksum = calculate_checksum(without_checksum.as_bytes());
        format!("{without_checksum}10={checksum:03}\x01").into_bytes()
    }

    #[test]
    fn test_decode_complete_message() {
        let mut codec = FixFramingCodec::new();
        let message = frame("35=0\x01");
        let mut buf = BytesMut::from(&message[..]);

        let framed = codec.decode(&mut buf).unwrap();
        assert_eq!(framed.as_deref(), Some(&message[..]));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_two_back_to_back_messages() {
        let mut codec = FixFramingCodec::new();
        let first = frame("35=0\x01");
        let second = frame("35=1\x01112=ping\x01");

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&first);
        buf.extend_from_slice(&second);

        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(&first[..]));
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some(&second[..])
        );
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_incomplete_waits_for_more() {
        let mut codec = FixFramingCodec::new();
        let message = frame("35=0\x01");
        let mut buf = BytesMut::from(&message[..message.len() - 5]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_invalid_begin_string() {
        let mut codec = FixFramingCodec::new();
        let mut buf = BytesMut::from(&b"9=FIX.4.4\x019=5\x0135=0\x0110=000\x01"[..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(GatewayError::Decode(DecodeError::InvalidBeginString))
        ));
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let mut codec = FixFramingCodec::new();
        let mut buf = BytesMut::from(&b"8=FIX.4.4\x019=5\x0135=0\x0110=000\x01"[..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(GatewayError::Decode(DecodeError::ChecksumMismatch { .. }))
        ));
    }

    #[test]
    fn test_decode_without_checksum_validation() {
        let mut codec = FixFramingCodec::new().with_checksum_validation(false);
        let mut buf = BytesMut::from(&b"8=FIX.4.4\x019=5\x0135=0\x0110=000\x01"[..]);

        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn test_encode_passthrough() {
        let mut codec = FixFramingCodec::new();
        let message = frame("35=0\x01");
        let mut dst = BytesMut::new();

        codec.encode(&message[..], &mut dst).unwrap();
        assert_eq!(&dst[..], &message[..]);
    }
}
