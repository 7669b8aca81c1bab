/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! SBE-encoded FIXP session messages.
//!
//! Every message starts with the standard 8-byte little-endian SBE header
//! (`block_length`, `template_id`, `schema_id`, `version`) followed by its
//! fixed block. Messages decode into stack-allocated structs; the session
//! dispatches on [`FixpMessage`] with an exhaustive match.

use bytes::{Buf, BufMut, BytesMut};
use irongate_core::error::DecodeError;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

/// Length of the SBE message header in bytes.
pub const SBE_HEADER_LEN: usize = 8;

/// Schema id stamped on every session message.
pub const SCHEMA_ID: u16 = 8;

/// Schema version stamped on every session message.
pub const SCHEMA_VERSION: u16 = 5;

/// SBE template ids of the FIXP session messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum TemplateId {
    /// Negotiate (500).
    Negotiate = 500,
    /// NegotiationResponse (501).
    NegotiationResponse = 501,
    /// NegotiationReject (502).
    NegotiationReject = 502,
    /// Establish (503).
    Establish = 503,
    /// EstablishmentAck (504).
    EstablishmentAck = 504,
    /// EstablishmentReject (505).
    EstablishmentReject = 505,
    /// Sequence (506).
    Sequence = 506,
    /// Terminate (507).
    Terminate = 507,
    /// RetransmitRequest (508).
    RetransmitRequest = 508,
    /// Retransmission (509).
    Retransmission = 509,
    /// NotApplied (513).
    NotApplied = 513,
}

/// The standard SBE message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbeHeader {
    /// Length of the fixed block that follows.
    pub block_length: u16,
    /// Template id of the message.
    pub template_id: u16,
    /// Schema id.
    pub schema_id: u16,
    /// Schema version.
    pub version: u16,
}

impl SbeHeader {
    /// Writes the header to the buffer.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.block_length);
        buf.put_u16_le(self.template_id);
        buf.put_u16_le(self.schema_id);
        buf.put_u16_le(self.version);
    }

    /// Reads a header from the front of the buffer.
    ///
    /// # Errors
    /// Returns `DecodeError::Incomplete` if fewer than 8 bytes remain.
    pub fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        if buf.remaining() < SBE_HEADER_LEN {
            return Err(DecodeError::Incomplete);
        }
        Ok(Self {
            block_length: buf.get_u16_le(),
            template_id: buf.get_u16_le(),
            schema_id: buf.get_u16_le(),
            version: buf.get_u16_le(),
        })
    }
}

macro_rules! check_block {
    ($buf:expr, $len:expr) => {
        if $buf.remaining() < usize::from($len) {
            return Err(DecodeError::Incomplete);
        }
    };
}

/// Negotiate (500): opens a session, proposing a fresh UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiate {
    /// Session UUID proposed for this connection.
    pub uuid: u64,
    /// Request timestamp in nanoseconds.
    pub request_timestamp: u64,
}

/// NegotiationResponse (501): the exchange accepted the negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationResponse {
    /// Echoed session UUID.
    pub uuid: u64,
    /// Echoed request timestamp.
    pub request_timestamp: u64,
    /// UUID of the previous accepted connection, or 0.
    pub previous_uuid: u64,
    /// Last sequence number of the previous connection, or 0.
    pub previous_seq_no: u64,
}

/// NegotiationReject (502).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationReject {
    /// Echoed session UUID.
    pub uuid: u64,
    /// Echoed request timestamp.
    pub request_timestamp: u64,
    /// Reject code.
    pub error_codes: u16,
}

/// Establish (503): binds the negotiated session to this connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Establish {
    /// Session UUID.
    pub uuid: u64,
    /// Request timestamp in nanoseconds.
    pub request_timestamp: u64,
    /// Next sequence number the initiator will send.
    pub next_seq_no: u64,
    /// Keepalive interval in milliseconds.
    pub keep_alive_interval_ms: u16,
}

/// EstablishmentAck (504).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstablishmentAck {
    /// Session UUID.
    pub uuid: u64,
    /// Echoed request timestamp.
    pub request_timestamp: u64,
    /// Next sequence number the exchange will send.
    pub next_seq_no: u64,
    /// Negotiated keepalive interval in milliseconds.
    pub keep_alive_interval_ms: u16,
}

/// EstablishmentReject (505).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstablishmentReject {
    /// Session UUID.
    pub uuid: u64,
    /// Echoed request timestamp.
    pub request_timestamp: u64,
    /// Reject code.
    pub error_codes: u16,
}

/// Sequence (506): announces the sender's next sequence number; doubles as
/// the keepalive probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequence {
    /// Session UUID.
    pub uuid: u64,
    /// Next sequence number the sender will use.
    pub next_seq_no: u64,
    /// Set when sent because the peer's keepalive interval lapsed.
    pub keep_alive_lapsed: bool,
}

/// Terminate (507): initiates or acknowledges connection termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminate {
    /// Session UUID.
    pub uuid: u64,
    /// Request timestamp in nanoseconds.
    pub request_timestamp: u64,
    /// Error code, or 0 for an orderly termination.
    pub error_codes: u16,
}

/// RetransmitRequest (508): asks for a replay of business messages. May
/// reference the previous connection's UUID to recover its tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetransmitRequest {
    /// UUID of the connection whose messages are requested.
    pub uuid: u64,
    /// Current connection UUID of the requester.
    pub last_uuid: u64,
    /// Request timestamp in nanoseconds.
    pub request_timestamp: u64,
    /// First sequence number requested.
    pub from_seq_no: u64,
    /// Number of messages requested.
    pub msg_count: u16,
}

/// Retransmission (509): announces the replay that answers a
/// [`RetransmitRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retransmission {
    /// UUID of the connection whose messages are replayed.
    pub uuid: u64,
    /// Requester's current connection UUID.
    pub last_uuid: u64,
    /// Echoed request timestamp.
    pub request_timestamp: u64,
    /// First sequence number replayed.
    pub from_seq_no: u64,
    /// Number of messages replayed.
    pub msg_count: u16,
}

/// NotApplied (513): the exchange did not apply a range of our messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotApplied {
    /// Session UUID.
    pub uuid: u64,
    /// First sequence number not applied.
    pub from_seq_no: u64,
    /// Number of messages not applied.
    pub msg_count: u32,
}

macro_rules! fixp_codec {
    ($name:ident, $template:expr, $block:expr, [$(($field:ident, $put:ident, $get:ident)),+]) => {
        impl $name {
            /// Fixed block length in bytes.
            pub const BLOCK_LENGTH: u16 = $block;

            /// Encodes the message, header included.
            pub fn encode(&self, buf: &mut BytesMut) {
                SbeHeader {
                    block_length: Self::BLOCK_LENGTH,
                    template_id: $template as u16,
                    schema_id: SCHEMA_ID,
                    version: SCHEMA_VERSION,
                }
                .encode(buf);
                $(buf.$put(self.$field);)+
            }

            /// Decodes the fixed block (header already consumed).
            ///
            /// # Errors
            /// Returns `DecodeError::Incomplete` if the block is truncated.
            pub fn decode_block(buf: &mut &[u8]) -> Result<Self, DecodeError> {
                check_block!(buf, Self::BLOCK_LENGTH);
                Ok(Self {
                    $($field: buf.$get(),)+
                })
            }
        }
    };
}

fixp_codec!(Negotiate, TemplateId::Negotiate, 16, [
    (uuid, put_u64_le, get_u64_le),
    (request_timestamp, put_u64_le, get_u64_le)
]);

fixp_codec!(NegotiationResponse, TemplateId::NegotiationResponse, 32, [
    (uuid, put_u64_le, get_u64_le),
    (request_timestamp, put_u64_le, get_u64_le),
    (previous_uuid, put_u64_le, get_u64_le),
    (previous_seq_no, put_u64_le, get_u64_le)
]);

fixp_codec!(NegotiationReject, TemplateId::NegotiationReject, 18, [
    (uuid, put_u64_le, get_u64_le),
    (request_timestamp, put_u64_le, get_u64_le),
    (error_codes, put_u16_le, get_u16_le)
]);

fixp_codec!(Establish, TemplateId::Establish, 26, [
    (uuid, put_u64_le, get_u64_le),
    (request_timestamp, put_u64_le, get_u64_le),
    (next_seq_no, put_u64_le, get_u64_le),
    (keep_alive_interval_ms, put_u16_le, get_u16_le)
]);

fixp_codec!(EstablishmentAck, TemplateId::EstablishmentAck, 26, [
    (uuid, put_u64_le, get_u64_le),
    (request_timestamp, put_u64_le, get_u64_le),
    (next_seq_no, put_u64_le, get_u64_le),
    (keep_alive_interval_ms, put_u16_le, get_u16_le)
]);

fixp_codec!(EstablishmentReject, TemplateId::EstablishmentReject, 18, [
    (uuid, put_u64_le, get_u64_le),
    (request_timestamp, put_u64_le, get_u64_le),
    (error_codes, put_u16_le, get_u16_le)
]);

fixp_codec!(Terminate, TemplateId::Terminate, 18, [
    (uuid, put_u64_le, get_u64_le),
    (request_timestamp, put_u64_le, get_u64_le),
    (error_codes, put_u16_le, get_u16_le)
]);

fixp_codec!(RetransmitRequest, TemplateId::RetransmitRequest, 34, [
    (uuid, put_u64_le, get_u64_le),
    (last_uuid, put_u64_le, get_u64_le),
    (request_timestamp, put_u64_le, get_u64_le),
    (from_seq_no, put_u64_le, get_u64_le),
    (msg_count, put_u16_le, get_u16_le)
]);

fixp_codec!(Retransmission, TemplateId::Retransmission, 34, [
    (uuid, put_u64_le, get_u64_le),
    (last_uuid, put_u64_le, get_u64_le),
    (request_timestamp, put_u64_le, get_u64_le),
    (from_seq_no, put_u64_le, get_u64_le),
    (msg_count, put_u16_le, get_u16_le)
]);

fixp_codec!(NotApplied, TemplateId::NotApplied, 20, [
    (uuid, put_u64_le, get_u64_le),
    (from_seq_no, put_u64_le, get_u64_le),
    (msg_count, put_u32_le, get_u32_le)
]);

impl Sequence {
    /// Fixed block length in bytes.
    pub const BLOCK_LENGTH: u16 = 17;

    /// Encodes the message, header included.
    pub fn encode(&self, buf: &mut BytesMut) {
        SbeHeader {
            block_length: Self::BLOCK_LENGTH,
            template_id: TemplateId::Sequence as u16,
            schema_id: SCHEMA_ID,
            version: SCHEMA_VERSION,
        }
        .encode(buf);
        buf.put_u64_le(self.uuid);
        buf.put_u64_le(self.next_seq_no);
        buf.put_u8(u8::from(self.keep_alive_lapsed));
    }

    /// Decodes the fixed block (header already consumed).
    ///
    /// # Errors
    /// Returns `DecodeError::Incomplete` if the block is truncated.
    pub fn decode_block(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        check_block!(buf, Self::BLOCK_LENGTH);
        Ok(Self {
            uuid: buf.get_u64_le(),
            next_seq_no: buf.get_u64_le(),
            keep_alive_lapsed: buf.get_u8() != 0,
        })
    }
}

/// A decoded FIXP session message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixpMessage {
    /// Negotiate (500).
    Negotiate(Negotiate),
    /// NegotiationResponse (501).
    NegotiationResponse(NegotiationResponse),
    /// NegotiationReject (502).
    NegotiationReject(NegotiationReject),
    /// Establish (503).
    Establish(Establish),
    /// EstablishmentAck (504).
    EstablishmentAck(EstablishmentAck),
    /// EstablishmentReject (505).
    EstablishmentReject(EstablishmentReject),
    /// Sequence (506).
    Sequence(Sequence),
    /// Terminate (507).
    Terminate(Terminate),
    /// RetransmitRequest (508).
    RetransmitRequest(RetransmitRequest),
    /// Retransmission (509).
    Retransmission(Retransmission),
    /// NotApplied (513).
    NotApplied(NotApplied),
}

impl FixpMessage {
    /// Decodes one session message from a buffer.
    ///
    /// # Errors
    /// Returns `DecodeError::UnknownTemplateId` for business-layer or
    /// unrecognised templates and `DecodeError::Incomplete` for truncated
    /// blocks.
    pub fn decode(mut buf: &[u8]) -> Result<Self, DecodeError> {
        let header = SbeHeader::decode(&mut buf)?;
        let template = TemplateId::from_u16(header.template_id).ok_or(
            DecodeError::UnknownTemplateId {
                template_id: header.template_id,
            },
        )?;

        Ok(match template {
            TemplateId::Negotiate => Self::Negotiate(Negotiate::decode_block(&mut buf)?),
            TemplateId::NegotiationResponse => {
                Self::NegotiationResponse(NegotiationResponse::decode_block(&mut buf)?)
            }
            TemplateId::NegotiationReject => {
                Self::NegotiationReject(NegotiationReject::decode_block(&mut buf)?)
            }
            TemplateId::Establish => Self::Establish(Establish::decode_block(&mut buf)?),
            TemplateId::EstablishmentAck => {
                Self::EstablishmentAck(EstablishmentAck::decode_block(&mut buf)?)
            }
            TemplateId::EstablishmentReject => {
                Self::EstablishmentReject(EstablishmentReject::decode_block(&mut buf)?)
            }
            TemplateId::Sequence => Self::Sequence(Sequence::decode_block(&mut buf)?),
            TemplateId::Terminate => Self::Terminate(Terminate::decode_block(&mut buf)?),
            TemplateId::RetransmitRequest => {
                Self::RetransmitRequest(RetransmitRequest::decode_block(&mut buf)?)
            }
            TemplateId::Retransmission => {
                Self::Retransmission(Retransmission::decode_block(&mut buf)?)
            }
            TemplateId::NotApplied => Self::NotApplied(NotApplied::decode_block(&mut buf)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode() {
        let header = SbeHeader {
            block_length: 26,
            template_id: TemplateId::Establish as u16,
            schema_id: SCHEMA_ID,
            version: SCHEMA_VERSION,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), SBE_HEADER_LEN);

        let mut slice = &buf[..];
        assert_eq!(SbeHeader::decode(&mut slice).unwrap(), header);
    }

    #[test]
    fn test_negotiate_roundtrip() {
        let message = Negotiate {
            uuid: 0xDEAD_BEEF,
            request_timestamp: 123_456_789,
        };
        let mut buf = BytesMut::new();
        message.encode(&mut buf);
        assert_eq!(buf.len(), SBE_HEADER_LEN + usize::from(Negotiate::BLOCK_LENGTH));

        match FixpMessage::decode(&buf).unwrap() {
            FixpMessage::Negotiate(decoded) => assert_eq!(decoded, message),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_not_applied_roundtrip() {
        let message = NotApplied {
            uuid: 7,
            from_seq_no: 20,
            msg_count: 3,
        };
        let mut buf = BytesMut::new();
        message.encode(&mut buf);

        match FixpMessage::decode(&buf).unwrap() {
            FixpMessage::NotApplied(decoded) => assert_eq!(decoded, message),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_sequence_keep_alive_flag() {
        let message = Sequence {
            uuid: 9,
            next_seq_no: 42,
            keep_alive_lapsed: true,
        };
        let mut buf = BytesMut::new();
        message.encode(&mut buf);

        match FixpMessage::decode(&buf).unwrap() {
            FixpMessage::Sequence(decoded) => {
                assert!(decoded.keep_alive_lapsed);
                assert_eq!(decoded.next_seq_no, 42);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_template_rejected() {
        let header = SbeHeader {
            block_length: 0,
            template_id: 999,
            schema_id: SCHEMA_ID,
            version: SCHEMA_VERSION,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        assert!(matches!(
            FixpMessage::decode(&buf),
            Err(DecodeError::UnknownTemplateId { template_id: 999 })
        ));
    }

    #[test]
    fn test_truncated_block_rejected() {
        let message = Establish {
            uuid: 1,
            request_timestamp: 2,
            next_seq_no: 3,
            keep_alive_interval_ms: 30_000,
        };
        let mut buf = BytesMut::new();
        message.encode(&mut buf);
        let truncated = &buf[..buf.len() - 4];

        assert!(matches!(
            FixpMessage::decode(truncated),
            Err(DecodeError::Incomplete)
        ));
    }
}
