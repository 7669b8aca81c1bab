/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Error types for the IronGate gateway engine.
//!
//! This module provides a unified error hierarchy using `thiserror` for typed,
//! domain-specific errors across all IronGate operations.
//!
//! Back-pressure is modelled as an ordinary `Err` variant so it is always
//! caller-visible; protocol faults are not raised as errors at all but become
//! state transitions recording a `DisconnectReason`.

use crate::types::DisconnectReason;
use thiserror::Error;

/// Result type alias using [`GatewayError`] as the error type.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Top-level error type for all IronGate operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Error during message decoding.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Error during message encoding.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Error in FIX session layer operations.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Error in FIXP connection operations.
    #[error("fixp error: {0}")]
    Fixp(#[from] FixpError),

    /// Error in message store operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error in transport stream operations.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// I/O error from an underlying socket.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that occur during FIX message decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Message buffer is incomplete, need more data.
    #[error("incomplete message, need more data")]
    Incomplete,

    /// Invalid BeginString field (tag 8).
    #[error("invalid begin string: expected 8=FIX.x.y")]
    InvalidBeginString,

    /// Missing or invalid BodyLength field (tag 9).
    #[error("missing or invalid body length (tag 9)")]
    InvalidBodyLength,

    /// Missing MsgType field (tag 35).
    #[error("missing msg type field (tag 35)")]
    MissingMsgType,

    /// Checksum mismatch between calculated and declared values.
    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        /// Calculated checksum value.
        calculated: u8,
        /// Declared checksum value in message.
        declared: u8,
    },

    /// Missing required field.
    #[error("missing required field: tag {tag}")]
    MissingRequiredField {
        /// The tag number of the missing field.
        tag: u32,
    },

    /// Invalid field value for the expected type.
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },

    /// Invalid UTF-8 in string field.
    #[error("invalid utf-8 in field: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Message exceeds maximum allowed size.
    #[error("message too large: {size} bytes exceeds maximum {max_size}")]
    MessageTooLarge {
        /// Actual message size in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max_size: usize,
    },

    /// Unknown SBE template id on a FIXP stream.
    #[error("unknown template id: {template_id}")]
    UnknownTemplateId {
        /// The unrecognised template id.
        template_id: u16,
    },
}

/// Errors that occur during message encoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Buffer capacity exceeded during encoding.
    #[error("buffer overflow: need {needed} bytes, have {available}")]
    BufferOverflow {
        /// Bytes needed to complete encoding.
        needed: usize,
        /// Bytes available in buffer.
        available: usize,
    },

    /// Field value exceeds maximum length.
    #[error("field value too long for tag {tag}: {length} bytes")]
    FieldTooLong {
        /// The tag number of the field.
        tag: u32,
        /// Actual length of the value.
        length: usize,
    },
}

/// Errors in FIX session layer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The transport refused the write; retry on a later poll.
    #[error("back pressured")]
    BackPressured,

    /// The session is not in a state that allows sending.
    #[error("not connected: session state is {state}")]
    NotConnected {
        /// Name of the current session state.
        state: &'static str,
    },

    /// The session has been administratively disabled.
    #[error("session disabled")]
    SessionDisabled,

    /// Heartbeat timeout - no traffic within 2.4x the heartbeat interval.
    #[error("heartbeat timeout after {elapsed_ms} milliseconds")]
    HeartbeatTimeout {
        /// Elapsed time in milliseconds since last received message.
        elapsed_ms: u64,
    },

    /// Sequence number gap detected.
    #[error("sequence gap: expected {expected}, received {received}")]
    SequenceGap {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },

    /// Sequence number lower than expected without PossDupFlag.
    #[error("sequence too low: expected >= {expected}, received {received}")]
    SequenceTooLow {
        /// Minimum expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },

    /// Logon was rejected by the configured authenticator.
    #[error("authentication rejected: {reason}")]
    AuthenticationRejected {
        /// Reason for rejection.
        reason: String,
    },

    /// The session was disconnected.
    #[error("disconnected: {reason}")]
    Disconnected {
        /// Why the disconnect happened.
        reason: DisconnectReason,
    },

    /// Session configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Errors in FIXP connection operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FixpError {
    /// The transport refused the write; retry on a later poll.
    #[error("back pressured")]
    BackPressured,

    /// The connection is not established.
    #[error("not connected: connection state is {state}")]
    NotConnected {
        /// Name of the current connection state.
        state: &'static str,
    },

    /// The peer rejected negotiation or establishment.
    #[error("rejected by peer: code {code}")]
    Rejected {
        /// Reject code from the wire.
        code: u16,
    },

    /// The requested retransmit range is unavailable.
    #[error("retransmit range unavailable: from {from_seq_no}, count {count}")]
    RetransmitUnavailable {
        /// First sequence number of the requested range.
        from_seq_no: u64,
        /// Number of messages requested.
        count: u32,
    },
}

/// Errors in message store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Message not found in store.
    #[error("message not found: seq={seq_num} index={sequence_index}")]
    NotFound {
        /// Sequence number of the missing message.
        seq_num: u64,
        /// Sequence index generation searched.
        sequence_index: u32,
    },

    /// Range of messages not available.
    #[error("messages not available for range {begin}..={end} index={sequence_index}")]
    RangeNotAvailable {
        /// Begin sequence number (inclusive).
        begin: u64,
        /// End sequence number (inclusive).
        end: u64,
        /// Sequence index generation searched.
        sequence_index: u32,
    },
}

/// Errors in transport stream operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The stream buffer is full; retry later.
    #[error("back pressured")]
    BackPressured,

    /// This node is not the cluster leader; the write was suppressed.
    #[error("not the cluster leader")]
    NotLeader,

    /// The stream has been closed by the other end.
    #[error("stream closed")]
    Closed,

    /// The payload exceeds the stream's maximum frame size.
    #[error("frame too large: {size} bytes exceeds maximum {max_size}")]
    FrameTooLarge {
        /// Offered payload size.
        size: usize,
        /// Maximum accepted size.
        max_size: usize,
    },
}

impl SessionError {
    /// Returns true if the operation may be retried on a later poll.
    #[must_use]
    pub const fn is_back_pressured(&self) -> bool {
        matches!(self, Self::BackPressured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::ChecksumMismatch {
            calculated: 100,
            declared: 200,
        };
        assert_eq!(
            err.to_string(),
            "checksum mismatch: calculated 100, declared 200"
        );
    }

    #[test]
    fn test_gateway_error_from_session() {
        let err: GatewayError = SessionError::BackPressured.into();
        assert!(matches!(
            err,
            GatewayError::Session(SessionError::BackPressured)
        ));
    }

    #[test]
    fn test_session_error_back_pressure_predicate() {
        assert!(SessionError::BackPressured.is_back_pressured());
        assert!(!SessionError::SessionDisabled.is_back_pressured());
    }

    #[test]
    fn test_transport_error_display() {
        assert_eq!(TransportError::NotLeader.to_string(), "not the cluster leader");
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::NotFound {
            seq_num: 42,
            sequence_index: 1,
        };
        assert_eq!(err.to_string(), "message not found: seq=42 index=1");
    }
}
