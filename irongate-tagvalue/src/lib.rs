/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # IronGate Tag-Value
//!
//! Zero-copy FIX tag=value encoding and decoding for the IronGate engine.
//!
//! This crate provides high-performance parsing and serialization of FIX
//! messages using the standard tag=value format with SOH (0x01) delimiters.
//!
//! ## Features
//!
//! - **Zero-copy parsing**: Field values reference the original buffer
//! - **SIMD-accelerated**: Uses `memchr` for fast delimiter search
//! - **Session header support**: the encoder stamps MsgSeqNum, SendingTime,
//!   and the CompID pair the way the session state machine requires

pub mod checksum;
pub mod decoder;
pub mod encoder;

pub use checksum::{calculate_checksum, format_checksum, parse_checksum};
pub use decoder::Decoder;
pub use encoder::MessageBuilder;
pub use irongate_core::message::RawMessage;

/// SOH (Start of Header) delimiter used in FIX messages.
pub const SOH: u8 = 0x01;
