/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # IronGate Core
//!
//! Core types, traits, and error definitions for the IronGate gateway engine.
//!
//! This crate provides the fundamental building blocks used across all IronGate crates:
//! - **Error types**: Unified error handling with `thiserror`
//! - **Identity types**: `SessionId`, `ConnectionId`, `LibraryId`
//! - **Message types**: `RawMessage`, `OwnedMessage`, `MsgType`
//! - **Core types**: `SeqNum`, `Timestamp`, `CompId`, `DisconnectReason`
//! - **Clock**: the injected [`clock::EpochNanoClock`] used by every protocol timer
//!
//! ## Zero-Copy Design
//!
//! The message abstractions support both zero-copy borrowed views (for hot-path
//! processing) and owned representations (for storage and replay).

pub mod clock;
pub mod error;
pub mod field;
pub mod message;
pub mod types;

pub use clock::{EpochNanoClock, ManualClock, SystemNanoClock};
pub use error::{
    DecodeError, EncodeError, FixpError, GatewayError, Result, SessionError, StoreError,
    TransportError,
};
pub use field::{FieldRef, tags};
pub use message::{MsgType, OwnedMessage, RawMessage};
pub use types::{
    CompId, ConnectionId, DisconnectReason, LibraryId, MessageStatus, PersistenceMode, SeqNum,
    SessionId, Timestamp,
};
