/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # IronGate FIXP
//!
//! FIXP/iLink3 binary session protocol for the IronGate engine.
//!
//! This crate provides:
//! - **Messages**: SBE-encoded flyweights for the Negotiate / Establish /
//!   Terminate family, plus Sequence, NotApplied, and retransmit messages
//! - **Connection**: the Negotiate -> Establish -> Terminate state machine
//!   with keepalive probing and NotApplied-driven retransmission
//!
//! Unlike FIX, a FIXP session is identified by a 64-bit UUID assigned per
//! negotiation; the previous UUID remains referenceable for recovering a
//! prior connection's tail.

pub mod connection;
pub mod messages;

pub use connection::{FixpAction, FixpConnection, FixpState, NOT_AWAITING_RETRANSMIT};
pub use messages::{FixpMessage, TemplateId};
