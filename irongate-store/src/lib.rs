/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # IronGate Store
//!
//! Sent-message storage for the IronGate gateway engine.
//!
//! Every message a session sends is recorded here under its sequence number
//! and sequence index, so that a counterparty ResendRequest can be answered
//! with the original bytes. Only in-memory storage is provided; sequence
//! state does not survive a process restart.

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{MessageStore, StoredMessage};
