/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # IronGate Engine
//!
//! Library/gateway integration for the IronGate session core.
//!
//! This crate provides:
//! - **Application trait**: async callback interface for session events and
//!   delivered messages
//! - **Ownership registry**: the two-phase `release_to_gateway` / `acquire`
//!   handoff between library workers and the gateway-managed pool
//! - **Session driver**: a Tokio task pumping a framed TCP stream through a
//!   session state machine

pub mod application;
pub mod driver;
pub mod ownership;

pub use application::{Application, NoOpApplication};
pub use driver::SessionDriver;
pub use ownership::{AdminCommand, SessionOwnership, SessionReplyStatus};
