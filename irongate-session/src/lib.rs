/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # IronGate Session
//!
//! FIX session layer protocol implementation for the IronGate engine.
//!
//! This crate provides:
//! - **State machine**: the full session lifecycle (logon, heartbeats,
//!   resend, logout, disconnect) driven by `on_message` and `poll`
//! - **Sequencing**: gap detection, ResendRequest emission, gap-fill replay,
//!   and sequence number resets with generation tracking
//! - **Heartbeats**: Heartbeat/TestRequest timers on an injected clock
//! - **Back-pressure**: transport refusals become retry frames replayed by
//!   `poll`, never blocking
//! - **Configuration**: per-session configuration options

pub mod admin;
pub mod config;
pub mod follower;
pub mod heartbeat;
pub mod session;
pub mod state;

pub use admin::{AdminMessage, LogonView};
pub use config::SessionConfig;
pub use follower::FollowerSession;
pub use heartbeat::HeartbeatState;
pub use session::{AcceptAllAuthenticator, Session, SessionAuthenticator, SessionRole};
pub use state::{Action, SessionState};
