/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # IronGate
//!
//! The core session engine of a FIX/FIXP trading gateway.
//!
//! IronGate owns the wire-level contract with an exchange - sequencing,
//! retransmission, heartbeats, session identity, and termination - for both
//! classic FIX tag=value sessions and binary FIXP/iLink3 connections, plus
//! the timestamp-reordering message logger downstream analytics depend on.
//!
//! ## Design
//!
//! - **Synchronous state machines**: a session progresses only through
//!   `on_message` and `poll`; nothing on the hot path blocks or reads system
//!   time directly
//! - **Caller-visible back-pressure**: transport refusals surface in every
//!   result or park the machine in a retry state replayed by `poll`
//! - **Deterministic testing**: all timers run on an injected clock
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use irongate::prelude::*;
//!
//! let (publication, subscription) = in_process_stream(1024);
//! let session = Session::acceptor(
//!     SessionConfig::new(
//!         CompId::new("GATEWAY").unwrap(),
//!         CompId::new("COUNTER").unwrap(),
//!         "FIX.4.4",
//!     ),
//!     SessionId::new(1),
//!     ConnectionId::new(1),
//!     LibraryId::new(1),
//!     Arc::new(publication),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(SystemNanoClock),
//! );
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`]: identity types, clock abstraction, and error definitions
//! - [`tagvalue`]: zero-copy FIX tag=value encoding and decoding
//! - [`collections`]: primitive-keyed open-addressed maps
//! - [`transport`]: back-pressure aware streams, cluster gating, TCP framing
//! - [`store`]: sent-message stores backing resend requests
//! - [`session`]: the FIX session state machine
//! - [`fixp`]: the binary FIXP/iLink3 connection state machine
//! - [`logger`]: the timestamp-reordering message logger
//! - [`engine`]: application callbacks, ownership handoff, session driver

pub use irongate_collections as collections;
pub use irongate_core as core;
pub use irongate_engine as engine;
pub use irongate_fixp as fixp;
pub use irongate_logger as logger;
pub use irongate_session as session;
pub use irongate_store as store;
pub use irongate_tagvalue as tagvalue;
pub use irongate_transport as transport;

/// Commonly used types, importable with one `use`.
pub mod prelude {
    pub use irongate_collections::Long2LongMap;
    pub use irongate_core::clock::{EpochNanoClock, ManualClock, SystemNanoClock};
    pub use irongate_core::error::{GatewayError, Result, SessionError};
    pub use irongate_core::message::{MsgType, OwnedMessage, RawMessage};
    pub use irongate_core::types::{
        CompId, ConnectionId, DisconnectReason, LibraryId, PersistenceMode, SeqNum, SessionId,
    };
    pub use irongate_engine::{Application, SessionDriver, SessionOwnership, SessionReplyStatus};
    pub use irongate_fixp::{FixpAction, FixpConnection, FixpState};
    pub use irongate_logger::{FixMessageLogger, LoggerConfiguration};
    pub use irongate_session::{Action, Session, SessionConfig, SessionState};
    pub use irongate_store::{MemoryStore, MessageStore};
    pub use irongate_tagvalue::{Decoder, MessageBuilder};
    pub use irongate_transport::stream::{
        StreamPublication, StreamSubscription, in_process_stream,
    };
}
