/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # IronGate Logger
//!
//! Merges the inbound stream, the outbound stream, and the replay watermark
//! stream into a single stream ordered by capture timestamp.
//!
//! Inbound and outbound traffic arrive on independent paths with unbounded
//! relative skew; the logger buffers every record and releases only what is
//! provably safe: a record is emitted once every input stream has advanced
//! past its timestamp. Downstream analytics rely on the resulting
//! non-decreasing timestamp order.

pub mod consumer;
pub mod logger;

pub use consumer::{FixMessageConsumer, IlinkMessageConsumer, LoggerConfiguration};
pub use logger::FixMessageLogger;
