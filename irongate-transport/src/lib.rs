/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # IronGate Transport
//!
//! Transport layer abstractions for the IronGate gateway engine.
//!
//! This crate provides:
//! - **Streams**: back-pressure aware [`StreamPublication`] /
//!   [`StreamSubscription`] with an in-process bounded implementation
//! - **Cluster gating**: publications and subscriptions that transmit only
//!   while this node holds cluster leadership
//! - **Codec**: Tokio codec for FIX message framing over TCP

pub mod cluster;
pub mod codec;
pub mod stream;

pub use cluster::{ClusterPublication, ClusterStreams, ClusterSubscription};
pub use codec::FixFramingCodec;
pub use stream::{
    FrameHandler, FrameHeader, InProcessPublication, InProcessSubscription, StreamPublication,
    StreamSubscription, in_process_stream,
};
