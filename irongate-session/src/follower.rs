/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Follower-side session handle.
//!
//! On a cluster follower the sequence counters are owned by the leader; the
//! follower only stamps pre-assigned sequence numbers onto outgoing frames.
//! Whether the frame actually transmits is decided by the cluster-gated
//! publication it writes through.

use crate::config::SessionConfig;
use bytes::Bytes;
use irongate_core::clock::EpochNanoClock;
use irongate_core::error::TransportError;
use irongate_core::message::MsgType;
use irongate_core::types::{ConnectionId, LibraryId, MessageStatus, SessionId, Timestamp};
use irongate_tagvalue::MessageBuilder;
use irongate_transport::stream::{FrameHeader, StreamPublication};
use std::sync::Arc;

/// A session handle that sends with caller-assigned sequence numbers.
pub struct FollowerSession {
    config: SessionConfig,
    session_id: SessionId,
    connection_id: ConnectionId,
    library_id: LibraryId,
    sequence_index: u32,
    publication: Arc<dyn StreamPublication>,
    clock: Arc<dyn EpochNanoClock>,
}

impl FollowerSession {
    /// Creates a follower session handle.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        session_id: SessionId,
        connection_id: ConnectionId,
        library_id: LibraryId,
        sequence_index: u32,
        publication: Arc<dyn StreamPublication>,
        clock: Arc<dyn EpochNanoClock>,
    ) -> Self {
        Self {
            config,
            session_id,
            connection_id,
            library_id,
            sequence_index,
            publication,
            clock,
        }
    }

    /// Returns the stable session id.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Adopts a new sequence reset generation from the leader.
    pub fn set_sequence_index(&mut self, sequence_index: u32) {
        self.sequence_index = sequence_index;
    }

    /// Sends a message with a pre-assigned sequence number.
    ///
    /// # Arguments
    /// * `msg_type` - The message type
    /// * `seq_num` - The sequence number assigned by the leader
    /// * `fill` - Body fields, appended after the standard header
    ///
    /// # Errors
    /// Propagates the transport result, including `NotLeader` from a
    /// cluster-gated publication.
    pub fn send<F>(&self, msg_type: &MsgType, seq_num: u64, fill: F) -> Result<u64, TransportError>
    where
        F: FnOnce(&mut MessageBuilder),
    {
        let now = Timestamp::from_nanos(self.clock.nanos());
        let mut builder = MessageBuilder::new(self.config.begin_string);
        builder.msg_type(msg_type.as_str());
        builder.standard_header(
            self.config.sender_comp_id.as_str(),
            self.config.target_comp_id.as_str(),
            seq_num,
            now,
        );
        fill(&mut builder);
        let bytes: Bytes = builder.finish().freeze();

        let header = FrameHeader {
            stream_id: self.config.outbound_stream_id,
            session_id: self.session_id,
            connection_id: self.connection_id,
            library_id: self.library_id,
            message_type: u16::from(msg_type.as_str().as_bytes()[0]),
            sequence_index: self.sequence_index,
            sequence_number: seq_num,
            status: MessageStatus::Ok,
            timestamp_ns: self.clock.nanos(),
        };

        self.publication.try_offer(&header, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irongate_core::clock::ManualClock;
    use irongate_core::types::CompId;
    use irongate_transport::cluster::ClusterStreams;
    use irongate_transport::stream::{StreamSubscription, in_process_stream};
    use std::sync::atomic::{AtomicI32, Ordering};

    fn config() -> SessionConfig {
        SessionConfig::new(
            CompId::new("FOLLOWER").unwrap(),
            CompId::new("PEER").unwrap(),
            "FIX.4.4",
        )
    }

    #[test]
    fn test_send_stamps_assigned_seq_num() {
        let (publication, mut subscription) = in_process_stream(4);
        let follower = FollowerSession::new(
            config(),
            SessionId::new(3),
            ConnectionId::new(7),
            LibraryId::new(2),
            1,
            Arc::new(publication),
            Arc::new(ManualClock::new(0)),
        );

        follower
            .send(&MsgType::NewOrderSingle, 42, |builder| {
                builder.put_str(11, "X")
            })
            .unwrap();

        let mut captured = Vec::new();
        let mut handler = |header: &FrameHeader, payload: &[u8]| {
            captured.push((header.sequence_number, header.sequence_index, payload.to_vec()));
        };
        subscription.poll(&mut handler, 4);

        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].0, 42);
        assert_eq!(captured[0].1, 1);
        let text = String::from_utf8_lossy(&captured[0].2).to_string();
        assert!(text.contains("34=42\x01"));
    }

    #[test]
    fn test_send_through_cluster_gate_requires_leadership() {
        let leader = std::sync::Arc::new(AtomicI32::new(0));
        let streams = ClusterStreams::new(5, Arc::clone(&leader));
        let (publication, _subscription) = in_process_stream(4);
        let gated = streams.publication(Arc::new(publication));

        let follower = FollowerSession::new(
            config(),
            SessionId::new(3),
            ConnectionId::new(7),
            LibraryId::new(2),
            0,
            Arc::new(gated),
            Arc::new(ManualClock::new(0)),
        );

        assert_eq!(
            follower.send(&MsgType::Heartbeat, 1, |_| {}),
            Err(TransportError::NotLeader)
        );

        leader.store(5, Ordering::SeqCst);
        assert!(follower.send(&MsgType::Heartbeat, 1, |_| {}).is_ok());
    }
}
