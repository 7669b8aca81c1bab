/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Cluster-gated streams.
//!
//! In a replicated deployment only the elected leader is allowed to transmit.
//! Leadership is observed through a single shared atomic holding the leader's
//! session id; the wrapped publication and subscription consult it on every
//! operation, so a leadership change takes effect on the next offer or poll.

use crate::stream::{FrameHandler, FrameHeader, StreamPublication, StreamSubscription};
use irongate_core::error::TransportError;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::debug;

/// Factory for cluster-gated publications and subscriptions.
///
/// All streams created from one `ClusterStreams` share the same leadership
/// view.
#[derive(Debug, Clone)]
pub struct ClusterStreams {
    our_session_id: i32,
    leader_session_id: Arc<AtomicI32>,
}

impl ClusterStreams {
    /// Creates a factory for this node.
    ///
    /// # Arguments
    /// * `our_session_id` - This node's replication session id
    /// * `leader_session_id` - Shared atomic updated by the election machinery
    #[must_use]
    pub fn new(our_session_id: i32, leader_session_id: Arc<AtomicI32>) -> Self {
        Self {
            our_session_id,
            leader_session_id,
        }
    }

    /// Returns true if this node currently holds leadership.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.leader_session_id.load(Ordering::SeqCst) == self.our_session_id
    }

    /// Wraps a publication so that offers transmit only while leader.
    #[must_use]
    pub fn publication(&self, inner: Arc<dyn StreamPublication>) -> ClusterPublication {
        ClusterPublication {
            inner,
            our_session_id: self.our_session_id,
            leader_session_id: Arc::clone(&self.leader_session_id),
        }
    }

    /// Wraps a subscription so that polls make progress only while leader.
    #[must_use]
    pub fn subscription<S: StreamSubscription>(&self, inner: S) -> ClusterSubscription<S> {
        ClusterSubscription {
            inner,
            our_session_id: self.our_session_id,
            leader_session_id: Arc::clone(&self.leader_session_id),
        }
    }
}

/// Publication that transmits only while this node is the leader.
pub struct ClusterPublication {
    inner: Arc<dyn StreamPublication>,
    our_session_id: i32,
    leader_session_id: Arc<AtomicI32>,
}

impl ClusterPublication {
    fn is_leader(&self) -> bool {
        self.leader_session_id.load(Ordering::SeqCst) == self.our_session_id
    }
}

impl StreamPublication for ClusterPublication {
    fn try_offer(&self, header: &FrameHeader, payload: &[u8]) -> Result<u64, TransportError> {
        if !self.is_leader() {
            debug!(
                our_session_id = self.our_session_id,
                "suppressing offer while not leader"
            );
            return Err(TransportError::NotLeader);
        }
        self.inner.try_offer(header, payload)
    }

    fn position(&self) -> u64 {
        self.inner.position()
    }
}

/// Subscription that reports zero progress while this node is not the leader.
#[derive(Debug)]
pub struct ClusterSubscription<S: StreamSubscription> {
    inner: S,
    our_session_id: i32,
    leader_session_id: Arc<AtomicI32>,
}

impl<S: StreamSubscription> StreamSubscription for ClusterSubscription<S> {
    fn poll(&mut self, handler: &mut dyn FrameHandler, fragment_limit: usize) -> usize {
        if self.leader_session_id.load(Ordering::SeqCst) != self.our_session_id {
            return 0;
        }
        self.inner.poll(handler, fragment_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::in_process_stream;
    use irongate_core::types::{ConnectionId, LibraryId, SessionId};

    fn header() -> FrameHeader {
        FrameHeader::new(
            1,
            SessionId::new(1),
            ConnectionId::new(1),
            LibraryId::new(1),
        )
    }

    #[test]
    fn test_leader_transmits() {
        let leader = Arc::new(AtomicI32::new(5));
        let streams = ClusterStreams::new(5, Arc::clone(&leader));
        assert!(streams.is_leader());

        let (publication, mut subscription) = in_process_stream(4);
        let publication = streams.publication(Arc::new(publication));

        publication.try_offer(&header(), b"payload").unwrap();

        let mut count = 0;
        let mut handler = |_: &FrameHeader, _: &[u8]| count += 1;
        assert_eq!(subscription.poll(&mut handler, 10), 1);
    }

    #[test]
    fn test_non_leader_is_suppressed() {
        let leader = Arc::new(AtomicI32::new(9));
        let streams = ClusterStreams::new(5, Arc::clone(&leader));
        assert!(!streams.is_leader());

        let (publication, subscription) = in_process_stream(4);
        let publication = streams.publication(Arc::new(publication));
        let mut subscription = streams.subscription(subscription);

        assert_eq!(
            publication.try_offer(&header(), b"payload"),
            Err(TransportError::NotLeader)
        );

        let mut handler = |_: &FrameHeader, _: &[u8]| {};
        assert_eq!(subscription.poll(&mut handler, 10), 0);
    }

    #[test]
    fn test_leadership_change_takes_effect() {
        let leader = Arc::new(AtomicI32::new(0));
        let streams = ClusterStreams::new(5, Arc::clone(&leader));

        let (publication, _subscription) = in_process_stream(4);
        let publication = streams.publication(Arc::new(publication));

        assert!(publication.try_offer(&header(), b"x").is_err());

        leader.store(5, Ordering::SeqCst);
        assert!(publication.try_offer(&header(), b"x").is_ok());
    }
}
