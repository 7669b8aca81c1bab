/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Abstract message streams.
//!
//! A stream carries framed records between gateway components. Producers
//! offer a [`FrameHeader`] plus payload and either receive a position or a
//! back-pressure indication; consumers poll cooperatively. The in-process
//! implementation is a bounded SPSC channel - producers observing a full
//! buffer must retry on a later duty-cycle.

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use irongate_core::error::TransportError;
use irongate_core::types::{ConnectionId, LibraryId, MessageStatus, SessionId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-frame position overhead charged on top of the payload bytes.
const FRAME_OVERHEAD: u64 = 32;

/// Default maximum payload size accepted by a stream.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024;

/// Record tagging applied to every frame written to a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Which logical stream the frame belongs to.
    pub stream_id: u32,
    /// Owning session.
    pub session_id: SessionId,
    /// TCP attach the frame was read from or written to.
    pub connection_id: ConnectionId,
    /// Library worker that owns the session.
    pub library_id: LibraryId,
    /// Wire message type tag (packed FIX type or SBE template id).
    pub message_type: u16,
    /// Sequence reset generation of the session.
    pub sequence_index: u32,
    /// Session-level sequence number of the message.
    pub sequence_number: u64,
    /// Validation status of the frame.
    pub status: MessageStatus,
    /// Capture timestamp in nanoseconds since the Unix epoch.
    pub timestamp_ns: u64,
}

impl FrameHeader {
    /// Creates a header with the given identity, `Ok` status, and zeroed
    /// sequencing fields.
    #[must_use]
    pub fn new(
        stream_id: u32,
        session_id: SessionId,
        connection_id: ConnectionId,
        library_id: LibraryId,
    ) -> Self {
        Self {
            stream_id,
            session_id,
            connection_id,
            library_id,
            message_type: 0,
            sequence_index: 0,
            sequence_number: 0,
            status: MessageStatus::Ok,
            timestamp_ns: 0,
        }
    }
}

/// Producer side of a stream.
pub trait StreamPublication: Send + Sync {
    /// Offers one frame to the stream.
    ///
    /// # Returns
    /// The strictly increasing stream position past the end of this frame.
    ///
    /// # Errors
    /// [`TransportError::BackPressured`] when the stream buffer is full (the
    /// caller retries on a later poll), [`TransportError::FrameTooLarge`] or
    /// [`TransportError::Closed`] otherwise.
    fn try_offer(&self, header: &FrameHeader, payload: &[u8]) -> Result<u64, TransportError>;

    /// Returns the position after the last successfully offered frame.
    fn position(&self) -> u64;
}

/// Callback receiving polled frames.
pub trait FrameHandler {
    /// Called once per polled frame.
    fn on_frame(&mut self, header: &FrameHeader, payload: &[u8]);
}

impl<F: FnMut(&FrameHeader, &[u8])> FrameHandler for F {
    fn on_frame(&mut self, header: &FrameHeader, payload: &[u8]) {
        self(header, payload)
    }
}

/// Consumer side of a stream. Polling is the only progress mechanism and
/// never blocks.
pub trait StreamSubscription {
    /// Reads up to `fragment_limit` frames, invoking the handler for each.
    ///
    /// # Returns
    /// The number of frames consumed.
    fn poll(&mut self, handler: &mut dyn FrameHandler, fragment_limit: usize) -> usize;
}

/// Creates a bounded in-process stream.
///
/// # Arguments
/// * `capacity` - Maximum number of buffered frames before producers see
///   back-pressure
#[must_use]
pub fn in_process_stream(capacity: usize) -> (InProcessPublication, InProcessSubscription) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity);
    let position = Arc::new(AtomicU64::new(0));

    (
        InProcessPublication {
            sender,
            position: Arc::clone(&position),
            max_payload: DEFAULT_MAX_PAYLOAD,
        },
        InProcessSubscription { receiver },
    )
}

/// Producer endpoint of an in-process stream.
#[derive(Debug, Clone)]
pub struct InProcessPublication {
    sender: Sender<(FrameHeader, Bytes)>,
    position: Arc<AtomicU64>,
    max_payload: usize,
}

impl InProcessPublication {
    /// Overrides the maximum accepted payload size.
    #[must_use]
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }
}

impl StreamPublication for InProcessPublication {
    fn try_offer(&self, header: &FrameHeader, payload: &[u8]) -> Result<u64, TransportError> {
        if payload.len() > self.max_payload {
            return Err(TransportError::FrameTooLarge {
                size: payload.len(),
                max_size: self.max_payload,
            });
        }

        let frame = (*header, Bytes::copy_from_slice(payload));
        match self.sender.try_send(frame) {
            Ok(()) => {
                let length = payload.len() as u64 + FRAME_OVERHEAD;
                Ok(self.position.fetch_add(length, Ordering::SeqCst) + length)
            }
            Err(TrySendError::Full(_)) => Err(TransportError::BackPressured),
            Err(TrySendError::Disconnected(_)) => Err(TransportError::Closed),
        }
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::SeqCst)
    }
}

/// Consumer endpoint of an in-process stream.
#[derive(Debug)]
pub struct InProcessSubscription {
    receiver: Receiver<(FrameHeader, Bytes)>,
}

impl StreamSubscription for InProcessSubscription {
    fn poll(&mut self, handler: &mut dyn FrameHandler, fragment_limit: usize) -> usize {
        let mut read = 0;
        while read < fragment_limit {
            match self.receiver.try_recv() {
                Ok((header, payload)) => {
                    handler.on_frame(&header, &payload);
                    read += 1;
                }
                Err(_) => break,
            }
        }
        read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> FrameHeader {
        FrameHeader::new(
            1,
            SessionId::new(2),
            ConnectionId::new(4),
            LibraryId::new(1),
        )
    }

    #[test]
    fn test_offer_and_poll() {
        let (publication, mut subscription) = in_process_stream(8);

        publication.try_offer(&header(), b"hello").unwrap();
        publication.try_offer(&header(), b"world").unwrap();

        let mut seen = Vec::new();
        let mut handler = |_: &FrameHeader, payload: &[u8]| {
            seen.push(payload.to_vec());
        };
        let read = subscription.poll(&mut handler, 10);

        assert_eq!(read, 2);
        assert_eq!(seen, vec![b"hello".to_vec(), b"world".to_vec()]);
    }

    #[test]
    fn test_positions_strictly_increase() {
        let (publication, _subscription) = in_process_stream(8);

        let first = publication.try_offer(&header(), b"a").unwrap();
        let second = publication.try_offer(&header(), b"").unwrap();

        assert!(second > first);
        assert_eq!(publication.position(), second);
    }

    #[test]
    fn test_full_buffer_back_pressures() {
        let (publication, mut subscription) = in_process_stream(1);

        publication.try_offer(&header(), b"one").unwrap();
        assert_eq!(
            publication.try_offer(&header(), b"two"),
            Err(TransportError::BackPressured)
        );

        // Draining frees the slot; the retry then succeeds.
        let mut handler = |_: &FrameHeader, _: &[u8]| {};
        assert_eq!(subscription.poll(&mut handler, 10), 1);
        assert!(publication.try_offer(&header(), b"two").is_ok());
    }

    #[test]
    fn test_fragment_limit_is_respected() {
        let (publication, mut subscription) = in_process_stream(8);
        for _ in 0..5 {
            publication.try_offer(&header(), b"x").unwrap();
        }

        let mut count = 0;
        let mut handler = |_: &FrameHeader, _: &[u8]| count += 1;
        assert_eq!(subscription.poll(&mut handler, 3), 3);
        assert_eq!(count, 3);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let (publication, _subscription) = in_process_stream(1);
        let publication = publication.with_max_payload(4);

        assert!(matches!(
            publication.try_offer(&header(), b"too big"),
            Err(TransportError::FrameTooLarge { size: 7, .. })
        ));
    }
}
