/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The reordering buffer.
//!
//! One ring of payload bytes plus an index of `(timestamp, origin, range)`
//! records. Releases are gated on
//! `min(latest inbound ts, latest outbound ts, replay watermark)`; ties
//! break by insertion order. After a drain the live bytes are relocated to
//! the buffer head whenever they exceed the configured compaction size, so
//! the buffer position stays bounded.

use crate::consumer::{FixMessageConsumer, IlinkMessageConsumer, LoggerConfiguration};
use bytes::{BufMut, BytesMut};
use irongate_transport::stream::{FrameHeader, StreamSubscription};
use std::ops::Range;
use tracing::warn;

/// Which input stream a buffered record arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Inbound,
    Outbound,
}

/// Wire family of a buffered record, decided by payload sniffing: FIX
/// tag=value always opens with `8=`, anything else is SBE binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Fix,
    Ilink,
}

#[derive(Debug)]
struct Record {
    timestamp_ns: u64,
    #[allow(dead_code)]
    origin: Origin,
    family: Family,
    header: FrameHeader,
    range: Range<usize>,
}

/// Merges two message streams and a watermark stream into one
/// timestamp-ordered stream.
pub struct FixMessageLogger {
    inbound: Box<dyn StreamSubscription>,
    outbound: Box<dyn StreamSubscription>,
    replay: Box<dyn StreamSubscription>,
    fix_consumer: Box<dyn FixMessageConsumer>,
    ilink_consumer: Box<dyn IlinkMessageConsumer>,

    buffer: BytesMut,
    records: Vec<Record>,
    compaction_size: usize,
    poll_fragment_limit: usize,

    latest_inbound_ts: u64,
    latest_outbound_ts: u64,
    /// Monotonic max of replay watermarks seen.
    watermark_ts: u64,
    last_emitted_ts: u64,
    discontinuity_count: u64,
}

impl FixMessageLogger {
    /// Creates a logger over the three input streams.
    #[must_use]
    pub fn new(
        configuration: LoggerConfiguration,
        inbound: Box<dyn StreamSubscription>,
        outbound: Box<dyn StreamSubscription>,
        replay: Box<dyn StreamSubscription>,
        fix_consumer: Box<dyn FixMessageConsumer>,
        ilink_consumer: Box<dyn IlinkMessageConsumer>,
    ) -> Self {
        Self {
            inbound,
            outbound,
            replay,
            fix_consumer,
            ilink_consumer,
            buffer: BytesMut::new(),
            records: Vec::new(),
            compaction_size: configuration.compaction_size,
            poll_fragment_limit: configuration.poll_fragment_limit,
            latest_inbound_ts: 0,
            latest_outbound_ts: 0,
            watermark_ts: 0,
            last_emitted_ts: 0,
            discontinuity_count: 0,
        }
    }

    /// Returns the live byte-range of the reordering buffer.
    #[must_use]
    pub fn buffer_position(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the number of buffered, not yet released records.
    #[must_use]
    pub fn buffered_record_count(&self) -> usize {
        self.records.len()
    }

    /// Returns how many out-of-order records have been dropped.
    #[must_use]
    pub const fn discontinuity_count(&self) -> u64 {
        self.discontinuity_count
    }

    /// One cooperative duty cycle: polls all three inputs, then releases
    /// every record at or below the gate.
    ///
    /// # Returns
    /// The number of frames read plus records released.
    pub fn do_work(&mut self) -> usize {
        let limit = self.poll_fragment_limit;
        let mut progress = 0;

        let mut polled: Vec<(FrameHeader, Vec<u8>)> = Vec::new();
        {
            let mut handler = |header: &FrameHeader, payload: &[u8]| {
                polled.push((*header, payload.to_vec()));
            };
            progress += self.inbound.poll(&mut handler, limit);
        }
        for (header, payload) in polled.drain(..) {
            self.append(Origin::Inbound, header, &payload);
        }

        {
            let mut handler = |header: &FrameHeader, payload: &[u8]| {
                polled.push((*header, payload.to_vec()));
            };
            progress += self.outbound.poll(&mut handler, limit);
        }
        for (header, payload) in polled.drain(..) {
            self.append(Origin::Outbound, header, &payload);
        }

        {
            let mut handler = |header: &FrameHeader, _payload: &[u8]| {
                polled.push((*header, Vec::new()));
            };
            progress += self.replay.poll(&mut handler, limit);
        }
        for (header, _) in polled.drain(..) {
            self.watermark_ts = self.watermark_ts.max(header.timestamp_ns);
        }

        progress + self.drain()
    }

    fn append(&mut self, origin: Origin, header: FrameHeader, payload: &[u8]) {
        let timestamp_ns = header.timestamp_ns;

        if timestamp_ns < self.last_emitted_ts {
            self.discontinuity_count += 1;
            warn!(
                timestamp_ns,
                last_emitted_ts = self.last_emitted_ts,
                "dropping record behind the emitted watermark"
            );
            return;
        }

        match origin {
            Origin::Inbound => {
                self.latest_inbound_ts = self.latest_inbound_ts.max(timestamp_ns);
            }
            Origin::Outbound => {
                self.latest_outbound_ts = self.latest_outbound_ts.max(timestamp_ns);
            }
        }

        let family = if payload.starts_with(b"8=") {
            Family::Fix
        } else {
            Family::Ilink
        };

        let start = self.buffer.len();
        self.buffer.put_slice(payload);
        self.records.push(Record {
            timestamp_ns,
            origin,
            family,
            header,
            range: start..start + payload.len(),
        });
    }

    /// Releases every buffered record with a timestamp at or below the gate,
    /// in ascending timestamp order, then compacts the buffer.
    fn drain(&mut self) -> usize {
        let gate = self
            .latest_inbound_ts
            .min(self.latest_outbound_ts)
            .min(self.watermark_ts);

        if self.records.iter().all(|r| r.timestamp_ns > gate) {
            return 0;
        }

        // Stable sort preserves insertion order for equal timestamps.
        self.records.sort_by_key(|r| r.timestamp_ns);

        let mut released = 0;
        let mut remaining = Vec::with_capacity(self.records.len());
        for record in self.records.drain(..) {
            if record.timestamp_ns <= gate {
                let payload = &self.buffer[record.range.clone()];
                match record.family {
                    Family::Fix => self.fix_consumer.on_message(&record.header, payload),
                    Family::Ilink => self.ilink_consumer.on_message(&record.header, payload),
                }
                self.last_emitted_ts = record.timestamp_ns;
                released += 1;
            } else {
                remaining.push(record);
            }
        }
        self.records = remaining;

        if self.buffer.len() > self.compaction_size {
            self.compact();
        }

        released
    }

    /// Relocates the remaining live payloads to the buffer head.
    fn compact(&mut self) {
        let mut compacted = BytesMut::with_capacity(self.compaction_size);
        for record in &mut self.records {
            let start = compacted.len();
            compacted.put_slice(&self.buffer[record.range.clone()]);
            record.range = start..compacted.len();
        }
        self.buffer = compacted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irongate_core::types::{ConnectionId, LibraryId, SessionId};
    use irongate_transport::stream::{InProcessPublication, in_process_stream};
    use irongate_transport::StreamPublication;
    use std::cell::RefCell;
    use std::rc::Rc;

    const COMPACTION_SIZE: usize = 64;

    struct RecordingConsumer {
        timestamps: Rc<RefCell<Vec<u64>>>,
    }

    impl FixMessageConsumer for RecordingConsumer {
        fn on_message(&mut self, header: &FrameHeader, _payload: &[u8]) {
            self.timestamps.borrow_mut().push(header.timestamp_ns);
        }
    }

    impl IlinkMessageConsumer for RecordingConsumer {
        fn on_message(&mut self, header: &FrameHeader, _payload: &[u8]) {
            self.timestamps.borrow_mut().push(header.timestamp_ns);
        }
    }

    struct Harness {
        logger: FixMessageLogger,
        inbound: InProcessPublication,
        outbound: InProcessPublication,
        replay: InProcessPublication,
        fix_timestamps: Rc<RefCell<Vec<u64>>>,
        ilink_timestamps: Rc<RefCell<Vec<u64>>>,
    }

    impl Harness {
        fn new() -> Self {
            let (inbound_pub, inbound_sub) = in_process_stream(64);
            let (outbound_pub, outbound_sub) = in_process_stream(64);
            let (replay_pub, replay_sub) = in_process_stream(64);

            let fix_timestamps = Rc::new(RefCell::new(Vec::new()));
            let ilink_timestamps = Rc::new(RefCell::new(Vec::new()));

            let logger = FixMessageLogger::new(
                LoggerConfiguration::default().with_compaction_size(COMPACTION_SIZE),
                Box::new(inbound_sub),
                Box::new(outbound_sub),
                Box::new(replay_sub),
                Box::new(RecordingConsumer {
                    timestamps: Rc::clone(&fix_timestamps),
                }),
                Box::new(RecordingConsumer {
                    timestamps: Rc::clone(&ilink_timestamps),
                }),
            );

            Self {
                logger,
                inbound: inbound_pub,
                outbound: outbound_pub,
                replay: replay_pub,
                fix_timestamps,
                ilink_timestamps,
            }
        }

        fn header(timestamp_ns: u64) -> FrameHeader {
            let mut header = FrameHeader::new(
                1,
                SessionId::new(2),
                ConnectionId::new(4),
                LibraryId::new(1),
            );
            header.timestamp_ns = timestamp_ns;
            header
        }

        fn on_inbound(&self, timestamp_ns: u64) {
            self.inbound
                .try_offer(&Self::header(timestamp_ns), b"8=FIXMSG\x01")
                .unwrap();
        }

        fn on_outbound(&self, timestamp_ns: u64) {
            self.outbound
                .try_offer(&Self::header(timestamp_ns), b"8=FIXMSG\x01")
                .unwrap();
        }

        fn on_watermark(&self, timestamp_ns: u64) {
            self.replay
                .try_offer(&Self::header(timestamp_ns), b"")
                .unwrap();
        }

        fn fix_seen(&self) -> Vec<u64> {
            self.fix_timestamps.borrow().clone()
        }

        fn clear_seen(&self) {
            self.fix_timestamps.borrow_mut().clear();
        }
    }

    #[test]
    fn test_reorders_messages_by_timestamp() {
        let mut harness = Harness::new();

        harness.on_inbound(2);
        harness.on_inbound(3);
        harness.on_inbound(4);
        harness.on_outbound(1);
        harness.on_outbound(5);
        harness.on_outbound(7);
        harness.on_inbound(6);
        harness.on_watermark(10);

        harness.logger.do_work();
        assert_eq!(harness.fix_seen(), vec![1, 2, 3, 4, 5, 6]);
        harness.clear_seen();

        // A message arriving later advances the inbound gate past 7.
        harness.on_inbound(8);
        harness.logger.do_work();
        assert_eq!(harness.fix_seen(), vec![7]);
        harness.clear_seen();

        assert!(
            harness.logger.buffer_position() <= COMPACTION_SIZE,
            "failed to reshuffle"
        );

        harness.on_inbound(9);
        harness.on_outbound(10);
        harness.logger.do_work();
        assert_eq!(harness.fix_seen(), vec![8, 9]);
    }

    #[test]
    fn test_nothing_released_until_all_streams_advance() {
        let mut harness = Harness::new();

        harness.on_inbound(1);
        harness.on_inbound(2);
        harness.on_watermark(10);
        harness.logger.do_work();

        // The outbound stream has not advanced; nothing may be released.
        assert!(harness.fix_seen().is_empty());
        assert_eq!(harness.logger.buffered_record_count(), 2);

        // Outbound reaches 3: the inbound records clear, 3 itself waits for
        // the inbound stream to pass it.
        harness.on_outbound(3);
        harness.logger.do_work();
        assert_eq!(harness.fix_seen(), vec![1, 2]);
        assert_eq!(harness.logger.buffered_record_count(), 1);

        harness.on_inbound(4);
        harness.logger.do_work();
        assert_eq!(harness.fix_seen(), vec![1, 2, 3]);
    }

    #[test]
    fn test_emitted_timestamps_are_non_decreasing() {
        let mut harness = Harness::new();

        for &ts in &[5, 2, 9, 4] {
            harness.on_inbound(ts);
        }
        for &ts in &[3, 8, 1, 7] {
            harness.on_outbound(ts);
        }
        harness.on_watermark(100);
        harness.logger.do_work();

        let seen = harness.fix_seen();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn test_late_record_is_dropped_and_counted() {
        let mut harness = Harness::new();

        harness.on_inbound(5);
        harness.on_outbound(6);
        harness.on_watermark(10);
        harness.logger.do_work();
        assert_eq!(harness.fix_seen(), vec![5]);

        // Behind the emitted watermark: dropped, not stalled.
        harness.on_inbound(3);
        harness.logger.do_work();
        assert_eq!(harness.logger.discontinuity_count(), 1);
        assert_eq!(harness.fix_seen(), vec![5]);

        harness.on_inbound(7);
        harness.on_outbound(8);
        harness.logger.do_work();
        assert_eq!(harness.fix_seen(), vec![5, 6, 7]);
    }

    #[test]
    fn test_watermark_regression_is_ignored() {
        let mut harness = Harness::new();

        harness.on_watermark(10);
        harness.on_watermark(4);
        harness.on_inbound(5);
        harness.on_outbound(6);
        harness.logger.do_work();

        // The gate stays at the maximum watermark seen.
        assert_eq!(harness.fix_seen(), vec![5]);
    }

    #[test]
    fn test_binary_payloads_route_to_ilink_consumer() {
        let mut harness = Harness::new();

        harness
            .inbound
            .try_offer(&Harness::header(1), &[0x10, 0x00, 0xF4, 0x01])
            .unwrap();
        harness.on_outbound(2);
        harness.on_inbound(3);
        harness.on_watermark(10);
        harness.logger.do_work();

        assert_eq!(*harness.ilink_timestamps.borrow(), vec![1]);
        assert_eq!(harness.fix_seen(), vec![2]);
    }

    #[test]
    fn test_compaction_bounds_buffer_position() {
        let mut harness = Harness::new();

        // Enough traffic to overflow the 64-byte compaction threshold.
        for ts in 1..=20u64 {
            harness.on_inbound(ts);
            harness.on_outbound(ts);
        }
        harness.on_watermark(50);
        harness.logger.do_work();

        assert_eq!(harness.logger.buffered_record_count(), 0);
        assert!(harness.logger.buffer_position() <= COMPACTION_SIZE);
    }
}
