/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The FIXP connection state machine.
//!
//! Mirrors the FIX session lifecycle over the binary Negotiate -> Establish
//! -> Terminate protocol. A connection is mutated by exactly one worker and
//! progresses only through `on_message` and `poll`. Back-pressure never
//! blocks: refused handshake sends park the connection in one of the retry
//! states (`RetryNegotiate`, `RetryEstablish`, `ResendTerminate`,
//! `ResendTerminateAck`), which are invisible to the peer and re-attempted
//! on every poll.

use crate::messages::{
    Establish, FixpMessage, Negotiate, NotApplied, RetransmitRequest, Retransmission, Sequence,
    Terminate,
};
use bytes::{Bytes, BytesMut};
use irongate_core::clock::EpochNanoClock;
use irongate_core::error::FixpError;
use irongate_core::types::{ConnectionId, DisconnectReason, LibraryId, MessageStatus, SessionId};
use irongate_transport::stream::{FrameHeader, StreamPublication};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sentinel for "no retransmit operation in progress".
pub const NOT_AWAITING_RETRANSMIT: i64 = -1;

/// Internal state of a FIXP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixpState {
    /// TCP established; Negotiate not sent yet.
    Connected,
    /// Negotiate sent; awaiting the response.
    SentNegotiate,
    /// Negotiate refused by back-pressure; poll retries the send.
    RetryNegotiate,
    /// The peer rejected the negotiation.
    NegotiateRejected,
    /// Negotiation accepted; Establish not sent yet.
    Negotiated,
    /// Establish sent; awaiting the ack.
    SentEstablish,
    /// Establish refused by back-pressure; poll retries the send.
    RetryEstablish,
    /// The peer rejected the establishment.
    EstablishRejected,
    /// Established; business messages flow.
    Established,
    /// Republishing a range in response to a NotApplied.
    Retransmitting,
    /// One keepalive interval elapsed without peer traffic.
    AwaitingKeepalive,
    /// An initiating Terminate was refused by back-pressure.
    ResendTerminate,
    /// An acknowledging Terminate was refused by back-pressure.
    ResendTerminateAck,
    /// Awaiting the reply to our Terminate.
    Unbinding,
    /// We initiated a terminate and await the acknowledging Terminate.
    SentTerminate,
    /// Disconnected at the TCP level.
    Unbound,
}

impl FixpState {
    /// Returns the state name for diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Connected => "CONNECTED",
            Self::SentNegotiate => "SENT_NEGOTIATE",
            Self::RetryNegotiate => "RETRY_NEGOTIATE",
            Self::NegotiateRejected => "NEGOTIATE_REJECTED",
            Self::Negotiated => "NEGOTIATED",
            Self::SentEstablish => "SENT_ESTABLISH",
            Self::RetryEstablish => "RETRY_ESTABLISH",
            Self::EstablishRejected => "ESTABLISH_REJECTED",
            Self::Established => "ESTABLISHED",
            Self::Retransmitting => "RETRANSMITTING",
            Self::AwaitingKeepalive => "AWAITING_KEEPALIVE",
            Self::ResendTerminate => "RESEND_TERMINATE",
            Self::ResendTerminateAck => "RESEND_TERMINATE_ACK",
            Self::Unbinding => "UNBINDING",
            Self::SentTerminate => "SENT_TERMINATE",
            Self::Unbound => "UNBOUND",
        }
    }
}

/// Outcome of processing one inbound session message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixpAction {
    /// Nothing notable happened.
    None,
    /// Negotiation was accepted; the Establish has been initiated.
    Negotiated,
    /// The connection is established.
    Established,
    /// The peer rejected the negotiation.
    NegotiateRejected {
        /// Reject code from the wire.
        error_codes: u16,
    },
    /// The peer rejected the establishment.
    EstablishRejected {
        /// Reject code from the wire.
        error_codes: u16,
    },
    /// A NotApplied started a retransmission.
    Retransmitting {
        /// First republished sequence number.
        from_seq_no: u64,
        /// Number of messages to republish.
        msg_count: u32,
    },
    /// The connection terminated.
    Terminated,
}

/// The FIXP connection state machine.
pub struct FixpConnection {
    session_id: SessionId,
    connection_id: ConnectionId,
    library_id: LibraryId,
    stream_id: u32,

    state: FixpState,
    uuid: u64,
    last_uuid: u64,
    next_sent_seq_no: u64,
    next_recv_seq_no: u64,
    retransmit_fill_seq_no: i64,
    next_retransmit_seq_no: i64,
    /// State to return to once a retransmission completes.
    pre_retransmit_state: FixpState,

    keep_alive_interval_ns: u64,
    last_sent_ns: u64,
    last_received_ns: u64,

    /// Outstanding claimed frame, if any.
    claim: Option<BytesMut>,
    /// Committed business frames kept for NotApplied republishing.
    sent_cache: BTreeMap<u64, Bytes>,
    /// Business frames refused by the transport, flushed in order by poll.
    pending: VecDeque<(u16, u64, Bytes)>,
    /// Error codes for a Terminate awaiting resend.
    terminate_error_codes: u16,
    disconnect_reason: Option<DisconnectReason>,

    publication: Arc<dyn StreamPublication>,
    clock: Arc<dyn EpochNanoClock>,
}

impl FixpConnection {
    /// Creates a connection in the `Connected` state.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        connection_id: ConnectionId,
        library_id: LibraryId,
        stream_id: u32,
        keep_alive_interval_ms: u64,
        publication: Arc<dyn StreamPublication>,
        clock: Arc<dyn EpochNanoClock>,
    ) -> Self {
        let now = clock.nanos();
        Self {
            session_id,
            connection_id,
            library_id,
            stream_id,
            state: FixpState::Connected,
            uuid: 0,
            last_uuid: 0,
            next_sent_seq_no: 1,
            next_recv_seq_no: 1,
            retransmit_fill_seq_no: NOT_AWAITING_RETRANSMIT,
            next_retransmit_seq_no: NOT_AWAITING_RETRANSMIT,
            pre_retransmit_state: FixpState::Established,
            keep_alive_interval_ns: keep_alive_interval_ms * 1_000_000,
            last_sent_ns: now,
            last_received_ns: now,
            claim: None,
            sent_cache: BTreeMap::new(),
            pending: VecDeque::new(),
            terminate_error_codes: 0,
            disconnect_reason: None,
            publication,
            clock,
        }
    }

    // -----------------------------------------------
    // Accessors
    // -----------------------------------------------

    /// Returns the UUID of the current connection.
    #[must_use]
    pub const fn uuid(&self) -> u64 {
        self.uuid
    }

    /// Returns the UUID of the last successful connection.
    #[must_use]
    pub const fn last_uuid(&self) -> u64 {
        self.last_uuid
    }

    /// Returns the connection id.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> FixpState {
        self.state
    }

    /// Returns the next sequence number for an outgoing business message.
    #[must_use]
    pub const fn next_sent_seq_no(&self) -> u64 {
        self.next_sent_seq_no
    }

    /// Sets the next outgoing sequence number.
    pub fn set_next_sent_seq_no(&mut self, seq_no: u64) {
        self.next_sent_seq_no = seq_no;
    }

    /// Returns the next expected inbound sequence number.
    #[must_use]
    pub const fn next_recv_seq_no(&self) -> u64 {
        self.next_recv_seq_no
    }

    /// Sets the next expected inbound sequence number.
    pub fn set_next_recv_seq_no(&mut self, seq_no: u64) {
        self.next_recv_seq_no = seq_no;
    }

    /// Returns the sequence number that completes the current
    /// retransmission, or [`NOT_AWAITING_RETRANSMIT`].
    #[must_use]
    pub const fn retransmit_fill_seq_no(&self) -> i64 {
        self.retransmit_fill_seq_no
    }

    /// Returns the next sequence number to republish in the current
    /// retransmission, or [`NOT_AWAITING_RETRANSMIT`].
    #[must_use]
    pub const fn next_retransmit_seq_no(&self) -> i64 {
        self.next_retransmit_seq_no
    }

    /// Returns why the connection unbound, once it has.
    #[must_use]
    pub const fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.disconnect_reason
    }

    /// Returns true if a business message can be sent right now.
    #[must_use]
    pub const fn can_send_message(&self) -> bool {
        matches!(
            self.state,
            FixpState::Established | FixpState::AwaitingKeepalive
        )
    }

    // -----------------------------------------------
    // Handshake operations
    // -----------------------------------------------

    /// Sends the Negotiate, assigning a fresh UUID.
    ///
    /// # Errors
    /// `FixpError::NotConnected` outside the `Connected` state. On
    /// back-pressure the connection parks in `RetryNegotiate` and the send
    /// is re-attempted by `poll`; no error is surfaced.
    pub fn negotiate(&mut self) -> Result<u64, FixpError> {
        if self.state != FixpState::Connected {
            return Err(FixpError::NotConnected {
                state: self.state.name(),
            });
        }

        self.last_uuid = self.uuid;
        self.uuid = self.clock.nanos();
        info!(uuid = self.uuid, last_uuid = self.last_uuid, "negotiating");

        Ok(self.send_negotiate())
    }

    fn send_negotiate(&mut self) -> u64 {
        let message = Negotiate {
            uuid: self.uuid,
            request_timestamp: self.clock.nanos(),
        };
        let mut buf = BytesMut::new();
        message.encode(&mut buf);

        match self.offer_session_frame(crate::messages::TemplateId::Negotiate as u16, &buf.freeze())
        {
            Ok(position) => {
                self.state = FixpState::SentNegotiate;
                position
            }
            Err(_) => {
                self.state = FixpState::RetryNegotiate;
                0
            }
        }
    }

    fn send_establish(&mut self) -> u64 {
        let message = Establish {
            uuid: self.uuid,
            request_timestamp: self.clock.nanos(),
            next_seq_no: self.next_sent_seq_no,
            keep_alive_interval_ms: (self.keep_alive_interval_ns / 1_000_000) as u16,
        };
        let mut buf = BytesMut::new();
        message.encode(&mut buf);

        match self.offer_session_frame(crate::messages::TemplateId::Establish as u16, &buf.freeze())
        {
            Ok(position) => {
                self.state = FixpState::SentEstablish;
                position
            }
            Err(_) => {
                self.state = FixpState::RetryEstablish;
                0
            }
        }
    }

    /// Initiates a termination with the given error codes.
    ///
    /// On back-pressure the connection parks in `ResendTerminate` and the
    /// send is re-attempted by `poll`.
    pub fn terminate(&mut self, error_codes: u16) -> u64 {
        self.terminate_error_codes = error_codes;
        self.send_terminate(FixpState::SentTerminate, FixpState::ResendTerminate)
    }

    fn send_terminate(&mut self, on_sent: FixpState, on_refused: FixpState) -> u64 {
        let message = Terminate {
            uuid: self.uuid,
            request_timestamp: self.clock.nanos(),
            error_codes: self.terminate_error_codes,
        };
        let mut buf = BytesMut::new();
        message.encode(&mut buf);

        match self.offer_session_frame(crate::messages::TemplateId::Terminate as u16, &buf.freeze())
        {
            Ok(position) => {
                self.state = on_sent;
                if on_sent == FixpState::Unbound {
                    self.record_unbound(DisconnectReason::ApplicationRequested);
                }
                position
            }
            Err(_) => {
                self.state = on_refused;
                0
            }
        }
    }

    /// Disconnects immediately with no Terminate message.
    pub fn request_disconnect(&mut self, reason: DisconnectReason) {
        if self.state != FixpState::Unbound {
            self.state = FixpState::Unbound;
            self.record_unbound(reason);
        }
    }

    /// Rebinds an unbound connection to a fresh TCP attach.
    pub fn bind_connection(&mut self, connection_id: ConnectionId) {
        debug_assert_eq!(self.state, FixpState::Unbound);
        self.connection_id = connection_id;
        self.disconnect_reason = None;
        self.state = FixpState::Connected;
        let now = self.clock.nanos();
        self.last_sent_ns = now;
        self.last_received_ns = now;
    }

    /// Sends a Sequence message announcing the current sent position.
    ///
    /// # Errors
    /// `FixpError::NotConnected` unless established;
    /// `FixpError::BackPressured` if the transport refuses (retry on a later
    /// poll).
    pub fn try_send_sequence(&mut self) -> Result<u64, FixpError> {
        if !self.can_send_message() {
            return Err(FixpError::NotConnected {
                state: self.state.name(),
            });
        }
        self.offer_sequence(false)
    }

    /// Sends a custom RetransmitRequest, optionally referencing the
    /// previous connection's UUID to recover its tail.
    ///
    /// # Errors
    /// `FixpError::NotConnected` unless established;
    /// `FixpError::BackPressured` if the transport refuses.
    pub fn try_retransmit_request(
        &mut self,
        uuid: u64,
        from_seq_no: u64,
        msg_count: u16,
    ) -> Result<u64, FixpError> {
        if !self.can_send_message() {
            return Err(FixpError::NotConnected {
                state: self.state.name(),
            });
        }

        let message = RetransmitRequest {
            uuid,
            last_uuid: self.uuid,
            request_timestamp: self.clock.nanos(),
            from_seq_no,
            msg_count,
        };
        let mut buf = BytesMut::new();
        message.encode(&mut buf);
        self.offer_session_frame(
            crate::messages::TemplateId::RetransmitRequest as u16,
            &buf.freeze(),
        )
    }

    // -----------------------------------------------
    // Business sends
    // -----------------------------------------------

    /// Claims a slot for a business message of `length` bytes (SBE header
    /// included). Fill the returned slice, then call [`commit`](Self::commit)
    /// or [`abort`](Self::abort) before any other send or poll.
    ///
    /// # Errors
    /// `FixpError::NotConnected` unless established or awaiting keepalive;
    /// `FixpError::BackPressured` while earlier refused frames are still
    /// queued.
    ///
    /// # Panics
    /// Panics if a claim is already outstanding.
    pub fn try_claim(&mut self, length: usize) -> Result<&mut [u8], FixpError> {
        assert!(
            self.claim.is_none(),
            "claim already outstanding: commit or abort first"
        );

        if !self.can_send_message() {
            return Err(FixpError::NotConnected {
                state: self.state.name(),
            });
        }
        if !self.pending.is_empty() {
            return Err(FixpError::BackPressured);
        }

        let mut buffer = BytesMut::with_capacity(length);
        buffer.resize(length, 0);
        self.claim = Some(buffer);
        Ok(&mut self.claim.as_mut().expect("just set")[..])
    }

    /// Commits the claimed frame, assigning the next sequence number.
    ///
    /// # Returns
    /// The stream position, or 0 if the transport refused and the frame was
    /// queued for the next poll. Either way the sequence number is consumed
    /// and the frame is retained for NotApplied republishing.
    ///
    /// # Panics
    /// Panics if no claim is outstanding.
    pub fn commit(&mut self) -> u64 {
        let buffer = self.claim.take().expect("commit without claim");
        let bytes = buffer.freeze();
        let template_id = business_template_id(&bytes);
        let seq_num = self.next_sent_seq_no;
        self.next_sent_seq_no += 1;
        self.sent_cache.insert(seq_num, bytes.clone());

        match self.offer_frame(template_id, seq_num, &bytes, MessageStatus::Ok) {
            Ok(position) => position,
            Err(_) => {
                self.pending.push_back((template_id, seq_num, bytes));
                0
            }
        }
    }

    /// Aborts the claimed frame without sending.
    ///
    /// # Panics
    /// Panics if no claim is outstanding.
    pub fn abort(&mut self) {
        self.claim.take().expect("abort without claim");
    }

    // -----------------------------------------------
    // Inbound dispatch
    // -----------------------------------------------

    /// Processes one inbound session message.
    pub fn on_message(&mut self, message: &FixpMessage, receive_time_ns: u64) -> FixpAction {
        if self.state == FixpState::Unbound {
            return FixpAction::None;
        }
        self.last_received_ns = receive_time_ns;

        match message {
            FixpMessage::NegotiationResponse(response) => {
                if !matches!(
                    self.state,
                    FixpState::SentNegotiate | FixpState::RetryNegotiate
                ) {
                    warn!(state = self.state.name(), "unexpected negotiation response");
                    return FixpAction::None;
                }
                debug!(
                    uuid = response.uuid,
                    previous_uuid = response.previous_uuid,
                    "negotiation accepted"
                );
                self.state = FixpState::Negotiated;
                self.send_establish();
                FixpAction::Negotiated
            }
            FixpMessage::NegotiationReject(reject) => {
                warn!(error_codes = reject.error_codes, "negotiation rejected");
                self.state = FixpState::NegotiateRejected;
                self.disconnect_reason = Some(DisconnectReason::NegotiateReject);
                FixpAction::NegotiateRejected {
                    error_codes: reject.error_codes,
                }
            }
            FixpMessage::EstablishmentAck(ack) => {
                if !matches!(
                    self.state,
                    FixpState::SentEstablish | FixpState::RetryEstablish
                ) {
                    warn!(state = self.state.name(), "unexpected establishment ack");
                    return FixpAction::None;
                }
                self.next_recv_seq_no = ack.next_seq_no;
                self.keep_alive_interval_ns =
                    u64::from(ack.keep_alive_interval_ms) * 1_000_000;
                self.state = FixpState::Established;
                info!(uuid = self.uuid, "connection established");
                FixpAction::Established
            }
            FixpMessage::EstablishmentReject(reject) => {
                warn!(error_codes = reject.error_codes, "establishment rejected");
                self.state = FixpState::EstablishRejected;
                self.disconnect_reason = Some(DisconnectReason::EstablishReject);
                FixpAction::EstablishRejected {
                    error_codes: reject.error_codes,
                }
            }
            FixpMessage::Sequence(sequence) => {
                if sequence.next_seq_no > self.next_recv_seq_no && self.can_send_message() {
                    // The peer is ahead of us: recover the missed range.
                    let from = self.next_recv_seq_no;
                    let count = (sequence.next_seq_no - from).min(u64::from(u16::MAX)) as u16;
                    self.next_retransmit_seq_no = from as i64;
                    let _ = self.try_retransmit_request(self.uuid, from, count);
                }
                FixpAction::None
            }
            FixpMessage::Terminate(terminate) => self.on_terminate(terminate),
            FixpMessage::NotApplied(not_applied) => self.on_not_applied(not_applied),
            FixpMessage::RetransmitRequest(request) => {
                self.on_retransmit_request(request);
                FixpAction::None
            }
            FixpMessage::Retransmission(retransmission) => {
                debug!(
                    from_seq_no = retransmission.from_seq_no,
                    msg_count = retransmission.msg_count,
                    "peer retransmission starting"
                );
                FixpAction::None
            }
            FixpMessage::Negotiate(_) | FixpMessage::Establish(_) => {
                warn!("acceptor-side message on an initiator connection");
                FixpAction::None
            }
        }
    }

    fn on_terminate(&mut self, terminate: &Terminate) -> FixpAction {
        if matches!(self.state, FixpState::SentTerminate | FixpState::Unbinding) {
            // The peer acknowledged our terminate.
            self.state = FixpState::Unbound;
            self.record_unbound(DisconnectReason::ApplicationRequested);
            return FixpAction::Terminated;
        }

        info!(error_codes = terminate.error_codes, "peer initiated terminate");
        self.terminate_error_codes = 0;
        self.disconnect_reason = Some(DisconnectReason::RemoteDisconnect);
        self.send_terminate(FixpState::Unbound, FixpState::ResendTerminateAck);
        FixpAction::Terminated
    }

    fn on_not_applied(&mut self, not_applied: &NotApplied) -> FixpAction {
        if !self.can_send_message() {
            warn!(state = self.state.name(), "NotApplied outside established");
            return FixpAction::None;
        }

        let from = not_applied.from_seq_no;
        let fill = from + u64::from(not_applied.msg_count) - 1;
        info!(from, fill, "NotApplied received, retransmitting");

        self.pre_retransmit_state = self.state;
        self.state = FixpState::Retransmitting;
        self.retransmit_fill_seq_no = fill as i64;
        self.next_retransmit_seq_no = from as i64;

        self.continue_retransmit();
        FixpAction::Retransmitting {
            from_seq_no: from,
            msg_count: not_applied.msg_count,
        }
    }

    fn on_retransmit_request(&mut self, request: &RetransmitRequest) {
        if request.uuid != self.uuid && request.uuid != self.last_uuid {
            warn!(uuid = request.uuid, "retransmit request for unknown uuid");
            return;
        }

        let announce = Retransmission {
            uuid: request.uuid,
            last_uuid: request.last_uuid,
            request_timestamp: request.request_timestamp,
            from_seq_no: request.from_seq_no,
            msg_count: request.msg_count,
        };
        let mut buf = BytesMut::new();
        announce.encode(&mut buf);
        let _ = self.offer_session_frame(
            crate::messages::TemplateId::Retransmission as u16,
            &buf.freeze(),
        );

        let fill = request.from_seq_no + u64::from(request.msg_count) - 1;
        self.pre_retransmit_state = self.state;
        self.state = FixpState::Retransmitting;
        self.retransmit_fill_seq_no = fill as i64;
        self.next_retransmit_seq_no = request.from_seq_no as i64;
        self.continue_retransmit();
    }

    /// Republishes cached frames from `next_retransmit_seq_no` through the
    /// fill sequence, stopping on back-pressure. Completion restores the
    /// prior state and clears both cursors to the sentinel.
    fn continue_retransmit(&mut self) {
        while self.next_retransmit_seq_no != NOT_AWAITING_RETRANSMIT
            && self.next_retransmit_seq_no <= self.retransmit_fill_seq_no
        {
            let seq_num = self.next_retransmit_seq_no as u64;
            let Some(bytes) = self.sent_cache.get(&seq_num).cloned() else {
                warn!(seq_num, "no retained frame to retransmit, skipping");
                self.next_retransmit_seq_no += 1;
                continue;
            };

            let template_id = business_template_id(&bytes);
            if self
                .offer_frame(template_id, seq_num, &bytes, MessageStatus::CatchupReplay)
                .is_err()
            {
                return;
            }
            self.next_retransmit_seq_no += 1;
        }

        self.on_replay_complete();
    }

    /// Clears the retransmission cursors and restores the prior state.
    fn on_replay_complete(&mut self) {
        if self.state == FixpState::Retransmitting {
            self.state = self.pre_retransmit_state;
        }
        self.retransmit_fill_seq_no = NOT_AWAITING_RETRANSMIT;
        self.next_retransmit_seq_no = NOT_AWAITING_RETRANSMIT;
    }

    // -----------------------------------------------
    // Duty cycle
    // -----------------------------------------------

    /// Drives retries and keepalive timers. Never blocks.
    ///
    /// Keepalive cadence from the last received message: one interval parks
    /// the connection in `AwaitingKeepalive` and probes with a Sequence;
    /// two intervals send Terminate and enter `Unbinding`; three intervals
    /// drop the TCP connection.
    ///
    /// # Returns
    /// The number of units of work performed.
    pub fn poll(&mut self, now_ns: u64) -> usize {
        let mut work = 0;

        match self.state {
            FixpState::RetryNegotiate => {
                self.send_negotiate();
                return usize::from(self.state == FixpState::SentNegotiate);
            }
            FixpState::RetryEstablish => {
                self.send_establish();
                return usize::from(self.state == FixpState::SentEstablish);
            }
            FixpState::ResendTerminate => {
                self.send_terminate(FixpState::SentTerminate, FixpState::ResendTerminate);
                return usize::from(self.state == FixpState::SentTerminate);
            }
            FixpState::ResendTerminateAck => {
                self.send_terminate(FixpState::Unbound, FixpState::ResendTerminateAck);
                if self.state == FixpState::Unbound {
                    self.disconnect_reason = Some(DisconnectReason::RemoteDisconnect);
                    return 1;
                }
                return 0;
            }
            FixpState::Retransmitting => {
                self.continue_retransmit();
                work += 1;
            }
            _ => {}
        }

        work += self.flush_pending();

        let quiet_ns = now_ns.saturating_sub(self.last_received_ns);
        match self.state {
            FixpState::Established => {
                if quiet_ns >= self.keep_alive_interval_ns {
                    self.state = FixpState::AwaitingKeepalive;
                    let _ = self.offer_sequence(true);
                    work += 1;
                } else if now_ns.saturating_sub(self.last_sent_ns) >= self.keep_alive_interval_ns {
                    // Keep our own side of the keepalive contract.
                    let _ = self.offer_sequence(false);
                    work += 1;
                }
            }
            FixpState::AwaitingKeepalive => {
                if quiet_ns >= 2 * self.keep_alive_interval_ns {
                    warn!(uuid = self.uuid, "keepalive lapsed twice, terminating");
                    self.terminate_error_codes = 0;
                    self.send_terminate(FixpState::Unbinding, FixpState::ResendTerminate);
                    work += 1;
                }
            }
            FixpState::Unbinding => {
                if quiet_ns >= 3 * self.keep_alive_interval_ns {
                    self.state = FixpState::Unbound;
                    self.record_unbound(DisconnectReason::KeepaliveTimeout);
                    work += 1;
                }
            }
            _ => {}
        }

        work
    }

    fn flush_pending(&mut self) -> usize {
        let mut work = 0;
        while let Some((template_id, seq_num, bytes)) = self.pending.pop_front() {
            if self
                .offer_frame(template_id, seq_num, &bytes, MessageStatus::Ok)
                .is_ok()
            {
                work += 1;
            } else {
                self.pending.push_front((template_id, seq_num, bytes));
                break;
            }
        }
        work
    }

    // -----------------------------------------------
    // Plumbing
    // -----------------------------------------------

    fn offer_sequence(&mut self, keep_alive_lapsed: bool) -> Result<u64, FixpError> {
        let message = Sequence {
            uuid: self.uuid,
            next_seq_no: self.next_sent_seq_no,
            keep_alive_lapsed,
        };
        let mut buf = BytesMut::new();
        message.encode(&mut buf);
        self.offer_session_frame(crate::messages::TemplateId::Sequence as u16, &buf.freeze())
    }

    fn offer_session_frame(&mut self, template_id: u16, bytes: &Bytes) -> Result<u64, FixpError> {
        self.offer_frame(template_id, 0, bytes, MessageStatus::Ok)
    }

    fn offer_frame(
        &mut self,
        template_id: u16,
        seq_num: u64,
        bytes: &Bytes,
        status: MessageStatus,
    ) -> Result<u64, FixpError> {
        let header = FrameHeader {
            stream_id: self.stream_id,
            session_id: self.session_id,
            connection_id: self.connection_id,
            library_id: self.library_id,
            message_type: template_id,
            sequence_index: 0,
            sequence_number: seq_num,
            status,
            timestamp_ns: self.clock.nanos(),
        };

        let position = self
            .publication
            .try_offer(&header, bytes)
            .map_err(|_| FixpError::BackPressured)?;
        self.last_sent_ns = self.clock.nanos();
        Ok(position)
    }

    fn record_unbound(&mut self, reason: DisconnectReason) {
        info!(uuid = self.uuid, %reason, "connection unbound");
        if self.disconnect_reason.is_none() {
            self.disconnect_reason = Some(reason);
        }
        self.claim = None;
        self.pending.clear();
        self.retransmit_fill_seq_no = NOT_AWAITING_RETRANSMIT;
        self.next_retransmit_seq_no = NOT_AWAITING_RETRANSMIT;
    }
}

/// Reads the template id from a claimed business frame's SBE header.
fn business_template_id(bytes: &Bytes) -> u16 {
    if bytes.len() >= 4 {
        u16::from_le_bytes([bytes[2], bytes[3]])
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{
        EstablishmentAck, EstablishmentReject, NegotiationReject, NegotiationResponse,
        SBE_HEADER_LEN,
    };
    use irongate_core::clock::ManualClock;
    use irongate_transport::stream::{
        InProcessPublication, InProcessSubscription, StreamSubscription, in_process_stream,
    };

    const SECOND_NS: u64 = 1_000_000_000;

    struct Fixture {
        connection: FixpConnection,
        subscription: InProcessSubscription,
        publication: InProcessPublication,
        clock: ManualClock,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_capacity(64)
        }

        fn with_capacity(capacity: usize) -> Self {
            let clock = ManualClock::new(1_000);
            let (publication, subscription) = in_process_stream(capacity);
            let connection = FixpConnection::new(
                SessionId::new(2),
                ConnectionId::new(4),
                LibraryId::new(1),
                7,
                1_000,
                Arc::new(publication.clone()),
                Arc::new(clock.clone()),
            );
            Self {
                connection,
                subscription,
                publication,
                clock,
            }
        }

        fn establish(&mut self) {
            self.connection.negotiate().unwrap();
            self.connection.on_message(
                &FixpMessage::NegotiationResponse(NegotiationResponse {
                    uuid: self.connection.uuid(),
                    request_timestamp: 0,
                    previous_uuid: 0,
                    previous_seq_no: 0,
                }),
                self.clock.nanos(),
            );
            self.connection.on_message(
                &FixpMessage::EstablishmentAck(EstablishmentAck {
                    uuid: self.connection.uuid(),
                    request_timestamp: 0,
                    next_seq_no: 1,
                    keep_alive_interval_ms: 1_000,
                }),
                self.clock.nanos(),
            );
            assert_eq!(self.connection.state(), FixpState::Established);
            self.drain();
        }

        fn drain(&mut self) -> Vec<(FrameHeader, Vec<u8>)> {
            let mut frames = Vec::new();
            let mut handler = |header: &FrameHeader, payload: &[u8]| {
                frames.push((*header, payload.to_vec()));
            };
            self.subscription.poll(&mut handler, 64);
            frames
        }

        fn send_business(&mut self, marker: u8) -> u64 {
            let frame = self.connection.try_claim(SBE_HEADER_LEN + 8).unwrap();
            frame[2] = 0xE8;
            frame[3] = 0x03; // template 1000
            frame[SBE_HEADER_LEN] = marker;
            self.connection.commit()
        }
    }

    #[test]
    fn test_negotiate_establish_handshake() {
        let mut fixture = Fixture::new();

        fixture.connection.negotiate().unwrap();
        assert_eq!(fixture.connection.state(), FixpState::SentNegotiate);
        assert_eq!(fixture.connection.uuid(), 1_000);

        let action = fixture.connection.on_message(
            &FixpMessage::NegotiationResponse(NegotiationResponse {
                uuid: fixture.connection.uuid(),
                request_timestamp: 0,
                previous_uuid: 0,
                previous_seq_no: 0,
            }),
            fixture.clock.nanos(),
        );
        assert_eq!(action, FixpAction::Negotiated);
        assert_eq!(fixture.connection.state(), FixpState::SentEstablish);

        let action = fixture.connection.on_message(
            &FixpMessage::EstablishmentAck(EstablishmentAck {
                uuid: fixture.connection.uuid(),
                request_timestamp: 0,
                next_seq_no: 5,
                keep_alive_interval_ms: 2_000,
            }),
            fixture.clock.nanos(),
        );
        assert_eq!(action, FixpAction::Established);
        assert_eq!(fixture.connection.state(), FixpState::Established);
        assert_eq!(fixture.connection.next_recv_seq_no(), 5);
        assert!(fixture.connection.can_send_message());

        let frames = fixture.drain();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].0.message_type, TemplateIdWire::NEGOTIATE);
        assert_eq!(frames[1].0.message_type, TemplateIdWire::ESTABLISH);
    }

    /// Wire values asserted in tests.
    struct TemplateIdWire;
    impl TemplateIdWire {
        const NEGOTIATE: u16 = 500;
        const ESTABLISH: u16 = 503;
        const SEQUENCE: u16 = 506;
        const TERMINATE: u16 = 507;
    }

    #[test]
    fn test_negotiate_assigns_fresh_uuid_and_keeps_last() {
        let mut fixture = Fixture::new();

        fixture.connection.negotiate().unwrap();
        let first_uuid = fixture.connection.uuid();

        fixture
            .connection
            .request_disconnect(DisconnectReason::RemoteDisconnect);
        fixture.connection.bind_connection(ConnectionId::new(5));
        fixture.clock.advance(123);
        fixture.connection.negotiate().unwrap();

        assert_eq!(fixture.connection.last_uuid(), first_uuid);
        assert_ne!(fixture.connection.uuid(), first_uuid);
    }

    #[test]
    fn test_claim_requires_established() {
        let mut fixture = Fixture::new();
        assert!(matches!(
            fixture.connection.try_claim(16),
            Err(FixpError::NotConnected { state: "CONNECTED" })
        ));
    }

    #[test]
    #[should_panic(expected = "claim already outstanding")]
    fn test_double_claim_panics() {
        let mut fixture = Fixture::new();
        fixture.establish();
        let _ = fixture.connection.try_claim(16).map(|_| ());
        let _ = fixture.connection.try_claim(16);
    }

    #[test]
    #[should_panic(expected = "commit without claim")]
    fn test_commit_without_claim_panics() {
        let mut fixture = Fixture::new();
        fixture.establish();
        fixture.connection.commit();
    }

    #[test]
    fn test_claim_commit_assigns_sequence() {
        let mut fixture = Fixture::new();
        fixture.establish();

        assert_eq!(fixture.connection.next_sent_seq_no(), 1);
        let position = fixture.send_business(0xAA);
        assert!(position > 0);
        assert_eq!(fixture.connection.next_sent_seq_no(), 2);

        let frames = fixture.drain();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0.sequence_number, 1);
        assert_eq!(frames[0].0.message_type, 1000);
        assert_eq!(frames[0].1[SBE_HEADER_LEN], 0xAA);
    }

    #[test]
    fn test_abort_releases_claim() {
        let mut fixture = Fixture::new();
        fixture.establish();

        let _ = fixture.connection.try_claim(16).unwrap();
        fixture.connection.abort();

        // A fresh claim succeeds and nothing hit the wire.
        let _ = fixture.connection.try_claim(16).unwrap();
        fixture.connection.abort();
        assert!(fixture.drain().is_empty());
        assert_eq!(fixture.connection.next_sent_seq_no(), 1);
    }

    #[test]
    fn test_not_applied_retransmits_range() {
        let mut fixture = Fixture::new();
        fixture.establish();
        fixture.connection.set_next_sent_seq_no(20);

        fixture.send_business(20);
        fixture.send_business(21);
        fixture.send_business(22);
        fixture.drain();

        let action = fixture.connection.on_message(
            &FixpMessage::NotApplied(NotApplied {
                uuid: fixture.connection.uuid(),
                from_seq_no: 20,
                msg_count: 3,
            }),
            fixture.clock.nanos(),
        );
        assert_eq!(
            action,
            FixpAction::Retransmitting {
                from_seq_no: 20,
                msg_count: 3
            }
        );

        // The replay completed inline: back to established, sentinel reset.
        assert_eq!(fixture.connection.state(), FixpState::Established);
        assert_eq!(
            fixture.connection.retransmit_fill_seq_no(),
            NOT_AWAITING_RETRANSMIT
        );
        assert_eq!(
            fixture.connection.next_retransmit_seq_no(),
            NOT_AWAITING_RETRANSMIT
        );

        let frames = fixture.drain();
        assert_eq!(frames.len(), 3);
        for (index, (header, payload)) in frames.iter().enumerate() {
            assert_eq!(header.sequence_number, 20 + index as u64);
            assert_eq!(header.status, MessageStatus::CatchupReplay);
            assert_eq!(payload[SBE_HEADER_LEN], 20 + index as u8);
        }
    }

    #[test]
    fn test_not_applied_with_back_pressure_resumes_on_poll() {
        let mut fixture = Fixture::with_capacity(2);
        fixture.establish();
        fixture.connection.set_next_sent_seq_no(20);

        fixture.send_business(20);
        fixture.drain();
        fixture.send_business(21);
        fixture.send_business(22);
        fixture.drain();

        // Capacity 2: the third republish is refused mid-replay.
        fixture.connection.on_message(
            &FixpMessage::NotApplied(NotApplied {
                uuid: fixture.connection.uuid(),
                from_seq_no: 20,
                msg_count: 3,
            }),
            fixture.clock.nanos(),
        );
        assert_eq!(fixture.connection.state(), FixpState::Retransmitting);
        assert_eq!(fixture.connection.retransmit_fill_seq_no(), 22);
        assert_eq!(fixture.connection.next_retransmit_seq_no(), 22);

        let first = fixture.drain();
        assert_eq!(first.len(), 2);

        fixture.connection.poll(fixture.clock.nanos());
        assert_eq!(fixture.connection.state(), FixpState::Established);
        assert_eq!(
            fixture.connection.retransmit_fill_seq_no(),
            NOT_AWAITING_RETRANSMIT
        );

        let rest = fixture.drain();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].0.sequence_number, 22);
    }

    #[test]
    fn test_keepalive_cadence() {
        let mut fixture = Fixture::new();
        fixture.establish();

        // One quiet interval: probe and await.
        fixture.clock.advance(SECOND_NS);
        fixture.connection.poll(fixture.clock.nanos());
        assert_eq!(fixture.connection.state(), FixpState::AwaitingKeepalive);
        let frames = fixture.drain();
        assert_eq!(frames[0].0.message_type, TemplateIdWire::SEQUENCE);

        // Two quiet intervals: terminate and unbind.
        fixture.clock.advance(SECOND_NS);
        fixture.connection.poll(fixture.clock.nanos());
        assert_eq!(fixture.connection.state(), FixpState::Unbinding);
        let frames = fixture.drain();
        assert_eq!(frames[0].0.message_type, TemplateIdWire::TERMINATE);

        // Three quiet intervals: drop the TCP connection.
        fixture.clock.advance(SECOND_NS);
        fixture.connection.poll(fixture.clock.nanos());
        assert_eq!(fixture.connection.state(), FixpState::Unbound);
        assert_eq!(
            fixture.connection.disconnect_reason(),
            Some(DisconnectReason::KeepaliveTimeout)
        );
    }

    #[test]
    fn test_peer_traffic_defers_keepalive() {
        let mut fixture = Fixture::new();
        fixture.establish();

        fixture.clock.advance(SECOND_NS / 2);
        fixture.connection.on_message(
            &FixpMessage::Sequence(Sequence {
                uuid: fixture.connection.uuid(),
                next_seq_no: 1,
                keep_alive_lapsed: false,
            }),
            fixture.clock.nanos(),
        );

        fixture.clock.advance(SECOND_NS / 2);
        fixture.connection.poll(fixture.clock.nanos());
        assert_eq!(fixture.connection.state(), FixpState::Established);
    }

    #[test]
    fn test_send_side_keepalive_emits_sequence() {
        let mut fixture = Fixture::new();
        fixture.establish();

        // Peer keeps talking but we are quiet: we still probe.
        fixture.clock.advance(SECOND_NS - 1);
        fixture.connection.on_message(
            &FixpMessage::Sequence(Sequence {
                uuid: fixture.connection.uuid(),
                next_seq_no: 1,
                keep_alive_lapsed: false,
            }),
            fixture.clock.nanos(),
        );
        fixture.clock.advance(1);
        fixture.connection.poll(fixture.clock.nanos());

        assert_eq!(fixture.connection.state(), FixpState::Established);
        let frames = fixture.drain();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0.message_type, TemplateIdWire::SEQUENCE);
    }

    #[test]
    fn test_terminate_handshake() {
        let mut fixture = Fixture::new();
        fixture.establish();

        fixture.connection.terminate(0);
        assert_eq!(fixture.connection.state(), FixpState::SentTerminate);

        let action = fixture.connection.on_message(
            &FixpMessage::Terminate(Terminate {
                uuid: fixture.connection.uuid(),
                request_timestamp: 0,
                error_codes: 0,
            }),
            fixture.clock.nanos(),
        );
        assert_eq!(action, FixpAction::Terminated);
        assert_eq!(fixture.connection.state(), FixpState::Unbound);
    }

    #[test]
    fn test_peer_terminate_is_acknowledged() {
        let mut fixture = Fixture::new();
        fixture.establish();

        let action = fixture.connection.on_message(
            &FixpMessage::Terminate(Terminate {
                uuid: fixture.connection.uuid(),
                request_timestamp: 0,
                error_codes: 3,
            }),
            fixture.clock.nanos(),
        );
        assert_eq!(action, FixpAction::Terminated);
        assert_eq!(fixture.connection.state(), FixpState::Unbound);

        let frames = fixture.drain();
        assert_eq!(
            frames.last().unwrap().0.message_type,
            TemplateIdWire::TERMINATE
        );
    }

    #[test]
    fn test_rejects_park_connection() {
        let mut fixture = Fixture::new();
        fixture.connection.negotiate().unwrap();

        let action = fixture.connection.on_message(
            &FixpMessage::NegotiationReject(NegotiationReject {
                uuid: fixture.connection.uuid(),
                request_timestamp: 0,
                error_codes: 7,
            }),
            fixture.clock.nanos(),
        );
        assert_eq!(action, FixpAction::NegotiateRejected { error_codes: 7 });
        assert_eq!(fixture.connection.state(), FixpState::NegotiateRejected);

        let mut other = Fixture::new();
        other.connection.negotiate().unwrap();
        other.connection.on_message(
            &FixpMessage::NegotiationResponse(NegotiationResponse {
                uuid: other.connection.uuid(),
                request_timestamp: 0,
                previous_uuid: 0,
                previous_seq_no: 0,
            }),
            other.clock.nanos(),
        );
        let action = other.connection.on_message(
            &FixpMessage::EstablishmentReject(EstablishmentReject {
                uuid: other.connection.uuid(),
                request_timestamp: 0,
                error_codes: 9,
            }),
            other.clock.nanos(),
        );
        assert_eq!(action, FixpAction::EstablishRejected { error_codes: 9 });
        assert_eq!(other.connection.state(), FixpState::EstablishRejected);
    }

    #[test]
    fn test_retry_negotiate_is_transparent() {
        let mut fixture = Fixture::with_capacity(1);

        // Fill the stream so the Negotiate is refused.
        let junk_header = FrameHeader::new(
            7,
            SessionId::new(2),
            ConnectionId::new(4),
            LibraryId::new(1),
        );
        fixture.publication.try_offer(&junk_header, b"junk").unwrap();

        fixture.connection.negotiate().unwrap();
        assert_eq!(fixture.connection.state(), FixpState::RetryNegotiate);

        fixture.drain();
        fixture.connection.poll(fixture.clock.nanos());
        assert_eq!(fixture.connection.state(), FixpState::SentNegotiate);
    }

    #[test]
    fn test_sequence_gap_requests_retransmit() {
        let mut fixture = Fixture::new();
        fixture.establish();

        fixture.connection.on_message(
            &FixpMessage::Sequence(Sequence {
                uuid: fixture.connection.uuid(),
                next_seq_no: 11,
                keep_alive_lapsed: false,
            }),
            fixture.clock.nanos(),
        );

        let frames = fixture.drain();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0.message_type, 508);
        let decoded = FixpMessage::decode(&frames[0].1).unwrap();
        let FixpMessage::RetransmitRequest(request) = decoded else {
            panic!("expected retransmit request");
        };
        assert_eq!(request.from_seq_no, 1);
        assert_eq!(request.msg_count, 10);
    }
}
