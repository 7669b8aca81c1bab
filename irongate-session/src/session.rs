/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The FIX session state machine.
//!
//! One `Session` owns the lifecycle of a single logical FIX session: logon,
//! heartbeats, sequencing, resend, logout, and disconnect. It is mutated by
//! exactly one worker; progress happens only through [`Session::on_message`]
//! and [`Session::poll`], and neither ever blocks. Transport refusals are
//! recorded as pending work and retried on the next poll, ahead of any later
//! send, so the on-wire order always matches the order of successful sends.

use crate::admin::{AdminMessage, LogonView};
use crate::config::SessionConfig;
use crate::heartbeat::HeartbeatState;
use crate::state::{Action, PendingWork, SessionState};
use bytes::Bytes;
use irongate_core::clock::EpochNanoClock;
use irongate_core::error::SessionError;
use irongate_core::field::tags;
use irongate_core::message::{MsgType, OwnedMessage, RawMessage};
use irongate_core::types::{
    ConnectionId, DisconnectReason, LibraryId, MessageStatus, PersistenceMode, SessionId, Timestamp,
};
use irongate_store::{MessageStore, StoredMessage};
use irongate_tagvalue::{Decoder, MessageBuilder};
use irongate_transport::stream::{FrameHeader, StreamPublication};
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// SessionStatus (tag 1409) value sent when rejecting an unexpected
/// mid-stream sequence reset.
const SESSION_STATUS_SEQ_NUM_NOT_VALID: u64 = 5;

/// Validates logon credentials on the acceptor side.
pub trait SessionAuthenticator: Send + Sync {
    /// Returns true if the logon should be accepted.
    fn authenticate(&self, logon: &LogonView<'_>) -> bool;
}

/// Authenticator that accepts every logon.
#[derive(Debug, Default)]
pub struct AcceptAllAuthenticator;

impl SessionAuthenticator for AcceptAllAuthenticator {
    fn authenticate(&self, _logon: &LogonView<'_>) -> bool {
        true
    }
}

/// Which side of the session this instance plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// We connect out and send the first Logon.
    Initiator,
    /// We accept the connection and wait for the counterparty's Logon.
    Acceptor,
}

/// The FIX session state machine.
pub struct Session {
    config: SessionConfig,
    role: SessionRole,
    session_id: SessionId,
    connection_id: ConnectionId,
    library_id: LibraryId,

    state: SessionState,
    next_sent_seq_no: u64,
    next_recv_seq_no: u64,
    sequence_index: u32,
    heartbeat: HeartbeatState,

    /// End of the gap currently being recovered (valid in `AwaitingResend`).
    awaiting_resend_to: u64,
    /// Admin message that triggered the gap; consumed but not yet counted.
    gap_trigger_seq: Option<u64>,
    /// Application messages received beyond the gap, keyed by sequence.
    queued_beyond_gap: VecDeque<(u64, OwnedMessage)>,

    /// Sends refused by the transport, retried in order by `poll`.
    pending: VecDeque<PendingWork>,

    logout_deadline_ns: Option<u64>,
    logout_reason: DisconnectReason,
    last_logout_position: u64,
    disconnect_reason: Option<DisconnectReason>,
    test_req_counter: u64,

    publication: Arc<dyn StreamPublication>,
    store: Arc<dyn MessageStore>,
    clock: Arc<dyn EpochNanoClock>,
    authenticator: Arc<dyn SessionAuthenticator>,
}

impl Session {
    /// Creates an initiating session in the `Connected` state.
    #[must_use]
    pub fn initiator(
        config: SessionConfig,
        session_id: SessionId,
        connection_id: ConnectionId,
        library_id: LibraryId,
        publication: Arc<dyn StreamPublication>,
        store: Arc<dyn MessageStore>,
        clock: Arc<dyn EpochNanoClock>,
    ) -> Self {
        Self::new(
            config,
            SessionRole::Initiator,
            SessionState::Connected,
            session_id,
            connection_id,
            library_id,
            publication,
            store,
            clock,
        )
    }

    /// Creates an accepting session in the `AwaitingLogon` state.
    #[must_use]
    pub fn acceptor(
        config: SessionConfig,
        session_id: SessionId,
        connection_id: ConnectionId,
        library_id: LibraryId,
        publication: Arc<dyn StreamPublication>,
        store: Arc<dyn MessageStore>,
        clock: Arc<dyn EpochNanoClock>,
    ) -> Self {
        Self::new(
            config,
            SessionRole::Acceptor,
            SessionState::AwaitingLogon,
            session_id,
            connection_id,
            library_id,
            publication,
            store,
            clock,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn new(
        config: SessionConfig,
        role: SessionRole,
        state: SessionState,
        session_id: SessionId,
        connection_id: ConnectionId,
        library_id: LibraryId,
        publication: Arc<dyn StreamPublication>,
        store: Arc<dyn MessageStore>,
        clock: Arc<dyn EpochNanoClock>,
    ) -> Self {
        let now = clock.nanos();
        let heartbeat = HeartbeatState::new(config.heartbeat_interval_ms(), now);

        Self {
            config,
            role,
            session_id,
            connection_id,
            library_id,
            state,
            next_sent_seq_no: 1,
            next_recv_seq_no: 1,
            sequence_index: 0,
            heartbeat,
            awaiting_resend_to: 0,
            gap_trigger_seq: None,
            queued_beyond_gap: VecDeque::new(),
            pending: VecDeque::new(),
            logout_deadline_ns: None,
            logout_reason: DisconnectReason::ApplicationRequested,
            last_logout_position: 0,
            disconnect_reason: None,
            test_req_counter: 0,
            publication,
            store,
            clock,
            authenticator: Arc::new(AcceptAllAuthenticator),
        }
    }

    /// Replaces the logon authenticator (acceptor side).
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn SessionAuthenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    // -----------------------------------------------
    // Accessors
    // -----------------------------------------------

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the stable session id.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Returns the current connection id.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Returns the owning library id.
    #[must_use]
    pub const fn library_id(&self) -> LibraryId {
        self.library_id
    }

    /// Reassigns the owning library.
    pub fn set_library_id(&mut self, library_id: LibraryId) {
        self.library_id = library_id;
    }

    /// Returns the next sequence number for an outgoing message.
    #[must_use]
    pub const fn next_sent_seq_no(&self) -> u64 {
        self.next_sent_seq_no
    }

    /// Sets the next outgoing sequence number.
    pub fn set_next_sent_seq_no(&mut self, seq_no: u64) {
        self.next_sent_seq_no = seq_no;
    }

    /// Returns the next expected incoming sequence number.
    #[must_use]
    pub const fn next_recv_seq_no(&self) -> u64 {
        self.next_recv_seq_no
    }

    /// Sets the next expected incoming sequence number.
    pub fn set_next_recv_seq_no(&mut self, seq_no: u64) {
        self.next_recv_seq_no = seq_no;
    }

    /// Returns the sequence reset generation.
    #[must_use]
    pub const fn sequence_index(&self) -> u32 {
        self.sequence_index
    }

    /// Returns why the session disconnected, once it has.
    #[must_use]
    pub const fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.disconnect_reason
    }

    /// Returns true if a back-pressured send is awaiting retry.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        !self.pending.is_empty()
    }

    // -----------------------------------------------
    // User operations
    // -----------------------------------------------

    /// Sends the initial Logon (initiator only).
    ///
    /// # Errors
    /// `SessionError::NotConnected` outside the `Connected` state;
    /// `SessionError::BackPressured` if the transport refuses (retry the
    /// call - no state has changed).
    pub fn connect(&mut self) -> Result<u64, SessionError> {
        if self.state == SessionState::Disabled {
            return Err(SessionError::SessionDisabled);
        }
        if self.role != SessionRole::Initiator || self.state != SessionState::Connected {
            return Err(SessionError::NotConnected {
                state: self.state.name(),
            });
        }

        // Guarded so a retry after back-pressure does not bump the
        // generation twice.
        if self.config.reset_seq_num_on_logon
            && (self.next_sent_seq_no != 1 || self.next_recv_seq_no != 1)
        {
            self.reset_sequence_numbers();
        }

        let heart_bt_secs = self.config.heartbeat_interval.as_secs();
        let reset = self.config.reset_seq_num_on_logon;
        let username = self.config.username.clone();
        let password = self.config.password.clone();

        let position = self.send_admin_now(MsgType::Logon, |builder| {
            builder.put_uint(tags::ENCRYPT_METHOD, 0);
            builder.put_uint(tags::HEART_BT_INT, heart_bt_secs);
            if reset {
                builder.put_bool(tags::RESET_SEQ_NUM_FLAG, true);
            }
            if let Some(username) = &username {
                builder.put_str(tags::USERNAME, username);
            }
            if let Some(password) = &password {
                builder.put_str(tags::PASSWORD, password);
            }
        })?;

        info!(session_id = %self.session_id, "logon sent, awaiting reply");
        self.state = SessionState::SentLogon;
        Ok(position)
    }

    /// Sends an application message, assigning the next sequence number.
    ///
    /// The body closure receives the builder after the standard header has
    /// been stamped.
    ///
    /// # Errors
    /// `SessionError::NotConnected` unless the session is `Active` or
    /// `AwaitingResend`; `SessionError::BackPressured` if a retry is already
    /// outstanding or the transport refuses (the sequence number is not
    /// consumed - retry the call).
    pub fn send_application<F>(&mut self, msg_type: &MsgType, fill: F) -> Result<u64, SessionError>
    where
        F: FnOnce(&mut MessageBuilder),
    {
        if self.state == SessionState::Disabled {
            return Err(SessionError::SessionDisabled);
        }
        if !self.state.can_send_app() {
            return Err(SessionError::NotConnected {
                state: self.state.name(),
            });
        }
        if !self.pending.is_empty() {
            return Err(SessionError::BackPressured);
        }

        let seq_num = self.next_sent_seq_no;
        let bytes = self.build_message(msg_type, seq_num, fill);

        let position = self
            .offer_frame(msg_type, seq_num, &bytes, MessageStatus::Ok)
            .map_err(|_| SessionError::BackPressured)?;

        self.next_sent_seq_no += 1;
        self.record_sent(msg_type.clone(), seq_num, bytes);
        Ok(position)
    }

    /// Initiates a logout. Idempotent: a second call while `AwaitingLogout`
    /// returns the prior position.
    ///
    /// # Errors
    /// `SessionError::NotConnected` if no logon has completed;
    /// `SessionError::BackPressured` if the transport refuses (retry the
    /// call - no state has changed).
    pub fn start_logout(&mut self) -> Result<u64, SessionError> {
        if self.state == SessionState::Disabled {
            return Err(SessionError::SessionDisabled);
        }
        if self.state == SessionState::AwaitingLogout {
            return Ok(self.last_logout_position);
        }
        if !matches!(
            self.state,
            SessionState::Active | SessionState::AwaitingResend | SessionState::SentLogon
        ) {
            return Err(SessionError::NotConnected {
                state: self.state.name(),
            });
        }

        let position = self.send_admin_now(MsgType::Logout, |_| {})?;

        info!(session_id = %self.session_id, "logout sent");
        self.state = SessionState::AwaitingLogout;
        self.logout_reason = DisconnectReason::ApplicationRequested;
        self.last_logout_position = position;
        self.arm_logout_timer();
        Ok(position)
    }

    /// Disconnects immediately without a Logout exchange. Idempotent.
    pub fn request_disconnect(&mut self, reason: DisconnectReason) {
        if self.state != SessionState::Disconnected {
            self.transition_disconnected(reason);
        }
    }

    /// Notifies the session that the TCP connection dropped.
    pub fn on_disconnect(&mut self) {
        if self.state != SessionState::Disconnected {
            self.transition_disconnected(DisconnectReason::RemoteDisconnect);
        }
    }

    /// Administratively disables the session. All user calls are rejected
    /// with `SessionDisabled` until it is re-enabled via
    /// [`Session::bind_connection`].
    pub fn disable(&mut self) {
        if self.state.is_connected() {
            self.transition_disconnected(DisconnectReason::EngineShutdown);
        }
        self.state = SessionState::Disabled;
        info!(session_id = %self.session_id, "session disabled");
    }

    /// Rebinds the session to a fresh connection after a disconnect.
    ///
    /// Sequence counters carry or reset according to the persistence mode,
    /// which [`Session::on_disconnect`] has already applied.
    pub fn bind_connection(&mut self, connection_id: ConnectionId) {
        debug_assert!(matches!(
            self.state,
            SessionState::Disconnected | SessionState::Disabled
        ));
        self.connection_id = connection_id;
        self.disconnect_reason = None;
        self.heartbeat.reset(self.clock.nanos());
        self.state = match self.role {
            SessionRole::Initiator => SessionState::Connected,
            SessionRole::Acceptor => SessionState::AwaitingLogon,
        };
        info!(
            session_id = %self.session_id,
            connection_id = %connection_id,
            "session rebound to new connection"
        );
    }

    // -----------------------------------------------
    // Duty cycle
    // -----------------------------------------------

    /// Drives timers and retries; the only progress mechanism besides
    /// `on_message`. Never blocks.
    ///
    /// # Returns
    /// The number of units of work performed.
    pub fn poll(&mut self, now_ns: u64) -> usize {
        if !self.state.is_connected() {
            return 0;
        }

        let mut work = self.flush_pending();
        if !self.pending.is_empty() {
            return work;
        }

        if self.state == SessionState::AwaitingLogout {
            if let Some(deadline) = self.logout_deadline_ns
                && now_ns >= deadline
            {
                let reason = self.logout_reason;
                self.transition_disconnected(reason);
                work += 1;
            }
            return work;
        }

        if matches!(
            self.state,
            SessionState::Active | SessionState::AwaitingResend
        ) {
            if self.heartbeat.timed_out(now_ns) {
                warn!(
                    session_id = %self.session_id,
                    quiet_ms = self.heartbeat.quiet_ms(now_ns),
                    "heartbeat timeout"
                );
                self.transition_disconnected(DisconnectReason::HeartbeatTimeout);
                return work + 1;
            }

            if self.heartbeat.test_request_due(now_ns) {
                self.test_req_counter += 1;
                let test_req_id = format!("TEST{}", self.test_req_counter);
                let id_for_field = test_req_id.clone();
                self.emit_admin(MsgType::TestRequest, move |builder| {
                    builder.put_str(tags::TEST_REQ_ID, &id_for_field);
                });
                self.heartbeat.on_test_request_sent(now_ns, test_req_id);
                work += 1;
            }

            if self.heartbeat.heartbeat_due(now_ns) {
                self.emit_admin(MsgType::Heartbeat, |_| {});
                work += 1;
            }
        }

        work
    }

    // -----------------------------------------------
    // Inbound dispatch
    // -----------------------------------------------

    /// Processes one inbound message.
    ///
    /// # Arguments
    /// * `message` - The parsed message
    /// * `receive_time_ns` - Capture timestamp of the message
    pub fn on_message(&mut self, message: &RawMessage<'_>, receive_time_ns: u64) -> Action {
        if !self.state.is_connected() {
            return Action::None;
        }

        let Ok(seq_num) = message.msg_seq_num() else {
            warn!(session_id = %self.session_id, "message without MsgSeqNum");
            return self.disconnect_with_logout(DisconnectReason::InvalidFixMessage, "missing tag 34");
        };

        self.heartbeat.on_received(receive_time_ns);

        let admin = match AdminMessage::decode(message) {
            Ok(admin) => admin,
            Err(error) => {
                warn!(session_id = %self.session_id, %error, "malformed admin message");
                return self
                    .disconnect_with_logout(DisconnectReason::InvalidFixMessage, "malformed message");
            }
        };

        match admin {
            Some(AdminMessage::Logon(logon)) => self.on_logon(seq_num, &logon),
            Some(AdminMessage::SequenceReset {
                gap_fill,
                new_seq_no,
            }) => self.on_sequence_reset(seq_num, gap_fill, new_seq_no, message.poss_dup()),
            Some(admin) => self.on_admin(seq_num, &admin, message, receive_time_ns),
            None => self.on_app(seq_num, message),
        }
    }

    fn on_app(&mut self, seq_num: u64, message: &RawMessage<'_>) -> Action {
        let expected = self.next_recv_seq_no;

        if seq_num == expected {
            self.next_recv_seq_no += 1;

            let mut deliverable: SmallVec<[OwnedMessage; 1]> = SmallVec::new();
            deliverable.push(message.to_owned_message());
            self.after_advance(&mut deliverable);
            return Action::Deliver(deliverable);
        }

        if seq_num > expected {
            self.enqueue_beyond_gap(seq_num, message.to_owned_message());
            self.enter_awaiting_resend(expected, seq_num, None);
            return Action::Queue;
        }

        if message.poss_dup() {
            debug!(session_id = %self.session_id, seq_num, "dropping possdup below expected");
            return Action::Consume;
        }

        warn!(
            session_id = %self.session_id,
            expected, received = seq_num, "sequence number too low"
        );
        self.disconnect_with_logout(
            DisconnectReason::MsgSeqNoLow,
            &format!("MsgSeqNum too low, expecting {expected} but received {seq_num}"),
        )
    }

    fn on_admin(
        &mut self,
        seq_num: u64,
        admin: &AdminMessage<'_>,
        message: &RawMessage<'_>,
        receive_time_ns: u64,
    ) -> Action {
        let expected = self.next_recv_seq_no;

        if seq_num < expected {
            if message.poss_dup() {
                return Action::Consume;
            }
            warn!(
                session_id = %self.session_id,
                expected, received = seq_num, "admin sequence number too low"
            );
            return self.disconnect_with_logout(
                DisconnectReason::MsgSeqNoLow,
                &format!("MsgSeqNum too low, expecting {expected} but received {seq_num}"),
            );
        }

        let mut drained: SmallVec<[OwnedMessage; 1]> = SmallVec::new();
        if seq_num == expected {
            self.next_recv_seq_no += 1;
            self.after_advance(&mut drained);
        } else {
            // Process the content but recover the gap before counting it.
            self.enter_awaiting_resend(expected, seq_num, Some(seq_num));
        }

        match admin {
            AdminMessage::Heartbeat { test_req_id } => {
                self.heartbeat.on_heartbeat(receive_time_ns, *test_req_id);
            }
            AdminMessage::TestRequest { test_req_id } => {
                let echoed = test_req_id.to_string();
                self.emit_admin(MsgType::Heartbeat, move |builder| {
                    builder.put_str(tags::TEST_REQ_ID, &echoed);
                });
            }
            AdminMessage::ResendRequest {
                begin_seq_no,
                end_seq_no,
            } => {
                self.on_resend_request(*begin_seq_no, *end_seq_no);
            }
            AdminMessage::Logout { text } => {
                return self.on_logout(text.unwrap_or(""), drained);
            }
            AdminMessage::Reject => {
                warn!(session_id = %self.session_id, seq_num, "reject received");
            }
            AdminMessage::Logon(_) | AdminMessage::SequenceReset { .. } => {
                unreachable!("handled by dedicated dispatch arms")
            }
        }

        if drained.is_empty() {
            Action::Consume
        } else {
            Action::Deliver(drained)
        }
    }

    fn on_logon(&mut self, seq_num: u64, logon: &LogonView<'_>) -> Action {
        match self.state {
            SessionState::SentLogon => self.on_logon_reply(seq_num, logon),
            SessionState::AwaitingLogon | SessionState::Connected => {
                self.on_acceptor_logon(seq_num, logon)
            }
            SessionState::Active | SessionState::AwaitingResend => {
                if logon.reset_seq_num {
                    return self.on_midstream_reset(logon);
                }
                warn!(session_id = %self.session_id, "ignoring duplicate logon");
                Action::Consume
            }
            _ => {
                warn!(
                    session_id = %self.session_id,
                    state = self.state.name(),
                    "unexpected logon"
                );
                Action::Consume
            }
        }
    }

    fn on_logon_reply(&mut self, seq_num: u64, _logon: &LogonView<'_>) -> Action {
        let expected = self.next_recv_seq_no;

        if seq_num == expected {
            self.next_recv_seq_no += 1;
            self.state = SessionState::Active;
            info!(session_id = %self.session_id, "session active");
            Action::Consume
        } else if seq_num > expected {
            self.state = SessionState::Active;
            self.enter_awaiting_resend(expected, seq_num, Some(seq_num));
            Action::Consume
        } else {
            self.disconnect_with_logout(
                DisconnectReason::MsgSeqNoLow,
                &format!("Logon MsgSeqNum too low, expecting {expected} but received {seq_num}"),
            )
        }
    }

    fn on_acceptor_logon(&mut self, seq_num: u64, logon: &LogonView<'_>) -> Action {
        if !self.authenticator.authenticate(logon) {
            warn!(session_id = %self.session_id, "logon authentication rejected");
            return self
                .disconnect_with_logout(DisconnectReason::AuthenticationFailure, "invalid credentials");
        }

        self.heartbeat
            .set_interval_ms(logon.heart_bt_int_secs * 1_000);

        if logon.reset_seq_num {
            self.reset_sequence_numbers();
        }

        let expected = self.next_recv_seq_no;

        if seq_num < expected && !self.config.allow_lower_seqnum_logon {
            return self.disconnect_with_logout(
                DisconnectReason::MsgSeqNoLow,
                &format!("Logon MsgSeqNum too low, expecting {expected} but received {seq_num}"),
            );
        }

        // Reply before any ResendRequest so the counterparty sees the
        // session as established.
        let heart_bt_secs = logon.heart_bt_int_secs;
        let echo_reset = logon.reset_seq_num;
        self.emit_admin(MsgType::Logon, move |builder| {
            builder.put_uint(tags::ENCRYPT_METHOD, 0);
            builder.put_uint(tags::HEART_BT_INT, heart_bt_secs);
            if echo_reset {
                builder.put_bool(tags::RESET_SEQ_NUM_FLAG, true);
            }
        });

        if seq_num > expected {
            self.state = SessionState::Active;
            self.enter_awaiting_resend(expected, seq_num, Some(seq_num));
        } else {
            // In sequence, or an adopted lower sequence number.
            self.next_recv_seq_no = seq_num + 1;
            self.state = SessionState::Active;
        }

        info!(
            session_id = %self.session_id,
            sequence_index = self.sequence_index,
            "acceptor session active"
        );
        Action::Consume
    }

    fn on_midstream_reset(&mut self, _logon: &LogonView<'_>) -> Action {
        if self.config.persistence == PersistenceMode::Persistent {
            warn!(session_id = %self.session_id, "rejecting mid-stream sequence reset");
            let position = self.send_admin_now(MsgType::Logout, |builder| {
                builder.put_uint(tags::SESSION_STATUS, SESSION_STATUS_SEQ_NUM_NOT_VALID);
                builder.put_str(tags::TEXT, "MsgSeqNum not valid: unexpected reset");
            });
            if position.is_ok() {
                self.state = SessionState::AwaitingLogout;
                self.logout_reason = DisconnectReason::MsgSeqNoLow;
                self.arm_logout_timer();
            } else {
                self.transition_disconnected(DisconnectReason::MsgSeqNoLow);
            }
            return Action::Consume;
        }

        self.reset_sequence_numbers();
        self.next_recv_seq_no = 2;
        let heart_bt_secs = self.heartbeat.interval_ms() / 1_000;
        self.emit_admin(MsgType::Logon, move |builder| {
            builder.put_uint(tags::ENCRYPT_METHOD, 0);
            builder.put_uint(tags::HEART_BT_INT, heart_bt_secs);
            builder.put_bool(tags::RESET_SEQ_NUM_FLAG, true);
        });
        Action::Consume
    }

    fn on_sequence_reset(
        &mut self,
        seq_num: u64,
        gap_fill: bool,
        new_seq_no: u64,
        poss_dup: bool,
    ) -> Action {
        if !gap_fill {
            // Reset mode ignores MsgSeqNum entirely.
            if new_seq_no >= self.next_recv_seq_no {
                info!(session_id = %self.session_id, new_seq_no, "sequence reset");
                self.next_recv_seq_no = new_seq_no;
            } else {
                warn!(
                    session_id = %self.session_id,
                    new_seq_no, "ignoring sequence reset below expected"
                );
            }
            return Action::Consume;
        }

        let expected = self.next_recv_seq_no;
        if seq_num > expected {
            self.enter_awaiting_resend(expected, seq_num, Some(seq_num));
            return Action::Consume;
        }
        if seq_num < expected {
            if poss_dup {
                return Action::Consume;
            }
            return self.disconnect_with_logout(
                DisconnectReason::MsgSeqNoLow,
                &format!("MsgSeqNum too low, expecting {expected} but received {seq_num}"),
            );
        }

        if new_seq_no <= expected {
            warn!(
                session_id = %self.session_id,
                new_seq_no, expected, "gap fill does not advance sequence"
            );
            return Action::Consume;
        }

        debug!(session_id = %self.session_id, from = expected, to = new_seq_no, "gap filled");
        self.next_recv_seq_no = new_seq_no;

        let mut drained: SmallVec<[OwnedMessage; 1]> = SmallVec::new();
        self.after_advance(&mut drained);
        if drained.is_empty() {
            Action::Consume
        } else {
            Action::Deliver(drained)
        }
    }

    fn on_logout(&mut self, text: &str, drained: SmallVec<[OwnedMessage; 1]>) -> Action {
        if self.state == SessionState::AwaitingLogout {
            // The counterparty acknowledged our logout.
            let reason = self.logout_reason;
            self.transition_disconnected(reason);
            return Action::Disconnect(reason);
        }

        info!(session_id = %self.session_id, text, "logout received");
        self.emit_admin(MsgType::Logout, |_| {});
        self.state = SessionState::AwaitingLogout;
        self.logout_reason = DisconnectReason::RemoteDisconnect;
        self.arm_logout_timer();

        if drained.is_empty() {
            Action::Consume
        } else {
            Action::Deliver(drained)
        }
    }

    // -----------------------------------------------
    // Gap recovery
    // -----------------------------------------------

    fn enter_awaiting_resend(&mut self, expected: u64, received: u64, trigger: Option<u64>) {
        let gap_end = received - 1;

        if self.state == SessionState::AwaitingResend {
            self.awaiting_resend_to = self.awaiting_resend_to.max(gap_end);
            if let Some(trigger) = trigger {
                self.gap_trigger_seq = Some(self.gap_trigger_seq.map_or(trigger, |t| t.max(trigger)));
            }
            return;
        }

        info!(
            session_id = %self.session_id,
            from = expected, to = gap_end, "sequence gap detected"
        );
        self.awaiting_resend_to = gap_end;
        self.gap_trigger_seq = trigger;
        self.state = SessionState::AwaitingResend;

        self.emit_admin(MsgType::ResendRequest, move |builder| {
            builder.put_uint(tags::BEGIN_SEQ_NO, expected);
            builder.put_uint(tags::END_SEQ_NO, gap_end);
        });
    }

    /// Called whenever `next_recv_seq_no` advances: closes the gap when the
    /// recovery range is exhausted and drains queued messages that have
    /// become in-sequence.
    fn after_advance(&mut self, deliverable: &mut SmallVec<[OwnedMessage; 1]>) {
        if self.state != SessionState::AwaitingResend
            || self.next_recv_seq_no <= self.awaiting_resend_to
        {
            return;
        }

        if let Some(trigger) = self.gap_trigger_seq.take() {
            self.next_recv_seq_no = self.next_recv_seq_no.max(trigger + 1);
        }

        while let Some(&(seq, _)) = self.queued_beyond_gap.front() {
            if seq < self.next_recv_seq_no {
                self.queued_beyond_gap.pop_front();
            } else if seq == self.next_recv_seq_no {
                let (_, message) = self.queued_beyond_gap.pop_front().expect("non-empty");
                self.next_recv_seq_no += 1;
                deliverable.push(message);
            } else {
                break;
            }
        }

        if let Some(&(received, _)) = self.queued_beyond_gap.front() {
            // Messages remain beyond a second gap; recover that one too.
            let expected = self.next_recv_seq_no;
            self.state = SessionState::Active;
            self.enter_awaiting_resend(expected, received, None);
        } else {
            info!(session_id = %self.session_id, "gap closed, session active");
            self.state = SessionState::Active;
            self.awaiting_resend_to = 0;
        }
    }

    fn enqueue_beyond_gap(&mut self, seq_num: u64, message: OwnedMessage) {
        let position = self
            .queued_beyond_gap
            .iter()
            .position(|(queued_seq, _)| *queued_seq >= seq_num);
        match position {
            Some(index) if self.queued_beyond_gap[index].0 == seq_num => {
                // Duplicate of an already queued message.
            }
            Some(index) => self.queued_beyond_gap.insert(index, (seq_num, message)),
            None => self.queued_beyond_gap.push_back((seq_num, message)),
        }
    }

    // -----------------------------------------------
    // Resend replay
    // -----------------------------------------------

    fn on_resend_request(&mut self, begin_seq_no: u64, end_seq_no: u64) {
        let last_sent = self.next_sent_seq_no.saturating_sub(1);
        let end = if end_seq_no == 0 {
            last_sent
        } else {
            end_seq_no.min(last_sent)
        };

        if begin_seq_no == 0 || begin_seq_no > end {
            warn!(
                session_id = %self.session_id,
                begin_seq_no, end_seq_no, "unsatisfiable resend request"
            );
            return;
        }

        info!(session_id = %self.session_id, begin_seq_no, end, "replaying range");
        if !self.replay_from(begin_seq_no, end) {
            debug!(session_id = %self.session_id, "replay back-pressured, will resume");
        }
    }

    /// Replays `[begin, end]`, preserving original sequence numbers and
    /// setting PossDupFlag. Admin runs and unretained messages are coalesced
    /// into SequenceReset-GapFill records.
    ///
    /// # Returns
    /// `false` if interrupted by back-pressure; the remainder has been
    /// stashed for the next poll.
    fn replay_from(&mut self, begin: u64, end: u64) -> bool {
        let stored = self
            .store
            .get_range(self.sequence_index, begin, end)
            .unwrap_or_default();
        let mut stored_iter = stored.into_iter().peekable();

        let mut gap_fill_start: Option<u64> = None;
        let mut seq = begin;

        while seq <= end {
            let next_stored_seq = stored_iter.peek().map(|m| m.seq_num);

            if next_stored_seq == Some(seq) {
                let message = stored_iter.next().expect("peeked");
                if message.is_admin() {
                    gap_fill_start.get_or_insert(seq);
                } else {
                    if let Some(run_start) = gap_fill_start.take()
                        && !self.offer_gap_fill(run_start, seq)
                    {
                        self.stash_replay(seq, end, run_start);
                        return false;
                    }
                    if !self.offer_replayed_app(&message) {
                        self.stash_replay(seq, end, seq);
                        return false;
                    }
                }
            } else {
                // Message not retained; cover it with a gap fill.
                gap_fill_start.get_or_insert(seq);
                // Skip any stored entries the range walk has passed.
                while stored_iter.peek().is_some_and(|m| m.seq_num < seq) {
                    stored_iter.next();
                }
            }

            seq += 1;
        }

        if let Some(run_start) = gap_fill_start
            && !self.offer_gap_fill(run_start, end + 1)
        {
            self.stash_replay(end + 1, end, run_start);
            return false;
        }

        true
    }

    fn stash_replay(&mut self, resume_seq: u64, end: u64, run_start: u64) {
        // Resume from the start of the interrupted gap-fill run so the
        // coalesced record is re-attempted whole.
        let begin = resume_seq.min(run_start);
        self.pending.push_front(PendingWork::Replay { begin, end });
    }

    /// Emits a SequenceReset-GapFill covering `[run_start, new_seq_no)`.
    fn offer_gap_fill(&mut self, run_start: u64, new_seq_no: u64) -> bool {
        let now = Timestamp::from_nanos(self.clock.nanos());
        let mut builder = MessageBuilder::new(self.config.begin_string);
        builder.msg_type(MsgType::SequenceReset.as_str());
        builder.put_bool(tags::POSS_DUP_FLAG, true);
        builder.standard_header(
            self.config.sender_comp_id.as_str(),
            self.config.target_comp_id.as_str(),
            run_start,
            now,
        );
        builder.put_bool(tags::GAP_FILL_FLAG, true);
        builder.put_uint(tags::NEW_SEQ_NO, new_seq_no);
        let bytes = builder.finish().freeze();

        self.offer_frame(
            &MsgType::SequenceReset,
            run_start,
            &bytes,
            MessageStatus::CatchupReplay,
        )
        .is_ok()
    }

    /// Re-encodes a stored application message for replay: PossDupFlag set,
    /// SendingTime restamped, the original preserved as OrigSendingTime.
    fn offer_replayed_app(&mut self, stored: &StoredMessage) -> bool {
        let mut decoder = Decoder::new(&stored.bytes);
        let Ok(original) = decoder.decode() else {
            warn!(
                session_id = %self.session_id,
                seq_num = stored.seq_num, "stored message no longer parseable, skipping"
            );
            return true;
        };

        let now = Timestamp::from_nanos(self.clock.nanos());
        let mut builder = MessageBuilder::new(self.config.begin_string);
        builder.msg_type(stored.msg_type.as_str());
        builder.put_bool(tags::POSS_DUP_FLAG, true);

        for field in original.fields() {
            match field.tag {
                tags::BEGIN_STRING
                | tags::BODY_LENGTH
                | tags::CHECK_SUM
                | tags::MSG_TYPE
                | tags::POSS_DUP_FLAG
                | tags::ORIG_SENDING_TIME => {}
                tags::SENDING_TIME => {
                    builder.put_str(tags::SENDING_TIME, now.format_millis().as_str());
                    if let Ok(original_time) = field.as_str() {
                        builder.put_str(tags::ORIG_SENDING_TIME, original_time);
                    }
                }
                tag => builder.put_raw(tag, field.as_bytes()),
            }
        }

        let bytes = builder.finish().freeze();
        self.offer_frame(
            &stored.msg_type,
            stored.seq_num,
            &bytes,
            MessageStatus::CatchupReplay,
        )
        .is_ok()
    }

    // -----------------------------------------------
    // Sending plumbing
    // -----------------------------------------------

    /// Builds a message with the standard header and the caller's body.
    fn build_message<F>(&self, msg_type: &MsgType, seq_num: u64, fill: F) -> Bytes
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
        builder.finish().freeze()
    }

    /// Sends an admin message immediately, without stashing on refusal.
    /// Used by user-initiated operations whose contract is "retry the call".
    fn send_admin_now<F>(&mut self, msg_type: MsgType, fill: F) -> Result<u64, SessionError>
    where
        F: FnOnce(&mut MessageBuilder),
    {
        if !self.pending.is_empty() {
            return Err(SessionError::BackPressured);
        }

        let seq_num = self.next_sent_seq_no;
        let bytes = self.build_message(&msg_type, seq_num, fill);
        let position = self
            .offer_frame(&msg_type, seq_num, &bytes, MessageStatus::Ok)
            .map_err(|_| SessionError::BackPressured)?;

        self.next_sent_seq_no += 1;
        self.record_sent(msg_type, seq_num, bytes);
        Ok(position)
    }

    /// Emits a protocol reply, stashing it for retry if the transport
    /// refuses. The sequence number is consumed either way; the stashed
    /// frame is flushed before any later send.
    fn emit_admin<F>(&mut self, msg_type: MsgType, fill: F)
    where
        F: FnOnce(&mut MessageBuilder),
    {
        let seq_num = self.next_sent_seq_no;
        self.next_sent_seq_no += 1;
        let bytes = self.build_message(&msg_type, seq_num, fill);
        let message_type = packed_message_type(msg_type.as_str());

        self.record_sent(msg_type.clone(), seq_num, bytes.clone());

        if self.pending.is_empty()
            && self
                .offer_frame(&msg_type, seq_num, &bytes, MessageStatus::Ok)
                .is_ok()
        {
            return;
        }

        self.pending.push_back(PendingWork::Frame {
            message_type,
            seq_num,
            bytes,
        });
    }

    fn offer_frame(
        &mut self,
        msg_type: &MsgType,
        seq_num: u64,
        bytes: &Bytes,
        status: MessageStatus,
    ) -> Result<u64, irongate_core::error::TransportError> {
        let header = FrameHeader {
            stream_id: self.config.outbound_stream_id,
            session_id: self.session_id,
            connection_id: self.connection_id,
            library_id: self.library_id,
            message_type: packed_message_type(msg_type.as_str()),
            sequence_index: self.sequence_index,
            sequence_number: seq_num,
            status,
            timestamp_ns: self.clock.nanos(),
        };

        let position = self.publication.try_offer(&header, bytes)?;
        self.heartbeat.on_sent(self.clock.nanos());
        Ok(position)
    }

    fn record_sent(&self, msg_type: MsgType, seq_num: u64, bytes: Bytes) {
        self.store.store(StoredMessage {
            seq_num,
            sequence_index: self.sequence_index,
            msg_type,
            bytes,
        });
    }

    /// Retries stashed work in order. Stops at the first refusal.
    fn flush_pending(&mut self) -> usize {
        let mut work = 0;

        while let Some(item) = self.pending.pop_front() {
            match item {
                PendingWork::Frame {
                    message_type,
                    seq_num,
                    bytes,
                } => {
                    let header = FrameHeader {
                        stream_id: self.config.outbound_stream_id,
                        session_id: self.session_id,
                        connection_id: self.connection_id,
                        library_id: self.library_id,
                        message_type,
                        sequence_index: self.sequence_index,
                        sequence_number: seq_num,
                        status: MessageStatus::Ok,
                        timestamp_ns: self.clock.nanos(),
                    };
                    if self.publication.try_offer(&header, &bytes).is_ok() {
                        self.heartbeat.on_sent(self.clock.nanos());
                        work += 1;
                    } else {
                        self.pending.push_front(PendingWork::Frame {
                            message_type,
                            seq_num,
                            bytes,
                        });
                        break;
                    }
                }
                PendingWork::Replay { begin, end } => {
                    if self.replay_from(begin, end) {
                        work += 1;
                    } else {
                        break;
                    }
                }
            }
        }

        work
    }

    // -----------------------------------------------
    // Teardown
    // -----------------------------------------------

    fn arm_logout_timer(&mut self) {
        let window = 2 * self.heartbeat.interval_ms() * 1_000_000;
        self.logout_deadline_ns = Some(self.clock.nanos() + window);
    }

    /// Emits a Logout (best effort) and disconnects.
    fn disconnect_with_logout(&mut self, reason: DisconnectReason, text: &str) -> Action {
        let owned_text = text.to_string();
        self.emit_admin(MsgType::Logout, move |builder| {
            builder.put_str(tags::TEXT, &owned_text);
        });
        self.transition_disconnected(reason);
        Action::Disconnect(reason)
    }

    fn transition_disconnected(&mut self, reason: DisconnectReason) {
        info!(
            session_id = %self.session_id,
            from = self.state.name(),
            %reason,
            "session disconnected"
        );
        self.state = SessionState::Disconnected;
        self.disconnect_reason = Some(reason);
        self.logout_deadline_ns = None;
        self.queued_beyond_gap.clear();
        self.gap_trigger_seq = None;
        self.awaiting_resend_to = 0;
        self.pending.clear();

        if self.config.persistence == PersistenceMode::Transient {
            self.next_sent_seq_no = 1;
            self.next_recv_seq_no = 1;
        }
    }

    fn reset_sequence_numbers(&mut self) {
        self.sequence_index += 1;
        self.next_sent_seq_no = 1;
        self.next_recv_seq_no = 1;
        info!(
            session_id = %self.session_id,
            sequence_index = self.sequence_index,
            "sequence numbers reset"
        );
    }
}

/// Packs the first two bytes of a FIX message type into a u16 tag for frame
/// headers.
fn packed_message_type(msg_type: &str) -> u16 {
    let bytes = msg_type.as_bytes();
    match bytes {
        [] => 0,
        [a] => u16::from(*a),
        [a, b, ..] => u16::from(*a) | (u16::from(*b) << 8),
    }
}
