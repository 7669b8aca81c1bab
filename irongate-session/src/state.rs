/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session state and message-handling outcomes.

use irongate_core::message::OwnedMessage;
use irongate_core::types::DisconnectReason;
use smallvec::SmallVec;

/// Lifecycle state of a FIX session.
///
/// Exactly one state holds at any moment; every state has a deterministic
/// transition for each event class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// TCP established; no Logon exchanged yet.
    Connected,
    /// Initiator has sent Logon and awaits the reply.
    SentLogon,
    /// Acceptor is waiting for the counterparty's Logon.
    AwaitingLogon,
    /// Logon exchanged; messages flow.
    Active,
    /// A gap was detected; a ResendRequest is outstanding.
    AwaitingResend,
    /// A Logout was sent; awaiting the reply or the disconnect timer.
    AwaitingLogout,
    /// The TCP connection is gone.
    Disconnected,
    /// The session has been administratively disabled.
    Disabled,
}

impl SessionState {
    /// Returns the state name for diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Connected => "CONNECTED",
            Self::SentLogon => "SENT_LOGON",
            Self::AwaitingLogon => "AWAITING_LOGON",
            Self::Active => "ACTIVE",
            Self::AwaitingResend => "AWAITING_RESEND",
            Self::AwaitingLogout => "AWAITING_LOGOUT",
            Self::Disconnected => "DISCONNECTED",
            Self::Disabled => "DISABLED",
        }
    }

    /// Returns true if application messages may be sent in this state.
    #[must_use]
    pub const fn can_send_app(self) -> bool {
        matches!(self, Self::Active | Self::AwaitingResend)
    }

    /// Returns true if the session still has a live connection.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        !matches!(self, Self::Disconnected | Self::Disabled)
    }
}

/// Outcome of processing one inbound message.
#[derive(Debug)]
pub enum Action {
    /// Nothing to do (e.g. message arrived after disconnect).
    None,
    /// An admin message was consumed by the session layer.
    Consume,
    /// Application messages now deliverable, in sequence order. Usually just
    /// the message that was processed; after a gap closes it also carries
    /// the messages queued behind the gap.
    Deliver(SmallVec<[OwnedMessage; 1]>),
    /// The message arrived beyond a gap and was queued until the gap closes.
    Queue,
    /// The session disconnected as a result of this message.
    Disconnect(DisconnectReason),
}

impl Action {
    /// Convenience constructor for delivering a single message.
    #[must_use]
    pub fn deliver_one(message: OwnedMessage) -> Self {
        let mut messages: SmallVec<[OwnedMessage; 1]> = SmallVec::new();
        messages.push(message);
        Self::Deliver(messages)
    }

    /// Returns true if this is a `Deliver` action.
    #[must_use]
    pub const fn is_deliver(&self) -> bool {
        matches!(self, Self::Deliver(_))
    }
}

/// A send refused by the transport, kept for retry on the next poll.
///
/// While a retry is outstanding no later send may be attempted, preserving
/// the on-wire ordering of successful sends.
#[derive(Debug)]
pub(crate) enum PendingWork {
    /// A fully encoded frame awaiting transmission.
    Frame {
        /// Message type tag for the frame header.
        message_type: u16,
        /// Sequence number the frame was encoded with.
        seq_num: u64,
        /// The encoded bytes.
        bytes: bytes::Bytes,
    },
    /// A resend replay interrupted by back-pressure, restartable from
    /// `begin`.
    Replay {
        /// Next sequence number to replay.
        begin: u64,
        /// Last sequence number of the requested range.
        end: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(SessionState::Active.name(), "ACTIVE");
        assert_eq!(SessionState::AwaitingResend.name(), "AWAITING_RESEND");
    }

    #[test]
    fn test_can_send_app() {
        assert!(SessionState::Active.can_send_app());
        assert!(SessionState::AwaitingResend.can_send_app());
        assert!(!SessionState::SentLogon.can_send_app());
        assert!(!SessionState::Disconnected.can_send_app());
    }

    #[test]
    fn test_is_connected() {
        assert!(SessionState::Connected.is_connected());
        assert!(SessionState::AwaitingLogout.is_connected());
        assert!(!SessionState::Disconnected.is_connected());
        assert!(!SessionState::Disabled.is_connected());
    }
}
