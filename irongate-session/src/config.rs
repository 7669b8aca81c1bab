/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session configuration.

use irongate_core::types::{CompId, PersistenceMode};
use std::time::Duration;

/// Configuration for a FIX session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sender CompID (tag 49).
    pub sender_comp_id: CompId,
    /// Target CompID (tag 56).
    pub target_comp_id: CompId,
    /// FIX version BeginString (e.g., "FIX.4.4").
    pub begin_string: &'static str,
    /// Heartbeat interval.
    pub heartbeat_interval: Duration,
    /// Whether sequence numbers survive disconnects.
    pub persistence: PersistenceMode,
    /// Whether to request a sequence number reset on the next logon.
    pub reset_seq_num_on_logon: bool,
    /// Whether an acceptor adopts a lower-than-expected Logon sequence
    /// number instead of disconnecting.
    pub allow_lower_seqnum_logon: bool,
    /// Optional Username (tag 553) sent on Logon.
    pub username: Option<String>,
    /// Optional Password (tag 554) sent on Logon.
    pub password: Option<String>,
    /// Stream id the session writes its outbound frames to.
    pub outbound_stream_id: u32,
    /// Maximum message size in bytes.
    pub max_message_size: usize,
}

impl SessionConfig {
    /// Creates a configuration with required fields and defaults.
    ///
    /// # Arguments
    /// * `sender_comp_id` - The sender CompID
    /// * `target_comp_id` - The target CompID
    /// * `begin_string` - The FIX version string
    #[must_use]
    pub fn new(sender_comp_id: CompId, target_comp_id: CompId, begin_string: &'static str) -> Self {
        Self {
            sender_comp_id,
            target_comp_id,
            begin_string,
            heartbeat_interval: Duration::from_secs(30),
            persistence: PersistenceMode::Persistent,
            reset_seq_num_on_logon: false,
            allow_lower_seqnum_logon: false,
            username: None,
            password: None,
            outbound_stream_id: 1,
            max_message_size: 1024 * 1024,
        }
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the persistence mode.
    #[must_use]
    pub const fn with_persistence(mut self, persistence: PersistenceMode) -> Self {
        self.persistence = persistence;
        self
    }

    /// Sets whether to request a sequence reset on the next logon.
    #[must_use]
    pub const fn with_reset_seq_num_on_logon(mut self, reset: bool) -> Self {
        self.reset_seq_num_on_logon = reset;
        self
    }

    /// Sets whether a lower-than-expected Logon sequence number is adopted.
    #[must_use]
    pub const fn with_allow_lower_seqnum_logon(mut self, allow: bool) -> Self {
        self.allow_lower_seqnum_logon = allow;
        self
    }

    /// Sets the logon credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the outbound stream id.
    #[must_use]
    pub const fn with_outbound_stream_id(mut self, stream_id: u32) -> Self {
        self.outbound_stream_id = stream_id;
        self
    }

    /// Returns the heartbeat interval in whole milliseconds.
    #[must_use]
    pub fn heartbeat_interval_ms(&self) -> u64 {
        self.heartbeat_interval.as_millis() as u64
    }
}
