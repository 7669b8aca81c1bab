/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Heartbeat and TestRequest timing.
//!
//! All decisions are made against a caller-supplied `now` in epoch
//! nanoseconds, so the session never reads system time directly:
//! - a Heartbeat is due after one interval without an outgoing message
//! - a TestRequest is due after 1.2 intervals without an incoming message
//! - the session times out after 2.4 intervals without an incoming message

/// Heartbeat timing state for one session.
#[derive(Debug)]
pub struct HeartbeatState {
    /// Heartbeat interval in nanoseconds.
    interval_ns: u64,
    /// Time the last message was sent.
    last_sent_ns: u64,
    /// Time the last message was received.
    last_received_ns: u64,
    /// Pending TestRequest ID, if any.
    pending_test_req_id: Option<String>,
}

impl HeartbeatState {
    /// Creates heartbeat state with the given interval.
    ///
    /// # Arguments
    /// * `interval_ms` - The heartbeat interval in milliseconds
    /// * `now_ns` - The current time
    #[must_use]
    pub fn new(interval_ms: u64, now_ns: u64) -> Self {
        Self {
            interval_ns: interval_ms * 1_000_000,
            last_sent_ns: now_ns,
            last_received_ns: now_ns,
            pending_test_req_id: None,
        }
    }

    /// Adopts a new interval, as agreed during the Logon exchange.
    pub fn set_interval_ms(&mut self, interval_ms: u64) {
        self.interval_ns = interval_ms * 1_000_000;
    }

    /// Returns the interval in milliseconds.
    #[must_use]
    pub const fn interval_ms(&self) -> u64 {
        self.interval_ns / 1_000_000
    }

    /// Records that a message was sent.
    #[inline]
    pub fn on_sent(&mut self, now_ns: u64) {
        self.last_sent_ns = now_ns;
    }

    /// Records that a message was received.
    #[inline]
    pub fn on_received(&mut self, now_ns: u64) {
        self.last_received_ns = now_ns;
    }

    /// Records a received Heartbeat, clearing the pending TestRequest if
    /// its TestReqID is echoed back.
    pub fn on_heartbeat(&mut self, now_ns: u64, test_req_id: Option<&str>) {
        self.last_received_ns = now_ns;

        if let (Some(pending), Some(echoed)) = (&self.pending_test_req_id, test_req_id)
            && pending == echoed
        {
            self.pending_test_req_id = None;
        }
    }

    /// Records that a TestRequest was sent.
    pub fn on_test_request_sent(&mut self, now_ns: u64, test_req_id: String) {
        self.pending_test_req_id = Some(test_req_id);
        self.last_sent_ns = now_ns;
    }

    /// A Heartbeat is due after one quiet interval on the send side.
    #[must_use]
    pub fn heartbeat_due(&self, now_ns: u64) -> bool {
        now_ns.saturating_sub(self.last_sent_ns) >= self.interval_ns
    }

    /// A TestRequest is due after 1.2 quiet intervals on the receive side,
    /// unless one is already outstanding.
    #[must_use]
    pub fn test_request_due(&self, now_ns: u64) -> bool {
        self.pending_test_req_id.is_none()
            && now_ns.saturating_sub(self.last_received_ns) >= self.interval_ns_scaled(12)
    }

    /// The session has timed out after 2.4 quiet intervals on the receive
    /// side.
    #[must_use]
    pub fn timed_out(&self, now_ns: u64) -> bool {
        now_ns.saturating_sub(self.last_received_ns) >= self.interval_ns_scaled(24)
    }

    /// Milliseconds since the last received message.
    #[must_use]
    pub fn quiet_ms(&self, now_ns: u64) -> u64 {
        now_ns.saturating_sub(self.last_received_ns) / 1_000_000
    }

    /// Returns the pending TestRequest ID, if any.
    #[must_use]
    pub fn pending_test_req_id(&self) -> Option<&str> {
        self.pending_test_req_id.as_deref()
    }

    /// Resets all timers, as on a fresh connection.
    pub fn reset(&mut self, now_ns: u64) {
        self.last_sent_ns = now_ns;
        self.last_received_ns = now_ns;
        self.pending_test_req_id = None;
    }

    /// The interval scaled by `tenths / 10` in integer arithmetic.
    #[inline]
    const fn interval_ns_scaled(&self, tenths: u64) -> u64 {
        self.interval_ns / 10 * tenths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND_NS: u64 = 1_000_000_000;

    #[test]
    fn test_heartbeat_due_after_interval() {
        let mut state = HeartbeatState::new(1_000, 0);
        assert!(!state.heartbeat_due(SECOND_NS - 1));
        assert!(state.heartbeat_due(SECOND_NS));

        state.on_sent(SECOND_NS);
        assert!(!state.heartbeat_due(SECOND_NS + 1));
    }

    #[test]
    fn test_test_request_due_at_1_2_intervals() {
        let mut state = HeartbeatState::new(1_000, 0);
        assert!(!state.test_request_due(SECOND_NS));
        assert!(state.test_request_due(SECOND_NS + 200_000_000));

        state.on_test_request_sent(SECOND_NS + 200_000_000, "TEST1".to_string());
        assert_eq!(state.pending_test_req_id(), Some("TEST1"));
        // Already outstanding: no second request.
        assert!(!state.test_request_due(2 * SECOND_NS));
    }

    #[test]
    fn test_timeout_at_2_4_intervals() {
        let state = HeartbeatState::new(1_000, 0);
        assert!(!state.timed_out(2 * SECOND_NS));
        assert!(state.timed_out(2 * SECOND_NS + 400_000_000));
        assert_eq!(state.quiet_ms(2 * SECOND_NS + 400_000_000), 2_400);
    }

    #[test]
    fn test_heartbeat_echo_clears_pending() {
        let mut state = HeartbeatState::new(1_000, 0);
        state.on_test_request_sent(0, "PING".to_string());

        state.on_heartbeat(100, Some("OTHER"));
        assert_eq!(state.pending_test_req_id(), Some("PING"));

        state.on_heartbeat(200, Some("PING"));
        assert_eq!(state.pending_test_req_id(), None);
    }

    #[test]
    fn test_received_traffic_defers_test_request() {
        let mut state = HeartbeatState::new(1_000, 0);
        state.on_received(SECOND_NS);
        assert!(!state.test_request_due(2 * SECOND_NS));
        assert!(state.test_request_due(2 * SECOND_NS + 200_000_000));
    }

    #[test]
    fn test_interval_adoption() {
        let mut state = HeartbeatState::new(30_000, 0);
        assert_eq!(state.interval_ms(), 30_000);

        state.set_interval_ms(5_000);
        assert_eq!(state.interval_ms(), 5_000);
    }

    #[test]
    fn test_reset() {
        let mut state = HeartbeatState::new(1_000, 0);
        state.on_test_request_sent(0, "X".to_string());

        state.reset(5 * SECOND_NS);
        assert_eq!(state.pending_test_req_id(), None);
        assert!(!state.timed_out(6 * SECOND_NS));
    }
}
