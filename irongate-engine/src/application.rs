/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Application callback interface.
//!
//! Implement this trait to receive session lifecycle events and accepted
//! application messages from a session driver.

use async_trait::async_trait;
use irongate_core::message::OwnedMessage;
use irongate_core::types::{DisconnectReason, SessionId};

/// Async callback interface for session events.
#[async_trait]
pub trait Application: Send + Sync {
    /// Called once the logon exchange completes and the session is active.
    async fn on_session_active(&self, session_id: SessionId);

    /// Called for every accepted application message, in sequence order.
    ///
    /// # Arguments
    /// * `session_id` - The owning session
    /// * `message` - The delivered message
    async fn on_message(&self, session_id: SessionId, message: OwnedMessage);

    /// Called when the session disconnects, with the recorded reason.
    async fn on_disconnect(&self, session_id: SessionId, reason: DisconnectReason);
}

/// Default no-op application implementation.
#[derive(Debug, Default)]
pub struct NoOpApplication;

#[async_trait]
impl Application for NoOpApplication {
    async fn on_session_active(&self, _session_id: SessionId) {}

    async fn on_message(&self, _session_id: SessionId, _message: OwnedMessage) {}

    async fn on_disconnect(&self, _session_id: SessionId, _reason: DisconnectReason) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use irongate_core::message::MsgType;

    #[tokio::test]
    async fn test_noop_application() {
        let app = NoOpApplication;
        let session_id = SessionId::new(1);

        app.on_session_active(session_id).await;
        app.on_message(
            session_id,
            OwnedMessage::new(Bytes::from_static(b"x"), MsgType::Heartbeat, vec![]),
        )
        .await;
        app.on_disconnect(session_id, DisconnectReason::RemoteDisconnect)
            .await;
    }
}
