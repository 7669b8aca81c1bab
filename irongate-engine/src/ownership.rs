/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session ownership registry.
//!
//! Each live session is owned either by one library worker or by the
//! gateway-managed pool. Ownership changes through a two-phase rendez-vous:
//! a worker posts an [`AdminCommand`] on the admin stream, the gateway
//! applies it here, and the returned [`SessionReplyStatus`] is the ack.
//! Ownership changes only when the ack is `Ok`; a worker observing a
//! session before its acquire is acked sees `UnknownSession`.

use irongate_collections::Long2LongMap;
use irongate_core::types::{LibraryId, SessionId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Reply code for an admin ownership command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionReplyStatus {
    /// The command was applied.
    Ok,
    /// No session with that id is registered.
    UnknownSession,
    /// Another library currently owns the session.
    OtherSessionOwner,
    /// The session exists but has not completed a logon.
    SessionNotLoggedIn,
}

/// Ownership command carried on the admin stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// Hand a session from its owning library back to the gateway pool.
    ReleaseToGateway {
        /// The library issuing the command.
        library_id: LibraryId,
        /// The session being released.
        session_id: SessionId,
    },
    /// Take a gateway-managed session into a library.
    Acquire {
        /// The library issuing the command.
        library_id: LibraryId,
        /// The session being acquired.
        session_id: SessionId,
    },
}

/// Registry mapping sessions to their owning library.
///
/// Backed by primitive-keyed maps: `session_id -> library_id` and
/// `session_id -> logged-in flag`.
#[derive(Debug)]
pub struct SessionOwnership {
    /// Missing key means the session is unknown.
    owners: Long2LongMap,
    /// 1 when the session has completed a logon, 0 otherwise.
    logged_in: Long2LongMap,
}

const MISSING: i64 = -1;

impl SessionOwnership {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            owners: Long2LongMap::new(MISSING),
            logged_in: Long2LongMap::new(MISSING),
        }
    }

    /// Registers a session under gateway management.
    pub fn register_session(&mut self, session_id: SessionId) {
        self.owners
            .put(session_id.value(), i64::from(LibraryId::GATEWAY.value()));
        self.logged_in.put(session_id.value(), 0);
        debug!(%session_id, "session registered");
    }

    /// Removes a session entirely.
    pub fn deregister_session(&mut self, session_id: SessionId) {
        self.owners.remove(session_id.value());
        self.logged_in.remove(session_id.value());
    }

    /// Records the logon state of a session.
    pub fn set_logged_in(&mut self, session_id: SessionId, logged_in: bool) {
        if self.owners.contains_key(session_id.value()) {
            self.logged_in
                .put(session_id.value(), i64::from(logged_in));
        }
    }

    /// Returns the current owner, or `None` for an unknown session.
    #[must_use]
    pub fn owner_of(&self, session_id: SessionId) -> Option<LibraryId> {
        let owner = self.owners.get(session_id.value());
        (owner != MISSING).then(|| LibraryId::new(owner as i32))
    }

    /// Applies one ownership command; the return value is the ack.
    pub fn on_command(&mut self, command: AdminCommand) -> SessionReplyStatus {
        match command {
            AdminCommand::ReleaseToGateway {
                library_id,
                session_id,
            } => self.release_to_gateway(library_id, session_id),
            AdminCommand::Acquire {
                library_id,
                session_id,
            } => self.acquire(library_id, session_id),
        }
    }

    /// Hands a session back to the gateway pool.
    pub fn release_to_gateway(
        &mut self,
        library_id: LibraryId,
        session_id: SessionId,
    ) -> SessionReplyStatus {
        let owner = self.owners.get(session_id.value());
        if owner == MISSING {
            return SessionReplyStatus::UnknownSession;
        }
        if owner != i64::from(library_id.value()) {
            return SessionReplyStatus::OtherSessionOwner;
        }

        self.owners
            .put(session_id.value(), i64::from(LibraryId::GATEWAY.value()));
        info!(%session_id, %library_id, "session released to gateway");
        SessionReplyStatus::Ok
    }

    /// Takes a gateway-managed session into a library.
    pub fn acquire(&mut self, library_id: LibraryId, session_id: SessionId) -> SessionReplyStatus {
        let owner = self.owners.get(session_id.value());
        if owner == MISSING {
            return SessionReplyStatus::UnknownSession;
        }
        if owner != i64::from(LibraryId::GATEWAY.value()) {
            return SessionReplyStatus::OtherSessionOwner;
        }
        if self.logged_in.get(session_id.value()) != 1 {
            return SessionReplyStatus::SessionNotLoggedIn;
        }

        self.owners
            .put(session_id.value(), i64::from(library_id.value()));
        info!(%session_id, %library_id, "session acquired by library");
        SessionReplyStatus::Ok
    }
}

impl Default for SessionOwnership {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: SessionId = SessionId::new(7);
    const LIBRARY_A: LibraryId = LibraryId::new(1);
    const LIBRARY_B: LibraryId = LibraryId::new(2);

    #[test]
    fn test_unknown_session_is_rejected() {
        let mut ownership = SessionOwnership::new();

        assert_eq!(
            ownership.acquire(LIBRARY_A, SESSION),
            SessionReplyStatus::UnknownSession
        );
        assert_eq!(
            ownership.release_to_gateway(LIBRARY_A, SESSION),
            SessionReplyStatus::UnknownSession
        );
        assert_eq!(ownership.owner_of(SESSION), None);
    }

    #[test]
    fn test_acquire_requires_logon() {
        let mut ownership = SessionOwnership::new();
        ownership.register_session(SESSION);

        assert_eq!(
            ownership.acquire(LIBRARY_A, SESSION),
            SessionReplyStatus::SessionNotLoggedIn
        );

        ownership.set_logged_in(SESSION, true);
        assert_eq!(
            ownership.acquire(LIBRARY_A, SESSION),
            SessionReplyStatus::Ok
        );
        assert_eq!(ownership.owner_of(SESSION), Some(LIBRARY_A));
    }

    #[test]
    fn test_acquire_of_owned_session_is_rejected() {
        let mut ownership = SessionOwnership::new();
        ownership.register_session(SESSION);
        ownership.set_logged_in(SESSION, true);

        assert_eq!(
            ownership.acquire(LIBRARY_A, SESSION),
            SessionReplyStatus::Ok
        );
        assert_eq!(
            ownership.acquire(LIBRARY_B, SESSION),
            SessionReplyStatus::OtherSessionOwner
        );
    }

    #[test]
    fn test_release_round_trip() {
        let mut ownership = SessionOwnership::new();
        ownership.register_session(SESSION);
        ownership.set_logged_in(SESSION, true);
        ownership.acquire(LIBRARY_A, SESSION);

        // Only the owner may release.
        assert_eq!(
            ownership.release_to_gateway(LIBRARY_B, SESSION),
            SessionReplyStatus::OtherSessionOwner
        );
        assert_eq!(
            ownership.release_to_gateway(LIBRARY_A, SESSION),
            SessionReplyStatus::Ok
        );
        assert_eq!(ownership.owner_of(SESSION), Some(LibraryId::GATEWAY));

        // Released sessions can be acquired by another library.
        assert_eq!(
            ownership.acquire(LIBRARY_B, SESSION),
            SessionReplyStatus::Ok
        );
    }

    #[test]
    fn test_command_dispatch() {
        let mut ownership = SessionOwnership::new();
        ownership.register_session(SESSION);
        ownership.set_logged_in(SESSION, true);

        let ack = ownership.on_command(AdminCommand::Acquire {
            library_id: LIBRARY_A,
            session_id: SESSION,
        });
        assert_eq!(ack, SessionReplyStatus::Ok);

        let ack = ownership.on_command(AdminCommand::ReleaseToGateway {
            library_id: LIBRARY_A,
            session_id: SESSION,
        });
        assert_eq!(ack, SessionReplyStatus::Ok);
    }

    #[test]
    fn test_deregister_forgets_session() {
        let mut ownership = SessionOwnership::new();
        ownership.register_session(SESSION);
        ownership.deregister_session(SESSION);

        assert_eq!(
            ownership.acquire(LIBRARY_A, SESSION),
            SessionReplyStatus::UnknownSession
        );
    }
}
