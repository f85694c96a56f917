//! Session lifecycle collaborator.
//!
//! Session creation, lookup and expiry belong to the host application. The
//! engine only asks whether a session may currently receive donations or
//! subscribers.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use crate::claim::SessionId;

/// Existence and validity checks supplied by the host's session service.
pub trait SessionDirectory: Send + Sync {
    /// Whether the session exists and is open.
    fn is_open(&self, session_id: &SessionId) -> bool;
}

/// Directory that treats every session id as open.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllSessions;

impl SessionDirectory for AcceptAllSessions {
    fn is_open(&self, _session_id: &SessionId) -> bool {
        true
    }
}

/// In-memory directory for hosts that track sessions in process.
#[derive(Debug, Default)]
pub struct StaticSessions {
    open: RwLock<HashSet<SessionId>>,
}

impl StaticSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, session_id: impl Into<SessionId>) {
        self.open
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.into());
    }

    pub fn close(&self, session_id: &SessionId) -> bool {
        self.open
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
    }
}

impl SessionDirectory for StaticSessions {
    fn is_open(&self, session_id: &SessionId) -> bool {
        self.open
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_sessions() {
        let sessions = StaticSessions::new();
        let id = SessionId::new("overlay-1");
        assert!(!sessions.is_open(&id));

        sessions.open("overlay-1");
        assert!(sessions.is_open(&id));

        assert!(sessions.close(&id));
        assert!(!sessions.is_open(&id));
    }
}
