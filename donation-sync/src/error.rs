//! Error types for session sync and the engine facade.

use donation_core::CoreError;
use donation_verifier::VerifyError;
use thiserror::Error;

/// Errors that can occur while attaching subscribers or driving the engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The subscriber asked to resume past the end of the session log.
    #[error("Cannot resume from sequence {resume_from}: session head is {head}")]
    ResumeAhead {
        /// Requested resume point
        resume_from: u64,
        /// Current head of the session
        head: u64,
    },

    /// The session was closed.
    #[error("Session '{0}' is closed")]
    SessionClosed(String),

    /// The session directory does not consider this session open.
    #[error("Unknown session '{0}'")]
    UnknownSession(String),

    /// The connection went away before the handshake completed.
    #[error("Transport closed before subscription was established")]
    TransportClosed,

    /// Verification failed.
    #[error("Verification error: {0}")]
    Verify(#[from] VerifyError),

    /// Admission or ledger error.
    #[error("Ledger error: {0}")]
    Core(CoreError),
}

impl From<CoreError> for SyncError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::SessionClosed(session) => Self::SessionClosed(session),
            CoreError::UnknownSession(session) => Self::UnknownSession(session),
            other => Self::Core(other),
        }
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
