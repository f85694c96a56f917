//! Error types for donation verification.
//!
//! This module defines all error types that can occur during chain
//! access, claim verification, and router configuration.

use donation_core::{ChainId, CoreError};
use thiserror::Error;

/// Errors that can occur during verification operations.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The transaction reference or address is not valid syntax for the chain family.
    #[error("Malformed reference: {0}")]
    MalformedReference(String),

    /// No verifier is registered for the chain.
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(ChainId),

    /// The transaction was not found. May be transient (not yet propagated).
    #[error("Transaction {tx_reference} not found")]
    NotFound {
        /// The reference that was looked up
        tx_reference: String,
    },

    /// The transaction exists but does not match the claim. Terminal.
    #[error("Claim mismatch for {tx_reference}: {reason}")]
    Mismatch {
        /// The reference that was checked
        tx_reference: String,
        /// Which field disagreed
        reason: String,
    },

    /// The chain-access collaborator could not be reached.
    #[error("Chain unavailable: {0}")]
    ChainUnavailable(String),

    /// The claimed amount is not an integer in the chain's base unit range.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Router or client configuration problem.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl VerifyError {
    /// Whether the caller may retry the same claim later.
    ///
    /// `NotFound` and `ChainUnavailable` are transient. Everything else is
    /// either a caller error or a terminal rejection.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::ChainUnavailable(_))
    }

    /// Whether the claim was positively disproven by the chain.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Mismatch { .. })
    }
}

impl From<CoreError> for VerifyError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::InvalidAmount(amount) => Self::InvalidAmount(amount),
            CoreError::InvalidChainId(chain) => Self::Config(format!("invalid chain id '{}'", chain)),
            other => Self::Config(other.to_string()),
        }
    }
}

/// Result type alias for verifier operations.
pub type Result<T> = std::result::Result<T, VerifyError>;
