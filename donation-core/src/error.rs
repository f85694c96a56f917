//! Error types for the donation core.
//!
//! This module defines the errors that can occur while parsing the data
//! model and while admitting donations into a session ledger.

use thiserror::Error;

/// Errors that can occur in core donation operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A chain identifier could not be parsed.
    #[error("Invalid chain id: '{0}'. Expected a decimal EVM chain id or 'solana:<cluster>'")]
    InvalidChainId(String),

    /// An amount string is not a base-10 unsigned integer in native units.
    #[error("Invalid amount '{0}': expected an unsigned integer in base units")]
    InvalidAmount(String),

    /// Summing donations exceeded the 256-bit range.
    #[error("Amount overflow while totalling chain {chain}")]
    AmountOverflow {
        /// Chain whose subtotal overflowed
        chain: String,
    },

    /// An outcome was handed to admission without being valid and final.
    #[error("Outcome for {tx_reference} is not admissible (valid={valid}, finality={finality})")]
    NotAdmissible {
        /// Transaction reference of the rejected outcome
        tx_reference: String,
        /// Whether the verifier judged the fields valid
        valid: bool,
        /// Reported finality state
        finality: String,
    },

    /// The session was closed while the operation was in progress.
    #[error("Session '{0}' is closed")]
    SessionClosed(String),

    /// The session directory does not know this session.
    #[error("Unknown session '{0}'")]
    UnknownSession(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::NotAdmissible {
            tx_reference: "0xabc".to_string(),
            valid: true,
            finality: "pending".to_string(),
        };
        assert!(err.to_string().contains("0xabc"));
        assert!(err.to_string().contains("pending"));
    }

    #[test]
    fn test_invalid_amount_error() {
        let err = CoreError::InvalidAmount("1.5".to_string());
        assert!(err.to_string().contains("1.5"));
        assert!(err.to_string().contains("base units"));
    }
}
