//! # Donation Core
//!
//! **Data model and deduplicating ledger for multi-chain donations**
//!
//! This crate holds everything about donations that does not touch the
//! network: chain identifiers, claims, verification outcomes, the
//! deterministic donation identity, and the per-session ledger that admits
//! each on-chain donation exactly once and assigns it a sequence number.
//!
//! ## Features
//!
//! - **Idempotent**: the same chain + transaction always maps to one `DonationId`
//! - **Exact**: amounts are 256-bit integers in native base units, never floats
//! - **Sharded**: admission is serialized per session, parallel across sessions
//! - **Replayable**: each session is a sequence-indexed log, so resuming is a range query
//!
//! ## Quick Start
//!
//! ```rust
//! use donation_core::{
//!     ChainId, DonationCandidate, DonationLedger, FinalityState, SessionId, VerificationOutcome,
//! };
//! use ethers_core::types::U256;
//!
//! let ledger = DonationLedger::new();
//! let session = SessionId::new("stream-1");
//!
//! let outcome = VerificationOutcome::matched(
//!     ChainId::Evm(1),
//!     "0x2222222222222222222222222222222222222222222222222222222222222222",
//!     U256::from(5_000u64),
//!     "0x742d35cc6634c0532925a3b844bc454e4438f44e",
//!     Some(19_000_000),
//!     FinalityState::Confirmed,
//! );
//!
//! let admission = ledger
//!     .admit(&session, DonationCandidate::from_outcome(&outcome).unwrap())
//!     .unwrap();
//! assert_eq!(admission.donation().sequence, 1);
//! assert_eq!(ledger.total_for(&session).unwrap().get(&ChainId::Evm(1)), U256::from(5_000u64));
//! ```

pub mod chain;
pub mod claim;
pub mod donation;
pub mod error;
pub mod ledger;
pub mod outcome;
pub mod session;

// Re-export main types for convenience
pub use chain::{ChainFamily, ChainId, SolanaCluster};
pub use claim::{DonationClaim, DonorMetadata, SessionId};
pub use donation::{Donation, DonationCandidate, DonationId};
pub use error::{CoreError, Result};
pub use ledger::{Admission, DonationLedger, DonationList, SessionHead, SessionLedger, Totals};
pub use outcome::{FinalityState, VerificationOutcome};
pub use session::{AcceptAllSessions, SessionDirectory, StaticSessions};
