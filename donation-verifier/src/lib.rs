//! # Donation Verifier
//!
//! **Proving donation claims against EVM chains and Solana clusters**
//!
//! This crate turns an untrusted [`DonationClaim`](donation_core::DonationClaim)
//! into a [`VerificationOutcome`](donation_core::VerificationOutcome) by asking
//! the chain itself, through public RPC endpoints. It never touches the ledger;
//! admission is the caller's decision.
//!
//! ## Features
//!
//! - **Multi-chain**: EVM chains by numeric id, Solana clusters by name
//! - **Exact**: recipient and amount must match the chain, integer for integer
//! - **Resilient**: RPC clients retry transport failures with backoff and jitter
//! - **Bounded**: every claim runs under a timeout and degrades to `pending`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use donation_core::DonationClaim;
//! use donation_verifier::{VerificationRouter, VerifierConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = VerifierConfig::from_toml_str(r#"
//!         [[chains]]
//!         chain = "sepolia"
//!     "#)?;
//!     let router = VerificationRouter::from_config(&config)?;
//!
//!     let claim = DonationClaim::new(
//!         "11155111".parse()?,
//!         "0x1111111111111111111111111111111111111111111111111111111111111111",
//!         "0x742d35cc6634c0532925a3b844bc454e4438f44e",
//!         "10000000000000000",
//!         "stream-42",
//!     );
//!
//!     let outcome = router.submit_claim(&claim).await?;
//!     println!("Admissible: {}", outcome.is_admissible());
//!     Ok(())
//! }
//! ```

pub mod access;
pub mod config;
pub mod error;
pub mod evm;
pub mod router;
pub mod rpc;
pub mod solana;
pub mod verifier;

// Re-export main types for convenience
pub use access::{EvmChainAccess, EvmTransaction, SolanaChainAccess, SolanaCommitment};
pub use config::{get_chain, ChainEntry, ChainPreset, VerifierConfig, CHAINS};
pub use error::{Result, VerifyError};
pub use evm::EvmVerifier;
pub use router::VerificationRouter;
pub use rpc::{EvmRpcClient, SolanaRpcClient};
pub use solana::SolanaVerifier;
pub use verifier::{ChainVerifier, RecipientMatcher};
