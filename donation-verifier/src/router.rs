//! Claim routing.
//!
//! [`VerificationRouter`] maps each [`ChainId`] to the verifier that serves it
//! and bounds every verification with a timeout. It holds no mutable state:
//! dropping a `submit_claim` future abandons the lookup and nothing else.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use donation_core::{ChainFamily, ChainId, DonationClaim, VerificationOutcome};

use crate::config::{VerifierConfig, DEFAULT_TIMEOUT_MS};
use crate::error::{Result, VerifyError};
use crate::evm::{parse_address, EvmVerifier};
use crate::rpc::{EvmRpcClient, SolanaRpcClient};
use crate::solana::SolanaVerifier;
use crate::verifier::ChainVerifier;

/// Dispatches claims to per-chain verifiers.
///
/// # Example
///
/// ```rust,no_run
/// use donation_core::DonationClaim;
/// use donation_verifier::{VerificationRouter, VerifierConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let router = VerificationRouter::from_config(&VerifierConfig::all_presets())?;
///     let claim = DonationClaim::new(
///         "11155111".parse()?,
///         "0x5a3c...",
///         "0x742d35cc6634c0532925a3b844bc454e4438f44e",
///         "10000000000000000",
///         "stream-42",
///     );
///
///     let outcome = router.submit_claim(&claim).await?;
///     println!("{}", outcome);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct VerificationRouter {
    verifiers: HashMap<ChainId, ChainVerifier>,
    timeout: Duration,
}

impl Default for VerificationRouter {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }
}

impl VerificationRouter {
    /// Create an empty router with a per-claim timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            verifiers: HashMap::new(),
            timeout,
        }
    }

    /// Build RPC-backed verifiers for every configured chain.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a chain, URL, contract address or program id
    /// does not resolve.
    pub fn from_config(config: &VerifierConfig) -> Result<Self> {
        let mut router = Self::new(config.timeout());

        for entry in &config.chains {
            let chain_id = entry.chain_id()?;
            let rpc_url = entry.rpc_url()?;

            let verifier: ChainVerifier = match chain_id.family() {
                ChainFamily::Evm => {
                    let client = EvmRpcClient::new(&rpc_url)?;
                    let mut verifier = EvmVerifier::new(Arc::new(client))
                        .with_min_confirmations(entry.min_confirmations()?);
                    if let Some(contract) = &entry.donation_contract {
                        let contract = parse_address(contract).map_err(|e| {
                            VerifyError::Config(format!("chain '{}': {}", entry.chain, e))
                        })?;
                        verifier = verifier.with_donation_contract(contract);
                    }
                    verifier.into()
                }
                ChainFamily::Solana => {
                    let client = SolanaRpcClient::new(&rpc_url)?;
                    let mut verifier = SolanaVerifier::new(Arc::new(client));
                    if let Some(program) = &entry.donation_program {
                        verifier = verifier.with_donation_program(program).map_err(|e| {
                            VerifyError::Config(format!("chain '{}': {}", entry.chain, e))
                        })?;
                    }
                    verifier.into()
                }
            };

            info!("Serving chain {} via {}", chain_id, rpc_url);
            router.register(chain_id, verifier);
        }

        Ok(router)
    }

    /// Add or replace the verifier for a chain.
    pub fn register(&mut self, chain_id: ChainId, verifier: impl Into<ChainVerifier>) {
        self.verifiers.insert(chain_id, verifier.into());
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_verifier(mut self, chain_id: ChainId, verifier: impl Into<ChainVerifier>) -> Self {
        self.register(chain_id, verifier);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Served chains, sorted.
    pub fn chains(&self) -> Vec<ChainId> {
        let mut chains: Vec<ChainId> = self.verifiers.keys().copied().collect();
        chains.sort();
        chains
    }

    pub fn verifier(&self, chain_id: ChainId) -> Option<&ChainVerifier> {
        self.verifiers.get(&chain_id)
    }

    /// Verify a claim on the chain it names.
    ///
    /// A verification that outlives the timeout yields an undetermined
    /// (`pending`, `valid = false`) outcome; the caller polls again later.
    ///
    /// # Errors
    ///
    /// - `UnsupportedChain` if no verifier serves `claim.chain_id`
    /// - any error from the chain verifier
    pub async fn submit_claim(&self, claim: &DonationClaim) -> Result<VerificationOutcome> {
        let verifier = self
            .verifiers
            .get(&claim.chain_id)
            .ok_or(VerifyError::UnsupportedChain(claim.chain_id))?;

        debug!("Dispatching {} on chain {}", claim.tx_reference, claim.chain_id);

        match tokio::time::timeout(self.timeout, verifier.verify(claim)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(
                    "Verification of {} timed out after {:?}",
                    claim.tx_reference, self.timeout
                );
                Ok(VerificationOutcome::undetermined(claim.chain_id, &claim.tx_reference))
            }
        }
    }
}
