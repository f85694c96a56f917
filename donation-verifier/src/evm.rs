//! EVM donation verification.
//!
//! A claim is proven by the transaction receipt. With a donation contract
//! configured, the receipt must carry an ERC-20 style
//! `Transfer(address indexed from, address indexed to, uint256 value)` log
//! emitted by that contract; otherwise the native transfer (`to`, `value`) of
//! the transaction itself is compared. Amounts are compared as wei integers.

use ethers_core::types::{Address, Log, H256, U256};
use std::sync::Arc;
use tracing::{debug, warn};

use donation_core::{DonationClaim, FinalityState, VerificationOutcome};

use crate::access::{EvmChainAccess, EvmTransaction};
use crate::error::{Result, VerifyError};
use crate::verifier::{match_transfer, TransferMismatch};

/// ERC20 Transfer(address indexed from, address indexed to, uint256 value)
const TRANSFER_TOPIC: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Default confirmation depth when none is configured.
pub const DEFAULT_MIN_CONFIRMATIONS: u64 = 12;

/// Verifier for EVM-family chains.
#[derive(Clone)]
pub struct EvmVerifier {
    access: Arc<dyn EvmChainAccess>,
    min_confirmations: u64,
    donation_contract: Option<Address>,
}

impl EvmVerifier {
    /// Create a verifier that checks native value transfers.
    pub fn new(access: Arc<dyn EvmChainAccess>) -> Self {
        Self {
            access,
            min_confirmations: DEFAULT_MIN_CONFIRMATIONS,
            donation_contract: None,
        }
    }

    /// Require this many confirmations before reporting `Confirmed`.
    pub fn with_min_confirmations(mut self, confirmations: u64) -> Self {
        self.min_confirmations = confirmations.max(1);
        self
    }

    /// Verify transfer logs from this contract instead of native value.
    pub fn with_donation_contract(mut self, contract: Address) -> Self {
        self.donation_contract = Some(contract);
        self
    }

    pub fn min_confirmations(&self) -> u64 {
        self.min_confirmations
    }

    pub fn donation_contract(&self) -> Option<Address> {
        self.donation_contract
    }

    /// Verify a claim against the chain.
    ///
    /// # Errors
    ///
    /// - `MalformedReference` if the hash or recipient is not valid hex of the right length
    /// - `InvalidAmount` if the amount is not a base-10 integer
    /// - `NotFound` if the node does not know the transaction
    /// - `Mismatch` if the transaction reverted or disagrees with the claim
    /// - `ChainUnavailable` if the RPC could not be reached
    pub async fn verify(&self, claim: &DonationClaim) -> Result<VerificationOutcome> {
        let hash = parse_tx_hash(&claim.tx_reference)?;
        let recipient = parse_address(&claim.recipient_address)?;
        let amount = claim.amount()?;

        let tx = self
            .access
            .transaction(hash)
            .await?
            .ok_or_else(|| VerifyError::NotFound {
                tx_reference: claim.tx_reference.clone(),
            })?;

        let Some(block_number) = tx.block_number else {
            debug!("Transaction {:?} not mined yet", hash);
            return Ok(VerificationOutcome::undetermined(claim.chain_id, &claim.tx_reference));
        };

        if tx.success == Some(false) {
            return Err(self.mismatch(claim, "transaction reverted".to_string()));
        }

        let transfers = self.transfers(&tx);
        match_transfer(&transfers, &recipient, amount)
            .map_err(|m| self.mismatch(claim, describe(m, recipient, amount)))?;

        let depth = self.access.finality_depth(&tx).await?.unwrap_or(0);
        let finality = if depth >= self.min_confirmations {
            FinalityState::Confirmed
        } else {
            debug!(
                "Transaction {:?} has {}/{} confirmations",
                hash, depth, self.min_confirmations
            );
            FinalityState::Pending
        };

        Ok(VerificationOutcome::matched(
            claim.chain_id,
            &claim.tx_reference,
            amount,
            format!("{:?}", recipient),
            Some(block_number),
            finality,
        ))
    }

    /// Candidate (recipient, amount) pairs carried by the transaction.
    fn transfers(&self, tx: &EvmTransaction) -> Vec<(Address, U256)> {
        match self.donation_contract {
            Some(contract) => tx
                .logs
                .iter()
                .filter(|log| log.address == contract)
                .filter_map(decode_transfer_log)
                .collect(),
            None => tx.to.map(|to| vec![(to, tx.value)]).unwrap_or_default(),
        }
    }

    fn mismatch(&self, claim: &DonationClaim, reason: String) -> VerifyError {
        warn!(
            "Donation claim rejected on chain {}: {} ({})",
            claim.chain_id, claim.tx_reference, reason
        );
        VerifyError::Mismatch {
            tx_reference: claim.tx_reference.clone(),
            reason,
        }
    }
}

fn describe(mismatch: TransferMismatch<U256>, recipient: Address, claimed: U256) -> String {
    match mismatch {
        TransferMismatch::NoTransfers => "no transfer found in transaction".to_string(),
        TransferMismatch::Recipient => format!("no transfer to {:?}", recipient),
        TransferMismatch::Amount { found } => {
            let found: Vec<String> = found.iter().map(|a| a.to_string()).collect();
            format!("claimed {} wei, transferred {}", claimed, found.join(", "))
        }
    }
}

/// Decode `Transfer(from, to, value)`; returns `(to, value)`.
fn decode_transfer_log(log: &Log) -> Option<(Address, U256)> {
    let topic: H256 = TRANSFER_TOPIC.parse().ok()?;
    if log.topics.len() != 3 || log.topics[0] != topic || log.data.len() != 32 {
        return None;
    }
    let to = Address::from_slice(&log.topics[2].as_bytes()[12..]);
    Some((to, U256::from_big_endian(&log.data)))
}

/// Parse a `0x`-prefixed 32-byte transaction hash.
pub fn parse_tx_hash(reference: &str) -> Result<H256> {
    let bytes = decode_prefixed_hex(reference, 32)
        .ok_or_else(|| VerifyError::MalformedReference(format!("'{}' is not a 32-byte hex hash", reference)))?;
    Ok(H256::from_slice(&bytes))
}

/// Parse a `0x`-prefixed 20-byte address. Checksum casing is not enforced.
pub fn parse_address(address: &str) -> Result<Address> {
    let bytes = decode_prefixed_hex(address, 20)
        .ok_or_else(|| VerifyError::MalformedReference(format!("'{}' is not a 20-byte hex address", address)))?;
    Ok(Address::from_slice(&bytes))
}

fn decode_prefixed_hex(value: &str, len: usize) -> Option<Vec<u8>> {
    let digits = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X"))?;
    if digits.len() != len * 2 {
        return None;
    }
    hex::decode(digits).ok()
}
