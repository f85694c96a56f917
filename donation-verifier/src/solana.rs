//! Solana donation verification.
//!
//! Without a donation program configured, the transaction must contain a
//! System Program `Transfer` instruction (`u32 LE 2 || u64 LE lamports`,
//! accounts `[from, to]`) paying the claimed recipient. With a program
//! configured, an Anchor-style `donate` instruction to that program
//! (`sha256("global:donate")[..8] || u64 LE amount`, recipient at account
//! index 1) is required instead. Only `finalized` signatures are confirmed.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

use donation_core::{DonationClaim, FinalityState, VerificationOutcome};

use crate::access::{SolanaChainAccess, SolanaCommitment, SolanaInstruction, SolanaTransaction};
use crate::error::{Result, VerifyError};
use crate::verifier::{lamports, match_transfer, TransferMismatch};

/// The System Program id.
pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";

/// System Program instruction index for `Transfer`.
const SYSTEM_TRANSFER_TAG: u32 = 2;

/// Anchor global namespace for the donation instruction.
const DONATE_PREIMAGE: &[u8] = b"global:donate";

/// Verifier for Solana clusters.
#[derive(Clone)]
pub struct SolanaVerifier {
    access: Arc<dyn SolanaChainAccess>,
    donation_program: Option<String>,
}

impl SolanaVerifier {
    /// Create a verifier that checks System Program transfers.
    pub fn new(access: Arc<dyn SolanaChainAccess>) -> Self {
        Self {
            access,
            donation_program: None,
        }
    }

    /// Verify `donate` instructions to this program instead of system transfers.
    ///
    /// # Errors
    ///
    /// Returns `MalformedReference` if the program id is not a base58 public key.
    pub fn with_donation_program(mut self, program_id: &str) -> Result<Self> {
        let key = decode_pubkey(program_id)?;
        self.donation_program = Some(bs58::encode(key).into_string());
        Ok(self)
    }

    pub fn donation_program(&self) -> Option<&str> {
        self.donation_program.as_deref()
    }

    /// Verify a claim against the cluster.
    ///
    /// # Errors
    ///
    /// - `MalformedReference` if the signature or recipient is not valid base58 of the right length
    /// - `InvalidAmount` if the amount is not an integer that fits in lamports (`u64`)
    /// - `NotFound` if the cluster does not know the signature
    /// - `Mismatch` if the transaction failed or disagrees with the claim
    /// - `ChainUnavailable` if the RPC could not be reached
    pub async fn verify(&self, claim: &DonationClaim) -> Result<VerificationOutcome> {
        decode_signature(&claim.tx_reference)?;
        let recipient = bs58::encode(decode_pubkey(&claim.recipient_address)?).into_string();
        let amount = claim.amount()?;
        if amount.bits() > 64 {
            return Err(VerifyError::InvalidAmount(format!(
                "{} exceeds the lamport range",
                claim.claimed_amount
            )));
        }
        let amount = amount.as_u64();

        let tx = self
            .access
            .transaction(&claim.tx_reference)
            .await?
            .ok_or_else(|| VerifyError::NotFound {
                tx_reference: claim.tx_reference.clone(),
            })?;

        if tx.failed {
            return Err(self.mismatch(claim, "transaction failed on-chain".to_string()));
        }

        let transfers = self.transfers(&tx);
        match_transfer(&transfers, &recipient, amount)
            .map_err(|m| self.mismatch(claim, describe(m, &recipient, amount)))?;

        let finality = match self.access.signature_status(&claim.tx_reference).await? {
            Some(SolanaCommitment::Finalized) => FinalityState::Finalized,
            status => {
                debug!("Signature {} not finalized yet ({:?})", claim.tx_reference, status);
                FinalityState::Pending
            }
        };

        Ok(VerificationOutcome::matched(
            claim.chain_id,
            &claim.tx_reference,
            lamports(amount),
            recipient,
            Some(tx.slot),
            finality,
        ))
    }

    fn transfers(&self, tx: &SolanaTransaction) -> Vec<(String, u64)> {
        tx.instructions
            .iter()
            .filter_map(|ix| match &self.donation_program {
                Some(program) => decode_donate(ix, program),
                None => decode_system_transfer(ix),
            })
            .collect()
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

fn describe(mismatch: TransferMismatch<u64>, recipient: &str, claimed: u64) -> String {
    match mismatch {
        TransferMismatch::NoTransfers => "no transfer instruction found".to_string(),
        TransferMismatch::Recipient => format!("no transfer to {}", recipient),
        TransferMismatch::Amount { found } => {
            let found: Vec<String> = found.iter().map(|a| a.to_string()).collect();
            format!("claimed {} lamports, transferred {}", claimed, found.join(", "))
        }
    }
}

/// Decode a System Program transfer; returns `(to, lamports)`.
fn decode_system_transfer(ix: &SolanaInstruction) -> Option<(String, u64)> {
    if ix.program_id != SYSTEM_PROGRAM_ID || ix.data.len() != 12 {
        return None;
    }
    let tag = u32::from_le_bytes(ix.data[0..4].try_into().ok()?);
    if tag != SYSTEM_TRANSFER_TAG {
        return None;
    }
    let amount = u64::from_le_bytes(ix.data[4..12].try_into().ok()?);
    Some((ix.accounts.get(1)?.clone(), amount))
}

/// Decode a `donate` instruction to the configured program; returns `(recipient, amount)`.
fn decode_donate(ix: &SolanaInstruction, program: &str) -> Option<(String, u64)> {
    if ix.program_id != program || ix.data.len() < 16 {
        return None;
    }
    if ix.data[0..8] != donate_discriminator() {
        return None;
    }
    let amount = u64::from_le_bytes(ix.data[8..16].try_into().ok()?);
    Some((ix.accounts.get(1)?.clone(), amount))
}

/// First eight bytes of `sha256("global:donate")`.
pub fn donate_discriminator() -> [u8; 8] {
    let digest = Sha256::digest(DONATE_PREIMAGE);
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// Decode a base58 public key (32 bytes).
pub fn decode_pubkey(value: &str) -> Result<[u8; 32]> {
    let bytes = bs58::decode(value)
        .into_vec()
        .map_err(|e| VerifyError::MalformedReference(format!("'{}': base58 decode failed: {}", value, e)))?;
    bytes.try_into().map_err(|v: Vec<u8>| {
        VerifyError::MalformedReference(format!("'{}': expected 32 bytes, got {}", value, v.len()))
    })
}

/// Decode a base58 transaction signature (64 bytes).
pub fn decode_signature(value: &str) -> Result<[u8; 64]> {
    let bytes = bs58::decode(value)
        .into_vec()
        .map_err(|e| VerifyError::MalformedReference(format!("'{}': base58 decode failed: {}", value, e)))?;
    bytes.try_into().map_err(|v: Vec<u8>| {
        VerifyError::MalformedReference(format!("'{}': expected 64-byte signature, got {}", value, v.len()))
    })
}
