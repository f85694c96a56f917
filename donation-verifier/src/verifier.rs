//! Chain verifiers: the per-family verification contract.
//!
//! Chain families form a closed set: adding a chain family means adding a
//! variant here, not implementing an open trait.

use ethers_core::types::U256;

use donation_core::{ChainFamily, DonationClaim, VerificationOutcome};

use crate::error::Result;
use crate::evm::{parse_address, EvmVerifier};
use crate::solana::{decode_pubkey, SolanaVerifier};

/// A verifier for one chain family.
#[derive(Clone)]
pub enum ChainVerifier {
    Evm(EvmVerifier),
    Solana(SolanaVerifier),
}

impl ChainVerifier {
    /// Prove (or disprove) a claim against the chain.
    pub async fn verify(&self, claim: &DonationClaim) -> Result<VerificationOutcome> {
        match self {
            Self::Evm(v) => v.verify(claim).await,
            Self::Solana(v) => v.verify(claim).await,
        }
    }

    /// How recipient addresses compare on this family.
    pub fn recipient_matcher(&self) -> RecipientMatcher {
        match self {
            Self::Evm(_) => RecipientMatcher::Evm,
            Self::Solana(_) => RecipientMatcher::Solana,
        }
    }

    pub fn family(&self) -> ChainFamily {
        match self {
            Self::Evm(_) => ChainFamily::Evm,
            Self::Solana(_) => ChainFamily::Solana,
        }
    }
}

impl From<EvmVerifier> for ChainVerifier {
    fn from(verifier: EvmVerifier) -> Self {
        Self::Evm(verifier)
    }
}

impl From<SolanaVerifier> for ChainVerifier {
    fn from(verifier: SolanaVerifier) -> Self {
        Self::Solana(verifier)
    }
}

/// Address equality rules for a chain family.
///
/// EVM addresses compare as 20 raw bytes, so checksum casing is irrelevant.
/// Solana addresses compare as 32 decoded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientMatcher {
    Evm,
    Solana,
}

impl RecipientMatcher {
    /// Whether two textual addresses denote the same account.
    /// Unparseable input never matches.
    pub fn matches(&self, claimed: &str, on_chain: &str) -> bool {
        match self {
            Self::Evm => match (parse_address(claimed), parse_address(on_chain)) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            },
            Self::Solana => match (decode_pubkey(claimed), decode_pubkey(on_chain)) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Canonical textual form (lower-case hex for EVM, base58 for Solana).
    pub fn normalize(&self, address: &str) -> Result<String> {
        match self {
            Self::Evm => parse_address(address).map(|a| format!("{:?}", a)),
            Self::Solana => decode_pubkey(address).map(|k| bs58::encode(k).into_string()),
        }
    }
}

/// Why no transfer in a transaction satisfied a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransferMismatch<A> {
    /// The transaction carries no recognizable transfer at all.
    NoTransfers,
    /// Transfers exist, none to the claimed recipient.
    Recipient,
    /// Transfers to the recipient exist with these amounts, none equal to the claim.
    Amount { found: Vec<A> },
}

/// Find a transfer with exactly the claimed recipient and amount.
pub(crate) fn match_transfer<R, A>(
    transfers: &[(R, A)],
    recipient: &R,
    amount: A,
) -> std::result::Result<(), TransferMismatch<A>>
where
    R: PartialEq,
    A: PartialEq + Copy,
{
    if transfers.is_empty() {
        return Err(TransferMismatch::NoTransfers);
    }

    let to_recipient: Vec<A> = transfers
        .iter()
        .filter(|(r, _)| r == recipient)
        .map(|(_, a)| *a)
        .collect();

    if to_recipient.is_empty() {
        return Err(TransferMismatch::Recipient);
    }
    if to_recipient.contains(&amount) {
        return Ok(());
    }
    Err(TransferMismatch::Amount { found: to_recipient })
}

/// Lamport amounts are carried as `U256` in outcomes.
pub(crate) fn lamports(amount: u64) -> U256 {
    U256::from(amount)
}
