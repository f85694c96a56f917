//! Verified donations and their deterministic identity.

use ethers_core::types::U256;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::chain::{ChainFamily, ChainId};
use crate::claim::{DonorMetadata, SessionId};
use crate::error::{CoreError, Result};
use crate::outcome::{decimal_amount, VerificationOutcome};

/// Identity of a donation, derived from where it happened on-chain.
///
/// `keccak256("<chain_id>:<normalized tx reference>")`. EVM hashes are
/// lower-cased before hashing; Solana signatures are base58 and therefore
/// case sensitive, so they are kept verbatim. The same on-chain event always
/// yields the same id, whichever party submits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DonationId([u8; 32]);

impl DonationId {
    pub fn derive(chain_id: &ChainId, tx_reference: &str) -> Self {
        let reference = match chain_id.family() {
            ChainFamily::Evm => tx_reference.trim().to_ascii_lowercase(),
            ChainFamily::Solana => tx_reference.trim().to_string(),
        };

        let mut hasher = Keccak256::new();
        hasher.update(chain_id.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(reference.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for DonationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for DonationId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DonationId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        use serde::de::Error;

        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(text.trim_start_matches("0x")).map_err(D::Error::custom)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| D::Error::custom("donation id must be 32 bytes"))?;
        Ok(Self(arr))
    }
}

/// A donation that passed verification but has not been admitted yet.
///
/// Admission assigns the session sequence number and the admission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonationCandidate {
    pub donation_id: DonationId,
    pub chain_id: ChainId,
    pub tx_reference: String,
    pub amount: U256,
    pub recipient: String,
    pub donor: Option<DonorMetadata>,
}

impl DonationCandidate {
    /// Build a candidate from an admissible outcome.
    ///
    /// Fail-closed: a pending or invalid outcome never produces a candidate.
    pub fn from_outcome(outcome: &VerificationOutcome) -> Result<Self> {
        let amount = match outcome.confirmed_amount {
            Some(amount) if outcome.is_admissible() => amount,
            _ => {
                return Err(CoreError::NotAdmissible {
                    tx_reference: outcome.tx_reference.clone(),
                    valid: outcome.valid,
                    finality: outcome.finality.to_string(),
                })
            }
        };

        Ok(Self {
            donation_id: DonationId::derive(&outcome.chain_id, &outcome.tx_reference),
            chain_id: outcome.chain_id,
            tx_reference: outcome.tx_reference.clone(),
            amount,
            recipient: outcome.confirmed_recipient.clone().unwrap_or_default(),
            donor: None,
        })
    }

    pub fn with_donor(mut self, donor: Option<DonorMetadata>) -> Self {
        self.donor = donor.map(DonorMetadata::cleaned).filter(|d| !d.is_empty());
        self
    }
}

/// A verified, admitted donation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Donation {
    pub donation_id: DonationId,
    /// Per-session sequence number, assigned at admission, starting at 1.
    pub sequence: u64,
    pub session_id: SessionId,
    pub chain_id: ChainId,
    pub tx_reference: String,
    /// Amount in the chain's native base unit.
    #[serde(with = "decimal_amount")]
    pub amount: U256,
    pub recipient: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donor: Option<DonorMetadata>,
    /// Admission time as milliseconds since the Unix epoch.
    pub verified_at: u64,
}

impl Donation {
    pub(crate) fn admit(candidate: DonationCandidate, session_id: SessionId, sequence: u64) -> Self {
        Self {
            donation_id: candidate.donation_id,
            sequence,
            session_id,
            chain_id: candidate.chain_id,
            tx_reference: candidate.tx_reference,
            amount: candidate.amount,
            recipient: candidate.recipient,
            donor: candidate.donor,
            verified_at: unix_millis(),
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
