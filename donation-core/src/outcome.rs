//! Verification outcome structure.
//!
//! An outcome is the verifier's judgment on a single claim. It is produced
//! once and never modified; admission reads it and either creates a
//! [`Donation`](crate::Donation) or refuses.

use ethers_core::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chain::ChainId;

/// How irreversible the chain considers the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalityState {
    /// Seen (or not yet seen) but below the finality threshold. Poll again.
    Pending,
    /// Deep enough under the chain's confirmation policy.
    Confirmed,
    /// Reported final by the cluster itself.
    Finalized,
}

impl fmt::Display for FinalityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Finalized => write!(f, "finalized"),
        }
    }
}

/// Result of verifying a donation claim.
///
/// `valid` reports whether the on-chain fields matched the claim. A valid
/// outcome may still be `Pending`; only [`is_admissible`](Self::is_admissible)
/// outcomes may become donations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub chain_id: ChainId,
    pub tx_reference: String,
    pub valid: bool,
    #[serde(with = "decimal_amount::option", default)]
    pub confirmed_amount: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub confirmed_recipient: Option<String>,
    /// Block number (EVM) or slot (Solana) that included the transaction.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub block_or_slot_height: Option<u64>,
    pub finality: FinalityState,
}

impl VerificationOutcome {
    /// A matching transaction at the given finality.
    pub fn matched(
        chain_id: ChainId,
        tx_reference: impl Into<String>,
        amount: U256,
        recipient: impl Into<String>,
        height: Option<u64>,
        finality: FinalityState,
    ) -> Self {
        Self {
            chain_id,
            tx_reference: tx_reference.into(),
            valid: true,
            confirmed_amount: Some(amount),
            confirmed_recipient: Some(recipient.into()),
            block_or_slot_height: height,
            finality,
        }
    }

    /// Nothing conclusive yet (for example the verification timed out).
    pub fn undetermined(chain_id: ChainId, tx_reference: impl Into<String>) -> Self {
        Self {
            chain_id,
            tx_reference: tx_reference.into(),
            valid: false,
            confirmed_amount: None,
            confirmed_recipient: None,
            block_or_slot_height: None,
            finality: FinalityState::Pending,
        }
    }

    /// Whether this outcome may be turned into a donation.
    pub fn is_admissible(&self) -> bool {
        self.valid && self.finality != FinalityState::Pending && self.confirmed_amount.is_some()
    }

    /// Whether the caller should poll again later.
    pub fn is_pending(&self) -> bool {
        self.finality == FinalityState::Pending
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.confirmed_amount, self.valid) {
            (Some(amount), true) => write!(
                f,
                "{} on chain {} VALID ({} base units, {})",
                self.tx_reference, self.chain_id, amount, self.finality
            ),
            _ => write!(
                f,
                "{} on chain {} UNDETERMINED ({})",
                self.tx_reference, self.chain_id, self.finality
            ),
        }
    }
}

/// Serialize `U256` amounts as base-10 strings rather than ethers' hex form.
pub(crate) mod decimal_amount {
    use ethers_core::types::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(amount: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        crate::claim::parse_base_units(&text).map_err(D::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S>(amount: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match amount {
                Some(a) => serializer.serialize_some(&a.to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|text| crate::claim::parse_base_units(&text).map_err(D::Error::custom))
                .transpose()
        }
    }
}
