//! Donation claims and the identifiers that travel with them.
//!
//! A [`DonationClaim`] is an unverified assertion made by the submitting
//! party. It is never mutated; once a verifier has judged it, the claim is
//! discarded and only the resulting outcome moves forward.

use ethers_core::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chain::ChainId;
use crate::error::{CoreError, Result};

/// Maximum number of characters kept from a donor's display name.
pub const MAX_DONOR_NAME_LEN: usize = 64;

/// Maximum number of characters kept from a donor's message.
pub const MAX_DONOR_MESSAGE_LEN: usize = 280;

/// Opaque session identifier handed out by the session collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Untrusted, display-only information supplied by the donor.
///
/// Never consulted during verification. Fields are trimmed and truncated on
/// construction and on deserialization, so overlays can render them without
/// further checks on length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDonorMetadata")]
pub struct DonorMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DonorMetadata {
    /// Build metadata, dropping blank fields and truncating long ones.
    pub fn new(name: Option<&str>, message: Option<&str>) -> Self {
        Self {
            name: clean_text(name, MAX_DONOR_NAME_LEN),
            message: clean_text(message, MAX_DONOR_MESSAGE_LEN),
        }
    }

    /// Re-apply the length and blank rules, e.g. after building the struct literally.
    pub fn cleaned(self) -> Self {
        Self::new(self.name.as_deref(), self.message.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.message.is_none()
    }
}

/// Wire form of [`DonorMetadata`] before cleaning.
#[derive(Deserialize)]
struct RawDonorMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl From<RawDonorMetadata> for DonorMetadata {
    fn from(raw: RawDonorMetadata) -> Self {
        Self::new(raw.name.as_deref(), raw.message.as_deref())
    }
}

fn clean_text(value: Option<&str>, max_chars: usize) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_chars).collect())
}

/// An unverified assertion that a donation occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationClaim {
    /// Network the transaction lives on.
    pub chain_id: ChainId,
    /// Chain-native transaction hash (EVM) or signature (Solana).
    pub tx_reference: String,
    /// Address that should have received the funds.
    pub recipient_address: String,
    /// Claimed amount as a base-10 integer in native base units (wei, lamports).
    pub claimed_amount: String,
    /// Session the donation should be credited to.
    pub session_id: SessionId,
    /// Optional donor-supplied metadata, carried through untouched by verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donor: Option<DonorMetadata>,
}

impl DonationClaim {
    pub fn new(
        chain_id: ChainId,
        tx_reference: impl Into<String>,
        recipient_address: impl Into<String>,
        claimed_amount: impl Into<String>,
        session_id: impl Into<SessionId>,
    ) -> Self {
        Self {
            chain_id,
            tx_reference: tx_reference.into(),
            recipient_address: recipient_address.into(),
            claimed_amount: claimed_amount.into(),
            session_id: session_id.into(),
            donor: None,
        }
    }

    /// Attach donor metadata.
    pub fn with_donor(mut self, donor: DonorMetadata) -> Self {
        let donor = donor.cleaned();
        self.donor = (!donor.is_empty()).then_some(donor);
        self
    }

    /// Parse the claimed amount into base units.
    pub fn amount(&self) -> Result<U256> {
        parse_base_units(&self.claimed_amount)
    }
}

/// Parse a base-10 unsigned integer string into a 256-bit amount.
///
/// Only ASCII digits are accepted: no sign, no decimal point, no exponent.
/// This keeps every comparison in the verification path on exact integers.
///
/// # Example
///
/// ```rust
/// use donation_core::claim::parse_base_units;
///
/// let one_eth = parse_base_units("1000000000000000000").unwrap();
/// assert_eq!(one_eth.to_string(), "1000000000000000000");
/// assert!(parse_base_units("1.0").is_err());
/// ```
pub fn parse_base_units(value: &str) -> Result<U256> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoreError::InvalidAmount(value.to_string()));
    }
    U256::from_dec_str(value).map_err(|_| CoreError::InvalidAmount(value.to_string()))
}
