//! Chain identifiers.
//!
//! EVM networks are identified by their numeric chain id (EIP-155), Solana
//! clusters by name. The textual form is what configuration files and the
//! CLI use: `11155111` for Sepolia, `solana:devnet` for the Solana devnet.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Family of chains sharing one verification strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    /// Ethereum-compatible chains (receipts, logs, wei).
    Evm,
    /// Solana clusters (signatures, instructions, lamports).
    Solana,
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evm => write!(f, "evm"),
            Self::Solana => write!(f, "solana"),
        }
    }
}

/// A Solana cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SolanaCluster {
    MainnetBeta,
    Devnet,
    Testnet,
}

impl SolanaCluster {
    /// Canonical cluster name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MainnetBeta => "mainnet-beta",
            Self::Devnet => "devnet",
            Self::Testnet => "testnet",
        }
    }
}

/// Network identifier used as the routing key for verification.
///
/// # Example
///
/// ```rust
/// use donation_core::{ChainFamily, ChainId};
///
/// let sepolia: ChainId = "11155111".parse().unwrap();
/// assert_eq!(sepolia, ChainId::Evm(11155111));
/// assert_eq!(sepolia.family(), ChainFamily::Evm);
///
/// let devnet: ChainId = "solana:devnet".parse().unwrap();
/// assert_eq!(devnet.to_string(), "solana:devnet");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChainId {
    /// EVM chain by EIP-155 chain id.
    Evm(u64),
    /// Solana cluster.
    Solana(SolanaCluster),
}

impl ChainId {
    /// The verification family this chain belongs to.
    pub fn family(&self) -> ChainFamily {
        match self {
            Self::Evm(_) => ChainFamily::Evm,
            Self::Solana(_) => ChainFamily::Solana,
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evm(id) => write!(f, "{}", id),
            Self::Solana(cluster) => write!(f, "solana:{}", cluster.as_str()),
        }
    }
}

impl FromStr for ChainId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Some(rest) = trimmed.strip_prefix("solana") {
            let cluster = match rest {
                "" | ":mainnet" | ":mainnet-beta" => SolanaCluster::MainnetBeta,
                ":devnet" => SolanaCluster::Devnet,
                ":testnet" => SolanaCluster::Testnet,
                _ => return Err(CoreError::InvalidChainId(s.to_string())),
            };
            return Ok(Self::Solana(cluster));
        }

        trimmed
            .parse::<u64>()
            .map(Self::Evm)
            .map_err(|_| CoreError::InvalidChainId(s.to_string()))
    }
}

impl TryFrom<String> for ChainId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ChainId> for String {
    fn from(value: ChainId) -> Self {
        value.to_string()
    }
}
