//! Chain presets and verifier configuration.
//!
//! Presets carry public RPC endpoints and confirmation depths for the
//! supported networks. A [`VerifierConfig`] (usually loaded from TOML) picks
//! the chains to serve and overrides any preset value.
//!
//! ```toml
//! timeout_ms = 15000
//!
//! [[chains]]
//! chain = "sepolia"
//! min_confirmations = 3
//!
//! [[chains]]
//! chain = "solana:devnet"
//! rpc_url = "https://api.devnet.solana.com"
//! donation_program = "Donate11111111111111111111111111111111111111"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use donation_core::{ChainId, SolanaCluster};

use crate::error::{Result, VerifyError};

/// Default per-claim verification timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// Supported network preset.
#[derive(Debug, Clone)]
pub struct ChainPreset {
    pub name: &'static str,
    pub chain_id: ChainId,
    pub rpc_urls: &'static [&'static str],
    /// Confirmations before an EVM transfer counts as `confirmed`.
    /// Unused for Solana, which waits for `finalized`.
    pub min_confirmations: u64,
    pub description: &'static str,
}

/// All supported chains.
pub const CHAINS: &[ChainPreset] = &[
    ChainPreset {
        name: "ethereum",
        chain_id: ChainId::Evm(1),
        rpc_urls: &[
            "https://eth.llamarpc.com",
            "https://ethereum-rpc.publicnode.com",
            "https://1rpc.io/eth",
        ],
        min_confirmations: 12,
        description: "Ethereum Mainnet",
    },
    ChainPreset {
        name: "sepolia",
        chain_id: ChainId::Evm(11155111),
        rpc_urls: &[
            "https://ethereum-sepolia.publicnode.com",
            "https://rpc.sepolia.org",
            "https://1rpc.io/sepolia",
        ],
        min_confirmations: 3,
        description: "Ethereum Sepolia Testnet",
    },
    ChainPreset {
        name: "base",
        chain_id: ChainId::Evm(8453),
        rpc_urls: &[
            "https://base.publicnode.com",
            "https://mainnet.base.org",
            "https://1rpc.io/base",
        ],
        min_confirmations: 10,
        description: "Base Mainnet (Coinbase L2)",
    },
    ChainPreset {
        name: "arbitrum",
        chain_id: ChainId::Evm(42161),
        rpc_urls: &[
            "https://arbitrum.publicnode.com",
            "https://arb1.arbitrum.io/rpc",
            "https://1rpc.io/arb",
        ],
        min_confirmations: 10,
        description: "Arbitrum One",
    },
    ChainPreset {
        name: "optimism",
        chain_id: ChainId::Evm(10),
        rpc_urls: &[
            "https://optimism.publicnode.com",
            "https://mainnet.optimism.io",
            "https://1rpc.io/op",
        ],
        min_confirmations: 10,
        description: "Optimism Mainnet",
    },
    ChainPreset {
        name: "polygon",
        chain_id: ChainId::Evm(137),
        rpc_urls: &[
            "https://polygon-bor-rpc.publicnode.com",
            "https://polygon-rpc.com",
            "https://1rpc.io/matic",
        ],
        min_confirmations: 64,
        description: "Polygon PoS",
    },
    ChainPreset {
        name: "solana",
        chain_id: ChainId::Solana(SolanaCluster::MainnetBeta),
        rpc_urls: &["https://api.mainnet-beta.solana.com"],
        min_confirmations: 1,
        description: "Solana Mainnet Beta",
    },
    ChainPreset {
        name: "solana-devnet",
        chain_id: ChainId::Solana(SolanaCluster::Devnet),
        rpc_urls: &["https://api.devnet.solana.com"],
        min_confirmations: 1,
        description: "Solana Devnet",
    },
];

/// Get a preset by name (case-insensitive) or by chain id text
/// (`"11155111"`, `"solana:devnet"`).
pub fn get_chain(name_or_id: &str) -> Option<&'static ChainPreset> {
    if let Some(preset) = CHAINS.iter().find(|c| c.name.eq_ignore_ascii_case(name_or_id)) {
        return Some(preset);
    }
    let id: ChainId = name_or_id.parse().ok()?;
    preset_for(id)
}

/// Get the preset for a chain id.
pub fn preset_for(chain_id: ChainId) -> Option<&'static ChainPreset> {
    CHAINS.iter().find(|c| c.chain_id == chain_id)
}

/// Top-level verifier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifierConfig {
    /// Per-claim verification timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub chains: Vec<ChainEntry>,
}

/// One chain to serve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainEntry {
    /// Preset name or chain id text.
    pub chain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confirmations: Option<u64>,
    /// EVM only: verify `Transfer` logs from this contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donation_contract: Option<String>,
    /// Solana only: verify `donate` instructions to this program.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donation_program: Option<String>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            chains: Vec::new(),
        }
    }
}

impl VerifierConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `Config` on syntax errors, unknown keys, or chains that
    /// resolve to neither a preset nor a valid chain id.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| VerifyError::Config(e.to_string()))?;
        for entry in &config.chains {
            entry.chain_id()?;
        }
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| VerifyError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// Serve every preset with its defaults.
    pub fn all_presets() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            chains: CHAINS.iter().map(|c| ChainEntry::preset(c.name)).collect(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// A commented starting point for a config file.
    pub fn template() -> String {
        let mut out = String::from("# Donation verifier configuration\n");
        out.push_str(&format!("timeout_ms = {}\n", DEFAULT_TIMEOUT_MS));
        for preset in CHAINS {
            out.push_str(&format!(
                "\n# {}\n[[chains]]\nchain = \"{}\"\n# rpc_url = \"{}\"\n",
                preset.description,
                preset.name,
                preset.rpc_urls.first().copied().unwrap_or_default()
            ));
            match preset.chain_id {
                ChainId::Evm(_) => out.push_str(&format!(
                    "# min_confirmations = {}\n# donation_contract = \"0x...\"\n",
                    preset.min_confirmations
                )),
                ChainId::Solana(_) => out.push_str("# donation_program = \"<base58 program id>\"\n"),
            }
        }
        out
    }
}

impl ChainEntry {
    /// An entry that takes everything from the named preset.
    pub fn preset(name: &str) -> Self {
        Self {
            chain: name.to_string(),
            rpc_url: None,
            min_confirmations: None,
            donation_contract: None,
            donation_program: None,
        }
    }

    pub fn chain_id(&self) -> Result<ChainId> {
        if let Some(preset) = get_chain(&self.chain) {
            return Ok(preset.chain_id);
        }
        self.chain
            .parse()
            .map_err(|e| VerifyError::Config(format!("chain '{}': {}", self.chain, e)))
    }

    /// Explicit URL, else the preset's first endpoint.
    pub fn rpc_url(&self) -> Result<String> {
        if let Some(url) = &self.rpc_url {
            return Ok(url.clone());
        }
        let id = self.chain_id()?;
        preset_for(id)
            .and_then(|p| p.rpc_urls.first())
            .map(|url| url.to_string())
            .ok_or_else(|| {
                VerifyError::Config(format!("chain '{}' has no preset; set rpc_url", self.chain))
            })
    }

    /// Explicit depth, else the preset's, else the verifier default.
    pub fn min_confirmations(&self) -> Result<u64> {
        if let Some(depth) = self.min_confirmations {
            return Ok(depth);
        }
        Ok(preset_for(self.chain_id()?)
            .map(|p| p.min_confirmations)
            .unwrap_or(crate::evm::DEFAULT_MIN_CONFIRMATIONS))
    }
}
