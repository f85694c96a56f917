//! Chain-access collaborators.
//!
//! Verifiers never talk to the network directly; they go through these
//! traits. The crate ships RPC-backed implementations in [`crate::rpc`], and
//! tests substitute in-memory ones.

use async_trait::async_trait;
use ethers_core::types::{Address, Log, H256, U256};

use crate::error::Result;

/// An EVM transaction joined with its receipt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvmTransaction {
    pub hash: H256,
    pub from: Address,
    pub to: Option<Address>,
    /// Native value in wei.
    pub value: U256,
    /// Block that included the transaction; `None` while in the mempool.
    pub block_number: Option<u64>,
    /// Receipt status; `None` until mined.
    pub success: Option<bool>,
    /// Receipt logs (empty until mined).
    pub logs: Vec<Log>,
}

/// Raw EVM lookups.
#[async_trait]
pub trait EvmChainAccess: Send + Sync {
    /// Transaction plus receipt, or `None` if the node does not know the hash.
    async fn transaction(&self, hash: H256) -> Result<Option<EvmTransaction>>;

    /// Number of blocks from the including block of an already fetched
    /// transaction to the tip, inclusive. `None` if it is not mined.
    async fn finality_depth(&self, tx: &EvmTransaction) -> Result<Option<u64>>;
}

/// One compiled instruction with its account keys resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolanaInstruction {
    pub program_id: String,
    pub accounts: Vec<String>,
    pub data: Vec<u8>,
}

/// A confirmed Solana transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolanaTransaction {
    pub signature: String,
    pub slot: u64,
    /// Set when `meta.err` is non-null.
    pub failed: bool,
    pub instructions: Vec<SolanaInstruction>,
}

/// Commitment level reported by the cluster for a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SolanaCommitment {
    Processed,
    Confirmed,
    Finalized,
}

/// Raw Solana lookups.
#[async_trait]
pub trait SolanaChainAccess: Send + Sync {
    /// Transaction with instructions, or `None` if the cluster does not know it.
    async fn transaction(&self, signature: &str) -> Result<Option<SolanaTransaction>>;

    /// Current commitment of the signature, or `None` if unknown.
    async fn signature_status(&self, signature: &str) -> Result<Option<SolanaCommitment>>;
}
