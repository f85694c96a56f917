//! EVM chain access over JSON-RPC.
//!
//! Wraps `ethers_providers::Provider` with an LRU cache of deeply confirmed
//! transactions, exponential backoff retry logic, and error classification.

use async_trait::async_trait;
use ethers_core::types::H256;
use ethers_providers::{Http, Middleware, Provider, ProviderError};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::access::{EvmChainAccess, EvmTransaction};
use crate::error::{Result, VerifyError};
use crate::rpc::{classify_message, default_backoff, with_backoff};

/// Default cache size (number of transactions).
const DEFAULT_CACHE_SIZE: usize = 100;

/// Transactions this deep are treated as immutable and cached.
const CACHE_MIN_DEPTH: u64 = 64;

/// RPC-backed [`EvmChainAccess`].
///
/// Features:
/// - LRU cache for deeply confirmed transactions (configurable via `DONATION_RPC_CACHE_SIZE`)
/// - Exponential backoff with jitter for retries
/// - Smart error classification
///
/// # Example
///
/// ```rust,no_run
/// use donation_verifier::access::EvmChainAccess;
/// use donation_verifier::EvmRpcClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = EvmRpcClient::new("https://ethereum-sepolia.publicnode.com")?;
///     let hash = "0x1111111111111111111111111111111111111111111111111111111111111111".parse()?;
///
///     if let Some(tx) = client.transaction(hash).await? {
///         if let Some(depth) = client.finality_depth(&tx).await? {
///             println!("{} confirmations", depth);
///         }
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct EvmRpcClient {
    provider: Arc<Provider<Http>>,
    cache: Arc<Mutex<LruCache<H256, EvmTransaction>>>,
    backoff: Vec<Duration>,
    fetch_count: Arc<AtomicUsize>,
}

impl EvmRpcClient {
    /// Create a new RPC client from a URL.
    ///
    /// Cache size can be configured via the `DONATION_RPC_CACHE_SIZE` environment variable.
    /// Default is 100 transactions.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the URL is invalid.
    pub fn new(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| VerifyError::Config(format!("Invalid RPC URL '{}': {}", rpc_url, e)))?;

        let cache_size = std::env::var("DONATION_RPC_CACHE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CACHE_SIZE);

        Ok(Self {
            provider: Arc::new(provider),
            cache: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN),
            ))),
            backoff: default_backoff(),
            fetch_count: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Replace the retry schedule (one attempt per entry).
    pub fn with_backoff(mut self, schedule: Vec<Duration>) -> Self {
        self.backoff = schedule;
        self
    }

    /// Fetch the latest block number.
    pub async fn latest_block(&self) -> Result<u64> {
        with_backoff(&self.backoff, move || async move {
            self.provider
                .get_block_number()
                .await
                .map(|n| n.as_u64())
                .map_err(classify_error)
        })
        .await
    }

    /// Number of transaction lookups that went to the network.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Get the current cache size (for testing/monitoring).
    pub fn cache_len(&self) -> usize {
        self.cache().len()
    }

    /// Clear the cache.
    pub fn clear_cache(&self) {
        self.cache().clear();
    }

    fn cache(&self) -> MutexGuard<'_, LruCache<H256, EvmTransaction>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch_once(&self, hash: H256) -> Result<Option<EvmTransaction>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let Some(tx) = self
            .provider
            .get_transaction(hash)
            .await
            .map_err(classify_error)?
        else {
            return Ok(None);
        };

        let mut joined = EvmTransaction {
            hash: tx.hash,
            from: tx.from,
            to: tx.to,
            value: tx.value,
            block_number: None,
            success: None,
            logs: Vec::new(),
        };

        if tx.block_number.is_some() {
            if let Some(receipt) = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .map_err(classify_error)?
            {
                joined.block_number = receipt.block_number.map(|n| n.as_u64());
                joined.success = receipt.status.map(|s| s.as_u64() == 1);
                joined.logs = receipt.logs;
            }
        }

        Ok(Some(joined))
    }
}

#[async_trait]
impl EvmChainAccess for EvmRpcClient {
    async fn transaction(&self, hash: H256) -> Result<Option<EvmTransaction>> {
        if let Some(tx) = self.cache().get(&hash) {
            return Ok(Some(tx.clone()));
        }

        with_backoff(&self.backoff, move || self.fetch_once(hash)).await
    }

    async fn finality_depth(&self, tx: &EvmTransaction) -> Result<Option<u64>> {
        let Some(block) = tx.block_number else {
            return Ok(None);
        };

        // A lagging load-balanced node can report a head behind the block.
        let latest = self.latest_block().await?;
        let depth = if latest >= block { latest - block + 1 } else { 0 };

        if depth >= CACHE_MIN_DEPTH {
            self.cache().put(tx.hash, tx.clone());
        }

        Ok(Some(depth))
    }
}

/// Classify an ethers error into our error type.
fn classify_error(error: ProviderError) -> VerifyError {
    classify_message(&error.to_string())
}
