//! Solana chain access over JSON-RPC.
//!
//! Uses `getTransaction` (json encoding, versioned transactions allowed) and
//! `getSignatureStatuses` with history search. Account indices are resolved
//! against the static keys followed by any lookup-table addresses, writable
//! first, the same order the runtime uses.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::access::{SolanaChainAccess, SolanaCommitment, SolanaInstruction, SolanaTransaction};
use crate::error::{Result, VerifyError};
use crate::rpc::{classify_message, default_backoff, with_backoff};

/// JSON-RPC "invalid params" code; Solana returns it for undecodable signatures.
const INVALID_PARAMS: i64 = -32602;

/// Per-request HTTP timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// RPC-backed [`SolanaChainAccess`].
#[derive(Clone)]
pub struct SolanaRpcClient {
    http: reqwest::Client,
    url: String,
    backoff: Vec<Duration>,
    next_id: Arc<AtomicU64>,
}

impl SolanaRpcClient {
    /// Create a client for one cluster endpoint.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the URL does not parse or the HTTP client cannot be built.
    pub fn new(rpc_url: &str) -> Result<Self> {
        reqwest::Url::parse(rpc_url)
            .map_err(|e| VerifyError::Config(format!("Invalid RPC URL '{}': {}", rpc_url, e)))?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VerifyError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: rpc_url.to_string(),
            backoff: default_backoff(),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Replace the retry schedule (one attempt per entry).
    pub fn with_backoff(mut self, schedule: Vec<Duration>) -> Self {
        self.backoff = schedule;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &'static str, params: Value) -> Result<Option<T>> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| VerifyError::ChainUnavailable(format!("{}: {}", method, e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(classify_message("too many requests"));
        }
        if !status.is_success() {
            return Err(VerifyError::ChainUnavailable(format!("{}: HTTP {}", method, status)));
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| VerifyError::ChainUnavailable(format!("{}: invalid response: {}", method, e)))?;

        if let Some(error) = body.error {
            return Err(if error.code == INVALID_PARAMS {
                VerifyError::MalformedReference(error.message)
            } else {
                classify_message(&error.message)
            });
        }

        Ok(body.result)
    }
}

#[async_trait]
impl SolanaChainAccess for SolanaRpcClient {
    async fn transaction(&self, signature: &str) -> Result<Option<SolanaTransaction>> {
        let params = json!([
            signature,
            {
                "encoding": "json",
                "commitment": "confirmed",
                "maxSupportedTransactionVersion": 0
            }
        ]);

        let raw: Option<RawTransaction> = with_backoff(&self.backoff, move || {
            self.call("getTransaction", params.clone())
        })
        .await?;

        raw.map(|tx| tx.resolve(signature)).transpose()
    }

    async fn signature_status(&self, signature: &str) -> Result<Option<SolanaCommitment>> {
        let params = json!([[signature], { "searchTransactionHistory": true }]);

        let statuses: Option<RawStatuses> = with_backoff(&self.backoff, move || {
            self.call("getSignatureStatuses", params.clone())
        })
        .await?;

        Ok(statuses
            .and_then(|s| s.value.into_iter().next().flatten())
            .map(|status| status.commitment()))
    }
}

#[derive(Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RawTransaction {
    slot: u64,
    meta: Option<RawMeta>,
    transaction: RawEnvelope,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMeta {
    err: Option<Value>,
    #[serde(default)]
    loaded_addresses: Option<LoadedAddresses>,
}

#[derive(Deserialize)]
struct LoadedAddresses {
    #[serde(default)]
    writable: Vec<String>,
    #[serde(default)]
    readonly: Vec<String>,
}

#[derive(Deserialize)]
struct RawEnvelope {
    message: RawMessage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    account_keys: Vec<String>,
    instructions: Vec<RawInstruction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInstruction {
    program_id_index: usize,
    accounts: Vec<usize>,
    data: String,
}

impl RawTransaction {
    fn resolve(self, signature: &str) -> Result<SolanaTransaction> {
        let (failed, loaded) = match self.meta {
            Some(meta) => (meta.err.is_some(), meta.loaded_addresses),
            None => (false, None),
        };

        let mut keys = self.transaction.message.account_keys;
        if let Some(loaded) = loaded {
            keys.extend(loaded.writable);
            keys.extend(loaded.readonly);
        }

        let key = |index: usize| {
            keys.get(index).cloned().ok_or_else(|| {
                VerifyError::ChainUnavailable(format!(
                    "malformed transaction {}: account index {} out of range",
                    signature, index
                ))
            })
        };

        let instructions = self
            .transaction
            .message
            .instructions
            .into_iter()
            .map(|ix| {
                let data = bs58::decode(&ix.data).into_vec().map_err(|e| {
                    VerifyError::ChainUnavailable(format!(
                        "malformed instruction data in {}: {}",
                        signature, e
                    ))
                })?;
                Ok(SolanaInstruction {
                    program_id: key(ix.program_id_index)?,
                    accounts: ix.accounts.into_iter().map(key).collect::<Result<_>>()?,
                    data,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SolanaTransaction {
            signature: signature.to_string(),
            slot: self.slot,
            failed,
            instructions,
        })
    }
}

#[derive(Deserialize)]
struct RawStatuses {
    value: Vec<Option<RawStatus>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStatus {
    confirmations: Option<u64>,
    confirmation_status: Option<String>,
}

impl RawStatus {
    fn commitment(&self) -> SolanaCommitment {
        match self.confirmation_status.as_deref() {
            Some("finalized") => SolanaCommitment::Finalized,
            Some("confirmed") => SolanaCommitment::Confirmed,
            Some(_) => SolanaCommitment::Processed,
            // Older nodes omit the status; null confirmations means rooted.
            None if self.confirmations.is_none() => SolanaCommitment::Finalized,
            None => SolanaCommitment::Confirmed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            SolanaRpcClient::new("not a url"),
            Err(VerifyError::Config(_))
        ));
        assert!(SolanaRpcClient::new("https://api.devnet.solana.com").is_ok());
    }

    #[test]
    fn test_resolve_with_lookup_tables() {
        let raw: RawTransaction = serde_json::from_value(json!({
            "slot": 250,
            "meta": {
                "err": null,
                "loadedAddresses": { "writable": ["Lw"], "readonly": ["Lr"] }
            },
            "transaction": {
                "message": {
                    "accountKeys": ["A", "B"],
                    "instructions": [
                        { "programIdIndex": 3, "accounts": [0, 2], "data": "3Bxs4h24hBtQy9rw" }
                    ]
                }
            }
        }))
        .unwrap();

        let tx = raw.resolve("sig").unwrap();
        assert_eq!(tx.slot, 250);
        assert!(!tx.failed);
        assert_eq!(tx.instructions[0].program_id, "Lr");
        assert_eq!(tx.instructions[0].accounts, vec!["A".to_string(), "Lw".to_string()]);
    }

    #[test]
    fn test_resolve_failed_and_out_of_range() {
        let raw: RawTransaction = serde_json::from_value(json!({
            "slot": 1,
            "meta": { "err": { "InstructionError": [0, "Custom"] } },
            "transaction": {
                "message": {
                    "accountKeys": ["A"],
                    "instructions": [
                        { "programIdIndex": 9, "accounts": [], "data": "" }
                    ]
                }
            }
        }))
        .unwrap();

        assert!(matches!(raw.resolve("sig"), Err(VerifyError::ChainUnavailable(_))));
    }

    #[test]
    fn test_status_commitment() {
        let status = |s: Option<&str>, c: Option<u64>| RawStatus {
            confirmations: c,
            confirmation_status: s.map(str::to_string),
        };
        assert_eq!(status(Some("finalized"), None).commitment(), SolanaCommitment::Finalized);
        assert_eq!(status(Some("confirmed"), Some(3)).commitment(), SolanaCommitment::Confirmed);
        assert_eq!(status(Some("processed"), Some(0)).commitment(), SolanaCommitment::Processed);
        assert_eq!(status(None, None).commitment(), SolanaCommitment::Finalized);
    }
}
