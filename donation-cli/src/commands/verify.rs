//! Verify command implementation.

use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

use donation_core::{ChainId, DonationClaim, VerificationOutcome};
use donation_verifier::{get_chain, ChainEntry, VerificationRouter, VerifierConfig, VerifyError};

use crate::output;

/// Arguments for the verify command.
#[derive(Args)]
pub struct VerifyArgs {
    /// Transaction hash (EVM) or signature (Solana)
    pub tx: String,

    /// Address that should have received the donation
    #[arg(long)]
    pub to: String,

    /// Claimed amount in base units (wei, lamports)
    #[arg(short, long)]
    pub amount: String,

    /// Chain name or id (sepolia, ethereum, base, solana, 8453, solana:devnet, ...)
    #[arg(short, long, default_value = "sepolia")]
    pub chain: String,

    /// Custom RPC URL (overrides chain default)
    #[arg(long)]
    pub rpc_url: Option<String>,

    /// Verifier config file (TOML)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Timeout in seconds (overrides the config)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Session the claim is credited to
    #[arg(long, default_value = "cli")]
    pub session: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// JSON output structure.
#[derive(Serialize)]
struct JsonOutput {
    success: bool,
    chain: String,
    tx_reference: String,
    admissible: bool,
    time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<VerificationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Exit code when the claim matches but is not final yet.
const EXIT_PENDING: i32 = 2;

/// Run the verify command.
pub async fn run(args: VerifyArgs) -> i32 {
    let start = Instant::now();

    let (router, chain_id) = match build_router(&args) {
        Ok(r) => r,
        Err(e) => return fail(&args, start, &e, "Run `donation chains` for supported chains."),
    };

    let claim = DonationClaim::new(
        chain_id,
        args.tx.as_str(),
        args.to.as_str(),
        args.amount.as_str(),
        args.session.as_str(),
    );

    if !args.json {
        let network = get_chain(&args.chain).map(|p| p.description).unwrap_or("custom network");
        output::checking(&claim, network);
    }

    match router.submit_claim(&claim).await {
        Ok(outcome) => {
            let elapsed = start.elapsed().as_millis() as u64;
            let admissible = outcome.is_admissible();

            if args.json {
                output::json(&JsonOutput {
                    success: true,
                    chain: chain_id.to_string(),
                    tx_reference: args.tx.clone(),
                    admissible,
                    time_ms: elapsed,
                    outcome: Some(outcome),
                    error: None,
                });
            } else {
                output::outcome(&outcome, elapsed);
                if !admissible {
                    output::next_step("Re-run once the transaction has more confirmations.");
                }
            }

            if admissible {
                0
            } else {
                EXIT_PENDING
            }
        }
        Err(e) => {
            let hint = match &e {
                VerifyError::ChainUnavailable(_) => "Check your network connection or try a different RPC URL.",
                VerifyError::NotFound { .. } => "Check the transaction hash and the chain.",
                _ => "Check the claim fields.",
            };
            fail(&args, start, &e, hint)
        }
    }
}

/// Router serving the requested chain, from `--config` or presets.
fn build_router(args: &VerifyArgs) -> Result<(VerificationRouter, ChainId), VerifyError> {
    let mut config = match &args.config {
        Some(path) => VerifierConfig::load(path)?,
        None => VerifierConfig::default(),
    };

    let requested = ChainEntry::preset(&args.chain);
    let chain_id = requested.chain_id()?;

    // Loaded configs have validated chain ids.
    let mut entry = config
        .chains
        .iter()
        .find(|e| e.chain_id().ok() == Some(chain_id))
        .cloned()
        .unwrap_or(requested);
    if let Some(url) = &args.rpc_url {
        entry.rpc_url = Some(url.clone());
    }
    config.chains = vec![entry];

    if let Some(secs) = args.timeout {
        config.timeout_ms = secs.saturating_mul(1000);
    }

    Ok((VerificationRouter::from_config(&config)?, chain_id))
}

fn fail(args: &VerifyArgs, start: Instant, e: &VerifyError, hint: &str) -> i32 {
    if args.json {
        output::json(&JsonOutput {
            success: false,
            chain: args.chain.clone(),
            tx_reference: args.tx.clone(),
            admissible: false,
            time_ms: start.elapsed().as_millis() as u64,
            outcome: None,
            error: Some(e.to_string()),
        });
    } else {
        output::rejected("Verification failed", e);
        output::next_step(hint);
    }
    1
}
