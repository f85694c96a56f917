//! Terminal rendering for claims, outcomes and chain listings.

use colored::{ColoredString, Colorize};
use serde::Serialize;
use std::fmt;
use std::path::Path;

use donation_core::{ChainFamily, ChainId, DonationClaim, FinalityState, VerificationOutcome};
use donation_verifier::ChainPreset;

/// Width of the label column in outcome and config summaries.
const LABEL_WIDTH: usize = 12;

/// Announce the claim about to be checked.
pub fn checking(claim: &DonationClaim, network: &str) {
    println!(
        "{} Checking {} on {} ({})",
        "⛓".cyan(),
        claim.tx_reference.bold(),
        claim.chain_id,
        network.dimmed()
    );
    println!(
        "  claimed {} to {}",
        units(&claim.chain_id, &claim.claimed_amount),
        claim.recipient_address
    );
}

/// Render a verification outcome with its verdict line.
pub fn outcome(outcome: &VerificationOutcome, elapsed_ms: u64) {
    println!();
    println!("{}", verdict(outcome));
    if let Some(amount) = &outcome.confirmed_amount {
        field("received", &units(&outcome.chain_id, amount));
    }
    if let Some(recipient) = &outcome.confirmed_recipient {
        field("recipient", recipient);
    }
    if let Some(height) = outcome.block_or_slot_height {
        let label = match outcome.chain_id.family() {
            ChainFamily::Evm => "block",
            ChainFamily::Solana => "slot",
        };
        field(label, &height.to_string());
    }
    field("finality", &outcome.finality.to_string());
    field("checked in", &format!("{:.2}s", elapsed_ms as f64 / 1000.0));
    println!();
}

/// Report a claim or config that could not be accepted. Goes to stderr.
pub fn rejected(what: &str, reason: &dyn fmt::Display) {
    eprintln!("{} {}: {}", "✗".red().bold(), what.red(), reason);
}

/// Suggest what the user should do next.
pub fn next_step(msg: &str) {
    println!("  {} {}", "↳".dimmed(), msg.dimmed());
}

/// Table of built-in chain presets.
pub fn chain_table(presets: &[ChainPreset]) {
    println!("\n{}", "Donation networks".bold());
    println!(
        "{:<14} {:<20} {:<8} {}",
        "name".bold(),
        "chain id".bold(),
        "depth".bold(),
        "notes".bold()
    );
    for preset in presets {
        let depth = match preset.chain_id.family() {
            ChainFamily::Evm => preset.min_confirmations.to_string(),
            ChainFamily::Solana => "final".to_string(),
        };
        println!(
            "{:<14} {:<20} {:<8} {}",
            preset.name.green(),
            preset.chain_id.to_string(),
            depth,
            preset.description.dimmed()
        );
    }
    println!();
}

/// Summary of a config file that loaded and resolved cleanly.
pub fn config_accepted(path: &Path, timeout_ms: u64, chains: &[ChainId]) {
    println!("{} {} is valid", "✔".green().bold(), path.display());
    field("timeout", &format!("{} ms", timeout_ms));
    for chain_id in chains {
        field("chain", &chain_id.to_string());
    }
}

/// Print a value as pretty JSON on stdout.
pub fn json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => rejected("Could not encode JSON output", &e),
    }
}

fn field(label: &str, value: &str) {
    println!("  {:<width$} {}", label.dimmed(), value, width = LABEL_WIDTH);
}

/// One-line verdict for an outcome.
fn verdict(outcome: &VerificationOutcome) -> ColoredString {
    if !outcome.valid {
        return "? Could not settle the claim yet (not mined or RPC timed out)".yellow();
    }
    match outcome.finality {
        FinalityState::Pending => "⏳ Transfer matches the claim, waiting for finality".yellow(),
        FinalityState::Confirmed | FinalityState::Finalized => {
            "✔ Donation verified, safe to credit".green().bold()
        }
    }
}

/// Amount with the chain's base unit name.
fn units(chain_id: &ChainId, amount: &impl fmt::Display) -> String {
    let unit = match chain_id.family() {
        ChainFamily::Evm => "wei",
        ChainFamily::Solana => "lamports",
    };
    format!("{} {}", amount, unit)
}
