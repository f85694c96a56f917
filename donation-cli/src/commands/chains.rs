//! Chains command implementation.

use donation_verifier::CHAINS;

use crate::output;

/// Run the chains command.
pub fn run() -> i32 {
    output::chain_table(CHAINS);
    output::next_step("Pass --chain <NAME> to verify, or --rpc-url to use your own node.");
    0
}
