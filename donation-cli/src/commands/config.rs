//! Config command implementation.

use clap::Args;
use std::path::PathBuf;

use donation_verifier::{VerificationRouter, VerifierConfig};

use crate::output;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    /// Validate this config file instead of printing a template
    #[arg(long, value_name = "PATH")]
    pub check: Option<PathBuf>,
}

/// Run the config command.
pub fn run(args: ConfigArgs) -> i32 {
    let Some(path) = args.check else {
        print!("{}", VerifierConfig::template());
        return 0;
    };

    let config = match VerifierConfig::load(&path) {
        Ok(c) => c,
        Err(e) => {
            output::rejected("Invalid config", &e);
            return 1;
        }
    };

    // Building the router resolves every URL, contract and program id.
    let router = match VerificationRouter::from_config(&config) {
        Ok(r) => r,
        Err(e) => {
            output::rejected("Invalid config", &e);
            return 1;
        }
    };

    output::config_accepted(&path, config.timeout_ms, &router.chains());
    0
}
