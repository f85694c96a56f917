//! Donation CLI
//!
//! Terminal-first interface for checking on-chain donation claims.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "donation")]
#[command(version)]
#[command(about = "Verify on-chain donation claims across EVM chains and Solana", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a donation claim against the chain
    Verify(commands::verify::VerifyArgs),

    /// List supported chains
    Chains,

    /// Print or check a verifier config file
    Config(commands::config::ConfigArgs),
}

fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let exit_code = match cli.command {
        Commands::Verify(args) => commands::verify::run(args).await,
        Commands::Chains => commands::chains::run(),
        Commands::Config(args) => commands::config::run(args),
    };

    std::process::exit(exit_code);
}
