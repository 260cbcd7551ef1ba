//! # safetrade CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use safetrade_cli::check::{run_check, CheckArgs};
use safetrade_cli::fees::{run_fees, FeesArgs};
use safetrade_cli::invoice::{run_invoice, InvoiceArgs};
use safetrade_cli::transitions::{run_transitions, TransitionsArgs};

/// SafeTrade lifecycle tooling.
///
/// Inspects transition tables, checks individual transitions and computes
/// invoice and fee amounts without a running server.
#[derive(Parser, Debug)]
#[command(name = "safetrade", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the transition table of one or all state machines.
    Transitions(TransitionsArgs),

    /// Check one transition. Exit code 0 on allow, 2 on reject.
    Check(CheckArgs),

    /// Invoice amount derivation.
    Invoice(InvoiceArgs),

    /// Quote fees and seller payout for a purchase price.
    Fees(FeesArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Transitions(args) => run_transitions(&args),
        Commands::Check(args) => run_check(&args),
        Commands::Invoice(args) => run_invoice(&args),
        Commands::Fees(args) => run_fees(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
