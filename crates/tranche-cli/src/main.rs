//! # tranche CLI entry point
//!
//! Parses command-line arguments and dispatches to the handlers in the
//! `tranche_cli` library.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tranche_cli::attest::{run_attest, AttestArgs};
use tranche_cli::bid::{run_open_bid, run_seal_bid, OpenBidArgs, SealBidArgs};
use tranche_cli::fee::{run_fee, FeeArgs};
use tranche_cli::keys::{run_keygen, run_sealing_keygen, KeygenArgs};
use tranche_cli::merkle::{run_merkle, MerkleArgs};
use tranche_cli::simulate::{run_simulate, SimulateArgs};

/// Tranche sale engine tooling.
///
/// Key generation, sealed bids, settlement trees, attestations, fee quotes
/// and scripted sale simulation.
#[derive(Parser, Debug)]
#[command(name = "tranche", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an Ed25519 attestation signer key.
    Keygen(KeygenArgs),

    /// Generate a sale's sealing scalar and public point.
    SealingKeygen(KeygenArgs),

    /// Seal a bid amount to a sale's public point.
    SealBid(SealBidArgs),

    /// Open a sealed bid with the sale's sealing scalar.
    OpenBid(OpenBidArgs),

    /// Build or verify settlement Merkle trees.
    Merkle(MerkleArgs),

    /// Sign pre-liquid attestations.
    Attest(AttestArgs),

    /// Quote the exact fees a sale expects.
    Fee(FeeArgs),

    /// Run a YAML-scripted sale against in-memory collaborators.
    Simulate(SimulateArgs),
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
        .init();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "tranche CLI starting");

    let result = match cli.command {
        Commands::Keygen(args) => run_keygen(&args),
        Commands::SealingKeygen(args) => run_sealing_keygen(&args),
        Commands::SealBid(args) => run_seal_bid(&args),
        Commands::OpenBid(args) => run_open_bid(&args),
        Commands::Merkle(args) => run_merkle(&args),
        Commands::Attest(args) => run_attest(&args),
        Commands::Fee(args) => run_fee(&args),
        Commands::Simulate(args) => run_simulate(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
