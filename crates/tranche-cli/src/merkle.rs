//! # Settlement Trees
//!
//! `merkle build` turns the off-ledger outcome of a sale into the bundle the
//! platform publishes (roots and totals) and distributes (per-investor
//! proofs). `merkle verify` checks one investor's claim against a bundle
//! exactly as the sale would.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tranche_core::{AccountId, Amount};
use tranche_sale::{InvestorOutcome, SettlementBundle, SettlementLeaf, SettlementTree, VestingConfig};

#[derive(Args, Debug)]
pub struct MerkleArgs {
    #[command(subcommand)]
    pub command: MerkleCommand,
}

#[derive(Subcommand, Debug)]
pub enum MerkleCommand {
    /// Build the three settlement trees from an outcomes file.
    Build {
        /// JSON file with `vesting` (default schedule) and `outcomes`.
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Write the bundle here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Verify one investor's leaf against a bundle.
    Verify {
        /// Bundle produced by `merkle build`.
        #[arg(long)]
        bundle: PathBuf,
        /// Investor account (hex).
        #[arg(long)]
        account: String,
        #[arg(long, value_enum)]
        tree: TreeArg,
        /// Leaf amount in smallest units.
        #[arg(long)]
        amount: Amount,
        /// Position version, for pre-liquid sales.
        #[arg(long)]
        version: Option<u64>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TreeArg {
    Accepted,
    Excess,
    Allocation,
}

impl From<TreeArg> for SettlementTree {
    fn from(t: TreeArg) -> Self {
        match t {
            TreeArg::Accepted => SettlementTree::AcceptedCapital,
            TreeArg::Excess => SettlementTree::ExcessCapital,
            TreeArg::Allocation => SettlementTree::TokenAllocation,
        }
    }
}

/// Input to `merkle build`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomesFile {
    pub vesting: VestingConfig,
    pub outcomes: Vec<InvestorOutcome>,
}

pub fn run_merkle(args: &MerkleArgs) -> Result<u8> {
    match &args.command {
        MerkleCommand::Build { file, out } => cmd_build(file, out.as_deref()),
        MerkleCommand::Verify {
            bundle,
            account,
            tree,
            amount,
            version,
        } => cmd_verify(bundle, account, *tree, *amount, *version),
    }
}

fn cmd_build(file: &std::path::Path, out: Option<&std::path::Path>) -> Result<u8> {
    let input: OutcomesFile = crate::read_json(file, "outcomes")?;
    let bundle = SettlementBundle::build(&input.outcomes, &input.vesting).context("failed to build settlement trees")?;
    tracing::info!(
        investors = bundle.proofs.len(),
        total_accepted_capital = %bundle.total_accepted_capital,
        total_tokens_allocated = %bundle.total_tokens_allocated,
        "settlement trees built"
    );
    crate::emit_json(&bundle, out)?;
    Ok(0)
}

fn cmd_verify(
    bundle: &std::path::Path,
    account: &str,
    tree: TreeArg,
    amount: Amount,
    version: Option<u64>,
) -> Result<u8> {
    let bundle: SettlementBundle = crate::read_json(bundle, "bundle")?;
    let account = AccountId::from_hex(account).context("invalid account")?;
    let Some(proofs) = bundle.proofs.get(&account) else {
        println!("FAIL: {account} is not in the bundle");
        return Ok(1);
    };
    let tree = SettlementTree::from(tree);
    let (root, proof, vesting) = match tree {
        SettlementTree::AcceptedCapital => (bundle.roots.accepted_capital, &proofs.accepted_capital, None),
        SettlementTree::ExcessCapital => (bundle.roots.excess_capital, &proofs.excess_capital, None),
        SettlementTree::TokenAllocation => (
            bundle.roots.token_allocation,
            &proofs.token_allocation,
            Some(proofs.vesting.digest().context("vesting config does not canonicalize")?),
        ),
    };
    let leaf = SettlementLeaf {
        tree,
        account,
        amount,
        version,
        vesting,
    };
    match leaf.verify(&root, proof) {
        Ok(()) => {
            println!("OK: {} leaf for {account} verifies against {root}", tree.name());
            Ok(0)
        }
        Err(e) => {
            println!("FAIL: {e}");
            Ok(1)
        }
    }
}
