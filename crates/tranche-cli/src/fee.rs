//! # Fee Quotes
//!
//! `supply_tokens` and `withdraw_capital` reject any fee argument that is
//! not exactly `floor(base * bps / 10000)`. This prints the values to pass.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use tranche_core::{fee, Amount, BasisPoints, FeeSplit};
use tranche_sale::SaleConfig;

#[derive(Args, Debug)]
pub struct FeeArgs {
    /// Base amount in smallest units.
    #[arg(long)]
    pub base: Amount,
    /// Quote a single rate instead of a sale's schedule.
    #[arg(long, conflicts_with_all = ["config", "kind"])]
    pub bps: Option<u32>,
    /// Sale config (YAML) whose fee schedule applies.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Which side of the schedule to quote.
    #[arg(long, value_enum, default_value_t = FeeKind::Capital)]
    pub kind: FeeKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FeeKind {
    Capital,
    Token,
}

pub fn run_fee(args: &FeeArgs) -> Result<u8> {
    if let Some(bps) = args.bps {
        let bps = BasisPoints::new(bps).context("invalid basis points")?;
        println!("{}", fee(args.base, bps).context("fee overflows")?);
        return Ok(0);
    }
    let Some(path) = &args.config else {
        bail!("either --bps or --config is required");
    };
    let config = load_config(path)?;
    let split = quote(&config, args.kind, args.base)?;
    println!("platform: {}", split.platform);
    println!("referrer: {}", split.referrer);
    println!("net:      {}", split.net);
    Ok(0)
}

fn load_config(path: &std::path::Path) -> Result<SaleConfig> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read sale config: {}", path.display()))?;
    SaleConfig::from_yaml(&body).with_context(|| format!("invalid sale config: {}", path.display()))
}

/// The split a sale's schedule produces for `base`.
pub fn quote(config: &SaleConfig, kind: FeeKind, base: Amount) -> Result<FeeSplit> {
    let split = match kind {
        FeeKind::Capital => config.fees.capital_split(base),
        FeeKind::Token => config.fees.token_split(base),
    };
    split.context("fee overflows")
}
