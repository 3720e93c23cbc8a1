//! # Sealed Bids
//!
//! `seal-bid` is what an investor's client runs before investing in an
//! auction: it seals the bid amount to the sale's public point, salted with
//! the investor's account, under a fresh ephemeral scalar. The output is the
//! JSON `SealedBid` submitted with `invest`.
//!
//! `open-bid` is the platform side, run with the sealing scalar.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use rand::rngs::OsRng;
use tranche_core::{AccountId, Amount};
use tranche_crypto::{open_amount, seal_amount, SealedBid, SealingCurveKind};

#[derive(Args, Debug)]
pub struct SealBidArgs {
    /// File holding the sale's public sealing point (hex).
    #[arg(long)]
    pub point: PathBuf,
    /// Investor account (hex); the bid only verifies for this account.
    #[arg(long)]
    pub investor: String,
    /// Bid amount in smallest units.
    #[arg(long)]
    pub amount: Amount,
    /// Write the sealed bid here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct OpenBidArgs {
    /// File holding the sale's sealing scalar (hex).
    #[arg(long)]
    pub key: PathBuf,
    /// Sealed bid JSON.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

pub fn run_seal_bid(args: &SealBidArgs) -> Result<u8> {
    let point = crate::keys::load_point(&args.point)?;
    let investor = AccountId::from_hex(&args.investor).context("invalid investor account")?;
    let curve = SealingCurveKind::default().backend();
    curve.validate_point(&point).context("sealing point is not usable")?;

    let local = curve.random_scalar(&mut OsRng);
    let bid = seal_amount(curve, args.amount, &point, &local, &investor).context("failed to seal bid")?;
    tracing::debug!(investor = %investor, "bid sealed");
    crate::emit_json(&bid, args.out.as_deref())?;
    Ok(0)
}

pub fn run_open_bid(args: &OpenBidArgs) -> Result<u8> {
    let scalar = crate::keys::load_scalar(&args.key)?;
    let bid: SealedBid = crate::read_json(&args.file, "sealed bid")?;
    let curve = SealingCurveKind::default().backend();
    match open_amount(curve, &bid.ciphertext, &scalar, &bid.salt) {
        Ok(amount) => {
            println!("{amount}");
            Ok(0)
        }
        Err(e) => {
            println!("FAIL: {e}");
            Ok(1)
        }
    }
}
