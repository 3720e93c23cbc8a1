//! # Attestation Signing
//!
//! The platform signer issues one attestation per pre-liquid action. Each
//! carries a per-investor nonce that must exceed the last one the sale saw
//! for that investor, and an expiry.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use tranche_core::{AccountId, Amount, SaleId, Timestamp};
use tranche_sale::{Attestation, AttestationAction};
use uuid::Uuid;

#[derive(Args, Debug)]
pub struct AttestArgs {
    #[command(subcommand)]
    pub command: AttestCommand,
}

#[derive(Subcommand, Debug)]
pub enum AttestCommand {
    /// Sign an attestation with the platform signer key.
    Sign(SignArgs),
}

#[derive(Args, Debug)]
pub struct SignArgs {
    /// Platform signer key file (hex seed).
    #[arg(long)]
    pub key: PathBuf,
    /// Investor account (hex).
    #[arg(long)]
    pub account: String,
    /// Sale UUID.
    #[arg(long)]
    pub sale: String,
    #[arg(long, default_value_t = 1)]
    pub chain_id: u64,
    #[arg(long, value_enum)]
    pub action: ActionArg,
    /// Cumulative capital the position may hold.
    #[arg(long, default_value_t = 0)]
    pub cap: Amount,
    /// Share of the token allocation, 1e18 fixed point.
    #[arg(long, default_value_t = 0)]
    pub rate: Amount,
    #[arg(long)]
    pub nonce: u64,
    /// Expiry, RFC 3339 UTC (e.g. 2026-06-30T00:00:00Z).
    #[arg(long)]
    pub expires_at: String,
    /// Write the signed attestation here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ActionArg {
    Invest,
    WithdrawExcess,
    ClaimAllocation,
}

impl From<ActionArg> for AttestationAction {
    fn from(a: ActionArg) -> Self {
        match a {
            ActionArg::Invest => AttestationAction::Invest,
            ActionArg::WithdrawExcess => AttestationAction::WithdrawExcess,
            ActionArg::ClaimAllocation => AttestationAction::ClaimAllocation,
        }
    }
}

pub fn run_attest(args: &AttestArgs) -> Result<u8> {
    match &args.command {
        AttestCommand::Sign(sign) => cmd_sign(sign),
    }
}

fn cmd_sign(args: &SignArgs) -> Result<u8> {
    let signer = crate::keys::load_signer(&args.key)?;
    let sale = args.sale.strip_prefix("sale:").unwrap_or(&args.sale);
    let attestation = Attestation {
        account: AccountId::from_hex(&args.account).context("invalid investor account")?,
        sale: SaleId(Uuid::parse_str(sale).context("invalid sale id")?),
        chain_id: args.chain_id,
        position_cap: args.cap,
        allocation_rate: args.rate,
        action: args.action.into(),
        nonce: args.nonce,
        expires_at: Timestamp::parse(&args.expires_at).context("invalid expiry")?,
    };
    let signed = attestation.sign(&signer).context("failed to sign attestation")?;
    tracing::info!(
        account = %signed.attestation.account,
        action = %signed.attestation.action,
        nonce = signed.attestation.nonce,
        "attestation signed"
    );
    crate::emit_json(&signed, args.out.as_deref())?;
    Ok(0)
}
