//! # Key Generation
//!
//! Two kinds of keys leave this module:
//!
//! - Ed25519 signer keys for pre-liquid attestations. The `.pub` file holds
//!   the signer's account, which is what the directory records.
//! - Sealing keys for sealed-bid auctions. The `.point` file goes into the
//!   sale config; the `.scalar` file stays with the platform until results
//!   are published.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use rand::rngs::OsRng;
use tranche_crypto::{CurvePoint, CurveScalar, Ed25519KeyPair, SealingCurveKind};

/// Arguments shared by both key generators.
#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Output directory for the key files.
    #[arg(long, short, default_value = ".")]
    pub output: PathBuf,
    /// Prefix for the key filenames.
    #[arg(long, default_value = "tranche")]
    pub prefix: String,
}

fn prepare(output: &Path) -> Result<()> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create output directory: {}", output.display()))
}

fn write_key(path: &Path, hex: &str, what: &str) -> Result<()> {
    std::fs::write(path, hex).with_context(|| format!("failed to write {what}: {}", path.display()))
}

/// Generate an attestation signer keypair.
pub fn run_keygen(args: &KeygenArgs) -> Result<u8> {
    prepare(&args.output)?;
    let key = Ed25519KeyPair::generate();
    let account = key.account();

    let key_path = args.output.join(format!("{}.key", args.prefix));
    let pub_path = args.output.join(format!("{}.pub", args.prefix));
    write_key(&key_path, &tranche_core::hex::encode(&key.seed_bytes()), "signing key")?;
    write_key(&pub_path, &account.to_hex(), "signer account")?;

    tracing::info!(account = %account, "generated signer key");
    println!("OK: generated Ed25519 signer key");
    println!("  Signing key:    {}", key_path.display());
    println!("  Signer account: {}", pub_path.display());
    println!("  Account (hex):  {}", account.to_hex());
    Ok(0)
}

/// Generate a sealing scalar and its public point.
pub fn run_sealing_keygen(args: &KeygenArgs) -> Result<u8> {
    prepare(&args.output)?;
    let curve = SealingCurveKind::default().backend();
    let scalar = curve.random_scalar(&mut OsRng);
    let point = curve
        .public_point(&scalar)
        .context("failed to derive the sealing point")?;

    let scalar_path = args.output.join(format!("{}.scalar", args.prefix));
    let point_path = args.output.join(format!("{}.point", args.prefix));
    write_key(&scalar_path, &scalar.to_hex(), "sealing scalar")?;
    write_key(&point_path, &point.to_hex(), "sealing point")?;

    println!("OK: generated {} sealing key", curve.name());
    println!("  Private scalar: {}", scalar_path.display());
    println!("  Public point:   {}", point_path.display());
    println!("  Point (hex):    {}", point.to_hex());
    Ok(0)
}

/// Load a signer key written by [`run_keygen`].
pub fn load_signer(path: &Path) -> Result<Ed25519KeyPair> {
    let hex = crate::read_value(path, "signing key")?;
    Ed25519KeyPair::from_seed_hex(&hex).with_context(|| format!("invalid signing key: {}", path.display()))
}

/// Load a sealing scalar written by [`run_sealing_keygen`].
pub fn load_scalar(path: &Path) -> Result<CurveScalar> {
    let hex = crate::read_value(path, "sealing scalar")?;
    CurveScalar::from_hex(&hex).with_context(|| format!("invalid sealing scalar: {}", path.display()))
}

/// Load a sealing point written by [`run_sealing_keygen`].
pub fn load_point(path: &Path) -> Result<CurvePoint> {
    let hex = crate::read_value(path, "sealing point")?;
    CurvePoint::from_hex(&hex).with_context(|| format!("invalid sealing point: {}", path.display()))
}
