//! # tranche-cli: Operator Tooling for the Tranche Sale Engine
//!
//! Everything the platform and investors do off-ledger around a sale:
//!
//! - `tranche keygen`: Ed25519 attestation signer keys.
//! - `tranche sealing-keygen`: the sale's sealing scalar and public point.
//! - `tranche seal-bid` / `tranche open-bid`: sealed-bid auction bids.
//! - `tranche merkle build` / `tranche merkle verify`: settlement trees.
//! - `tranche attest sign`: pre-liquid attestations.
//! - `tranche fee`: exact fee quotes for a sale config.
//! - `tranche simulate`: run a YAML-scripted sale against the in-memory
//!   ledger, directory and vesting factory.
//!
//! ## Crate Policy
//!
//! - Argument parsing lives in `main.rs`; handlers here return an exit code.
//! - Handlers delegate to `tranche-sale`; no sale rules are re-implemented.
//! - Key files hold lowercase hex, one value per file.

pub mod attest;
pub mod bid;
pub mod fee;
pub mod keys;
pub mod merkle;
pub mod simulate;

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read a file that holds a single trimmed value, such as a hex key.
pub fn read_value(path: &Path, what: &str) -> Result<String> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {what}: {}", path.display()))?;
    Ok(body.trim().to_string())
}

/// Parse a JSON document from `path`.
pub fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {what}: {}", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("failed to parse {what}: {}", path.display()))
}

/// Parse a YAML document from `path`.
pub fn read_yaml<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {what}: {}", path.display()))?;
    serde_yaml::from_str(&body).with_context(|| format!("failed to parse {what}: {}", path.display()))
}

/// Pretty-print `value` as JSON to `out`, or to stdout when `out` is `None`.
pub fn emit_json<T: Serialize>(value: &T, out: Option<&Path>) -> Result<()> {
    let body = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    match out {
        Some(path) => {
            std::fs::write(path, format!("{body}\n"))
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("OK: wrote {}", path.display());
        }
        None => println!("{body}"),
    }
    Ok(())
}
