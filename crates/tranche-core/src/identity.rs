//! # Domain Identity Newtypes
//!
//! Newtype wrappers for every identifier the sale engine handles. You cannot
//! pass an `AssetId` where an `AccountId` is expected.
//!
//! ## Security Invariant
//!
//! `AccountId` is the 32-byte identity of a ledger participant. For the
//! platform signer it doubles as the Ed25519 verifying key, and for investors
//! it is the salt bound into sealed bids. The all-zero account is the "zero
//! address" and is rejected wherever a real counterparty is required.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::hex;

/// A 32-byte ledger account identifier.
///
/// Serializes as a 64-character lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    /// The zero account. Never a valid counterparty.
    pub const ZERO: AccountId = AccountId([0u8; 32]);

    /// Create an account identifier from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Deterministically derive an account from a namespace and seed.
    ///
    /// Used for sale vault accounts and in tests:
    /// `SHA256("tranche.account." || namespace || 0x00 || seed)`.
    pub fn derive(namespace: &str, seed: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"tranche.account.");
        hasher.update(namespace.as_bytes());
        hasher.update([0u8]);
        hasher.update(seed);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        Self(out)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is the zero account.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Reject the zero account, naming the field it was supplied for.
    pub fn ensure_nonzero(&self, field: &'static str) -> Result<(), ValidationError> {
        if self.is_zero() {
            return Err(ValidationError::ZeroAccount { field });
        }
        Ok(())
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parse from 64 hex chars (optional `0x` prefix).
    pub fn from_hex(s: &str) -> Result<Self, ValidationError> {
        hex::decode_array::<32>(s)
            .map(Self)
            .map_err(|reason| ValidationError::Malformed {
                field: "account",
                reason,
            })
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Debug for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountId({}...)", hex::prefix(&self.0))
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// A fungible asset identifier (capital or purchase token).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId(String);

impl AssetId {
    /// Create an asset identifier. Must be non-empty with no whitespace.
    pub fn new(symbol: impl Into<String>) -> Result<Self, ValidationError> {
        let symbol = symbol.into();
        if symbol.is_empty() || symbol.chars().any(char::is_whitespace) {
            return Err(ValidationError::Malformed {
                field: "asset",
                reason: format!("asset identifier must be non-empty without whitespace: {symbol:?}"),
            });
        }
        Ok(Self(symbol))
    }

    /// The identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AssetId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AssetId> for String {
    fn from(value: AssetId) -> Self {
        value.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a sale instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SaleId(pub Uuid);

impl SaleId {
    /// Generate a new random sale identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SaleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SaleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sale:{}", self.0)
    }
}
