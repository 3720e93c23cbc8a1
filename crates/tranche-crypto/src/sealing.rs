//! # Sealed Bids
//!
//! An investor in a sealed-bid auction commits to an amount without
//! revealing it. The sale publishes a public point `P = s·G`; the investor
//! picks an ephemeral scalar `l` and publishes:
//!
//! - `R = l·G`, the ephemeral point,
//! - `masked = amount XOR mask(l·P, salt)`,
//! - `tag = check(l·P, salt, amount)`.
//!
//! After the sale reveals `s`, anyone computes `s·R = l·P` and opens every
//! bid. The salt is the investor's account, so a ciphertext copied from
//! another investor opens to garbage and fails its tag.
//!
//! Masks and tags are domain-separated SHA-256 outputs, truncated to 16
//! bytes each.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use tranche_core::amount::decimal;
use tranche_core::{hex, AccountId, Amount, CryptoError, ValidationError};

use crate::curve::{CurvePoint, CurveScalar, SealingCurve};

const MASK_DOMAIN: &[u8] = b"tranche.sealed-bid.mask.v1";
const TAG_DOMAIN: &[u8] = b"tranche.sealed-bid.tag.v1";

/// 16-byte integrity tag over the plaintext amount.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SealTag(pub [u8; 16]);

impl Serialize for SealTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for SealTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode_array::<16>(&s)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Debug for SealTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SealTag({}...)", hex::prefix(&self.0))
    }
}

/// The encrypted amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedAmount {
    /// `R = l·G`.
    pub ephemeral: CurvePoint,
    #[serde(with = "decimal")]
    pub masked: Amount,
    pub tag: SealTag,
}

/// A sealed bid as submitted with an investment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBid {
    pub ciphertext: SealedAmount,
    /// Must equal the submitting investor's account.
    pub salt: AccountId,
    /// Must equal the sale's public point.
    pub public_key: CurvePoint,
}

impl SealedBid {
    /// Check that this bid was sealed for `investor` under `sale_key` and
    /// that its ephemeral point is a usable element of `curve`.
    pub fn check_binding(
        &self,
        curve: &dyn SealingCurve,
        investor: &AccountId,
        sale_key: &CurvePoint,
    ) -> Result<(), ValidationError> {
        if self.salt != *investor {
            return Err(ValidationError::SealedBidSaltMismatch {
                expected: *investor,
                actual: self.salt,
            });
        }
        if self.public_key != *sale_key {
            return Err(ValidationError::SealedBidKeyMismatch);
        }
        curve
            .validate_point(&self.ciphertext.ephemeral)
            .map_err(|e| ValidationError::Malformed {
                field: "sealed bid",
                reason: e.to_string(),
            })
    }
}

fn mask(shared: &CurvePoint, salt: &AccountId) -> Amount {
    let digest = Sha256::new()
        .chain_update(MASK_DOMAIN)
        .chain_update(shared.as_bytes())
        .chain_update(salt.as_bytes())
        .finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Amount::from_be_bytes(bytes)
}

fn tag(shared: &CurvePoint, salt: &AccountId, amount: Amount) -> SealTag {
    let digest = Sha256::new()
        .chain_update(TAG_DOMAIN)
        .chain_update(shared.as_bytes())
        .chain_update(salt.as_bytes())
        .chain_update(amount.to_be_bytes())
        .finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    SealTag(bytes)
}

/// Seal `amount` to `public_key` with ephemeral scalar `local`.
pub fn seal_amount(
    curve: &dyn SealingCurve,
    amount: Amount,
    public_key: &CurvePoint,
    local: &CurveScalar,
    salt: &AccountId,
) -> Result<SealedBid, CryptoError> {
    let ephemeral = curve.public_point(local)?;
    let shared = curve.mul(public_key, local)?;
    Ok(SealedBid {
        ciphertext: SealedAmount {
            ephemeral,
            masked: amount ^ mask(&shared, salt),
            tag: tag(&shared, salt, amount),
        },
        salt: *salt,
        public_key: *public_key,
    })
}

/// Open a sealed amount with the sale's private scalar.
///
/// Fails with `CryptoError::Decryption` when the tag does not match, which
/// is what a wrong key or a transplanted salt produces.
pub fn open_amount(
    curve: &dyn SealingCurve,
    sealed: &SealedAmount,
    private: &CurveScalar,
    salt: &AccountId,
) -> Result<Amount, CryptoError> {
    let shared = curve.mul(&sealed.ephemeral, private)?;
    let amount = sealed.masked ^ mask(&shared, salt);
    if tag(&shared, salt, amount) != sealed.tag {
        return Err(CryptoError::Decryption(format!(
            "sealed amount for {salt} does not open under this key"
        )));
    }
    Ok(amount)
}
