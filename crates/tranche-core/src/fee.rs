//! # Fee Calculator
//!
//! Pure basis-point arithmetic: `fee(base, bps) = floor(base * bps / 10000)`.
//! Capital-denominated and token-denominated bases are computed
//! independently.
//!
//! ## Exactness
//!
//! The engine never accepts a fee "close enough" to the computed one. Every
//! caller-supplied fee is recomputed from the stored rate with
//! [`verify_fee()`] and compared for equality, and a zero fee must still be
//! supplied explicitly as zero.

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::{AccountingError, ValidationError};

/// Basis-point denominator (100% == 10000 bps).
pub const BPS_DENOMINATOR: u32 = 10_000;

/// A fee rate in basis points, guaranteed to lie in `[0, 10000]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BasisPoints(u32);

impl BasisPoints {
    /// Zero rate.
    pub const ZERO: BasisPoints = BasisPoints(0);

    /// Validate and wrap a basis-point rate.
    pub fn new(bps: u32) -> Result<Self, ValidationError> {
        Self::checked("bps", bps)
    }

    /// Validate a rate, naming the field it was configured for.
    pub fn checked(field: &'static str, bps: u32) -> Result<Self, ValidationError> {
        if bps > BPS_DENOMINATOR {
            return Err(ValidationError::BpsOutOfRange { field, bps });
        }
        Ok(Self(bps))
    }

    /// The raw rate.
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for BasisPoints {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BasisPoints> for u32 {
    fn from(value: BasisPoints) -> Self {
        value.0
    }
}

impl std::fmt::Display for BasisPoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

/// `floor(base * bps / 10000)`.
pub fn fee(base: Amount, bps: BasisPoints) -> Result<Amount, AccountingError> {
    base.checked_mul(Amount::from(bps.get()))
        .map(|p| p / Amount::from(BPS_DENOMINATOR))
        .ok_or(AccountingError::Overflow { operation: "fee" })
}

/// Recompute a fee and require the supplied value to match it exactly.
///
/// Returns the verified fee.
pub fn verify_fee(
    kind: &'static str,
    base: Amount,
    bps: BasisPoints,
    supplied: Amount,
) -> Result<Amount, AccountingError> {
    let expected = fee(base, bps)?;
    if supplied != expected {
        return Err(AccountingError::FeeMismatch {
            kind,
            expected,
            supplied,
        });
    }
    Ok(expected)
}

/// The four fee rates of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Platform share of raised capital.
    pub platform_capital: BasisPoints,
    /// Platform share of supplied purchase tokens.
    pub platform_token: BasisPoints,
    /// Referrer share of raised capital.
    pub referrer_capital: BasisPoints,
    /// Referrer share of supplied purchase tokens.
    pub referrer_token: BasisPoints,
}

/// A base amount split into the platform fee, the referrer fee, and the
/// remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub platform: Amount,
    pub referrer: Amount,
    pub net: Amount,
}

impl FeeSchedule {
    /// Reject schedules whose combined capital fees exceed the raise.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let capital = self.platform_capital.get() + self.referrer_capital.get();
        if capital > BPS_DENOMINATOR {
            return Err(ValidationError::BpsOutOfRange {
                field: "platform_capital + referrer_capital",
                bps: capital,
            });
        }
        Ok(())
    }

    /// Fees on raised capital and the project's net proceeds.
    pub fn capital_split(&self, base: Amount) -> Result<FeeSplit, AccountingError> {
        split(base, self.platform_capital, self.referrer_capital)
    }

    /// Fees due on top of a token supply of `base`. Token fees are charged
    /// in addition to the supply, so `net` is `base` itself.
    pub fn token_split(&self, base: Amount) -> Result<FeeSplit, AccountingError> {
        Ok(FeeSplit {
            platform: fee(base, self.platform_token)?,
            referrer: fee(base, self.referrer_token)?,
            net: base,
        })
    }
}

fn split(base: Amount, platform: BasisPoints, referrer: BasisPoints) -> Result<FeeSplit, AccountingError> {
    let platform = fee(base, platform)?;
    let referrer = fee(base, referrer)?;
    let net = base
        .checked_sub(platform)
        .and_then(|n| n.checked_sub(referrer))
        .ok_or(AccountingError::Overflow { operation: "fee split" })?;
    Ok(FeeSplit {
        platform,
        referrer,
        net,
    })
}
