//! # Amounts
//!
//! All token quantities are `u128` in the asset's smallest unit. Anything
//! that enters a canonical (signed or hashed) payload serializes as a decimal
//! string through [`decimal`], since JSON numbers above `u64::MAX` are not
//! representable in the canonicalization pipeline.

/// A token quantity in the asset's smallest unit.
pub type Amount = u128;

/// Fixed-point precision for allocation rates (`1e18` == 100%).
pub const RATE_PRECISION: Amount = 1_000_000_000_000_000_000;

/// `floor(a * b / d)`, or `None` on overflow or a zero divisor.
pub fn mul_div_floor(a: Amount, b: Amount, d: Amount) -> Option<Amount> {
    if d == 0 {
        return None;
    }
    a.checked_mul(b).map(|p| p / d)
}

/// Serde adapter: `u128` as a decimal string.
pub mod decimal {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(serde::de::Error::custom(format!(
                "amount must be a decimal integer string, got {s:?}"
            )));
        }
        s.parse::<u128>().map_err(serde::de::Error::custom)
    }
}
