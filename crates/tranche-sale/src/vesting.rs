//! # Vesting Configuration
//!
//! The schedule under which an investor's purchased tokens are released.
//! Each allocation leaf commits to the digest of the investor's config, so
//! the schedule is fixed off-ledger together with the amount.
//!
//! ## Release Math
//!
//! - `Linear`: nothing before `start + cliff`, then `total * elapsed / duration`
//!   until `start + duration`, then everything.
//! - `LinearEpoch`: as linear, but `elapsed` is rounded down to whole epochs
//!   and `duration == epoch_duration * epoch_count`.
//!
//! The immediate-release fraction is paid to the investor at claim time and
//! never enters the schedule.

use serde::{Deserialize, Serialize};
use tranche_core::amount::mul_div_floor;
use tranche_core::{
    fee, sha256_digest, AccountingError, Amount, BasisPoints, CanonicalBytes, ContentDigest,
    Timestamp, ValidationError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VestingKind {
    Linear,
    LinearEpoch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VestingConfig {
    pub kind: VestingKind,
    pub start: Timestamp,
    pub duration_secs: u64,
    #[serde(default)]
    pub cliff_secs: u64,
    #[serde(default)]
    pub epoch_duration_secs: u64,
    #[serde(default)]
    pub epoch_count: u64,
    pub immediate_release: BasisPoints,
}

impl VestingConfig {
    /// Check internal consistency, and that the schedule starts no earlier
    /// than the sale's lockup end when one is known.
    pub fn validate(&self, lockup_end: Option<Timestamp>) -> Result<(), ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidVestingConfig { reason };
        if self.duration_secs == 0 {
            return Err(invalid("duration must be non-zero".into()));
        }
        if self.cliff_secs > self.duration_secs {
            return Err(invalid(format!(
                "cliff {}s exceeds duration {}s",
                self.cliff_secs, self.duration_secs
            )));
        }
        match self.kind {
            VestingKind::Linear => {
                if self.epoch_duration_secs != 0 || self.epoch_count != 0 {
                    return Err(invalid("linear schedules take no epochs".into()));
                }
            }
            VestingKind::LinearEpoch => {
                if self.epoch_duration_secs == 0 || self.epoch_count == 0 {
                    return Err(invalid("epoch duration and count must be non-zero".into()));
                }
                if self.epoch_duration_secs.checked_mul(self.epoch_count) != Some(self.duration_secs) {
                    return Err(invalid(format!(
                        "{} epochs of {}s do not span duration {}s",
                        self.epoch_count, self.epoch_duration_secs, self.duration_secs
                    )));
                }
            }
        }
        if let Some(lockup_end) = lockup_end {
            if self.start < lockup_end {
                return Err(invalid(format!(
                    "start {} precedes lockup end {lockup_end}",
                    self.start
                )));
            }
        }
        if self.start.checked_add_secs(self.duration_secs).is_none() {
            return Err(invalid("schedule end overflows".into()));
        }
        Ok(())
    }

    /// SHA-256 over the config's canonical bytes; bound into allocation leaves.
    pub fn digest(&self) -> Result<ContentDigest, ValidationError> {
        let bytes = CanonicalBytes::new(self).map_err(|e| ValidationError::Malformed {
            field: "vesting config",
            reason: e.to_string(),
        })?;
        Ok(sha256_digest(&bytes))
    }

    /// Split a claimed allocation into `(immediate, vested)`.
    pub fn split(&self, amount: Amount) -> Result<(Amount, Amount), AccountingError> {
        let immediate = fee(amount, self.immediate_release)?;
        Ok((immediate, amount - immediate))
    }

    /// Portion of `total` released by `now`.
    pub fn vested_amount(&self, total: Amount, now: Timestamp) -> Amount {
        if now < self.start {
            return 0;
        }
        let elapsed = now.secs_since(&self.start);
        if elapsed < self.cliff_secs {
            return 0;
        }
        if elapsed >= self.duration_secs {
            return total;
        }
        let (num, den) = match self.kind {
            VestingKind::Linear => (elapsed, self.duration_secs),
            VestingKind::LinearEpoch => (
                elapsed.checked_div(self.epoch_duration_secs).unwrap_or(0),
                self.epoch_count,
            ),
        };
        mul_div_floor(total, Amount::from(num), Amount::from(den)).unwrap_or(total)
    }
}
