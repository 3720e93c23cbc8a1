//! # Sale Configuration
//!
//! [`SaleConfig`] is fixed when a sale is created and never changes
//! afterwards. Operators describe it in YAML:
//!
//! ```yaml
//! chain_id: 1
//! capital_asset: USDC
//! purchase_asset: TOK
//! sale_period_secs: 604800
//! refund_period_secs: 86400
//! lockup_period_secs: 2592000
//! fees:
//!   platform_capital: 250
//!   platform_token: 100
//!   referrer_capital: 50
//!   referrer_token: 0
//! minimum_investment: "100"
//! project: "<hex account>"
//! referrer: "<hex account>"
//! directory: "<hex account>"
//! price_discovery:
//!   variant: fixed_price
//!   token_price: "2000000"
//! ```
//!
//! ## Schedule
//!
//! ```text
//!  start          end            refund_end          lockup_end
//!    |--- sale ----|--- refund ----|------ lockup -------|
//! ```
//!
//! `end` is `start + sale_period`. For the open-ended pre-liquid flavor the
//! sale has no period; `end` is fixed when the sale is ended explicitly and
//! the two later windows are anchored there.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tranche_core::amount::decimal;
use tranche_core::{AccountId, Amount, AssetId, FeeSchedule, SaleId, Timestamp, ValidationError};
use tranche_crypto::{CurvePoint, SealingCurveKind};

/// Failure to load a sale configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid sale config: {0}")]
    Validation(#[from] ValidationError),
}

// ---------------------------------------------------------------------------
// Price discovery
// ---------------------------------------------------------------------------

/// How the sale turns capital into a token allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum PriceDiscovery {
    /// Capital units per `1e18` purchase-token units.
    FixedPrice {
        #[serde(with = "decimal")]
        token_price: Amount,
    },
    /// Investors submit sealed amounts opened after the reveal.
    SealedBidAuction {
        public_key: CurvePoint,
        #[serde(default)]
        curve: SealingCurveKind,
    },
    /// Attestation-capped sale with no fixed period, ended explicitly.
    PreLiquidOpen,
    /// Attestation-capped sale with a fixed period.
    PreLiquidWindowed,
}

impl PriceDiscovery {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FixedPrice { .. } => "fixed_price",
            Self::SealedBidAuction { .. } => "sealed_bid_auction",
            Self::PreLiquidOpen => "pre_liquid_open",
            Self::PreLiquidWindowed => "pre_liquid_windowed",
        }
    }

    /// Pre-liquid variants are capped by signed attestations instead of a price.
    pub fn is_pre_liquid(&self) -> bool {
        matches!(self, Self::PreLiquidOpen | Self::PreLiquidWindowed)
    }
}

// ---------------------------------------------------------------------------
// Period bounds
// ---------------------------------------------------------------------------

const HOUR: u64 = 3_600;
const WEEK: u64 = 7 * 24 * HOUR;

/// Inclusive range for one period length, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRange {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl PeriodRange {
    pub fn check(&self, field: &'static str, secs: u64) -> Result<(), ValidationError> {
        if secs < self.min_secs || secs > self.max_secs {
            return Err(ValidationError::PeriodOutOfRange {
                field,
                secs,
                min: self.min_secs,
                max: self.max_secs,
            });
        }
        Ok(())
    }
}

/// Permitted lengths of the three sale windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBounds {
    pub sale: PeriodRange,
    pub refund: PeriodRange,
    pub lockup: PeriodRange,
}

impl Default for PeriodBounds {
    fn default() -> Self {
        Self {
            sale: PeriodRange {
                min_secs: HOUR,
                max_secs: 12 * WEEK,
            },
            refund: PeriodRange {
                min_secs: HOUR,
                max_secs: 2 * WEEK,
            },
            lockup: PeriodRange {
                min_secs: HOUR,
                max_secs: 520 * WEEK,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// SaleConfig
// ---------------------------------------------------------------------------

/// Immutable parameters of one sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleConfig {
    #[serde(default)]
    pub sale_id: SaleId,
    /// Bound into every attestation.
    pub chain_id: u64,
    pub capital_asset: AssetId,
    /// `None` until set for pre-liquid sales.
    #[serde(default)]
    pub purchase_asset: Option<AssetId>,
    /// Defaults to the creation time.
    #[serde(default)]
    pub start_time: Option<Timestamp>,
    /// Absent only for [`PriceDiscovery::PreLiquidOpen`].
    #[serde(default)]
    pub sale_period_secs: Option<u64>,
    pub refund_period_secs: u64,
    pub lockup_period_secs: u64,
    pub fees: FeeSchedule,
    #[serde(with = "decimal")]
    pub minimum_investment: Amount,
    pub project: AccountId,
    /// Receives referrer fees.
    pub referrer: AccountId,
    /// Identity of the directory the sale resolves platform roles from.
    pub directory: AccountId,
    pub price_discovery: PriceDiscovery,
    #[serde(default)]
    pub bounds: PeriodBounds,
}

impl SaleConfig {
    /// Parse and validate a YAML sale description.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.project.ensure_nonzero("project")?;
        self.referrer.ensure_nonzero("referrer")?;
        self.directory.ensure_nonzero("directory")?;
        self.fees.validate()?;

        match (&self.price_discovery, self.sale_period_secs) {
            (PriceDiscovery::PreLiquidOpen, None) => {}
            (PriceDiscovery::PreLiquidOpen, Some(_)) => {
                return Err(ValidationError::Malformed {
                    field: "sale_period_secs",
                    reason: "open-ended sales have no sale period".into(),
                })
            }
            (_, None) => {
                return Err(ValidationError::Malformed {
                    field: "sale_period_secs",
                    reason: format!("{} sales require a sale period", self.price_discovery.name()),
                })
            }
            (_, Some(secs)) => self.bounds.sale.check("sale_period_secs", secs)?,
        }
        self.bounds.refund.check("refund_period_secs", self.refund_period_secs)?;
        self.bounds.lockup.check("lockup_period_secs", self.lockup_period_secs)?;

        match &self.price_discovery {
            PriceDiscovery::FixedPrice { token_price } => {
                if *token_price == 0 {
                    return Err(ValidationError::ZeroAmount { field: "token_price" });
                }
            }
            PriceDiscovery::SealedBidAuction { public_key, curve } => {
                curve
                    .backend()
                    .validate_point(public_key)
                    .map_err(|e| ValidationError::Malformed {
                        field: "public_key",
                        reason: e.to_string(),
                    })?;
            }
            PriceDiscovery::PreLiquidOpen | PriceDiscovery::PreLiquidWindowed => {}
        }
        if !self.price_discovery.is_pre_liquid() && self.purchase_asset.is_none() {
            return Err(ValidationError::Malformed {
                field: "purchase_asset",
                reason: format!("{} sales require a purchase asset", self.price_discovery.name()),
            });
        }
        Ok(())
    }

    /// `(end, refund_end, lockup_end)` for a sale period ending at `end`.
    pub fn windows_from(&self, end: Timestamp) -> Result<(Timestamp, Timestamp, Timestamp), ValidationError> {
        let overflow = |field| ValidationError::Malformed {
            field,
            reason: "timestamp overflows".into(),
        };
        let refund_end = end
            .checked_add_secs(self.refund_period_secs)
            .ok_or_else(|| overflow("refund_period_secs"))?;
        let lockup_end = refund_end
            .checked_add_secs(self.lockup_period_secs)
            .ok_or_else(|| overflow("lockup_period_secs"))?;
        Ok((end, refund_end, lockup_end))
    }
}
