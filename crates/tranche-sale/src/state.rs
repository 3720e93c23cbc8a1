//! # Sale State
//!
//! The persisted record of one sale: its immutable [`SaleConfig`], the
//! mutable [`SaleStatus`], one [`InvestorPosition`] per investor, and the
//! set of consumed attestation digests.
//!
//! ## Phases
//!
//! ```text
//!           now >= start        now > end        now > refund_end          published
//!  Created ─────────────▶ Active ────────▶ Ended ────────────────▶ Closed ───────────▶ Finalized
//!     │                     │                │                       │
//!     └─────────────────────┴────────────────┴───────────────────────┴──▶ Canceled
//!                    (project, until results publication is initialized)
//! ```
//!
//! The phase is derived from timestamps and flags on every read; nothing
//! stores it. `Canceled` is absorbing.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tranche_core::amount::decimal;
use tranche_core::{AccountId, Amount, AssetId, ContentDigest, Timestamp};
use tranche_crypto::{CurveScalar, MerkleHash, SealedBid};

use crate::collab::DirectoryEntries;
use crate::config::SaleConfig;

/// Lifecycle phase of a sale at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalePhase {
    /// Before the start time.
    Created,
    /// Accepting investment.
    Active,
    /// Sale period over, refund window running.
    Ended,
    /// Refund window over, results not yet fully published.
    Closed,
    /// Results and capital published.
    Finalized,
    Canceled,
}

impl std::fmt::Display for SalePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::Active => "ACTIVE",
            Self::Ended => "ENDED",
            Self::Closed => "CLOSED",
            Self::Finalized => "FINALIZED",
            Self::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

/// Mutable sale-level state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleStatus {
    pub start: Timestamp,
    /// `None` while an open-ended sale is running.
    pub end: Option<Timestamp>,
    pub refund_end: Option<Timestamp>,
    pub lockup_end: Option<Timestamp>,

    /// Sum of all positions' current capital.
    #[serde(with = "decimal")]
    pub total_capital_raised: Amount,
    #[serde(with = "decimal")]
    pub total_accepted_capital: Amount,
    #[serde(with = "decimal")]
    pub total_tokens_allocated: Amount,
    #[serde(with = "decimal")]
    pub total_tokens_claimed: Amount,
    /// Gross capital paid out by `withdraw_capital`, fees included.
    #[serde(with = "decimal")]
    pub capital_withdrawn: Amount,
    /// Capital pulled back from the project on cancellation.
    #[serde(with = "decimal")]
    pub capital_returned: Amount,

    pub canceled: bool,
    /// Set by `initialize_results_publication`; locks cancellation.
    pub results_publication_initialized: bool,
    pub results_published: bool,
    pub capital_published: bool,
    pub tokens_supplied: bool,
    pub has_withdrawn_capital: bool,

    pub accepted_capital_root: Option<MerkleHash>,
    pub excess_capital_root: Option<MerkleHash>,
    pub token_allocation_root: Option<MerkleHash>,
    /// Sealing scalar, revealed with the results of an auction.
    pub revealed_private_key: Option<CurveScalar>,

    pub purchase_asset: Option<AssetId>,
    pub directory: DirectoryEntries,
}

impl SaleStatus {
    /// Fresh status for a sale starting at `start`.
    pub fn new(config: &SaleConfig, start: Timestamp, directory: DirectoryEntries) -> Self {
        Self {
            start,
            end: None,
            refund_end: None,
            lockup_end: None,
            total_capital_raised: 0,
            total_accepted_capital: 0,
            total_tokens_allocated: 0,
            total_tokens_claimed: 0,
            capital_withdrawn: 0,
            capital_returned: 0,
            canceled: false,
            results_publication_initialized: false,
            results_published: false,
            capital_published: false,
            tokens_supplied: false,
            has_withdrawn_capital: false,
            accepted_capital_root: None,
            excess_capital_root: None,
            token_allocation_root: None,
            revealed_private_key: None,
            purchase_asset: config.purchase_asset.clone(),
            directory,
        }
    }

    pub fn phase(&self, now: Timestamp) -> SalePhase {
        if self.canceled {
            return SalePhase::Canceled;
        }
        if now < self.start {
            return SalePhase::Created;
        }
        match (self.end, self.refund_end) {
            (None, _) => SalePhase::Active,
            (Some(end), _) if now <= end => SalePhase::Active,
            (Some(_), Some(refund_end)) if now <= refund_end => SalePhase::Ended,
            _ if self.results_published && self.capital_published => SalePhase::Finalized,
            _ => SalePhase::Closed,
        }
    }

    /// Whether the refund window has closed at `now`.
    pub fn refund_window_over(&self, now: Timestamp) -> bool {
        self.refund_end.is_some_and(|r| now > r)
    }
}

/// One investor's stake in a sale. Created on first investment and never
/// removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestorPosition {
    /// Gross capital paid in.
    #[serde(with = "decimal")]
    pub invested: Amount,
    #[serde(with = "decimal")]
    pub refunded: Amount,
    #[serde(with = "decimal")]
    pub excess_claimed: Amount,
    /// Tokens claimed at settlement.
    #[serde(with = "decimal")]
    pub allocation: Amount,

    pub has_refunded: bool,
    pub has_claimed_excess: bool,
    pub has_settled: bool,

    /// Set on the first allocation claim.
    pub vesting: Option<AccountId>,
    /// The bid recorded on first investment in an auction.
    pub sealed_bid: Option<SealedBid>,

    /// Cap from the latest invest attestation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attested_cap: Option<Amount>,
    /// Highest attestation nonce consumed for this investor, any action.
    pub last_nonce: u64,
    /// Nonce of the latest invest attestation; committed in pre-liquid leaves.
    pub version: u64,
}

impl InvestorPosition {
    /// Capital currently held for this investor.
    pub fn capital(&self) -> Amount {
        self.invested
            .saturating_sub(self.refunded)
            .saturating_sub(self.excess_claimed)
    }

    /// A refunded or excess-claimed position takes no further investment.
    pub fn is_closed(&self) -> bool {
        self.has_refunded || self.has_claimed_excess
    }
}

/// Everything a sale persists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub config: SaleConfig,
    pub status: SaleStatus,
    pub positions: BTreeMap<AccountId, InvestorPosition>,
    pub consumed_attestations: BTreeSet<ContentDigest>,
}

impl SaleRecord {
    pub fn position(&self, account: &AccountId) -> Option<&InvestorPosition> {
        self.positions.get(account)
    }

    /// Sum of every position's current capital.
    pub fn positions_capital(&self) -> Amount {
        self.positions
            .values()
            .fold(0, |acc: Amount, p| acc.saturating_add(p.capital()))
    }

    /// Position capital matches the raised total and claims stay within the
    /// allocation.
    pub fn conservation_holds(&self) -> bool {
        let claimed = self
            .positions
            .values()
            .fold(0, |acc: Amount, p| acc.saturating_add(p.allocation));
        self.positions_capital() == self.status.total_capital_raised
            && claimed == self.status.total_tokens_claimed
            && self.status.total_tokens_claimed <= self.status.total_tokens_allocated
    }
}
