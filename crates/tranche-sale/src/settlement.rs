//! # Settlement Authenticator
//!
//! Three outcome trees are computed off-ledger once the refund window has
//! closed:
//!
//! | Tree | Leaf amount | Consumed by |
//! |------|-------------|-------------|
//! | accepted capital | capital counted toward the raise | `withdraw_unaccepted_capital` |
//! | excess capital | capital returned to the investor | `claim_excess_capital` |
//! | token allocation | purchased tokens | `claim_token_allocation` |
//!
//! The sale stores only the roots. Claims are consumed through one-shot
//! per-investor flags; each account appears at most once per tree.
//!
//! ## Leaf Layout
//!
//! ```text
//! tree_tag (1) || account (32) || amount (16, BE)
//!     [|| version (8, BE)]          pre-liquid sales
//!     [|| vesting digest (32)]      token-allocation tree
//! ```
//!
//! The tag byte differs per tree, so a leaf of one tree never verifies
//! against another tree's root. The version is the nonce of the investor's
//! latest invest attestation; a re-attested position invalidates proofs
//! built against the earlier one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tranche_core::amount::decimal;
use tranche_core::{AccountId, Amount, ContentDigest, CryptoError, ProofError, ValidationError};
use tranche_crypto::{MerkleHash, MerkleProof, MerkleTree};

use crate::vesting::VestingConfig;

/// One of the three outcome trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementTree {
    AcceptedCapital,
    ExcessCapital,
    TokenAllocation,
}

impl SettlementTree {
    pub fn tag(self) -> u8 {
        match self {
            Self::AcceptedCapital => 0x01,
            Self::ExcessCapital => 0x02,
            Self::TokenAllocation => 0x03,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::AcceptedCapital => "accepted capital",
            Self::ExcessCapital => "excess capital",
            Self::TokenAllocation => "token allocation",
        }
    }
}

/// The fields a leaf commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementLeaf {
    pub tree: SettlementTree,
    pub account: AccountId,
    pub amount: Amount,
    pub version: Option<u64>,
    pub vesting: Option<ContentDigest>,
}

impl SettlementLeaf {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 32 + 16 + 8 + 32);
        out.push(self.tree.tag());
        out.extend_from_slice(self.account.as_bytes());
        out.extend_from_slice(&self.amount.to_be_bytes());
        if let Some(version) = self.version {
            out.extend_from_slice(&version.to_be_bytes());
        }
        if let Some(vesting) = &self.vesting {
            out.extend_from_slice(vesting.as_bytes());
        }
        out
    }

    /// Verify this leaf against `root`, reporting the tree, account and
    /// amount on failure.
    pub fn verify(&self, root: &MerkleHash, proof: &MerkleProof) -> Result<(), ProofError> {
        if proof.verify(root, &self.encode()) {
            Ok(())
        } else {
            Err(ProofError::InvalidProof {
                tree: self.tree.name(),
                account: self.account,
                amount: self.amount,
            })
        }
    }
}

/// The three published roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRoots {
    pub accepted_capital: MerkleHash,
    pub excess_capital: MerkleHash,
    pub token_allocation: MerkleHash,
}

/// One investor's off-ledger outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestorOutcome {
    pub account: AccountId,
    #[serde(with = "decimal")]
    pub accepted_capital: Amount,
    #[serde(with = "decimal")]
    pub excess_capital: Amount,
    #[serde(with = "decimal")]
    pub token_allocation: Amount,
    /// Position version, for pre-liquid sales.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Overrides the bundle's default schedule for this investor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vesting: Option<VestingConfig>,
}

/// Proofs handed to one investor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestorProofs {
    pub accepted_capital: MerkleProof,
    pub excess_capital: MerkleProof,
    pub token_allocation: MerkleProof,
    pub vesting: VestingConfig,
}

/// Everything the platform publishes and distributes after a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementBundle {
    pub roots: SettlementRoots,
    #[serde(with = "decimal")]
    pub total_accepted_capital: Amount,
    #[serde(with = "decimal")]
    pub total_tokens_allocated: Amount,
    pub proofs: BTreeMap<AccountId, InvestorProofs>,
}

fn merkle_err(e: CryptoError) -> ValidationError {
    ValidationError::Malformed {
        field: "settlement outcomes",
        reason: e.to_string(),
    }
}

fn checked_sum(total: Amount, add: Amount) -> Result<Amount, ValidationError> {
    total.checked_add(add).ok_or_else(|| ValidationError::Malformed {
        field: "settlement outcomes",
        reason: "totals overflow".into(),
    })
}

impl SettlementBundle {
    /// Build all three trees over `outcomes`, in the given order.
    pub fn build(
        outcomes: &[InvestorOutcome],
        default_vesting: &VestingConfig,
    ) -> Result<Self, ValidationError> {
        let mut seen = std::collections::BTreeSet::new();
        let mut accepted = Vec::with_capacity(outcomes.len());
        let mut excess = Vec::with_capacity(outcomes.len());
        let mut allocation = Vec::with_capacity(outcomes.len());
        let mut schedules = Vec::with_capacity(outcomes.len());
        let mut total_accepted_capital: Amount = 0;
        let mut total_tokens_allocated: Amount = 0;

        for o in outcomes {
            o.account.ensure_nonzero("outcome account")?;
            if !seen.insert(o.account) {
                return Err(ValidationError::Malformed {
                    field: "settlement outcomes",
                    reason: format!("{} appears more than once", o.account),
                });
            }
            let vesting = o.vesting.clone().unwrap_or_else(|| default_vesting.clone());
            vesting.validate(None)?;
            let leaf = |tree, amount, vesting| SettlementLeaf {
                tree,
                account: o.account,
                amount,
                version: o.version,
                vesting,
            };
            accepted.push(leaf(SettlementTree::AcceptedCapital, o.accepted_capital, None).encode());
            excess.push(leaf(SettlementTree::ExcessCapital, o.excess_capital, None).encode());
            allocation.push(
                leaf(SettlementTree::TokenAllocation, o.token_allocation, Some(vesting.digest()?)).encode(),
            );
            schedules.push(vesting);
            total_accepted_capital = checked_sum(total_accepted_capital, o.accepted_capital)?;
            total_tokens_allocated = checked_sum(total_tokens_allocated, o.token_allocation)?;
        }

        let accepted = MerkleTree::from_leaves(&accepted).map_err(merkle_err)?;
        let excess = MerkleTree::from_leaves(&excess).map_err(merkle_err)?;
        let allocation = MerkleTree::from_leaves(&allocation).map_err(merkle_err)?;

        let mut proofs = BTreeMap::new();
        for (i, (o, vesting)) in outcomes.iter().zip(schedules).enumerate() {
            proofs.insert(
                o.account,
                InvestorProofs {
                    accepted_capital: accepted.proof(i).map_err(merkle_err)?,
                    excess_capital: excess.proof(i).map_err(merkle_err)?,
                    token_allocation: allocation.proof(i).map_err(merkle_err)?,
                    vesting,
                },
            );
        }

        Ok(Self {
            roots: SettlementRoots {
                accepted_capital: accepted.root(),
                excess_capital: excess.root(),
                token_allocation: allocation.root(),
            },
            total_accepted_capital,
            total_tokens_allocated,
            proofs,
        })
    }
}
