//! # Price-Discovery Strategy
//!
//! The lifecycle core is shared by all four variants. Only the acceptance
//! step differs:
//!
//! | Variant | Invest payload | Exposure bound | Leaf version |
//! |---------|----------------|----------------|--------------|
//! | fixed price | none | minimum only | none |
//! | sealed-bid auction | [`SealedBid`] bound to caller and sale key | minimum only | none |
//! | pre-liquid (open, windowed) | invest attestation | attested cumulative cap | latest invest nonce |
//!
//! Pre-liquid variants additionally require a fresh attestation for the
//! excess-capital and allocation claims.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tranche_core::amount::{mul_div_floor, RATE_PRECISION};
use tranche_core::{
    AccountId, AccountingError, Amount, ContentDigest, SaleError, SaleId, SignatureError, Timestamp,
    ValidationError,
};
use tranche_crypto::SealedBid;

use crate::attestation::{
    verify_attestation, AttestationAction, AttestationScope, SignedAttestation, VerifiedAttestation,
};
use crate::config::PriceDiscovery;
use crate::state::InvestorPosition;

/// Variant-specific data submitted with an investment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvestPayload {
    #[default]
    Plain,
    SealedBid(SealedBid),
    Attestation(SignedAttestation),
}

impl InvestPayload {
    fn name(&self) -> &'static str {
        match self {
            Self::Plain => "plain investment",
            Self::SealedBid(_) => "sealed bid",
            Self::Attestation(_) => "attestation",
        }
    }
}

/// Everything attestation verification needs from the sale.
#[derive(Debug, Clone, Copy)]
pub struct AttestationGate<'a> {
    pub sale: SaleId,
    pub chain_id: u64,
    pub signer: AccountId,
    pub now: Timestamp,
    pub consumed: &'a BTreeSet<ContentDigest>,
}

impl AttestationGate<'_> {
    pub fn verify(
        &self,
        signed: &SignedAttestation,
        account: AccountId,
        action: AttestationAction,
        last_nonce: u64,
    ) -> Result<VerifiedAttestation, SignatureError> {
        let scope = AttestationScope {
            account,
            sale: self.sale,
            chain_id: self.chain_id,
            action,
            now: self.now,
            last_nonce,
        };
        verify_attestation(signed, &scope, &self.signer, self.consumed)
    }
}

/// What an accepted investment adds to the position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Acceptance {
    pub sealed_bid: Option<SealedBid>,
    pub attestation: Option<VerifiedAttestation>,
}

impl PriceDiscovery {
    /// Run the variant's acceptance rule for `amount` more capital from
    /// `investor`.
    pub fn accept(
        &self,
        investor: AccountId,
        amount: Amount,
        position: &InvestorPosition,
        payload: &InvestPayload,
        gate: &AttestationGate<'_>,
    ) -> Result<Acceptance, SaleError> {
        match (self, payload) {
            (PriceDiscovery::FixedPrice { .. }, InvestPayload::Plain) => Ok(Acceptance::default()),

            (PriceDiscovery::SealedBidAuction { public_key, curve }, InvestPayload::SealedBid(bid)) => {
                bid.check_binding(curve.backend(), &investor, public_key)?;
                if position.sealed_bid.is_some_and(|prev| prev != *bid) {
                    return Err(ValidationError::SealedBidChanged { account: investor }.into());
                }
                Ok(Acceptance {
                    sealed_bid: Some(*bid),
                    attestation: None,
                })
            }

            (
                PriceDiscovery::PreLiquidOpen | PriceDiscovery::PreLiquidWindowed,
                InvestPayload::Attestation(signed),
            ) => {
                let verified = gate.verify(signed, investor, AttestationAction::Invest, position.last_nonce)?;
                let requested = position
                    .capital()
                    .checked_add(amount)
                    .ok_or(AccountingError::Overflow { operation: "position capital" })?;
                if requested > verified.position_cap {
                    return Err(AccountingError::CapExceeded {
                        account: investor,
                        cap: verified.position_cap,
                        requested,
                    }
                    .into());
                }
                Ok(Acceptance {
                    sealed_bid: None,
                    attestation: Some(verified),
                })
            }

            (_, InvestPayload::Plain) => Err(ValidationError::MissingPayload {
                variant: self.name(),
                payload: self.expected_payload(),
            }
            .into()),

            (_, other) => Err(ValidationError::UnexpectedPayload {
                variant: self.name(),
                payload: other.name(),
            }
            .into()),
        }
    }

    fn expected_payload(&self) -> &'static str {
        match self {
            Self::FixedPrice { .. } => "plain investment",
            Self::SealedBidAuction { .. } => "sealed bid",
            Self::PreLiquidOpen | Self::PreLiquidWindowed => "attestation",
        }
    }

    /// Verify the attestation a claim carries: required for pre-liquid
    /// variants, rejected for priced ones.
    pub fn claim_attestation(
        &self,
        attestation: Option<&SignedAttestation>,
        investor: AccountId,
        action: AttestationAction,
        position: &InvestorPosition,
        gate: &AttestationGate<'_>,
    ) -> Result<Option<VerifiedAttestation>, SaleError> {
        match (self.is_pre_liquid(), attestation) {
            (true, Some(signed)) => Ok(Some(gate.verify(signed, investor, action, position.last_nonce)?)),
            (true, None) => Err(ValidationError::MissingPayload {
                variant: self.name(),
                payload: "attestation",
            }
            .into()),
            (false, Some(_)) => Err(ValidationError::UnexpectedPayload {
                variant: self.name(),
                payload: "attestation",
            }
            .into()),
            (false, None) => Ok(None),
        }
    }

    /// Version committed in this investor's settlement leaves.
    pub fn leaf_version(&self, position: &InvestorPosition) -> Option<u64> {
        self.is_pre_liquid().then_some(position.version)
    }

    /// Upper bound on tokens a fixed-price sale can allocate for
    /// `accepted_capital`. `None` for variants without a price.
    pub fn max_allocation(&self, accepted_capital: Amount) -> Result<Option<Amount>, AccountingError> {
        match self {
            Self::FixedPrice { token_price } => mul_div_floor(accepted_capital, RATE_PRECISION, *token_price)
                .map(Some)
                .ok_or(AccountingError::Overflow { operation: "fixed-price allocation" }),
            _ => Ok(None),
        }
    }

    /// Tokens a pre-liquid investor is owed at `allocation_rate` of the
    /// published allocation.
    pub fn attested_allocation(
        total_tokens_allocated: Amount,
        allocation_rate: Amount,
    ) -> Result<Amount, AccountingError> {
        mul_div_floor(total_tokens_allocated, allocation_rate, RATE_PRECISION)
            .ok_or(AccountingError::Overflow { operation: "attested allocation" })
    }
}
