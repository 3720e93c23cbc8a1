//! # tranche-sale: Multi-Phase Token Sale Lifecycle
//!
//! One lifecycle core shared by four price-discovery variants:
//!
//! - **Fixed price**: capital buys tokens at a configured price.
//! - **Sealed-bid auction**: investors commit to encrypted amounts that open
//!   only once the sale publishes its results and reveals the sealing key.
//! - **Pre-liquid (open / windowed)**: no price yet; each investor's exposure
//!   is capped by attestations co-signed by the platform signer.
//!
//! ## Architecture
//!
//! ```text
//!   SaleConfig ──▶ Sale ──┬──▶ PriceDiscovery::accept   (strategy)
//!                  │      ├──▶ verify_attestation        (attestation)
//!                  │      ├──▶ SettlementLeaf::verify    (settlement)
//!                  │      └──▶ fee / verify_fee          (tranche-core)
//!                  │
//!                  └── collaborators: TokenLedger, Directory, VestingFactory
//! ```
//!
//! Allocation is computed off-ledger after the refund window closes and
//! published as three Merkle roots; each investor settles with proofs
//! against them.
//!
//! ## Crate Policy
//!
//! - Every entry point takes an explicit [`CallContext`].
//! - A failing call leaves the sale record unchanged.
//! - Collaborators are trait objects; [`collab`] provides in-memory ones.

pub mod attestation;
pub mod collab;
pub mod config;
pub mod sale;
pub mod settlement;
pub mod state;
pub mod strategy;
pub mod vesting;

pub use attestation::{
    verify_attestation, Attestation, AttestationAction, AttestationScope, SignedAttestation,
    VerifiedAttestation,
};
pub use collab::{
    Directory, DirectoryEntries, DirectoryKey, InMemoryLedger, InMemoryVestingFactory,
    StaticDirectory, TokenLedger, VestingFactory, VestingInstance,
};
pub use config::{ConfigError, PeriodBounds, PeriodRange, PriceDiscovery, SaleConfig};
pub use sale::{vault_account, AllocationClaim, CallContext, ClaimReceipt, ResultsPublication, Sale};
pub use settlement::{
    InvestorOutcome, InvestorProofs, SettlementBundle, SettlementLeaf, SettlementRoots,
    SettlementTree,
};
pub use state::{InvestorPosition, SalePhase, SaleRecord, SaleStatus};
pub use strategy::{Acceptance, AttestationGate, InvestPayload};
pub use vesting::{VestingConfig, VestingKind};
