//! # tranche-core: Foundational Types for the Sale Engine
//!
//! The leaf of the workspace DAG. Every other `tranche-*` crate depends on
//! it; it depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** `AccountId`, `AssetId`,
//!    `SaleId` are distinct types. A capital asset can never be passed where
//!    an investor account is expected.
//!
//! 2. **`CanonicalBytes` for every signed or hashed payload.** Attestations
//!    and vesting configurations are hashed through the JCS pipeline only.
//!
//! 3. **Integer amounts.** `Amount` is a `u128` in the asset's smallest unit.
//!    Fees are `floor(base * bps / 10_000)` with checked arithmetic; there is
//!    no floating point anywhere in value computation.
//!
//! 4. **Typed failures.** `SaleError` nests one enum per failure class so
//!    callers can match on the class and still read the offending value.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `tranche-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod amount;
pub mod canonical;
pub mod digest;
pub mod error;
pub mod fee;
pub mod hex;
pub mod identity;
pub mod temporal;

pub use amount::Amount;
pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, ContentDigest};
pub use error::{
    AccountingError, AuthorizationError, CanonicalizationError, CryptoError, LedgerError,
    PhaseError, ProofError, SaleError, SignatureError, ValidationError,
};
pub use fee::{fee, verify_fee, BasisPoints, FeeSchedule, FeeSplit, BPS_DENOMINATOR};
pub use identity::{AccountId, AssetId, SaleId};
pub use temporal::Timestamp;
