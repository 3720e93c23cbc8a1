//! # Error Types: Structured Error Hierarchy
//!
//! Every failing entry point returns a [`SaleError`] whose variant names the
//! failure class (who may call, when, with what input, against which proof
//! or signature, and which ledger amount disagreed) and whose payload carries
//! the offending value. A failing call never leaves partial state behind.
//!
//! ## Design
//!
//! - Authorization errors name the caller that was rejected.
//! - Phase errors carry the timestamps or flags that made the call early,
//!   late, or repeated.
//! - Accounting errors carry expected vs. supplied amounts.

use thiserror::Error;

use crate::amount::Amount;
use crate::identity::{AccountId, AssetId};
use crate::temporal::Timestamp;

/// Top-level error returned by every sale operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaleError {
    /// Wrong caller role.
    #[error("authorization error: {0}")]
    Authorization(#[from] AuthorizationError),

    /// Action outside its valid window.
    #[error("phase error: {0}")]
    Phase(#[from] PhaseError),

    /// Malformed or out-of-range input.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Merkle verification failure or repeated claim.
    #[error("proof error: {0}")]
    Proof(#[from] ProofError),

    /// Invalid, reused, or stale co-signature.
    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    /// Fee or amount mismatch, or nothing to move.
    #[error("accounting error: {0}")]
    Accounting(#[from] AccountingError),

    /// Token ledger refused a transfer.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// The caller does not hold the role the operation requires.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// Platform-only operation.
    #[error("{caller} is not the platform operator")]
    NotPlatform { caller: AccountId },

    /// Project-only operation.
    #[error("{caller} is not the project account")]
    NotProject { caller: AccountId },

    /// Operation reserved for the project or the platform.
    #[error("{caller} is neither the project nor the platform operator")]
    NotProjectOrPlatform { caller: AccountId },

    /// The directory handed in is not the one the sale was created with.
    #[error("directory {actual} is not the sale's directory {expected}")]
    UnknownDirectory {
        expected: AccountId,
        actual: AccountId,
    },

    /// The vesting factory handed in is not the one resolved from the directory.
    #[error("vesting factory {actual} does not match the synced factory {expected}")]
    UnknownVestingFactory {
        expected: AccountId,
        actual: AccountId,
    },
}

/// The operation is not permitted at this point of the sale lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhaseError {
    #[error("sale has not started: now {now}, start {start}")]
    NotStarted { now: Timestamp, start: Timestamp },

    #[error("sale period is over: now {now}, ended {end}")]
    SaleEnded { now: Timestamp, end: Timestamp },

    #[error("sale period is not over: now {now}")]
    SaleNotEnded { now: Timestamp },

    #[error("refund period is over: now {now}, refund end {refund_end}")]
    RefundPeriodOver { now: Timestamp, refund_end: Timestamp },

    #[error("refund period is not over: now {now}")]
    RefundPeriodNotOver { now: Timestamp },

    #[error("sale is canceled")]
    Canceled,

    #[error("sale is not canceled")]
    NotCanceled,

    #[error("cancellation is locked once results publication is initialized")]
    CancelLocked,

    #[error("{action} has already been performed")]
    AlreadyDone { action: &'static str },

    #[error("results publication has not been initialized")]
    ResultsPublicationNotInitialized,

    #[error("sale results have not been published")]
    ResultsNotPublished,

    #[error("capital raised has not been published")]
    CapitalNotPublished,

    #[error("purchase tokens have not been supplied")]
    TokensNotSupplied,

    #[error("purchase asset is not yet known")]
    PurchaseAssetUnknown,

    #[error("sealed-bid private key has not been revealed")]
    PrivateKeyNotRevealed,

    #[error("position of {account} is closed by a refund or excess claim")]
    PositionClosed { account: AccountId },
}

/// Malformed, zero, or out-of-range input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must not be the zero account")]
    ZeroAccount { field: &'static str },

    #[error("{field} must be non-zero")]
    ZeroAmount { field: &'static str },

    #[error("malformed {field}: {reason}")]
    Malformed { field: &'static str, reason: String },

    #[error("{field} of {bps} bps exceeds 10000")]
    BpsOutOfRange { field: &'static str, bps: u32 },

    #[error("{field} of {secs}s outside [{min}s, {max}s]")]
    PeriodOutOfRange {
        field: &'static str,
        secs: u64,
        min: u64,
        max: u64,
    },

    #[error("investment {amount} below minimum {minimum}")]
    BelowMinimum { amount: Amount, minimum: Amount },

    #[error("sealed bid salt {actual} does not match caller {expected}")]
    SealedBidSaltMismatch {
        expected: AccountId,
        actual: AccountId,
    },

    #[error("sealed bid public key does not match the sale's sealing key")]
    SealedBidKeyMismatch,

    #[error("{account} already recorded a different sealed bid")]
    SealedBidChanged { account: AccountId },

    #[error("revealed private key does not match the sale's sealing key")]
    PrivateKeyMismatch,

    #[error("{variant} sales require a {payload} with each investment")]
    MissingPayload {
        variant: &'static str,
        payload: &'static str,
    },

    #[error("{variant} sales do not accept a {payload}")]
    UnexpectedPayload {
        variant: &'static str,
        payload: &'static str,
    },

    #[error("{operation} is not supported by {variant} sales")]
    UnsupportedForVariant {
        operation: &'static str,
        variant: &'static str,
    },

    #[error("invalid vesting config: {reason}")]
    InvalidVestingConfig { reason: String },
}

/// Merkle settlement failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("{tree} proof for {account} amount {amount} does not verify")]
    InvalidProof {
        tree: &'static str,
        account: AccountId,
        amount: Amount,
    },

    #[error("{account} has already settled its token allocation")]
    AlreadySettled { account: AccountId },

    #[error("{account} has already claimed excess capital")]
    ExcessAlreadyClaimed { account: AccountId },

    #[error("{account} has already refunded")]
    AlreadyRefunded { account: AccountId },
}

/// Co-signature failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("attestation signature for {account} is invalid: {reason}")]
    Invalid { account: AccountId, reason: String },

    #[error("attestation {digest} has already been used")]
    Reused { digest: String },

    #[error("attestation nonce {nonce} for {account} is not newer than {last_nonce}")]
    Stale {
        account: AccountId,
        nonce: u64,
        last_nonce: u64,
    },

    #[error("attestation expired at {expires_at}, now {now}")]
    Expired { expires_at: Timestamp, now: Timestamp },

    #[error("attestation {field} mismatch: expected {expected}, got {actual}")]
    Mismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },
}

/// Value-accounting failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountingError {
    #[error("{kind} fee mismatch: expected {expected}, supplied {supplied}")]
    FeeMismatch {
        kind: &'static str,
        expected: Amount,
        supplied: Amount,
    },

    #[error("{field} mismatch: expected {expected}, supplied {supplied}")]
    AmountMismatch {
        field: &'static str,
        expected: Amount,
        supplied: Amount,
    },

    #[error("{account} has no position in this sale")]
    NoPosition { account: AccountId },

    #[error("{account} has no capital to refund")]
    NothingToRefund { account: AccountId },

    #[error("nothing to withdraw")]
    NothingToWithdraw,

    #[error("{account} requested {requested} but has {invested} invested")]
    ExceedsInvested {
        account: AccountId,
        requested: Amount,
        invested: Amount,
    },

    #[error("{account} position {requested} exceeds attested cap {cap}")]
    CapExceeded {
        account: AccountId,
        cap: Amount,
        requested: Amount,
    },

    #[error("accepted capital {accepted} exceeds capital raised {raised}")]
    AcceptedExceedsRaised { accepted: Amount, raised: Amount },

    #[error("claim of {requested} exceeds unclaimed allocation {remaining}")]
    AllocationExceeded { requested: Amount, remaining: Amount },

    #[error("sale vault holds {available} {asset}, needs {required}")]
    InsufficientVault {
        asset: AssetId,
        required: Amount,
        available: Amount,
    },

    #[error("arithmetic overflow in {operation}")]
    Overflow { operation: &'static str },
}

/// Failures reported by the token ledger collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("{account} holds {available} {asset}, needs {required}")]
    InsufficientBalance {
        asset: AssetId,
        account: AccountId,
        required: Amount,
        available: Amount,
    },

    #[error("{spender} may spend {available} {asset} of {owner}, needs {required}")]
    InsufficientAllowance {
        asset: AssetId,
        owner: AccountId,
        spender: AccountId,
        required: Amount,
        available: Amount,
    },

    #[error("crediting {amount} {asset} to {account} overflows its balance")]
    BalanceOverflow {
        asset: AssetId,
        account: AccountId,
        amount: Amount,
    },

    #[error("vesting instance {0} is unknown")]
    UnknownVesting(AccountId),
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    #[error("float values are not permitted in canonical representations; use string or integer for amount: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Error in cryptographic primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Signature verification failed.
    #[error("signature verification failed: {0}")]
    VerificationFailed(String),

    /// Key generation or parsing failed.
    #[error("key error: {0}")]
    KeyError(String),

    /// Encoding is not a valid group element.
    #[error("invalid curve point: {0}")]
    InvalidPoint(String),

    /// Sealed payload could not be opened with the given key.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Merkle tree construction or proof generation failed.
    #[error("merkle error: {0}")]
    Merkle(String),
}

impl SaleError {
    /// Short class name, used as a structured log field.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Authorization(_) => "authorization",
            Self::Phase(_) => "phase",
            Self::Validation(_) => "validation",
            Self::Proof(_) => "proof",
            Self::Signature(_) => "signature",
            Self::Accounting(_) => "accounting",
            Self::Ledger(_) => "ledger",
        }
    }
}
