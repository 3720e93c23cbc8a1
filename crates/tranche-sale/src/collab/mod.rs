//! # External Collaborators
//!
//! The sale core talks to three systems it does not own:
//!
//! - [`TokenLedger`]: fungible balances for the capital and purchase assets,
//!   with pull-via-allowance and push-via-transfer.
//! - [`Directory`]: resolves platform roles by symbolic key. The sale keeps a
//!   cached copy ([`DirectoryEntries`]) refreshed only by an explicit sync.
//! - [`VestingFactory`]: creates a vesting instance per settled investor.
//!
//! Each trait is object-safe so the sale can be driven by the in-memory
//! implementations in this module or by an adapter to a real ledger.
//! Fee-on-transfer and other non-standard token behavior is out of scope:
//! a successful transfer of `n` moves exactly `n`.

mod directory;
mod ledger;
mod vesting;

pub use directory::StaticDirectory;
pub use ledger::InMemoryLedger;
pub use vesting::{InMemoryVestingFactory, VestingInstance};

use serde::{Deserialize, Serialize};
use tranche_core::{AccountId, Amount, AssetId, LedgerError, ValidationError};

use crate::vesting::VestingConfig;

/// Fungible token balances.
pub trait TokenLedger {
    fn balance_of(&self, asset: &AssetId, account: &AccountId) -> Amount;

    fn allowance(&self, asset: &AssetId, owner: &AccountId, spender: &AccountId) -> Amount;

    /// Move `amount` out of `from`, which the caller controls.
    fn transfer(
        &mut self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError>;

    /// Move `amount` from `owner` to `to` against `spender`'s allowance.
    fn transfer_from(
        &mut self,
        asset: &AssetId,
        spender: &AccountId,
        owner: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError>;
}

/// Symbolic directory keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryKey {
    PlatformOperator,
    PlatformSigner,
    PlatformFeeReceiver,
    VestingFactory,
}

impl DirectoryKey {
    pub const ALL: [DirectoryKey; 4] = [
        DirectoryKey::PlatformOperator,
        DirectoryKey::PlatformSigner,
        DirectoryKey::PlatformFeeReceiver,
        DirectoryKey::VestingFactory,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::PlatformOperator => "platform_operator",
            Self::PlatformSigner => "platform_signer",
            Self::PlatformFeeReceiver => "platform_fee_receiver",
            Self::VestingFactory => "vesting_factory",
        }
    }
}

/// Role resolution by symbolic key.
pub trait Directory {
    /// Identity of this directory; a sale only syncs from the directory it
    /// was created with.
    fn id(&self) -> AccountId;

    fn resolve(&self, key: DirectoryKey) -> Option<AccountId>;
}

/// The sale's cached copy of its directory entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntries {
    pub platform_operator: AccountId,
    pub platform_signer: AccountId,
    pub platform_fee_receiver: AccountId,
    pub vesting_factory: AccountId,
}

impl DirectoryEntries {
    /// Resolve every key. A missing or zero entry is an error.
    pub fn load(directory: &dyn Directory) -> Result<Self, ValidationError> {
        let get = |key: DirectoryKey| -> Result<AccountId, ValidationError> {
            let account = directory.resolve(key).unwrap_or(AccountId::ZERO);
            account.ensure_nonzero(key.name())?;
            Ok(account)
        };
        Ok(Self {
            platform_operator: get(DirectoryKey::PlatformOperator)?,
            platform_signer: get(DirectoryKey::PlatformSigner)?,
            platform_fee_receiver: get(DirectoryKey::PlatformFeeReceiver)?,
            vesting_factory: get(DirectoryKey::VestingFactory)?,
        })
    }
}

/// Creates vesting instances for settled investors.
///
/// The returned reference is also the ledger account holding the instance's
/// tokens; the sale funds it by transferring the vested portion there right
/// after creation. The sale creates the instance only once every other
/// check has passed and the immediate payout has gone through.
pub trait VestingFactory {
    fn id(&self) -> AccountId;

    fn create_vesting(
        &mut self,
        beneficiary: &AccountId,
        asset: &AssetId,
        config: &VestingConfig,
    ) -> Result<AccountId, LedgerError>;
}
