use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tranche_core::amount::decimal;
use tranche_core::{AccountId, Amount, AssetId, LedgerError, Timestamp};
use tracing::info;

use super::{TokenLedger, VestingFactory};
use crate::vesting::VestingConfig;

/// One schedule created by [`InMemoryVestingFactory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VestingInstance {
    pub beneficiary: AccountId,
    pub asset: AssetId,
    pub config: VestingConfig,
    #[serde(with = "decimal")]
    pub released: Amount,
}

/// Vesting factory holding its instances in memory. Each instance's tokens
/// sit in a ledger account derived from the factory id and a counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryVestingFactory {
    id: AccountId,
    next: u64,
    instances: BTreeMap<AccountId, VestingInstance>,
}

impl InMemoryVestingFactory {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            next: 0,
            instances: BTreeMap::new(),
        }
    }

    pub fn instance(&self, vesting: &AccountId) -> Option<&VestingInstance> {
        self.instances.get(vesting)
    }

    pub fn instances(&self) -> impl Iterator<Item = (&AccountId, &VestingInstance)> {
        self.instances.iter()
    }

    /// Tokens the beneficiary may release now: the vested share of
    /// everything the instance has ever held, less what was released.
    pub fn releasable(
        &self,
        ledger: &dyn TokenLedger,
        vesting: &AccountId,
        now: Timestamp,
    ) -> Result<Amount, LedgerError> {
        let inst = self
            .instances
            .get(vesting)
            .ok_or(LedgerError::UnknownVesting(*vesting))?;
        let held = ledger.balance_of(&inst.asset, vesting);
        let total = held.saturating_add(inst.released);
        Ok(inst
            .config
            .vested_amount(total, now)
            .saturating_sub(inst.released))
    }

    /// Pay the releasable amount to the beneficiary.
    pub fn release(
        &mut self,
        ledger: &mut dyn TokenLedger,
        vesting: &AccountId,
        now: Timestamp,
    ) -> Result<Amount, LedgerError> {
        let amount = self.releasable(&*ledger, vesting, now)?;
        let inst = self
            .instances
            .get_mut(vesting)
            .ok_or(LedgerError::UnknownVesting(*vesting))?;
        if amount > 0 {
            ledger.transfer(&inst.asset, vesting, &inst.beneficiary, amount)?;
            inst.released += amount;
            info!(vesting = %vesting, beneficiary = %inst.beneficiary, amount = %amount, "vested tokens released");
        }
        Ok(amount)
    }
}

impl VestingFactory for InMemoryVestingFactory {
    fn id(&self) -> AccountId {
        self.id
    }

    fn create_vesting(
        &mut self,
        beneficiary: &AccountId,
        asset: &AssetId,
        config: &VestingConfig,
    ) -> Result<AccountId, LedgerError> {
        let mut seed = self.id.as_bytes().to_vec();
        seed.extend_from_slice(&self.next.to_be_bytes());
        let vesting = AccountId::derive("vesting-instance", &seed);
        self.next += 1;
        self.instances.insert(
            vesting,
            VestingInstance {
                beneficiary: *beneficiary,
                asset: asset.clone(),
                config: config.clone(),
                released: 0,
            },
        );
        Ok(vesting)
    }
}
