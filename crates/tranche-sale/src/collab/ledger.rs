use std::collections::BTreeMap;

use tranche_core::{AccountId, Amount, AssetId, LedgerError};

use super::TokenLedger;

/// Balances and allowances held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    balances: BTreeMap<AssetId, BTreeMap<AccountId, Amount>>,
    allowances: BTreeMap<AssetId, BTreeMap<(AccountId, AccountId), Amount>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` out of thin air.
    pub fn mint(&mut self, asset: &AssetId, to: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        let credited = self.credited(asset, to, amount)?;
        self.balances
            .entry(asset.clone())
            .or_default()
            .insert(*to, credited);
        Ok(())
    }

    /// `to`'s balance after receiving `amount`.
    fn credited(&self, asset: &AssetId, to: &AccountId, amount: Amount) -> Result<Amount, LedgerError> {
        self.balance_of(asset, to)
            .checked_add(amount)
            .ok_or_else(|| LedgerError::BalanceOverflow {
                asset: asset.clone(),
                account: *to,
                amount,
            })
    }

    /// Debit then credit, checking both sides first so a failure moves nothing.
    fn shift(&mut self, asset: &AssetId, from: &AccountId, to: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        let available = self.balance_of(asset, from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                asset: asset.clone(),
                account: *from,
                required: amount,
                available,
            });
        }
        if from == to {
            return Ok(());
        }
        let credited = self.credited(asset, to, amount)?;
        let balances = self.balances.entry(asset.clone()).or_default();
        balances.insert(*from, available - amount);
        balances.insert(*to, credited);
        Ok(())
    }

    /// Set `spender`'s allowance over `owner`'s balance.
    pub fn approve(&mut self, asset: &AssetId, owner: &AccountId, spender: &AccountId, amount: Amount) {
        self.allowances
            .entry(asset.clone())
            .or_default()
            .insert((*owner, *spender), amount);
    }

    /// Non-zero balances of `asset`.
    pub fn balances(&self, asset: &AssetId) -> BTreeMap<AccountId, Amount> {
        self.balances
            .get(asset)
            .map(|m| m.iter().filter(|(_, b)| **b > 0).map(|(a, b)| (*a, *b)).collect())
            .unwrap_or_default()
    }

    /// Sum of all balances of `asset`.
    pub fn total_supply(&self, asset: &AssetId) -> Amount {
        self.balances
            .get(asset)
            .map_or(0, |m| m.values().fold(0, |acc: Amount, b| acc.saturating_add(*b)))
    }
}

impl TokenLedger for InMemoryLedger {
    fn balance_of(&self, asset: &AssetId, account: &AccountId) -> Amount {
        self.balances
            .get(asset)
            .and_then(|m| m.get(account))
            .copied()
            .unwrap_or(0)
    }

    fn allowance(&self, asset: &AssetId, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(asset)
            .and_then(|m| m.get(&(*owner, *spender)))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(
        &mut self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.shift(asset, from, to, amount)
    }

    fn transfer_from(
        &mut self,
        asset: &AssetId,
        spender: &AccountId,
        owner: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let allowed = self.allowance(asset, owner, spender);
        if allowed < amount {
            return Err(LedgerError::InsufficientAllowance {
                asset: asset.clone(),
                owner: *owner,
                spender: *spender,
                required: amount,
                available: allowed,
            });
        }
        self.shift(asset, owner, to, amount)?;
        self.approve(asset, owner, spender, allowed - amount);
        Ok(())
    }
}
