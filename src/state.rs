// 4.4: the reserve arena. a dense Vec of reserves indexed by ReserveId plus an asset -> slot map.
// tokens share the reserve's slot. everything here is plain data so a transaction can
// checkpoint it with a clone and restore it on failure.

use crate::emode::{EModeCategory, NO_EMODE};
use crate::errors::PoolError;
use crate::interest::InterestRateStrategy;
use crate::reserve::ReserveData;
use crate::tokens::{FixedRateDebtToken, ScaledBalanceToken};
use crate::types::{AccountId, AssetId, ReserveId};
use crate::user_config::UserConfiguration;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct PoolState {
    pub reserves: Vec<ReserveData>,
    pub asset_index: HashMap<AssetId, ReserveId>,
    pub receipt_tokens: Vec<ScaledBalanceToken>,
    pub variable_debt_tokens: Vec<ScaledBalanceToken>,
    pub fixed_debt_tokens: Vec<FixedRateDebtToken>,
    pub strategies: Vec<Arc<dyn InterestRateStrategy>>,
    pub user_configs: HashMap<AccountId, UserConfiguration>,
    pub user_emode: HashMap<AccountId, u8>,
    pub emode_categories: BTreeMap<u8, EModeCategory>,
    // fee-exempt flash loan initiators
    pub flash_borrowers: HashSet<AccountId>,
    // credit delegation: (asset, delegator, delegatee) -> amount
    pub borrow_allowances: HashMap<(AssetId, AccountId, AccountId), u128>,
}

impl PoolState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserves_count(&self) -> usize {
        self.reserves.len()
    }

    pub fn reserve_id(&self, asset: AssetId) -> Result<ReserveId, PoolError> {
        self.asset_index
            .get(&asset)
            .copied()
            .ok_or(PoolError::ReserveNotFound(asset))
    }

    pub fn reserve(&self, id: ReserveId) -> Option<&ReserveData> {
        self.reserves.get(id.index())
    }

    pub fn reserve_by_asset(&self, asset: AssetId) -> Result<&ReserveData, PoolError> {
        let id = self.reserve_id(asset)?;
        self.reserves
            .get(id.index())
            .ok_or(PoolError::ReserveNotFound(asset))
    }

    pub fn user_config(&self, user: AccountId) -> UserConfiguration {
        self.user_configs.get(&user).copied().unwrap_or_default()
    }

    pub fn user_config_mut(&mut self, user: AccountId) -> &mut UserConfiguration {
        self.user_configs.entry(user).or_default()
    }

    pub fn user_emode(&self, user: AccountId) -> u8 {
        self.user_emode.get(&user).copied().unwrap_or(NO_EMODE)
    }

    pub fn emode_category(&self, id: u8) -> Option<&EModeCategory> {
        if id == NO_EMODE {
            return None;
        }
        self.emode_categories.get(&id)
    }

    /// Listed assets in slot order.
    pub fn reserves_list(&self) -> Vec<AssetId> {
        self.reserves.iter().map(|reserve| reserve.asset).collect()
    }

    pub fn scaled_receipt_balance(&self, id: ReserveId, user: AccountId) -> u128 {
        self.receipt_tokens
            .get(id.index())
            .map(|token| token.scaled_balance_of(user))
            .unwrap_or(0)
    }

    pub fn scaled_variable_debt(&self, id: ReserveId, user: AccountId) -> u128 {
        self.variable_debt_tokens
            .get(id.index())
            .map(|token| token.scaled_balance_of(user))
            .unwrap_or(0)
    }

    pub fn is_flash_borrower(&self, account: AccountId) -> bool {
        self.flash_borrowers.contains(&account)
    }

    pub fn borrow_allowance(&self, asset: AssetId, delegator: AccountId, delegatee: AccountId) -> u128 {
        self.borrow_allowances
            .get(&(asset, delegator, delegatee))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reserve::ReserveConfig;
    use crate::types::{Bps, Timestamp};

    #[test]
    fn lookup_by_asset() {
        let mut state = PoolState::new();
        state
            .reserves
            .push(ReserveData::new(ReserveId(0), AssetId(7), ReserveConfig::default(), Timestamp(0)));
        state.asset_index.insert(AssetId(7), ReserveId(0));

        assert_eq!(state.reserve_id(AssetId(7)).unwrap(), ReserveId(0));
        assert!(matches!(state.reserve_id(AssetId(8)), Err(PoolError::ReserveNotFound(AssetId(8)))));
        assert_eq!(state.reserves_list(), vec![AssetId(7)]);
    }

    #[test]
    fn defaults_for_unknown_users() {
        let mut state = PoolState::new();
        assert!(state.user_config(AccountId(1)).is_empty());
        assert_eq!(state.user_emode(AccountId(1)), NO_EMODE);

        state.user_config_mut(AccountId(1)).set_borrowing(ReserveId(0), true);
        assert!(state.user_config(AccountId(1)).is_borrowing(ReserveId(0)));
    }

    #[test]
    fn category_zero_is_never_returned() {
        let mut state = PoolState::new();
        state
            .emode_categories
            .insert(1, EModeCategory::new(1, Bps(9_000), Bps(9_300), Bps(10_200), "metals"));
        assert!(state.emode_category(NO_EMODE).is_none());
        assert!(state.emode_category(1).is_some());
    }
}
