// 8.0.2: result types returned by pool entry points.

use crate::math::{Ray, Wad};
use crate::types::{AccountId, AssetId, Bps, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationResult {
    pub user: AccountId,
    pub collateral_asset: AssetId,
    pub debt_asset: AssetId,
    pub debt_covered: u128,
    pub collateral_to_liquidator: u128,
    pub protocol_fee: u128,
    pub health_factor_before: Wad,
    pub close_factor: Bps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashLoanResult {
    pub premiums: Vec<u128>,
    // legs converted into debt instead of being repaid
    pub opened_debt: Vec<AssetId>,
}

impl FlashLoanResult {
    pub fn total_premium(&self) -> u128 {
        self.premiums.iter().sum()
    }
}

/// Read-only view of a reserve with indexes projected to the current time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSnapshot {
    pub asset: AssetId,
    pub normalized_income: Ray,
    pub normalized_debt: Ray,
    pub liquidity_rate: Ray,
    pub variable_borrow_rate: Ray,
    pub fixed_borrow_rate: Ray,
    pub total_supplied: u128,
    pub total_variable_debt: u128,
    pub total_fixed_debt: u128,
    pub available_liquidity: u128,
    pub accrued_to_treasury: u128,
    pub as_of: Timestamp,
}
