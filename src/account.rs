//! Cross-reserve account aggregation.
//!
//! One place computes what a user's positions are worth: collateral value,
//! debt value, value-weighted LTV and liquidation threshold, and the health
//! factor. Every risk check in the pool reads from here.
//!
//! Values are in the oracle's base currency (8 decimals). Collateral is
//! valued rounding down and debt rounding up, so the health factor never
//! flatters the user.

use crate::errors::PoolError;
use crate::math::{checked_add, mul_div, percent_mul, pow10, MathError, Rounding, Wad};
use crate::oracle::PriceOracle;
use crate::reserve::ReserveData;
use crate::state::PoolState;
use crate::types::{AccountId, AssetId, Bps, ReserveId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccountData {
    pub total_collateral_base: u128,
    pub total_debt_base: u128,
    pub available_borrows_base: u128,
    pub avg_ltv: Bps,
    pub avg_liquidation_threshold: Bps,
    pub health_factor: Wad,
    // collateral enabled with ltv = 0, which blocks new borrows
    pub has_zero_ltv_collateral: bool,
}

/// Risk parameters that apply to one reserve for one user, after e-mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveParams {
    pub ltv: Bps,
    pub liquidation_threshold: Bps,
    pub liquidation_bonus: Bps,
    pub price_asset: AssetId,
}

/// E-mode overrides apply when the reserve sits in the user's active category.
pub fn effective_params(state: &PoolState, reserve: &ReserveData, emode_category: u8) -> EffectiveParams {
    let config = &reserve.config;
    match state.emode_category(emode_category) {
        Some(category) if config.emode_category == emode_category => EffectiveParams {
            ltv: category.ltv,
            liquidation_threshold: category.liquidation_threshold,
            liquidation_bonus: category.liquidation_bonus,
            price_asset: category.price_source.unwrap_or(reserve.asset),
        },
        _ => EffectiveParams {
            ltv: config.ltv,
            liquidation_threshold: config.liquidation_threshold,
            liquidation_bonus: config.liquidation_bonus,
            price_asset: reserve.asset,
        },
    }
}

pub fn asset_price(oracle: &dyn PriceOracle, asset: AssetId) -> Result<u128, PoolError> {
    oracle.asset_price(asset).ok_or(PoolError::PriceUnavailable(asset))
}

/// Token amount to base-currency value.
pub fn to_base(amount: u128, price: u128, decimals: u8, rounding: Rounding) -> Result<u128, MathError> {
    mul_div(amount, price, pow10(decimals as u32)?, rounding)
}

/// `debt == 0 ? MAX : collateral * threshold / debt`, in wad.
pub fn calculate_health_factor(total_collateral: u128, total_debt: u128, liquidation_threshold: Bps) -> Result<Wad, MathError> {
    if total_debt == 0 {
        return Ok(Wad::MAX);
    }
    let adjusted = percent_mul(total_collateral, liquidation_threshold.value(), Rounding::Down)?;
    Wad::from_ratio(adjusted, total_debt, Rounding::Down)
}

/// `max(0, collateral * ltv - debt)`.
pub fn calculate_available_borrows(total_collateral: u128, total_debt: u128, ltv: Bps) -> Result<u128, MathError> {
    let capacity = percent_mul(total_collateral, ltv.value(), Rounding::Down)?;
    Ok(capacity.saturating_sub(total_debt))
}

/// Underlying receipt balance of `user` on `id` as of `now`.
pub fn receipt_balance(state: &PoolState, id: ReserveId, user: AccountId, now: Timestamp) -> Result<u128, PoolError> {
    let Some(reserve) = state.reserve(id) else {
        return Ok(0);
    };
    let index = reserve.normalized_income(now)?;
    Ok(index.scale(state.scaled_receipt_balance(id, user), Rounding::Down)?)
}

/// Variable plus fixed debt of `user` on `id` as of `now`.
pub fn debt_balances(state: &PoolState, id: ReserveId, user: AccountId, now: Timestamp) -> Result<(u128, u128), PoolError> {
    let Some(reserve) = state.reserve(id) else {
        return Ok((0, 0));
    };
    let index = reserve.normalized_debt(now)?;
    let variable = index.scale(state.scaled_variable_debt(id, user), Rounding::Up)?;
    let fixed = match state.fixed_debt_tokens.get(id.index()) {
        Some(token) => token.balance_of(user, now)?,
        None => 0,
    };
    Ok((variable, fixed))
}

/// Aggregates every reserve flagged in the user's bitmap. `emode_category`
/// is passed in so a category switch can be evaluated before it is stored.
pub fn calculate_user_account_data(
    state: &PoolState,
    oracle: &dyn PriceOracle,
    user: AccountId,
    emode_category: u8,
    now: Timestamp,
) -> Result<UserAccountData, PoolError> {
    let config = state.user_config(user);

    let mut total_collateral: u128 = 0;
    let mut total_debt: u128 = 0;
    let mut weighted_ltv: u128 = 0;
    let mut weighted_threshold: u128 = 0;
    let mut has_zero_ltv_collateral = false;

    for id in config.active_reserves() {
        let Some(reserve) = state.reserve(id) else {
            continue;
        };
        let params = effective_params(state, reserve, emode_category);
        let price = asset_price(oracle, params.price_asset)?;
        let decimals = reserve.config.decimals;

        if config.is_using_as_collateral(id) {
            let balance = receipt_balance(state, id, user, now)?;
            let value = to_base(balance, price, decimals, Rounding::Down)?;
            total_collateral = checked_add(total_collateral, value)?;

            if params.ltv.is_zero() {
                has_zero_ltv_collateral = true;
            } else {
                let weighted = value
                    .checked_mul(params.ltv.value() as u128)
                    .ok_or(MathError::Overflow)?;
                weighted_ltv = checked_add(weighted_ltv, weighted)?;
            }
            let weighted = value
                .checked_mul(params.liquidation_threshold.value() as u128)
                .ok_or(MathError::Overflow)?;
            weighted_threshold = checked_add(weighted_threshold, weighted)?;
        }

        if config.is_borrowing(id) {
            let (variable, fixed) = debt_balances(state, id, user, now)?;
            let value = to_base(checked_add(variable, fixed)?, price, decimals, Rounding::Up)?;
            total_debt = checked_add(total_debt, value)?;
        }
    }

    let (avg_ltv, avg_liquidation_threshold) = if total_collateral == 0 {
        (Bps::ZERO, Bps::ZERO)
    } else {
        (
            Bps((weighted_ltv / total_collateral) as u16),
            Bps((weighted_threshold / total_collateral) as u16),
        )
    };

    Ok(UserAccountData {
        total_collateral_base: total_collateral,
        total_debt_base: total_debt,
        available_borrows_base: calculate_available_borrows(total_collateral, total_debt, avg_ltv)?,
        avg_ltv,
        avg_liquidation_threshold,
        health_factor: calculate_health_factor(total_collateral, total_debt, avg_liquidation_threshold)?,
        has_zero_ltv_collateral,
    })
}

/// Whether `user` can drop `amount` of collateral on `id` and stay at HF >= 1.
pub fn balance_decrease_allowed(
    state: &PoolState,
    oracle: &dyn PriceOracle,
    user: AccountId,
    id: ReserveId,
    amount: u128,
    now: Timestamp,
) -> Result<bool, PoolError> {
    let config = state.user_config(user);
    if !config.is_borrowing_any() || !config.is_using_as_collateral(id) {
        return Ok(true);
    }
    let Some(reserve) = state.reserve(id) else {
        return Ok(true);
    };

    let emode = state.user_emode(user);
    let params = effective_params(state, reserve, emode);
    if params.liquidation_threshold.is_zero() {
        return Ok(true);
    }

    let data = calculate_user_account_data(state, oracle, user, emode, now)?;
    if data.total_debt_base == 0 {
        return Ok(true);
    }

    let price = asset_price(oracle, params.price_asset)?;
    let decrease = to_base(amount, price, reserve.config.decimals, Rounding::Up)?;
    let collateral_after = data.total_collateral_base.saturating_sub(decrease);
    if collateral_after == 0 {
        return Ok(false);
    }

    let weighted_before = data
        .total_collateral_base
        .checked_mul(data.avg_liquidation_threshold.value() as u128)
        .ok_or(MathError::Overflow)?;
    let weighted_removed = decrease
        .checked_mul(params.liquidation_threshold.value() as u128)
        .ok_or(MathError::Overflow)?;
    let threshold_after = weighted_before.saturating_sub(weighted_removed) / collateral_after;

    let hf_after = calculate_health_factor(collateral_after, data.total_debt_base, Bps(threshold_after as u16))?;
    Ok(hf_after >= Wad::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emode::EModeCategory;
    use crate::oracle::{StaticPriceOracle, BASE_CURRENCY_UNIT};
    use crate::reserve::ReserveConfig;
    use crate::tokens::{FixedRateDebtToken, ScaledBalanceToken};
    use crate::math::WAD;

    const USER: AccountId = AccountId(10);
    const GOLD: AssetId = AssetId(1);
    const USDC: AssetId = AssetId(2);

    fn list(state: &mut PoolState, asset: AssetId, config: ReserveConfig) -> ReserveId {
        let id = ReserveId(state.reserves.len() as u16);
        state.reserves.push(ReserveData::new(id, asset, config, Timestamp(0)));
        state.asset_index.insert(asset, id);
        state.receipt_tokens.push(ScaledBalanceToken::new());
        state.variable_debt_tokens.push(ScaledBalanceToken::new());
        state.fixed_debt_tokens.push(FixedRateDebtToken::new());
        id
    }

    fn collateral_config() -> ReserveConfig {
        ReserveConfig {
            ltv: Bps(7_500),
            liquidation_threshold: Bps(8_000),
            liquidation_bonus: Bps(11_000),
            decimals: 6,
            borrowing_enabled: true,
            ..ReserveConfig::default()
        }
    }

    // 100 units of collateral, 90 units of debt, both priced at 1
    fn scenario() -> (PoolState, StaticPriceOracle, ReserveId, ReserveId) {
        let mut state = PoolState::new();
        let gold = list(&mut state, GOLD, collateral_config());
        let usdc = list(&mut state, USDC, collateral_config());

        state.receipt_tokens[gold.index()].mint_scaled(USER, 100_000_000).unwrap();
        state.user_config_mut(USER).set_using_as_collateral(gold, true);
        state.variable_debt_tokens[usdc.index()].mint_scaled(USER, 90_000_000).unwrap();
        state.user_config_mut(USER).set_borrowing(usdc, true);

        let oracle = StaticPriceOracle::new()
            .with_price(GOLD, BASE_CURRENCY_UNIT)
            .with_price(USDC, BASE_CURRENCY_UNIT);
        (state, oracle, gold, usdc)
    }

    #[test]
    fn zero_debt_is_infinite_health() {
        let hf = calculate_health_factor(1_000, 0, Bps(8_000)).unwrap();
        assert!(hf.is_max());
    }

    #[test]
    fn undercollateralized_health_factor() {
        let (state, oracle, _, _) = scenario();
        let data = calculate_user_account_data(&state, &oracle, USER, 0, Timestamp(0)).unwrap();

        assert_eq!(data.total_collateral_base, 100 * BASE_CURRENCY_UNIT);
        assert_eq!(data.total_debt_base, 90 * BASE_CURRENCY_UNIT);
        assert_eq!(data.avg_liquidation_threshold, Bps(8_000));
        assert_eq!(data.avg_ltv, Bps(7_500));
        // 80 / 90
        assert_eq!(data.health_factor, Wad::from_raw(888_888_888_888_888_888));
        assert_eq!(data.available_borrows_base, 0);
    }

    #[test]
    fn weighted_averages_truncate() {
        let mut state = PoolState::new();
        let a = list(&mut state, GOLD, collateral_config());
        let b = list(&mut state, USDC, ReserveConfig { ltv: Bps(5_000), liquidation_threshold: Bps(6_000), liquidation_bonus: Bps(10_500), decimals: 6, ..ReserveConfig::default() });
        state.receipt_tokens[a.index()].mint_scaled(USER, 1_000_000).unwrap();
        state.receipt_tokens[b.index()].mint_scaled(USER, 2_000_000).unwrap();
        state.user_config_mut(USER).set_using_as_collateral(a, true);
        state.user_config_mut(USER).set_using_as_collateral(b, true);
        let oracle = StaticPriceOracle::new().with_price(GOLD, BASE_CURRENCY_UNIT).with_price(USDC, BASE_CURRENCY_UNIT);

        let data = calculate_user_account_data(&state, &oracle, USER, 0, Timestamp(0)).unwrap();
        // (1*7500 + 2*5000) / 3 = 5833.33
        assert_eq!(data.avg_ltv, Bps(5_833));
        assert_eq!(data.avg_liquidation_threshold, Bps(6_666));
        assert!(data.health_factor.is_max());
    }

    #[test]
    fn zero_ltv_collateral_is_flagged_not_averaged() {
        let (mut state, oracle, gold, _) = scenario();
        state.reserves[gold.index()].config.ltv = Bps::ZERO;
        let data = calculate_user_account_data(&state, &oracle, USER, 0, Timestamp(0)).unwrap();
        assert!(data.has_zero_ltv_collateral);
        assert_eq!(data.avg_ltv, Bps::ZERO);
        assert_eq!(data.avg_liquidation_threshold, Bps(8_000));
    }

    #[test]
    fn missing_price_fails() {
        let (state, oracle, _, _) = scenario();
        oracle.remove_price(USDC);
        let result = calculate_user_account_data(&state, &oracle, USER, 0, Timestamp(0));
        assert!(matches!(result, Err(PoolError::PriceUnavailable(USDC))));
    }

    #[test]
    fn emode_overrides_params_and_price() {
        let (mut state, oracle, gold, _) = scenario();
        let mut category = EModeCategory::new(1, Bps(9_000), Bps(9_500), Bps(10_100), "gold").with_price_source(AssetId(99));
        category.set_eligible(gold, true);
        state.emode_categories.insert(1, category);
        state.reserves[gold.index()].config.emode_category = 1;
        oracle.set_price(AssetId(99), 2 * BASE_CURRENCY_UNIT);

        let data = calculate_user_account_data(&state, &oracle, USER, 1, Timestamp(0)).unwrap();
        assert_eq!(data.total_collateral_base, 200 * BASE_CURRENCY_UNIT);
        assert_eq!(data.avg_liquidation_threshold, Bps(9_500));
        assert!(data.health_factor > Wad::ONE);

        // without the category the plain params apply
        let plain = calculate_user_account_data(&state, &oracle, USER, 0, Timestamp(0)).unwrap();
        assert_eq!(plain.total_collateral_base, 100 * BASE_CURRENCY_UNIT);
    }

    #[test]
    fn available_borrows_clamps_at_zero() {
        assert_eq!(calculate_available_borrows(1_000, 100, Bps(5_000)).unwrap(), 400);
        assert_eq!(calculate_available_borrows(1_000, 600, Bps(5_000)).unwrap(), 0);
    }

    #[test]
    fn balance_decrease_checks_resulting_health() {
        let (mut state, oracle, gold, usdc) = scenario();
        // shrink the debt to 40 so HF = 80 / 40 = 2
        state.variable_debt_tokens[usdc.index()].burn_scaled(USER, 50_000_000).unwrap();

        // removing 40 leaves 60 * 0.8 / 40 = 1.2
        assert!(balance_decrease_allowed(&state, &oracle, USER, gold, 40_000_000, Timestamp(0)).unwrap());
        // removing 60 leaves 40 * 0.8 / 40 = 0.8
        assert!(!balance_decrease_allowed(&state, &oracle, USER, gold, 60_000_000, Timestamp(0)).unwrap());
        // the only collateral cannot be removed entirely while debt remains
        assert!(!balance_decrease_allowed(&state, &oracle, USER, gold, 100_000_000, Timestamp(0)).unwrap());
    }

    #[test]
    fn balance_decrease_without_debt_always_allowed() {
        let (mut state, oracle, gold, usdc) = scenario();
        state.user_config_mut(USER).set_borrowing(usdc, false);
        assert!(balance_decrease_allowed(&state, &oracle, USER, gold, 100_000_000, Timestamp(0)).unwrap());
    }

    #[test]
    fn health_factor_wad_scale() {
        let hf = calculate_health_factor(100, 80, Bps(8_000)).unwrap();
        assert_eq!(hf.raw(), WAD);
    }
}
