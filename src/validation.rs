// 6.0: the validation gate. stateless predicate checks run before every mutating action.
// each failed predicate maps to exactly one named error.

use crate::account::{
    asset_price, balance_decrease_allowed, calculate_user_account_data, effective_params, to_base, UserAccountData,
};
use crate::emode::NO_EMODE;
use crate::errors::{AuthorizationError, CapacityError, ConfigurationError, PoolError, SolvencyError};
use crate::isolation::{validate_isolated_borrow, IsolationModeState};
use crate::math::{checked_add, percent_div, percent_mul, Rounding, Wad};
use crate::oracle::{PriceOracle, PriceOracleSentinel};
use crate::reserve::{ReserveCache, ReserveData};
use crate::state::PoolState;
use crate::types::{AccountId, AssetId, Bps, InterestRateMode, ReserveId, RequestedAmount, Timestamp};

fn require_active(reserve: &ReserveData) -> Result<(), PoolError> {
    if !reserve.config.active {
        return Err(ConfigurationError::ReserveInactive(reserve.id).into());
    }
    if reserve.config.paused {
        return Err(ConfigurationError::ReservePaused(reserve.id).into());
    }
    Ok(())
}

fn require_not_frozen(reserve: &ReserveData) -> Result<(), PoolError> {
    if reserve.config.frozen {
        return Err(ConfigurationError::ReserveFrozen(reserve.id).into());
    }
    Ok(())
}

fn require_liquidity(reserve: &ReserveData, amount: u128) -> Result<(), PoolError> {
    if reserve.virtual_underlying_balance < amount {
        return Err(CapacityError::InsufficientLiquidity {
            reserve: reserve.id,
            available: reserve.virtual_underlying_balance,
            requested: amount,
        }
        .into());
    }
    Ok(())
}

pub fn validate_supply(reserve: &ReserveData, cache: &ReserveCache, scaled_total_supply: u128, amount: u128) -> Result<(), PoolError> {
    if amount == 0 {
        return Err(PoolError::InvalidAmount);
    }
    require_active(reserve)?;
    require_not_frozen(reserve)?;

    if let Some(cap) = reserve.supply_cap_units()? {
        let scaled = checked_add(scaled_total_supply, reserve.accrued_to_treasury)?;
        let supplied = cache.next_liquidity_index.scale(scaled, Rounding::HalfUp)?;
        if checked_add(supplied, amount)? > cap {
            return Err(CapacityError::SupplyCapExceeded(reserve.id).into());
        }
    }
    Ok(())
}

pub fn validate_withdraw(reserve: &ReserveData, amount: u128, user_balance: u128) -> Result<(), PoolError> {
    if amount == 0 {
        return Err(PoolError::InvalidAmount);
    }
    if amount > user_balance {
        return Err(CapacityError::NotEnoughAvailableUserBalance {
            requested: amount,
            balance: user_balance,
        }
        .into());
    }
    require_active(reserve)?;
    require_liquidity(reserve, amount)
}

/// Everything the borrow gate looks at.
pub struct BorrowValidation<'a> {
    pub state: &'a PoolState,
    pub oracle: &'a dyn PriceOracle,
    pub sentinel: Option<&'a dyn PriceOracleSentinel>,
    pub reserve: &'a ReserveData,
    pub cache: &'a ReserveCache,
    pub user: AccountId,
    pub amount: u128,
    pub rate_mode: InterestRateMode,
    pub max_fixed_rate_borrow_size_percent: Bps,
    pub isolation: IsolationModeState,
    pub user_emode: u8,
    pub now: Timestamp,
}

pub fn validate_borrow(params: &BorrowValidation<'_>) -> Result<UserAccountData, PoolError> {
    let reserve = params.reserve;
    if params.amount == 0 {
        return Err(PoolError::InvalidAmount);
    }
    require_active(reserve)?;
    require_not_frozen(reserve)?;
    if !reserve.config.borrowing_enabled {
        return Err(ConfigurationError::BorrowingNotEnabled(reserve.id).into());
    }
    require_liquidity(reserve, params.amount)?;

    if let Some(sentinel) = params.sentinel {
        if !sentinel.is_borrow_allowed() {
            return Err(AuthorizationError::BorrowNotAllowedBySentinel.into());
        }
    }

    match params.rate_mode {
        InterestRateMode::Variable => {}
        InterestRateMode::Fixed => {
            if !reserve.config.fixed_rate_borrowing_enabled {
                return Err(ConfigurationError::FixedRateBorrowingNotEnabled(reserve.id).into());
            }
        }
        InterestRateMode::None => {
            return Err(ConfigurationError::InvalidInterestRateMode(params.rate_mode).into());
        }
    }

    if let Some(cap) = reserve.borrow_cap_units()? {
        let total_debt = checked_add(params.cache.next_total_variable_debt()?, params.cache.next_total_fixed_debt)?;
        if checked_add(total_debt, params.amount)? > cap {
            return Err(CapacityError::BorrowCapExceeded(reserve.id).into());
        }
    }

    validate_isolated_borrow(params.state, &params.isolation, reserve, params.amount)?;

    if params.user_emode != NO_EMODE && reserve.config.emode_category != params.user_emode {
        return Err(ConfigurationError::InconsistentEModeCategory {
            reserve: reserve.id,
            category: params.user_emode,
        }
        .into());
    }

    let data = calculate_user_account_data(params.state, params.oracle, params.user, params.user_emode, params.now)?;
    if data.total_collateral_base == 0 {
        return Err(SolvencyError::CollateralBalanceZero.into());
    }
    if data.avg_ltv.is_zero() {
        return Err(SolvencyError::CollateralCannotCoverNewBorrow.into());
    }
    if data.health_factor < Wad::ONE {
        return Err(SolvencyError::HealthFactorLowerThanThreshold.into());
    }

    let price_asset = effective_params(params.state, reserve, params.user_emode).price_asset;
    let price = asset_price(params.oracle, price_asset)?;
    let amount_base = to_base(params.amount, price, reserve.config.decimals, Rounding::Up)?;
    let needed = percent_div(checked_add(data.total_debt_base, amount_base)?, data.avg_ltv.value(), Rounding::Up)?;
    if needed > data.total_collateral_base {
        return Err(SolvencyError::CollateralCannotCoverNewBorrow.into());
    }

    if params.rate_mode == InterestRateMode::Fixed {
        let config = params.state.user_config(params.user);
        let collateral_balance = crate::account::receipt_balance(params.state, reserve.id, params.user, params.now)?;
        if config.is_using_as_collateral(reserve.id)
            && !reserve.config.ltv.is_zero()
            && params.amount <= collateral_balance
        {
            return Err(SolvencyError::CollateralSameAsBorrowingCurrency.into());
        }
        let max = percent_mul(
            reserve.virtual_underlying_balance,
            params.max_fixed_rate_borrow_size_percent.value(),
            Rounding::Down,
        )?;
        if params.amount > max {
            return Err(CapacityError::FixedBorrowTooLarge {
                requested: params.amount,
                max,
            }
            .into());
        }
    }

    let (siloed, siloed_reserve) = get_siloed_borrowing_state(params.state, params.user);
    if siloed {
        if siloed_reserve != Some(reserve.id) {
            return Err(AuthorizationError::SiloedBorrowingViolation.into());
        }
    } else if reserve.config.siloed_borrowing && params.state.user_config(params.user).is_borrowing_any() {
        return Err(AuthorizationError::SiloedBorrowingViolation.into());
    }

    Ok(data)
}

/// A user borrowing exactly one siloed asset may not borrow anything else.
pub fn get_siloed_borrowing_state(state: &PoolState, user: AccountId) -> (bool, Option<ReserveId>) {
    let config = state.user_config(user);
    if !config.is_borrowing_one() {
        return (false, None);
    }
    match config.first_borrowed().and_then(|id| state.reserve(id)) {
        Some(reserve) if reserve.config.siloed_borrowing => (true, Some(reserve.id)),
        _ => (false, None),
    }
}

pub fn validate_repay(
    reserve: &ReserveData,
    amount: RequestedAmount,
    rate_mode: InterestRateMode,
    caller: AccountId,
    on_behalf_of: AccountId,
    variable_debt: u128,
    fixed_debt: u128,
) -> Result<(), PoolError> {
    if amount == RequestedAmount::Exact(0) {
        return Err(PoolError::InvalidAmount);
    }
    // repaying "all" on someone else's behalf needs an explicit amount
    if amount.is_all() && caller != on_behalf_of {
        return Err(PoolError::InvalidAmount);
    }
    require_active(reserve)?;

    let debt = match rate_mode {
        InterestRateMode::Variable => variable_debt,
        InterestRateMode::Fixed => fixed_debt,
        InterestRateMode::None => {
            return Err(ConfigurationError::InvalidInterestRateMode(rate_mode).into());
        }
    };
    if debt == 0 {
        return Err(PoolError::NoDebtOfSelectedType(rate_mode));
    }
    Ok(())
}

pub fn validate_set_use_reserve_as_collateral(reserve: &ReserveData, user_balance: u128) -> Result<(), PoolError> {
    if user_balance == 0 {
        return Err(PoolError::UnderlyingBalanceZero);
    }
    require_active(reserve)
}

/// Collateral reduction (withdraw, disable, transfer out) for a user with debt.
pub fn validate_collateral_decrease(
    state: &PoolState,
    oracle: &dyn PriceOracle,
    user: AccountId,
    id: ReserveId,
    amount: u128,
    now: Timestamp,
) -> Result<(), PoolError> {
    let config = state.user_config(user);
    if !config.is_borrowing_any() || !config.is_using_as_collateral(id) {
        return Ok(());
    }
    let Some(reserve) = state.reserve(id) else {
        return Ok(());
    };

    let emode = state.user_emode(user);
    let data = calculate_user_account_data(state, oracle, user, emode, now)?;
    // with zero-ltv collateral enabled, only zero-ltv assets may be taken out
    if data.has_zero_ltv_collateral && !effective_params(state, reserve, emode).ltv.is_zero() {
        return Err(ConfigurationError::ZeroLtvCollateral(id).into());
    }
    if !balance_decrease_allowed(state, oracle, user, id, amount, now)? {
        return Err(SolvencyError::HealthFactorLowerThanThreshold.into());
    }
    Ok(())
}

pub fn validate_flashloan_simple(reserve: &ReserveData, amount: u128) -> Result<(), PoolError> {
    require_active(reserve)?;
    if !reserve.config.flash_loan_enabled {
        return Err(ConfigurationError::FlashLoanNotEnabled(reserve.id).into());
    }
    require_liquidity(reserve, amount)
}

pub fn validate_flashloan(
    state: &PoolState,
    assets: &[AssetId],
    amounts: &[u128],
    modes: &[InterestRateMode],
) -> Result<(), PoolError> {
    if assets.len() != amounts.len() || assets.len() != modes.len() || assets.is_empty() {
        return Err(PoolError::InconsistentFlashLoanParams);
    }
    for (asset, amount) in assets.iter().zip(amounts) {
        validate_flashloan_simple(state.reserve_by_asset(*asset)?, *amount)?;
    }
    Ok(())
}

pub struct LiquidationValidation<'a> {
    pub collateral: &'a ReserveData,
    pub debt: &'a ReserveData,
    pub sentinel: Option<&'a dyn PriceOracleSentinel>,
    pub health_factor: Wad,
    pub sentinel_min_hf: Wad,
    pub collateral_enabled: bool,
    pub total_debt: u128,
}

pub fn validate_liquidation_call(params: &LiquidationValidation<'_>) -> Result<(), PoolError> {
    require_active(params.collateral)?;
    require_active(params.debt)?;

    if let Some(sentinel) = params.sentinel {
        if !sentinel.is_liquidation_allowed() && params.health_factor >= params.sentinel_min_hf {
            return Err(AuthorizationError::LiquidationNotAllowedBySentinel.into());
        }
    }

    if params.health_factor >= Wad::ONE {
        return Err(SolvencyError::HealthFactorNotBelowThreshold.into());
    }

    if params.collateral.config.liquidation_threshold.is_zero() || !params.collateral_enabled {
        return Err(ConfigurationError::CollateralNotEnabled(params.collateral.id).into());
    }

    if params.total_debt == 0 {
        return Err(PoolError::NoDebtOfSelectedType(InterestRateMode::Variable));
    }
    Ok(())
}

/// Every reserve the user borrows must belong to the target category.
pub fn validate_set_user_emode(state: &PoolState, user: AccountId, category: u8) -> Result<(), PoolError> {
    if category == NO_EMODE {
        return Ok(());
    }
    if state.emode_category(category).is_none() {
        return Err(ConfigurationError::EModeCategoryNotFound(category).into());
    }
    let config = state.user_config(user);
    for id in config.active_reserves() {
        if !config.is_borrowing(id) {
            continue;
        }
        if let Some(reserve) = state.reserve(id) {
            if reserve.config.emode_category != category {
                return Err(ConfigurationError::InconsistentEModeCategory { reserve: id, category }.into());
            }
        }
    }
    Ok(())
}

pub fn validate_health_factor(
    state: &PoolState,
    oracle: &dyn PriceOracle,
    user: AccountId,
    emode: u8,
    now: Timestamp,
) -> Result<UserAccountData, PoolError> {
    let data = calculate_user_account_data(state, oracle, user, emode, now)?;
    if data.health_factor < Wad::ONE {
        return Err(SolvencyError::HealthFactorLowerThanThreshold.into());
    }
    Ok(data)
}
