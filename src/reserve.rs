// 4.0: one asset's lending market. config (risk params, flags, caps) + live accounting
// (indices, rates, treasury accrual). every mutating action goes cache -> update_state ->
// action -> update_interest_rates, and writes back once.

use crate::config::ConfigError;
use crate::interest::{
    calculate_compounded_interest, calculate_linear_interest, InterestRateStrategy, InterestRates, RateInputs,
};
use crate::math::{checked_add, checked_sub, percent_mul, MathError, Ray, Rounding, PERCENTAGE_FACTOR, WAD};
use crate::tokens::{FixedRateDebtToken, ScaledBalanceToken};
use crate::types::{AssetId, Bps, ReserveId, Timestamp};
use serde::{Deserialize, Serialize};

/** 4.0.1: risk parameters and flags for a listed asset */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveConfig {
    pub ltv: Bps,
    pub liquidation_threshold: Bps,
    // stored as 10000 + bonus, 11000 = 10% bonus
    pub liquidation_bonus: Bps,
    pub decimals: u8,
    pub active: bool,
    pub frozen: bool,
    pub paused: bool,
    pub borrowing_enabled: bool,
    pub fixed_rate_borrowing_enabled: bool,
    pub flash_loan_enabled: bool,
    pub borrowable_in_isolation: bool,
    pub siloed_borrowing: bool,
    pub reserve_factor: Bps,
    // share of the liquidation bonus kept by the protocol
    pub liquidation_protocol_fee: Bps,
    // whole tokens, 0 = unlimited
    pub supply_cap: u64,
    pub borrow_cap: u64,
    // wad, 0 = not isolated
    pub debt_ceiling: u128,
    pub emode_category: u8,
}

impl Default for ReserveConfig {
    fn default() -> Self {
        Self {
            ltv: Bps::ZERO,
            liquidation_threshold: Bps::ZERO,
            liquidation_bonus: Bps::ZERO,
            decimals: 18,
            active: true,
            frozen: false,
            paused: false,
            borrowing_enabled: false,
            fixed_rate_borrowing_enabled: false,
            flash_loan_enabled: false,
            borrowable_in_isolation: false,
            siloed_borrowing: false,
            reserve_factor: Bps::ZERO,
            liquidation_protocol_fee: Bps::ZERO,
            supply_cap: 0,
            borrow_cap: 0,
            debt_ceiling: 0,
            emode_category: 0,
        }
    }
}

impl ReserveConfig {
    // Settlement stablecoin: high ltv, borrowable everywhere including isolation
    pub fn stablecoin(decimals: u8) -> Self {
        Self {
            ltv: Bps(8_000),
            liquidation_threshold: Bps(8_500),
            liquidation_bonus: Bps(10_500),
            decimals,
            borrowing_enabled: true,
            fixed_rate_borrowing_enabled: true,
            flash_loan_enabled: true,
            borrowable_in_isolation: true,
            reserve_factor: Bps(1_000),
            liquidation_protocol_fee: Bps(1_000),
            ..Self::default()
        }
    }

    // Vaulted gold token: solid collateral, modest ltv
    pub fn gold_token(decimals: u8) -> Self {
        Self {
            ltv: Bps(7_000),
            liquidation_threshold: Bps(7_500),
            liquidation_bonus: Bps(10_750),
            decimals,
            borrowing_enabled: true,
            flash_loan_enabled: true,
            reserve_factor: Bps(2_000),
            liquidation_protocol_fee: Bps(1_000),
            ..Self::default()
        }
    }

    // Thinly traded commodity: collateral only, behind a debt ceiling
    pub fn isolated_commodity(decimals: u8, debt_ceiling_whole: u128) -> Self {
        Self {
            ltv: Bps(5_000),
            liquidation_threshold: Bps(6_500),
            liquidation_bonus: Bps(11_000),
            decimals,
            reserve_factor: Bps(2_000),
            liquidation_protocol_fee: Bps(1_000),
            debt_ceiling: debt_ceiling_whole.saturating_mul(WAD),
            ..Self::default()
        }
    }

    pub fn is_isolated(&self) -> bool {
        self.debt_ceiling != 0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ltv > self.liquidation_threshold {
            return Err(ConfigError::InvalidReserve {
                reason: "ltv must not exceed the liquidation threshold".to_string(),
            });
        }

        if self.liquidation_threshold.is_zero() {
            if !self.liquidation_bonus.is_zero() {
                return Err(ConfigError::InvalidReserve {
                    reason: "liquidation bonus requires a liquidation threshold".to_string(),
                });
            }
        } else {
            if self.liquidation_bonus <= Bps::ONE_HUNDRED_PERCENT {
                return Err(ConfigError::InvalidReserve {
                    reason: "liquidation bonus must be above 100%".to_string(),
                });
            }
            let effective =
                self.liquidation_threshold.value() as u128 * self.liquidation_bonus.value() as u128 / PERCENTAGE_FACTOR;
            if effective > PERCENTAGE_FACTOR {
                return Err(ConfigError::InvalidReserve {
                    reason: "threshold times bonus must not exceed 100%".to_string(),
                });
            }
        }

        if self.reserve_factor > Bps::ONE_HUNDRED_PERCENT
            || self.liquidation_protocol_fee > Bps::ONE_HUNDRED_PERCENT
        {
            return Err(ConfigError::InvalidReserve {
                reason: "reserve factor and protocol fee must be at most 100%".to_string(),
            });
        }

        if self.decimals > 36 {
            return Err(ConfigError::InvalidReserve {
                reason: "decimals must be at most 36".to_string(),
            });
        }

        Ok(())
    }
}

/// Per-transaction snapshot. `curr_*` is what was stored on entry, `next_*`
/// is what the action writes. Copied, never borrowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveCache {
    pub config: ReserveConfig,
    pub curr_liquidity_index: Ray,
    pub next_liquidity_index: Ray,
    pub curr_variable_borrow_index: Ray,
    pub next_variable_borrow_index: Ray,
    pub curr_liquidity_rate: Ray,
    pub curr_variable_borrow_rate: Ray,
    pub curr_scaled_variable_debt: u128,
    pub next_scaled_variable_debt: u128,
    pub curr_principal_fixed_debt: u128,
    pub curr_total_fixed_debt: u128,
    pub next_total_fixed_debt: u128,
    pub curr_avg_fixed_borrow_rate: Ray,
    pub next_avg_fixed_borrow_rate: Ray,
    pub fixed_debt_last_update: Timestamp,
    pub reserve_last_update: Timestamp,
}

impl ReserveCache {
    /// Re-reads debt totals after tokens were minted or burned.
    pub fn refresh_debt(&mut self, variable_debt: &ScaledBalanceToken, fixed_debt: &FixedRateDebtToken, now: Timestamp) -> Result<(), MathError> {
        self.next_scaled_variable_debt = variable_debt.scaled_total_supply();
        self.next_total_fixed_debt = fixed_debt.total_supply(now)?;
        self.next_avg_fixed_borrow_rate = fixed_debt.average_rate();
        Ok(())
    }

    pub fn next_total_variable_debt(&self) -> Result<u128, MathError> {
        self.next_variable_borrow_index
            .scale(self.next_scaled_variable_debt, Rounding::Up)
    }
}

/** 4.0.2: live accounting state for a listed asset */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveData {
    pub id: ReserveId,
    pub asset: AssetId,
    pub config: ReserveConfig,
    pub liquidity_index: Ray,
    pub variable_borrow_index: Ray,
    pub current_liquidity_rate: Ray,
    pub current_variable_borrow_rate: Ray,
    pub current_fixed_borrow_rate: Ray,
    pub last_update_timestamp: Timestamp,
    // scaled receipt units owed to treasury, minted lazily
    pub accrued_to_treasury: u128,
    // wad
    pub isolation_mode_total_debt: u128,
    pub virtual_underlying_balance: u128,
}

impl ReserveData {
    pub fn new(id: ReserveId, asset: AssetId, config: ReserveConfig, now: Timestamp) -> Self {
        Self {
            id,
            asset,
            config,
            liquidity_index: Ray::ONE,
            variable_borrow_index: Ray::ONE,
            current_liquidity_rate: Ray::ZERO,
            current_variable_borrow_rate: Ray::ZERO,
            current_fixed_borrow_rate: Ray::ZERO,
            last_update_timestamp: now,
            accrued_to_treasury: 0,
            isolation_mode_total_debt: 0,
            virtual_underlying_balance: 0,
        }
    }

    pub fn cache(&self, variable_debt: &ScaledBalanceToken, fixed_debt: &FixedRateDebtToken, now: Timestamp) -> Result<ReserveCache, MathError> {
        let scaled_variable = variable_debt.scaled_total_supply();
        let total_fixed = fixed_debt.total_supply(now)?;
        Ok(ReserveCache {
            config: self.config,
            curr_liquidity_index: self.liquidity_index,
            next_liquidity_index: self.liquidity_index,
            curr_variable_borrow_index: self.variable_borrow_index,
            next_variable_borrow_index: self.variable_borrow_index,
            curr_liquidity_rate: self.current_liquidity_rate,
            curr_variable_borrow_rate: self.current_variable_borrow_rate,
            curr_scaled_variable_debt: scaled_variable,
            next_scaled_variable_debt: scaled_variable,
            curr_principal_fixed_debt: fixed_debt.principal_total(),
            curr_total_fixed_debt: total_fixed,
            next_total_fixed_debt: total_fixed,
            curr_avg_fixed_borrow_rate: fixed_debt.average_rate(),
            next_avg_fixed_borrow_rate: fixed_debt.average_rate(),
            fixed_debt_last_update: fixed_debt.total_last_update(),
            reserve_last_update: self.last_update_timestamp,
        })
    }

    /// Supply-side index as of `now`, without writing anything.
    pub fn normalized_income(&self, now: Timestamp) -> Result<Ray, MathError> {
        if self.last_update_timestamp == now {
            return Ok(self.liquidity_index);
        }
        calculate_linear_interest(self.current_liquidity_rate, self.last_update_timestamp, now)?
            .mul(self.liquidity_index)
    }

    /// Variable-debt index as of `now`, without writing anything.
    pub fn normalized_debt(&self, now: Timestamp) -> Result<Ray, MathError> {
        if self.last_update_timestamp == now {
            return Ok(self.variable_borrow_index);
        }
        calculate_compounded_interest(self.current_variable_borrow_rate, self.last_update_timestamp, now)?
            .mul(self.variable_borrow_index)
    }

    /// Accrues interest up to `now`. A second call at the same timestamp is a no-op.
    pub fn update_state(&mut self, cache: &mut ReserveCache, now: Timestamp) -> Result<(), MathError> {
        if self.last_update_timestamp == now {
            return Ok(());
        }
        self.update_indexes(cache, now)?;
        self.accrue_to_treasury(cache)?;
        self.last_update_timestamp = now;
        cache.reserve_last_update = now;
        Ok(())
    }

    fn update_indexes(&mut self, cache: &mut ReserveCache, now: Timestamp) -> Result<(), MathError> {
        // 100% reserve factor leaves the liquidity rate at zero: nothing to grow
        if !cache.curr_liquidity_rate.is_zero() {
            let factor = calculate_linear_interest(cache.curr_liquidity_rate, cache.reserve_last_update, now)?;
            cache.next_liquidity_index = factor.mul(cache.curr_liquidity_index)?;
            self.liquidity_index = cache.next_liquidity_index;
        }

        if cache.curr_scaled_variable_debt != 0 {
            let factor = calculate_compounded_interest(cache.curr_variable_borrow_rate, cache.reserve_last_update, now)?;
            cache.next_variable_borrow_index = factor.mul(cache.curr_variable_borrow_index)?;
            self.variable_borrow_index = cache.next_variable_borrow_index;
        }
        Ok(())
    }

    fn accrue_to_treasury(&mut self, cache: &ReserveCache) -> Result<(), MathError> {
        if cache.config.reserve_factor.is_zero() {
            return Ok(());
        }

        let prev_total_variable = cache
            .curr_variable_borrow_index
            .scale(cache.curr_scaled_variable_debt, Rounding::HalfUp)?;
        let curr_total_variable = cache
            .next_variable_borrow_index
            .scale(cache.curr_scaled_variable_debt, Rounding::HalfUp)?;

        let fixed_factor = calculate_compounded_interest(
            cache.curr_avg_fixed_borrow_rate,
            cache.fixed_debt_last_update,
            cache.reserve_last_update,
        )?;
        let prev_total_fixed = fixed_factor.scale(cache.curr_principal_fixed_debt, Rounding::Up)?;

        let accrued = checked_add(curr_total_variable, cache.curr_total_fixed_debt)?
            .saturating_sub(checked_add(prev_total_variable, prev_total_fixed)?);

        let to_mint = percent_mul(accrued, cache.config.reserve_factor.value(), Rounding::Down)?;
        if to_mint != 0 {
            let scaled = cache.next_liquidity_index.unscale(to_mint, Rounding::Down)?;
            self.accrued_to_treasury = checked_add(self.accrued_to_treasury, scaled)?;
        }
        Ok(())
    }

    /// Recomputes rates from the post-action debt totals and moves the virtual
    /// balance by the action's liquidity delta.
    pub fn update_interest_rates(
        &mut self,
        cache: &ReserveCache,
        strategy: &dyn InterestRateStrategy,
        liquidity_added: u128,
        liquidity_taken: u128,
    ) -> Result<InterestRates, MathError> {
        let inputs = RateInputs {
            liquidity_added,
            liquidity_taken,
            total_fixed_debt: cache.next_total_fixed_debt,
            total_variable_debt: cache.next_total_variable_debt()?,
            average_fixed_rate: cache.next_avg_fixed_borrow_rate,
            reserve_factor: cache.config.reserve_factor,
            available_liquidity: self.virtual_underlying_balance,
        };
        let rates = strategy.calculate_interest_rates(&inputs)?;

        self.current_liquidity_rate = rates.liquidity_rate;
        self.current_fixed_borrow_rate = rates.fixed_borrow_rate;
        self.current_variable_borrow_rate = rates.variable_borrow_rate;

        self.virtual_underlying_balance = checked_sub(
            checked_add(self.virtual_underlying_balance, liquidity_added)?,
            liquidity_taken,
        )?;
        Ok(rates)
    }

    /// Folds `amount` of income into the liquidity index, spreading it over
    /// every current supplier in proportion to their scaled balance.
    pub fn cumulate_to_liquidity_index(&mut self, total_liquidity: u128, amount: u128) -> Result<Ray, MathError> {
        let ratio = Ray::from_ratio(amount, total_liquidity, Rounding::HalfUp)?;
        let next = ratio.checked_add(Ray::ONE)?.mul(self.liquidity_index)?;
        self.liquidity_index = next;
        Ok(next)
    }

    /// Whole-token cap scaled to the asset's decimals. None when unlimited.
    pub fn supply_cap_units(&self) -> Result<Option<u128>, MathError> {
        cap_units(self.config.supply_cap, self.config.decimals)
    }

    pub fn borrow_cap_units(&self) -> Result<Option<u128>, MathError> {
        cap_units(self.config.borrow_cap, self.config.decimals)
    }
}

fn cap_units(cap: u64, decimals: u8) -> Result<Option<u128>, MathError> {
    if cap == 0 {
        return Ok(None);
    }
    let unit = crate::math::pow10(decimals as u32)?;
    (cap as u128)
        .checked_mul(unit)
        .map(Some)
        .ok_or(MathError::Overflow)
}
