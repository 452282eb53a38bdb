// 4.1: interest accrual factors and the pluggable rate strategy.
// rates are ray per-second. strategies are configured in annual Decimal terms and converted once.

use crate::math::{mul_div, percent_mul, MathError, Ray, Rounding, PERCENTAGE_FACTOR};
use crate::types::{Bps, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// `1 + rate * elapsed`. Used for the supply side.
pub fn calculate_linear_interest(rate: Ray, last_update: Timestamp, now: Timestamp) -> Result<Ray, MathError> {
    let elapsed = now.elapsed_since(last_update) as u128;
    rate.mul_int(elapsed)?.checked_add(Ray::ONE)
}

/// Compound interest approximated with the first four terms of the binomial
/// expansion: `1 + rt + (rt)^2/2 + (rt)^3/6`. Slightly under-estimates the
/// exact compounding, which keeps debt growth bounded for large gaps.
pub fn calculate_compounded_interest(rate: Ray, last_update: Timestamp, now: Timestamp) -> Result<Ray, MathError> {
    let exp = now.elapsed_since(last_update) as u128;
    if exp == 0 {
        return Ok(Ray::ONE);
    }

    let exp_minus_one = exp - 1;
    let exp_minus_two = exp.saturating_sub(2);

    let base_power_two = rate.mul(rate)?;
    let base_power_three = base_power_two.mul(rate)?;

    let second_term = base_power_two
        .mul_int(exp)?
        .mul_int(exp_minus_one)?
        .div_int(2)?;
    let third_term = base_power_three
        .mul_int(exp)?
        .mul_int(exp_minus_one)?
        .mul_int(exp_minus_two)?
        .div_int(6)?;

    Ray::ONE
        .checked_add(rate.mul_int(exp)?)?
        .checked_add(second_term)?
        .checked_add(third_term)
}

/// Annual rate expressed as a fraction (0.05 = 5% APR) to a per-second ray.
pub fn annual_to_per_second(annual: Decimal) -> Result<Ray, MathError> {
    Ray::from_decimal(annual)?.div_int(SECONDS_PER_YEAR as u128)
}

pub fn per_second_to_annual(rate: Ray) -> Decimal {
    rate.to_decimal() * Decimal::from(SECONDS_PER_YEAR)
}

/// Everything a strategy sees when rates are recomputed after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateInputs {
    pub liquidity_added: u128,
    pub liquidity_taken: u128,
    pub total_fixed_debt: u128,
    pub total_variable_debt: u128,
    pub average_fixed_rate: Ray,
    pub reserve_factor: Bps,
    /// Virtual underlying balance before this action's delta.
    pub available_liquidity: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterestRates {
    pub liquidity_rate: Ray,
    pub fixed_borrow_rate: Ray,
    pub variable_borrow_rate: Ray,
}

pub trait InterestRateStrategy: Debug + Send + Sync {
    fn calculate_interest_rates(&self, inputs: &RateInputs) -> Result<InterestRates, MathError>;
}

/// Kinked utilization curve parameters, annualized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestRateParams {
    pub optimal_usage_ratio: Decimal,
    pub base_variable_borrow_rate: Decimal,
    pub variable_rate_slope1: Decimal,
    pub variable_rate_slope2: Decimal,
    pub fixed_rate_slope1: Decimal,
    pub fixed_rate_slope2: Decimal,
    /// Premium of the fixed rate over the variable base rate.
    pub base_fixed_rate_offset: Decimal,
}

impl Default for InterestRateParams {
    fn default() -> Self {
        Self {
            optimal_usage_ratio: dec!(0.8),
            base_variable_borrow_rate: dec!(0),
            variable_rate_slope1: dec!(0.04),
            variable_rate_slope2: dec!(0.75),
            fixed_rate_slope1: dec!(0.005),
            fixed_rate_slope2: dec!(0.75),
            base_fixed_rate_offset: dec!(0.02),
        }
    }
}

impl InterestRateParams {
    /// Flatter curve for stable-value reserves.
    pub fn stablecoin() -> Self {
        Self {
            optimal_usage_ratio: dec!(0.9),
            variable_rate_slope1: dec!(0.035),
            variable_rate_slope2: dec!(0.6),
            ..Self::default()
        }
    }

    /// Steeper curve for volatile commodity tokens.
    pub fn volatile_commodity() -> Self {
        Self {
            optimal_usage_ratio: dec!(0.45),
            variable_rate_slope1: dec!(0.07),
            variable_rate_slope2: dec!(3),
            fixed_rate_slope2: dec!(3),
            base_fixed_rate_offset: dec!(0.03),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultInterestRateStrategy {
    optimal_usage_ratio: Ray,
    max_excess_usage_ratio: Ray,
    base_variable_borrow_rate: Ray,
    variable_rate_slope1: Ray,
    variable_rate_slope2: Ray,
    fixed_rate_slope1: Ray,
    fixed_rate_slope2: Ray,
    base_fixed_rate_offset: Ray,
}

impl DefaultInterestRateStrategy {
    pub fn new(params: &InterestRateParams) -> Result<Self, MathError> {
        let optimal_usage_ratio = Ray::from_decimal(params.optimal_usage_ratio)?;
        if optimal_usage_ratio.is_zero() {
            return Err(MathError::DivisionByZero);
        }
        if optimal_usage_ratio > Ray::ONE {
            return Err(MathError::Overflow);
        }
        Ok(Self {
            optimal_usage_ratio,
            max_excess_usage_ratio: Ray::ONE.checked_sub(optimal_usage_ratio)?,
            base_variable_borrow_rate: annual_to_per_second(params.base_variable_borrow_rate)?,
            variable_rate_slope1: annual_to_per_second(params.variable_rate_slope1)?,
            variable_rate_slope2: annual_to_per_second(params.variable_rate_slope2)?,
            fixed_rate_slope1: annual_to_per_second(params.fixed_rate_slope1)?,
            fixed_rate_slope2: annual_to_per_second(params.fixed_rate_slope2)?,
            base_fixed_rate_offset: annual_to_per_second(params.base_fixed_rate_offset)?,
        })
    }

    pub fn optimal_usage_ratio(&self) -> Ray {
        self.optimal_usage_ratio
    }

    pub fn base_variable_borrow_rate(&self) -> Ray {
        self.base_variable_borrow_rate
    }

    pub fn max_variable_borrow_rate(&self) -> Result<Ray, MathError> {
        self.base_variable_borrow_rate
            .checked_add(self.variable_rate_slope1)?
            .checked_add(self.variable_rate_slope2)
    }

    fn overall_borrow_rate(&self, inputs: &RateInputs, variable_rate: Ray) -> Result<Ray, MathError> {
        let total_debt = inputs.total_fixed_debt + inputs.total_variable_debt;
        if total_debt == 0 {
            return Ok(Ray::ZERO);
        }
        let weighted_variable = mul_div(inputs.total_variable_debt, variable_rate.raw(), 1, Rounding::Down)?;
        let weighted_fixed = mul_div(inputs.total_fixed_debt, inputs.average_fixed_rate.raw(), 1, Rounding::Down)?;
        let weighted = weighted_variable
            .checked_add(weighted_fixed)
            .ok_or(MathError::Overflow)?;
        Ok(Ray::from_raw(weighted / total_debt))
    }
}

impl InterestRateStrategy for DefaultInterestRateStrategy {
    fn calculate_interest_rates(&self, inputs: &RateInputs) -> Result<InterestRates, MathError> {
        let total_debt = inputs
            .total_fixed_debt
            .checked_add(inputs.total_variable_debt)
            .ok_or(MathError::Overflow)?;

        let mut variable_rate = self.base_variable_borrow_rate;
        let mut fixed_rate = self.base_variable_borrow_rate.checked_add(self.base_fixed_rate_offset)?;

        let mut usage_ratio = Ray::ZERO;
        if total_debt != 0 {
            let available = inputs
                .available_liquidity
                .checked_add(inputs.liquidity_added)
                .and_then(|v| v.checked_sub(inputs.liquidity_taken))
                .ok_or(MathError::Underflow)?;
            let available_plus_debt = available.checked_add(total_debt).ok_or(MathError::Overflow)?;
            usage_ratio = Ray::from_ratio(total_debt, available_plus_debt, Rounding::HalfUp)?;
        }

        if usage_ratio > self.optimal_usage_ratio {
            let excess_ratio = usage_ratio
                .checked_sub(self.optimal_usage_ratio)?
                .div(self.max_excess_usage_ratio)?;
            variable_rate = variable_rate
                .checked_add(self.variable_rate_slope1)?
                .checked_add(self.variable_rate_slope2.mul(excess_ratio)?)?;
            fixed_rate = fixed_rate
                .checked_add(self.fixed_rate_slope1)?
                .checked_add(self.fixed_rate_slope2.mul(excess_ratio)?)?;
        } else {
            let ratio = usage_ratio.div(self.optimal_usage_ratio)?;
            variable_rate = variable_rate.checked_add(self.variable_rate_slope1.mul(ratio)?)?;
            fixed_rate = fixed_rate.checked_add(self.fixed_rate_slope1.mul(ratio)?)?;
        }

        let overall = self.overall_borrow_rate(inputs, variable_rate)?;
        let supplier_share = PERCENTAGE_FACTOR
            .checked_sub(inputs.reserve_factor.value() as u128)
            .ok_or(MathError::Underflow)? as u16;
        let liquidity_rate = Ray::from_raw(percent_mul(
            overall.mul(usage_ratio)?.raw(),
            supplier_share,
            Rounding::Down,
        )?);

        Ok(InterestRates {
            liquidity_rate,
            fixed_borrow_rate: fixed_rate,
            variable_borrow_rate: variable_rate,
        })
    }
}

/// Flat rates regardless of utilization. Handy for deterministic accrual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRatesStrategy {
    pub rates: InterestRates,
}

impl InterestRateStrategy for FixedRatesStrategy {
    fn calculate_interest_rates(&self, _inputs: &RateInputs) -> Result<InterestRates, MathError> {
        Ok(self.rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(available: u128, variable_debt: u128) -> RateInputs {
        RateInputs {
            liquidity_added: 0,
            liquidity_taken: 0,
            total_fixed_debt: 0,
            total_variable_debt: variable_debt,
            average_fixed_rate: Ray::ZERO,
            reserve_factor: Bps::new(1000),
            available_liquidity: available,
        }
    }

    #[test]
    fn linear_interest_one_year_at_ten_percent() {
        let rate = annual_to_per_second(dec!(0.1)).unwrap();
        let factor = calculate_linear_interest(rate, Timestamp(0), Timestamp(SECONDS_PER_YEAR)).unwrap();
        let diff = factor.to_decimal() - dec!(1.1);
        assert!(diff.abs() < dec!(0.000000001), "factor {}", factor);
    }

    #[test]
    fn compounded_interest_exceeds_linear() {
        let rate = annual_to_per_second(dec!(0.1)).unwrap();
        let linear = calculate_linear_interest(rate, Timestamp(0), Timestamp(SECONDS_PER_YEAR)).unwrap();
        let compounded = calculate_compounded_interest(rate, Timestamp(0), Timestamp(SECONDS_PER_YEAR)).unwrap();
        assert!(compounded > linear);
        // e^0.1 = 1.10517..; the truncated expansion lands just under it
        assert!(compounded.to_decimal() < dec!(1.10518));
        assert!(compounded.to_decimal() > dec!(1.1051));
    }

    #[test]
    fn zero_elapsed_is_identity() {
        let rate = annual_to_per_second(dec!(0.5)).unwrap();
        assert_eq!(calculate_compounded_interest(rate, Timestamp(10), Timestamp(10)).unwrap(), Ray::ONE);
        assert_eq!(calculate_linear_interest(rate, Timestamp(10), Timestamp(10)).unwrap(), Ray::ONE);
    }

    #[test]
    fn no_debt_means_no_supply_rate() {
        let strategy = DefaultInterestRateStrategy::new(&InterestRateParams::default()).unwrap();
        let rates = strategy.calculate_interest_rates(&inputs(1_000_000, 0)).unwrap();
        assert_eq!(rates.liquidity_rate, Ray::ZERO);
        assert_eq!(rates.variable_borrow_rate, strategy.base_variable_borrow_rate());
    }

    #[test]
    fn rates_rise_with_utilization() {
        let strategy = DefaultInterestRateStrategy::new(&InterestRateParams::default()).unwrap();
        let low = strategy.calculate_interest_rates(&inputs(900, 100)).unwrap();
        let mid = strategy.calculate_interest_rates(&inputs(200, 800)).unwrap();
        let high = strategy.calculate_interest_rates(&inputs(50, 950)).unwrap();
        assert!(low.variable_borrow_rate < mid.variable_borrow_rate);
        assert!(mid.variable_borrow_rate < high.variable_borrow_rate);
        assert!(low.liquidity_rate < high.liquidity_rate);
        // supply rate never exceeds borrow rate
        assert!(high.liquidity_rate < high.variable_borrow_rate);
    }

    #[test]
    fn at_optimal_usage_rate_is_base_plus_slope1() {
        let strategy = DefaultInterestRateStrategy::new(&InterestRateParams::default()).unwrap();
        let rates = strategy.calculate_interest_rates(&inputs(200, 800)).unwrap();
        let annual = per_second_to_annual(rates.variable_borrow_rate);
        assert!((annual - dec!(0.04)).abs() < dec!(0.0000001), "annual {}", annual);
    }

    #[test]
    fn full_reserve_factor_zeroes_supply_rate() {
        let strategy = DefaultInterestRateStrategy::new(&InterestRateParams::default()).unwrap();
        let mut input = inputs(500, 500);
        input.reserve_factor = Bps::ONE_HUNDRED_PERCENT;
        let rates = strategy.calculate_interest_rates(&input).unwrap();
        assert_eq!(rates.liquidity_rate, Ray::ZERO);
        assert!(rates.variable_borrow_rate > Ray::ZERO);
    }

    #[test]
    fn liquidity_taken_beyond_available_is_underflow() {
        let strategy = DefaultInterestRateStrategy::new(&InterestRateParams::default()).unwrap();
        let mut input = inputs(100, 100);
        input.liquidity_taken = 101;
        assert_eq!(strategy.calculate_interest_rates(&input), Err(MathError::Underflow));
    }
}
