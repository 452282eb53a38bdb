//! Liquidation math.
//!
//! Pure functions: how much debt may be covered in one call (close factor)
//! and how much collateral that buys the liquidator, including the bonus and
//! the protocol's cut of it. Execution lives in `pool/liquidations.rs`.

use crate::config::ProtocolConfig;
use crate::math::{mul_div_wide, percent_div, percent_mul, pow10, MathError, Rounding, Wad, PERCENTAGE_FACTOR};
use crate::types::Bps;
use serde::{Deserialize, Serialize};

/// Share of total debt a single call may repay. At or above the threshold
/// only the default share, below it everything.
pub fn calculate_close_factor(health_factor: Wad, config: &ProtocolConfig) -> Bps {
    if health_factor >= config.close_factor_hf_threshold {
        config.default_close_factor
    } else {
        config.max_close_factor
    }
}

/// Requested cover clamped to `total_debt * close_factor`.
pub fn calculate_actual_debt_to_cover(total_debt: u128, requested: u128, close_factor: Bps) -> Result<u128, MathError> {
    let max = percent_mul(total_debt, close_factor.value(), Rounding::Down)?;
    Ok(requested.min(max))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeizureInputs {
    pub collateral_price: u128,
    pub collateral_decimals: u8,
    pub debt_price: u128,
    pub debt_decimals: u8,
    pub debt_to_cover: u128,
    pub user_collateral_balance: u128,
    // 10000 + bonus
    pub liquidation_bonus: Bps,
    pub liquidation_protocol_fee: Bps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralSeizure {
    // collateral sent to the liquidator, fee already taken out
    pub collateral_to_liquidator: u128,
    pub debt_to_cover: u128,
    pub protocol_fee: u128,
}

impl CollateralSeizure {
    pub fn total_seized(&self) -> u128 {
        self.collateral_to_liquidator + self.protocol_fee
    }
}

/// Collateral bought by `debt_to_cover` at the bonus, capped at the user's
/// balance. When the cap binds the debt actually covered shrinks to match.
/// Collateral rounds down, debt needed rounds up, the fee rounds up.
pub fn calculate_available_collateral_to_liquidate(inputs: &SeizureInputs) -> Result<CollateralSeizure, MathError> {
    let collateral_unit = pow10(inputs.collateral_decimals as u32)?;
    let debt_unit = pow10(inputs.debt_decimals as u32)?;
    let bonus = inputs.liquidation_bonus.value() as u128;

    let max_collateral = mul_div_wide(
        &[inputs.debt_price, inputs.debt_to_cover, collateral_unit, bonus],
        &[inputs.collateral_price, debt_unit, PERCENTAGE_FACTOR],
        Rounding::Down,
    )?;

    let (collateral_amount, debt_needed) = if max_collateral > inputs.user_collateral_balance {
        let debt_needed = mul_div_wide(
            &[inputs.collateral_price, inputs.user_collateral_balance, debt_unit, PERCENTAGE_FACTOR],
            &[inputs.debt_price, collateral_unit, bonus],
            Rounding::Up,
        )?;
        (inputs.user_collateral_balance, debt_needed.min(inputs.debt_to_cover))
    } else {
        (max_collateral, inputs.debt_to_cover)
    };

    let protocol_fee = if inputs.liquidation_protocol_fee.is_zero() {
        0
    } else {
        let without_bonus = percent_div(collateral_amount, inputs.liquidation_bonus.value(), Rounding::Down)?;
        let bonus_collateral = collateral_amount.saturating_sub(without_bonus);
        percent_mul(bonus_collateral, inputs.liquidation_protocol_fee.value(), Rounding::Up)?.min(collateral_amount)
    };

    Ok(CollateralSeizure {
        collateral_to_liquidator: collateral_amount - protocol_fee,
        debt_to_cover: debt_needed,
        protocol_fee,
    })
}
