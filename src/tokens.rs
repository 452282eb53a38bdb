// 4.2: position tokens. receipt and variable-debt balances are stored scaled by the reserve
// index; fixed-rate debt keeps a per-user principal and rate and compounds lazily.

use crate::interest::calculate_compounded_interest;
use crate::math::{checked_add, checked_sub, mul_div, MathError, Ray, Rounding};
use crate::types::{AccountId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Balance ledger whose entries are divided by a growing index. One instance
/// backs a reserve's receipt token, another its variable debt.
#[derive(Debug, Clone, Default)]
pub struct ScaledBalanceToken {
    balances: HashMap<AccountId, u128>,
    scaled_total_supply: u128,
}

impl ScaledBalanceToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scaled_balance_of(&self, user: AccountId) -> u128 {
        self.balances.get(&user).copied().unwrap_or(0)
    }

    pub fn scaled_total_supply(&self) -> u128 {
        self.scaled_total_supply
    }

    pub fn balance_of(&self, user: AccountId, index: Ray, rounding: Rounding) -> Result<u128, MathError> {
        index.scale(self.scaled_balance_of(user), rounding)
    }

    pub fn total_supply(&self, index: Ray, rounding: Rounding) -> Result<u128, MathError> {
        index.scale(self.scaled_total_supply, rounding)
    }

    /// Credits `scaled` units. Returns true when the user held nothing before.
    pub fn mint_scaled(&mut self, user: AccountId, scaled: u128) -> Result<bool, MathError> {
        let previous = self.scaled_balance_of(user);
        let next = checked_add(previous, scaled)?;
        self.scaled_total_supply = checked_add(self.scaled_total_supply, scaled)?;
        self.balances.insert(user, next);
        Ok(previous == 0)
    }

    /// Debits `scaled` units and returns the remaining scaled balance.
    pub fn burn_scaled(&mut self, user: AccountId, scaled: u128) -> Result<u128, MathError> {
        let previous = self.scaled_balance_of(user);
        let remaining = checked_sub(previous, scaled)?;
        self.scaled_total_supply = checked_sub(self.scaled_total_supply, scaled)?;
        if remaining == 0 {
            self.balances.remove(&user);
        } else {
            self.balances.insert(user, remaining);
        }
        Ok(remaining)
    }

    /// Moves scaled units between holders without touching total supply.
    /// Returns true when the receiver held nothing before.
    pub fn transfer_scaled(&mut self, from: AccountId, to: AccountId, scaled: u128) -> Result<bool, MathError> {
        let from_balance = self.scaled_balance_of(from);
        let remaining = checked_sub(from_balance, scaled)?;
        if from == to {
            return Ok(false);
        }
        let to_previous = self.scaled_balance_of(to);
        let to_next = checked_add(to_previous, scaled)?;

        if remaining == 0 {
            self.balances.remove(&from);
        } else {
            self.balances.insert(from, remaining);
        }
        self.balances.insert(to, to_next);
        Ok(to_previous == 0 && scaled > 0)
    }

    pub fn holders(&self) -> impl Iterator<Item = (&AccountId, &u128)> {
        self.balances.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FixedDebtPosition {
    pub principal: u128,
    pub rate: Ray,
    pub last_update: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDebtMint {
    pub previous_balance: u128,
    pub next_balance: u128,
    pub balance_increase: u128,
    pub user_rate: Ray,
    pub total_supply: u128,
    pub average_rate: Ray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDebtBurn {
    pub previous_balance: u128,
    pub next_balance: u128,
    pub balance_increase: u128,
    pub total_supply: u128,
    pub average_rate: Ray,
}

/// `(r1*w1 + r2*w2) / (w1 + w2)`, floored, zero if both weights are zero.
fn weighted_rate(r1: Ray, w1: u128, r2: Ray, w2: u128) -> Result<Ray, MathError> {
    let total = checked_add(w1, w2)?;
    if total == 0 {
        return Ok(Ray::ZERO);
    }
    let a = mul_div(r1.raw(), w1, total, Rounding::Down)?;
    let b = mul_div(r2.raw(), w2, total, Rounding::Down)?;
    Ok(Ray::from_raw(checked_add(a, b)?))
}

/// Fixed-rate debt: every borrower has their own rate, blended on each new borrow.
/// The reserve-level supply compounds at the weighted average rate.
#[derive(Debug, Clone, Default)]
pub struct FixedRateDebtToken {
    positions: HashMap<AccountId, FixedDebtPosition>,
    principal_total: u128,
    average_rate: Ray,
    total_last_update: Timestamp,
}

impl FixedRateDebtToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, user: AccountId) -> FixedDebtPosition {
        self.positions.get(&user).copied().unwrap_or_default()
    }

    pub fn principal_of(&self, user: AccountId) -> u128 {
        self.position(user).principal
    }

    pub fn user_rate(&self, user: AccountId) -> Ray {
        self.position(user).rate
    }

    pub fn average_rate(&self) -> Ray {
        self.average_rate
    }

    pub fn principal_total(&self) -> u128 {
        self.principal_total
    }

    pub fn total_last_update(&self) -> Timestamp {
        self.total_last_update
    }

    pub fn balance_of(&self, user: AccountId, now: Timestamp) -> Result<u128, MathError> {
        let position = self.position(user);
        if position.principal == 0 {
            return Ok(0);
        }
        let factor = calculate_compounded_interest(position.rate, position.last_update, now)?;
        factor.scale(position.principal, Rounding::Up)
    }

    pub fn total_supply(&self, now: Timestamp) -> Result<u128, MathError> {
        if self.principal_total == 0 {
            return Ok(0);
        }
        let factor = calculate_compounded_interest(self.average_rate, self.total_last_update, now)?;
        factor.scale(self.principal_total, Rounding::Up)
    }

    pub fn mint(&mut self, user: AccountId, amount: u128, rate: Ray, now: Timestamp) -> Result<FixedDebtMint, MathError> {
        let position = self.position(user);
        let previous_balance = self.balance_of(user, now)?;
        let balance_increase = checked_sub(previous_balance, position.principal)?;

        let previous_supply = self.total_supply(now)?;
        let next_supply = checked_add(previous_supply, amount)?;
        let next_balance = checked_add(previous_balance, amount)?;

        let user_rate = weighted_rate(position.rate, previous_balance, rate, amount)?;
        let average_rate = weighted_rate(self.average_rate, previous_supply, rate, amount)?;

        self.positions.insert(
            user,
            FixedDebtPosition {
                principal: next_balance,
                rate: user_rate,
                last_update: now,
            },
        );
        self.principal_total = next_supply;
        self.average_rate = average_rate;
        self.total_last_update = now;

        Ok(FixedDebtMint {
            previous_balance,
            next_balance,
            balance_increase,
            user_rate,
            total_supply: next_supply,
            average_rate,
        })
    }

    pub fn burn(&mut self, user: AccountId, amount: u128, now: Timestamp) -> Result<FixedDebtBurn, MathError> {
        let position = self.position(user);
        let previous_balance = self.balance_of(user, now)?;
        let balance_increase = checked_sub(previous_balance, position.principal)?;
        let next_balance = checked_sub(previous_balance, amount)?;

        let previous_supply = self.total_supply(now)?;
        let (next_supply, average_rate) = if previous_supply <= amount {
            (0, Ray::ZERO)
        } else {
            let next_supply = previous_supply - amount;
            // remove the burned weight from the average, never going negative
            let first = mul_div(self.average_rate.raw(), previous_supply, 1, Rounding::Down)?;
            let second = mul_div(position.rate.raw(), amount, 1, Rounding::Down)?;
            if second >= first {
                (0, Ray::ZERO)
            } else {
                (next_supply, Ray::from_raw((first - second) / next_supply))
            }
        };

        if next_balance == 0 {
            self.positions.remove(&user);
        } else {
            self.positions.insert(
                user,
                FixedDebtPosition {
                    principal: next_balance,
                    rate: position.rate,
                    last_update: now,
                },
            );
        }
        self.principal_total = next_supply;
        self.average_rate = average_rate;
        self.total_last_update = now;

        Ok(FixedDebtBurn {
            previous_balance,
            next_balance,
            balance_increase,
            total_supply: next_supply,
            average_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interest::{annual_to_per_second, SECONDS_PER_YEAR};
    use crate::math::RAY;
    use rust_decimal_macros::dec;

    const ALICE: AccountId = AccountId(10);
    const BOB: AccountId = AccountId(11);

    #[test]
    fn scaled_mint_burn_tracks_total() {
        let mut token = ScaledBalanceToken::new();
        assert!(token.mint_scaled(ALICE, 1_000).unwrap());
        assert!(!token.mint_scaled(ALICE, 500).unwrap());
        assert!(token.mint_scaled(BOB, 200).unwrap());
        assert_eq!(token.scaled_total_supply(), 1_700);

        assert_eq!(token.burn_scaled(ALICE, 1_500).unwrap(), 0);
        assert_eq!(token.scaled_balance_of(ALICE), 0);
        assert_eq!(token.scaled_total_supply(), 200);
        assert_eq!(token.burn_scaled(BOB, 201), Err(MathError::Underflow));
    }

    #[test]
    fn balance_of_applies_index() {
        let mut token = ScaledBalanceToken::new();
        token.mint_scaled(ALICE, 1_000).unwrap();
        let index = Ray::from_raw(RAY + RAY / 20);
        assert_eq!(token.balance_of(ALICE, index, Rounding::Down).unwrap(), 1_050);
        assert_eq!(token.total_supply(index, Rounding::Down).unwrap(), 1_050);
    }

    #[test]
    fn transfer_preserves_supply_and_flags_first_receipt() {
        let mut token = ScaledBalanceToken::new();
        token.mint_scaled(ALICE, 100).unwrap();
        assert!(token.transfer_scaled(ALICE, BOB, 40).unwrap());
        assert!(!token.transfer_scaled(ALICE, BOB, 10).unwrap());
        assert_eq!(token.scaled_balance_of(ALICE), 50);
        assert_eq!(token.scaled_balance_of(BOB), 50);
        assert_eq!(token.scaled_total_supply(), 100);
        assert_eq!(token.transfer_scaled(ALICE, BOB, 51), Err(MathError::Underflow));
    }

    #[test]
    fn fixed_debt_compounds_at_user_rate() {
        let mut token = FixedRateDebtToken::new();
        let rate = annual_to_per_second(dec!(0.1)).unwrap();
        token.mint(ALICE, 1_000_000, rate, Timestamp(0)).unwrap();

        let after_year = token.balance_of(ALICE, Timestamp(SECONDS_PER_YEAR)).unwrap();
        // ~ e^0.1
        assert!(after_year > 1_105_000 && after_year < 1_105_200, "balance {}", after_year);
        assert_eq!(token.total_supply(Timestamp(SECONDS_PER_YEAR)).unwrap(), after_year);
    }

    #[test]
    fn fixed_debt_rates_blend_by_weight() {
        let mut token = FixedRateDebtToken::new();
        let low = Ray::from_raw(RAY / 100);
        let high = Ray::from_raw(3 * RAY / 100);
        token.mint(ALICE, 1_000, low, Timestamp(0)).unwrap();
        let minted = token.mint(BOB, 1_000, high, Timestamp(0)).unwrap();
        assert_eq!(minted.average_rate, Ray::from_raw(2 * RAY / 100));

        let burned = token.burn(BOB, 1_000, Timestamp(0)).unwrap();
        assert_eq!(burned.next_balance, 0);
        assert_eq!(burned.average_rate, low);
        assert_eq!(token.principal_of(BOB), 0);
    }

    #[test]
    fn burning_everything_resets_average() {
        let mut token = FixedRateDebtToken::new();
        token.mint(ALICE, 500, Ray::from_raw(RAY / 50), Timestamp(0)).unwrap();
        let burned = token.burn(ALICE, 500, Timestamp(0)).unwrap();
        assert_eq!(burned.total_supply, 0);
        assert_eq!(token.average_rate(), Ray::ZERO);
        assert_eq!(token.burn(ALICE, 1, Timestamp(0)).map(|_| ()), Err(MathError::Underflow));
    }
}
