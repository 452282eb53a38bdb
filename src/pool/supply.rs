//! Supply side: deposits, withdrawals, collateral toggles, receipt transfers
//! and treasury minting.

use super::core::Pool;
use crate::account::receipt_balance;
use crate::errors::{AuthorizationError, CapacityError, ConfigurationError, PoolError};
use crate::events::{EventPayload, MintedToTreasuryEvent, SupplyEvent, WithdrawEvent};
use crate::isolation::validate_use_as_collateral;
use crate::ledger::TokenLedger;
use crate::math::{Ray, Rounding};
use crate::types::{AccountId, AssetId, ReserveId, RequestedAmount};
use crate::validation::{validate_collateral_decrease, validate_set_use_reserve_as_collateral, validate_supply, validate_withdraw};
use tracing::debug;

/// Scaled units minted for a deposit. The very first deposit into a fresh
/// reserve is taken one-to-one.
pub(super) fn scaled_for_mint(index: Ray, scaled_total: u128, amount: u128) -> Result<u128, PoolError> {
    let scaled = if scaled_total == 0 && index == Ray::ONE {
        amount
    } else {
        index.unscale(amount, Rounding::Down)?
    };
    if scaled == 0 {
        return Err(PoolError::InvalidAmount);
    }
    Ok(scaled)
}

/// Scaled units to burn for `amount` out of a `balance` backed by `scaled_balance`.
/// Taking the whole balance burns everything so no dust is left behind.
pub(super) fn scaled_for_burn(index: Ray, amount: u128, balance: u128, scaled_balance: u128) -> Result<u128, PoolError> {
    if amount >= balance {
        return Ok(scaled_balance);
    }
    Ok(index.unscale(amount, Rounding::Up)?.min(scaled_balance))
}

impl<L: TokenLedger + Clone> Pool<L> {
    /// Deposits `amount` of `asset` from `caller`, crediting receipt tokens to
    /// `on_behalf_of`. A first deposit switches the reserve on as collateral
    /// when the isolation rules allow it.
    pub fn supply(&mut self, caller: AccountId, asset: AssetId, amount: u128, on_behalf_of: AccountId) -> Result<(), PoolError> {
        self.transact("supply", |pool| pool.execute_supply(caller, asset, amount, on_behalf_of))
    }

    fn execute_supply(&mut self, caller: AccountId, asset: AssetId, amount: u128, on_behalf_of: AccountId) -> Result<(), PoolError> {
        let id = self.state.reserve_id(asset)?;
        let cache = self.cache_and_update(id)?;
        let scaled_total = self.state.receipt_tokens.get(id.index()).map_or(0, |t| t.scaled_total_supply());

        validate_supply(self.reserve(id)?, &cache, scaled_total, amount)?;
        self.update_rates(id, &cache, amount, 0)?;
        self.pull(asset, caller, amount)?;

        let scaled = scaled_for_mint(cache.next_liquidity_index, scaled_total, amount)?;
        let is_first = self.receipt_token_mut(id)?.mint_scaled(on_behalf_of, scaled)?;

        if is_first {
            let config = self.reserve(id)?.config;
            if validate_use_as_collateral(&self.state, on_behalf_of, &config) {
                self.set_using_as_collateral(id, on_behalf_of, true)?;
            }
        }

        debug!(%asset, %caller, %on_behalf_of, amount, scaled, "supply");
        self.emit_event(EventPayload::Supply(SupplyEvent {
            asset,
            user: caller,
            on_behalf_of,
            amount,
        }));
        Ok(())
    }

    /// Redeems receipt tokens for underlying sent to `to`. `All` withdraws the
    /// full balance. Returns the amount withdrawn.
    pub fn withdraw(&mut self, caller: AccountId, asset: AssetId, amount: RequestedAmount, to: AccountId) -> Result<u128, PoolError> {
        self.transact("withdraw", |pool| pool.execute_withdraw(caller, asset, amount, to))
    }

    fn execute_withdraw(&mut self, caller: AccountId, asset: AssetId, amount: RequestedAmount, to: AccountId) -> Result<u128, PoolError> {
        let id = self.state.reserve_id(asset)?;
        let cache = self.cache_and_update(id)?;
        let index = cache.next_liquidity_index;

        let scaled_balance = self.state.scaled_receipt_balance(id, caller);
        let balance = index.scale(scaled_balance, Rounding::Down)?;
        let amount = amount.resolve(balance);

        validate_withdraw(self.reserve(id)?, amount, balance)?;
        validate_collateral_decrease(&self.state, self.oracle.as_ref(), caller, id, amount, self.current_time)?;

        self.update_rates(id, &cache, 0, amount)?;

        let scaled = scaled_for_burn(index, amount, balance, scaled_balance)?;
        let remaining = self.receipt_token_mut(id)?.burn_scaled(caller, scaled)?;
        if remaining == 0 && self.state.user_config(caller).is_using_as_collateral(id) {
            self.set_using_as_collateral(id, caller, false)?;
        }

        self.push(asset, to, amount)?;

        debug!(%asset, %caller, %to, amount, scaled, "withdraw");
        self.emit_event(EventPayload::Withdraw(WithdrawEvent {
            asset,
            user: caller,
            to,
            amount,
        }));
        Ok(amount)
    }

    /// Switches a supplied reserve on or off as collateral for `user`.
    /// Switching off must leave the position healthy.
    pub fn set_user_use_reserve_as_collateral(&mut self, user: AccountId, asset: AssetId, use_as_collateral: bool) -> Result<(), PoolError> {
        self.transact("set_user_use_reserve_as_collateral", |pool| {
            let id = pool.state.reserve_id(asset)?;
            let balance = receipt_balance(&pool.state, id, user, pool.current_time)?;
            validate_set_use_reserve_as_collateral(pool.reserve(id)?, balance)?;

            if pool.state.user_config(user).is_using_as_collateral(id) == use_as_collateral {
                return Ok(());
            }

            if use_as_collateral {
                let config = pool.reserve(id)?.config;
                if config.ltv.is_zero() {
                    return Err(ConfigurationError::ZeroLtvCollateral(id).into());
                }
                if !validate_use_as_collateral(&pool.state, user, &config) {
                    return Err(AuthorizationError::IsolationModeCollateralMix.into());
                }
            } else {
                validate_collateral_decrease(&pool.state, pool.oracle.as_ref(), user, id, balance, pool.current_time)?;
            }
            pool.set_using_as_collateral(id, user, use_as_collateral)
        })
    }

    /// Moves `amount` (underlying units) of receipt tokens between accounts.
    /// The sender stays bound by the same health rule as a withdrawal.
    pub fn transfer_receipt(&mut self, asset: AssetId, from: AccountId, to: AccountId, amount: u128) -> Result<(), PoolError> {
        self.transact("transfer_receipt", |pool| {
            let id = pool.state.reserve_id(asset)?;
            let reserve = pool.reserve(id)?;
            if reserve.config.paused {
                return Err(ConfigurationError::ReservePaused(id).into());
            }
            let index = reserve.normalized_income(pool.current_time)?;
            let scaled_balance = pool.state.scaled_receipt_balance(id, from);
            let balance = index.scale(scaled_balance, Rounding::Down)?;
            if amount == 0 {
                return Err(PoolError::InvalidAmount);
            }
            if amount > balance {
                return Err(CapacityError::NotEnoughAvailableUserBalance {
                    requested: amount,
                    balance,
                }
                .into());
            }
            validate_collateral_decrease(&pool.state, pool.oracle.as_ref(), from, id, amount, pool.current_time)?;

            let scaled = scaled_for_burn(index, amount, balance, scaled_balance)?;
            pool.move_receipt(id, from, to, scaled)?;
            debug!(%asset, %from, %to, amount, scaled, "receipt transfer");
            Ok(())
        })
    }

    /// Moves scaled receipt units and keeps both collateral bitmaps in step.
    pub(super) fn move_receipt(&mut self, id: ReserveId, from: AccountId, to: AccountId, scaled: u128) -> Result<(), PoolError> {
        if from == to || scaled == 0 {
            return Ok(());
        }
        let receiver_first = self.receipt_token_mut(id)?.transfer_scaled(from, to, scaled)?;

        if self.state.scaled_receipt_balance(id, from) == 0 && self.state.user_config(from).is_using_as_collateral(id) {
            self.set_using_as_collateral(id, from, false)?;
        }
        if receiver_first {
            let config = self.reserve(id)?.config;
            if validate_use_as_collateral(&self.state, to, &config) {
                self.set_using_as_collateral(id, to, true)?;
            }
        }
        Ok(())
    }

    /// Mints the treasury's accrued share of each listed asset as receipt tokens.
    pub fn mint_to_treasury(&mut self, assets: &[AssetId]) -> Result<(), PoolError> {
        self.transact("mint_to_treasury", |pool| {
            let treasury = pool.config.protocol.treasury;
            let now = pool.current_time;
            for &asset in assets {
                let id = pool.state.reserve_id(asset)?;
                let reserve = pool.reserve_mut(id)?;
                if !reserve.config.active || reserve.accrued_to_treasury == 0 {
                    continue;
                }
                let scaled = std::mem::take(&mut reserve.accrued_to_treasury);
                let index = reserve.normalized_income(now)?;
                let amount = index.scale(scaled, Rounding::Down)?;

                pool.receipt_token_mut(id)?.mint_scaled(treasury, scaled)?;
                debug!(%asset, amount, scaled, "minted to treasury");
                pool.emit_event(EventPayload::MintedToTreasury(MintedToTreasuryEvent { asset, amount }));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_deposit_is_one_to_one() {
        assert_eq!(scaled_for_mint(Ray::ONE, 0, 1_000).unwrap(), 1_000);
    }

    #[test]
    fn mint_rounds_down_and_rejects_dust() {
        let index = Ray::from_raw(1_050_000_000_000_000_000_000_000_000);
        assert_eq!(scaled_for_mint(index, 1, 1_050).unwrap(), 1_000);
        assert_eq!(scaled_for_mint(index, 1, 1_000).unwrap(), 952);
        assert!(matches!(scaled_for_mint(index, 1, 1), Err(PoolError::InvalidAmount)));
    }

    #[test]
    fn burn_takes_everything_on_full_withdrawal() {
        let index = Ray::from_raw(1_050_000_000_000_000_000_000_000_000);
        assert_eq!(scaled_for_burn(index, 1_050, 1_050, 1_000).unwrap(), 1_000);
        // 100 / 1.05 = 95.2, rounded up
        assert_eq!(scaled_for_burn(index, 100, 1_050, 1_000).unwrap(), 96);
    }
}
