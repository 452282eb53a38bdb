//! Debt side: borrowing, repayment, credit delegation and e-mode selection.

use super::core::Pool;
use super::supply::scaled_for_burn;
use crate::errors::{AuthorizationError, PoolError};
use crate::events::{BorrowEvent, EventPayload, IsolationDebtEvent, RepayEvent, UserEModeSetEvent};
use crate::isolation::{decrease_isolated_debt, get_isolation_mode_state, increase_isolated_debt};
use crate::ledger::TokenLedger;
use crate::math::{checked_add, Rounding};
use crate::types::{AccountId, AssetId, InterestRateMode, ReserveId, RequestedAmount};
use crate::validation::{validate_borrow, validate_health_factor, validate_repay, validate_set_user_emode, BorrowValidation};
use tracing::{debug, info};

/// Internal borrow request. `release_underlying` is false when the funds
/// already left custody, as with a flash loan converted into debt.
#[derive(Debug, Clone, Copy)]
pub(super) struct BorrowArgs {
    pub caller: AccountId,
    pub asset: AssetId,
    pub amount: u128,
    pub rate_mode: InterestRateMode,
    pub on_behalf_of: AccountId,
    pub release_underlying: bool,
}

impl<L: TokenLedger + Clone> Pool<L> {
    /// Borrows `amount` against `on_behalf_of`'s collateral and sends it to
    /// `caller`. Borrowing for someone else spends their delegated allowance.
    pub fn borrow(
        &mut self,
        caller: AccountId,
        asset: AssetId,
        amount: u128,
        rate_mode: InterestRateMode,
        on_behalf_of: AccountId,
    ) -> Result<(), PoolError> {
        self.transact("borrow", |pool| {
            pool.execute_borrow(BorrowArgs {
                caller,
                asset,
                amount,
                rate_mode,
                on_behalf_of,
                release_underlying: true,
            })
        })
    }

    pub(super) fn execute_borrow(&mut self, args: BorrowArgs) -> Result<(), PoolError> {
        let now = self.current_time;
        let id = self.state.reserve_id(args.asset)?;
        let mut cache = self.cache_and_update(id)?;
        let isolation = get_isolation_mode_state(&self.state, args.on_behalf_of);

        validate_borrow(&BorrowValidation {
            state: &self.state,
            oracle: self.oracle.as_ref(),
            sentinel: self.sentinel.as_deref(),
            reserve: self.reserve(id)?,
            cache: &cache,
            user: args.on_behalf_of,
            amount: args.amount,
            rate_mode: args.rate_mode,
            max_fixed_rate_borrow_size_percent: self.config.protocol.max_fixed_rate_borrow_size_percent,
            isolation,
            user_emode: self.state.user_emode(args.on_behalf_of),
            now,
        })?;

        if args.caller != args.on_behalf_of {
            self.spend_delegation(args.asset, args.on_behalf_of, args.caller, args.amount)?;
        }

        let borrow_rate = match args.rate_mode {
            InterestRateMode::Fixed => {
                let rate = self.reserve(id)?.current_fixed_borrow_rate;
                self.fixed_debt_token_mut(id)?.mint(args.on_behalf_of, args.amount, rate, now)?;
                rate
            }
            _ => {
                let scaled = cache.next_variable_borrow_index.unscale(args.amount, Rounding::Up)?;
                if scaled == 0 {
                    return Err(PoolError::InvalidAmount);
                }
                self.variable_debt_token_mut(id)?.mint_scaled(args.on_behalf_of, scaled)?;
                self.reserve(id)?.current_variable_borrow_rate
            }
        };
        self.refresh_cache(id, &mut cache)?;
        self.state.user_config_mut(args.on_behalf_of).set_borrowing(id, true);

        let decimals = cache.config.decimals;
        if let Some((collateral, total_debt)) = increase_isolated_debt(&mut self.state, &isolation, decimals, args.amount)? {
            self.emit_isolation_debt(collateral, total_debt)?;
        }

        self.update_rates(id, &cache, 0, args.amount)?;
        if args.release_underlying {
            self.push(args.asset, args.caller, args.amount)?;
        }

        debug!(asset = %args.asset, caller = %args.caller, on_behalf_of = %args.on_behalf_of, amount = args.amount, mode = ?args.rate_mode, "borrow");
        self.emit_event(EventPayload::Borrow(BorrowEvent {
            asset: args.asset,
            user: args.caller,
            on_behalf_of: args.on_behalf_of,
            amount: args.amount,
            rate_mode: args.rate_mode,
            borrow_rate,
        }));
        Ok(())
    }

    /// Lets `delegatee` open up to `amount` of `asset` debt on `delegator`'s
    /// account. Replaces any previous allowance.
    pub fn approve_delegation(&mut self, delegator: AccountId, delegatee: AccountId, asset: AssetId, amount: u128) -> Result<(), PoolError> {
        self.transact("approve_delegation", |pool| {
            pool.state.reserve_id(asset)?;
            if amount == 0 {
                pool.state.borrow_allowances.remove(&(asset, delegator, delegatee));
            } else {
                pool.state.borrow_allowances.insert((asset, delegator, delegatee), amount);
            }
            Ok(())
        })
    }

    fn spend_delegation(&mut self, asset: AssetId, delegator: AccountId, delegatee: AccountId, amount: u128) -> Result<(), PoolError> {
        let allowance = self.state.borrow_allowance(asset, delegator, delegatee);
        if allowance < amount {
            return Err(AuthorizationError::NotApproved(delegator, delegatee).into());
        }
        let left = allowance - amount;
        if left == 0 {
            self.state.borrow_allowances.remove(&(asset, delegator, delegatee));
        } else {
            self.state.borrow_allowances.insert((asset, delegator, delegatee), left);
        }
        Ok(())
    }

    fn emit_isolation_debt(&mut self, collateral: ReserveId, total_debt: u128) -> Result<(), PoolError> {
        let asset = self.reserve(collateral)?.asset;
        self.emit_event(EventPayload::IsolationModeTotalDebtUpdated(IsolationDebtEvent { asset, total_debt }));
        Ok(())
    }

    /// Repays `on_behalf_of`'s debt of the given mode with `caller`'s funds.
    /// `All` repays the whole debt and is only accepted from the borrower.
    /// Returns the amount repaid.
    pub fn repay(
        &mut self,
        caller: AccountId,
        asset: AssetId,
        amount: RequestedAmount,
        rate_mode: InterestRateMode,
        on_behalf_of: AccountId,
    ) -> Result<u128, PoolError> {
        self.transact("repay", |pool| pool.execute_repay(caller, asset, amount, rate_mode, on_behalf_of, false))
    }

    /// Repays the caller's own debt by burning receipt tokens of the same asset.
    pub fn repay_with_receipt_tokens(
        &mut self,
        caller: AccountId,
        asset: AssetId,
        amount: RequestedAmount,
        rate_mode: InterestRateMode,
    ) -> Result<u128, PoolError> {
        self.transact("repay_with_receipt_tokens", |pool| pool.execute_repay(caller, asset, amount, rate_mode, caller, true))
    }

    fn execute_repay(
        &mut self,
        caller: AccountId,
        asset: AssetId,
        amount: RequestedAmount,
        rate_mode: InterestRateMode,
        on_behalf_of: AccountId,
        use_receipt_tokens: bool,
    ) -> Result<u128, PoolError> {
        let now = self.current_time;
        let id = self.state.reserve_id(asset)?;
        let mut cache = self.cache_and_update(id)?;

        let scaled_variable = self.state.scaled_variable_debt(id, on_behalf_of);
        let variable_debt = cache.next_variable_borrow_index.scale(scaled_variable, Rounding::Up)?;
        let fixed_debt = match self.state.fixed_debt_tokens.get(id.index()) {
            Some(token) => token.balance_of(on_behalf_of, now)?,
            None => 0,
        };

        validate_repay(self.reserve(id)?, amount, rate_mode, caller, on_behalf_of, variable_debt, fixed_debt)?;

        let debt = match rate_mode {
            InterestRateMode::Fixed => fixed_debt,
            _ => variable_debt,
        };
        let mut payback = amount.resolve(debt).min(debt);

        let income = cache.next_liquidity_index;
        let receipt_scaled = self.state.scaled_receipt_balance(id, caller);
        let receipt = income.scale(receipt_scaled, Rounding::Down)?;
        if use_receipt_tokens && amount.is_all() {
            payback = payback.min(receipt);
        }
        if payback == 0 {
            return Err(PoolError::InvalidAmount);
        }

        match rate_mode {
            InterestRateMode::Fixed => {
                self.fixed_debt_token_mut(id)?.burn(on_behalf_of, payback, now)?;
            }
            _ => {
                // partial repayments burn rounding down; the last unit of debt is never forgiven
                let scaled = if payback == variable_debt {
                    scaled_variable
                } else {
                    cache.next_variable_borrow_index.unscale(payback, Rounding::Down)?
                };
                self.variable_debt_token_mut(id)?.burn_scaled(on_behalf_of, scaled)?;
            }
        }
        self.refresh_cache(id, &mut cache)?;

        let remaining = checked_add(
            self.state.scaled_variable_debt(id, on_behalf_of),
            self.state.fixed_debt_tokens.get(id.index()).map_or(0, |t| t.principal_of(on_behalf_of)),
        )?;
        if remaining == 0 {
            self.state.user_config_mut(on_behalf_of).set_borrowing(id, false);
        }

        self.update_rates(id, &cache, if use_receipt_tokens { 0 } else { payback }, 0)?;

        if let Some((collateral, total_debt)) = decrease_isolated_debt(&mut self.state, on_behalf_of, cache.config.decimals, payback)? {
            self.emit_isolation_debt(collateral, total_debt)?;
        }

        if use_receipt_tokens {
            let scaled = scaled_for_burn(income, payback, receipt, receipt_scaled)?;
            let left = self.receipt_token_mut(id)?.burn_scaled(caller, scaled)?;
            if left == 0 && self.state.user_config(caller).is_using_as_collateral(id) {
                self.set_using_as_collateral(id, caller, false)?;
            }
        } else {
            self.pull(asset, caller, payback)?;
        }

        debug!(%asset, %caller, %on_behalf_of, payback, use_receipt_tokens, "repay");
        self.emit_event(EventPayload::Repay(RepayEvent {
            asset,
            user: on_behalf_of,
            repayer: caller,
            amount: payback,
            use_receipt_tokens,
        }));
        Ok(payback)
    }

    /// Enters, switches or leaves (`0`) an e-mode category. Every borrowed
    /// reserve must belong to the target category and the position must stay
    /// healthy under the new parameters.
    pub fn set_user_emode(&mut self, user: AccountId, category: u8) -> Result<(), PoolError> {
        self.transact("set_user_emode", |pool| {
            validate_set_user_emode(&pool.state, user, category)?;
            pool.state.user_emode.insert(user, category);
            if pool.state.user_config(user).is_borrowing_any() {
                validate_health_factor(&pool.state, pool.oracle.as_ref(), user, category, pool.current_time)?;
            }
            info!(%user, category, "user e-mode set");
            pool.emit_event(EventPayload::UserEModeSet(UserEModeSetEvent { user, category }));
            Ok(())
        })
    }
}
