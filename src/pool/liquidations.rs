//! Liquidation execution.

use super::core::Pool;
use super::results::LiquidationResult;
use crate::account::{asset_price, calculate_user_account_data, effective_params};
use crate::errors::PoolError;
use crate::events::{EventPayload, IsolationDebtEvent, LiquidationCallEvent};
use crate::isolation::decrease_isolated_debt;
use crate::ledger::TokenLedger;
use crate::liquidation::{
    calculate_actual_debt_to_cover, calculate_available_collateral_to_liquidate, calculate_close_factor, SeizureInputs,
};
use crate::math::{checked_add, Rounding};
use crate::types::{AccountId, AssetId, ReserveId};
use crate::validation::{validate_liquidation_call, LiquidationValidation};
use tracing::info;

impl<L: TokenLedger + Clone> Pool<L> {
    /// Repays part of an unhealthy `user`'s `debt_asset` debt on their behalf
    /// and hands the liquidator `collateral_asset` worth the repaid debt plus
    /// the liquidation bonus. The liquidator receives either receipt tokens or
    /// underlying.
    pub fn liquidation_call(
        &mut self,
        liquidator: AccountId,
        collateral_asset: AssetId,
        debt_asset: AssetId,
        user: AccountId,
        debt_to_cover: u128,
        receive_receipt_token: bool,
    ) -> Result<LiquidationResult, PoolError> {
        self.transact("liquidation_call", |pool| {
            pool.execute_liquidation_call(liquidator, collateral_asset, debt_asset, user, debt_to_cover, receive_receipt_token)
        })
    }

    fn execute_liquidation_call(
        &mut self,
        liquidator: AccountId,
        collateral_asset: AssetId,
        debt_asset: AssetId,
        user: AccountId,
        debt_to_cover: u128,
        receive_receipt_token: bool,
    ) -> Result<LiquidationResult, PoolError> {
        let now = self.current_time;
        let collateral_id = self.state.reserve_id(collateral_asset)?;
        let debt_id = self.state.reserve_id(debt_asset)?;

        // 8.4.1: accrue both reserves
        let mut debt_cache = self.cache_and_update(debt_id)?;
        self.cache_and_update(collateral_id)?;

        // 8.4.2: the user's position as of now
        let scaled_variable = self.state.scaled_variable_debt(debt_id, user);
        let variable_debt = debt_cache.next_variable_borrow_index.scale(scaled_variable, Rounding::Up)?;
        let fixed_debt = match self.state.fixed_debt_tokens.get(debt_id.index()) {
            Some(token) => token.balance_of(user, now)?,
            None => 0,
        };
        let total_debt = checked_add(variable_debt, fixed_debt)?;

        let emode = self.state.user_emode(user);
        let account = calculate_user_account_data(&self.state, self.oracle.as_ref(), user, emode, now)?;

        validate_liquidation_call(&LiquidationValidation {
            collateral: self.reserve(collateral_id)?,
            debt: self.reserve(debt_id)?,
            sentinel: self.sentinel.as_deref(),
            health_factor: account.health_factor,
            sentinel_min_hf: self.config.protocol.sentinel_liquidation_min_hf,
            collateral_enabled: self.state.user_config(user).is_using_as_collateral(collateral_id),
            total_debt,
        })?;

        // 8.4.3: how much debt this call may cover and what it buys
        let close_factor = calculate_close_factor(account.health_factor, &self.config.protocol);
        let max_cover = calculate_actual_debt_to_cover(total_debt, debt_to_cover, close_factor)?;

        let collateral = self.reserve(collateral_id)?;
        let debt = self.reserve(debt_id)?;
        let collateral_params = effective_params(&self.state, collateral, emode);
        let debt_params = effective_params(&self.state, debt, emode);
        let collateral_index = collateral.normalized_income(now)?;
        let collateral_scaled = self.state.scaled_receipt_balance(collateral_id, user);
        let user_collateral_balance = collateral_index.scale(collateral_scaled, Rounding::Down)?;

        let seizure = calculate_available_collateral_to_liquidate(&SeizureInputs {
            collateral_price: asset_price(self.oracle.as_ref(), collateral_params.price_asset)?,
            collateral_decimals: collateral.config.decimals,
            debt_price: asset_price(self.oracle.as_ref(), debt_params.price_asset)?,
            debt_decimals: debt.config.decimals,
            debt_to_cover: max_cover,
            user_collateral_balance,
            liquidation_bonus: collateral_params.liquidation_bonus,
            liquidation_protocol_fee: collateral.config.liquidation_protocol_fee,
        })?;
        let debt_amount = seizure.debt_to_cover;
        if debt_amount == 0 {
            return Err(PoolError::InvalidAmount);
        }

        // 8.4.4: burn debt, variable first
        if variable_debt >= debt_amount {
            let scaled = if debt_amount == variable_debt {
                scaled_variable
            } else {
                debt_cache.next_variable_borrow_index.unscale(debt_amount, Rounding::Down)?
            };
            self.variable_debt_token_mut(debt_id)?.burn_scaled(user, scaled)?;
        } else {
            if scaled_variable != 0 {
                self.variable_debt_token_mut(debt_id)?.burn_scaled(user, scaled_variable)?;
            }
            self.fixed_debt_token_mut(debt_id)?.burn(user, debt_amount - variable_debt, now)?;
        }
        self.refresh_cache(debt_id, &mut debt_cache)?;

        let debt_left = checked_add(
            self.state.scaled_variable_debt(debt_id, user),
            self.state.fixed_debt_tokens.get(debt_id.index()).map_or(0, |t| t.principal_of(user)),
        )?;
        if debt_left == 0 {
            self.state.user_config_mut(user).set_borrowing(debt_id, false);
        }

        if let Some((iso_collateral, total)) =
            decrease_isolated_debt(&mut self.state, user, debt_cache.config.decimals, debt_amount)?
        {
            let asset = self.reserve(iso_collateral)?.asset;
            self.emit_event(EventPayload::IsolationModeTotalDebtUpdated(IsolationDebtEvent {
                asset,
                total_debt: total,
            }));
        }

        self.update_rates(debt_id, &debt_cache, debt_amount, 0)?;

        // 8.4.5: hand over collateral. re-read the cache, the debt leg may have touched this reserve
        self.seize_collateral(
            collateral_id,
            user,
            liquidator,
            seizure.collateral_to_liquidator,
            seizure.protocol_fee,
            receive_receipt_token,
        )?;

        // 8.4.6: take the liquidator's payment
        self.pull(debt_asset, liquidator, debt_amount)?;

        info!(
            %user,
            %liquidator,
            %collateral_asset,
            %debt_asset,
            debt_covered = debt_amount,
            seized = seizure.collateral_to_liquidator,
            fee = seizure.protocol_fee,
            health_factor = %account.health_factor,
            "liquidation"
        );
        self.emit_event(EventPayload::LiquidationCall(LiquidationCallEvent {
            collateral_asset,
            debt_asset,
            user,
            debt_to_cover: debt_amount,
            liquidated_collateral: seizure.collateral_to_liquidator,
            protocol_fee: seizure.protocol_fee,
            liquidator,
            receive_receipt_token,
        }));

        Ok(LiquidationResult {
            user,
            collateral_asset,
            debt_asset,
            debt_covered: debt_amount,
            collateral_to_liquidator: seizure.collateral_to_liquidator,
            protocol_fee: seizure.protocol_fee,
            health_factor_before: account.health_factor,
            close_factor,
        })
    }

    fn seize_collateral(
        &mut self,
        id: ReserveId,
        user: AccountId,
        liquidator: AccountId,
        to_liquidator: u128,
        protocol_fee: u128,
        receive_receipt_token: bool,
    ) -> Result<(), PoolError> {
        let cache = self.cache_and_update(id)?;
        let index = cache.next_liquidity_index;
        let asset = self.reserve(id)?.asset;

        let scaled_balance = self.state.scaled_receipt_balance(id, user);
        let balance = index.scale(scaled_balance, Rounding::Down)?;
        let liquidator_scaled = if to_liquidator >= balance {
            scaled_balance
        } else {
            index.unscale(to_liquidator, Rounding::Up)?.min(scaled_balance)
        };

        if receive_receipt_token {
            self.move_receipt(id, user, liquidator, liquidator_scaled)?;
        } else {
            self.update_rates(id, &cache, 0, to_liquidator)?;
            let left = self.receipt_token_mut(id)?.burn_scaled(user, liquidator_scaled)?;
            if left == 0 && self.state.user_config(user).is_using_as_collateral(id) {
                self.set_using_as_collateral(id, user, false)?;
            }
            self.push(asset, liquidator, to_liquidator)?;
        }

        if protocol_fee != 0 {
            let remaining = self.state.scaled_receipt_balance(id, user);
            let fee_scaled = index.unscale(protocol_fee, Rounding::Up)?.min(remaining);
            let treasury = self.config.protocol.treasury;
            // the treasury never has collateral switched on for it
            if fee_scaled != 0 {
                self.receipt_token_mut(id)?.transfer_scaled(user, treasury, fee_scaled)?;
            }
        }
        if self.state.scaled_receipt_balance(id, user) == 0 && self.state.user_config(user).is_using_as_collateral(id) {
            self.set_using_as_collateral(id, user, false)?;
        }
        Ok(())
    }
}
