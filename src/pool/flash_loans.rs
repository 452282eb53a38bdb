//! Flash loan execution: disburse, call back, settle.

use super::borrow::BorrowArgs;
use super::core::Pool;
use super::results::FlashLoanResult;
use crate::errors::{CallbackError, PoolError};
use crate::events::{EventPayload, FlashLoanEvent};
use crate::flash_loan::{calculate_premium, split_premium, FlashLoanContext, FlashLoanReceiver, FlashLoanRequest};
use crate::ledger::TokenLedger;
use crate::math::{checked_add, checked_sub, Rounding};
use crate::types::{AccountId, AssetId, InterestRateMode};
use crate::validation::{validate_flashloan, validate_flashloan_simple};
use tracing::{debug, warn};

fn callback_outcome(result: Result<bool, PoolError>) -> Result<(), PoolError> {
    match result {
        Ok(true) => Ok(()),
        Ok(false) => Err(CallbackError::ReturnedFalse.into()),
        Err(err) => {
            warn!(error = %err, "flash loan receiver failed");
            Err(CallbackError::Reverted(err.to_string()).into())
        }
    }
}

impl<L: TokenLedger + Clone> Pool<L> {
    /// Lends every requested asset to `receiver` for the duration of its
    /// callback. Legs with mode `None` must come back with the premium; legs
    /// with a debt mode stay out as a new borrow for `on_behalf_of`.
    pub fn flash_loan<R: FlashLoanReceiver<L>>(
        &mut self,
        initiator: AccountId,
        receiver: &mut R,
        request: &FlashLoanRequest,
    ) -> Result<FlashLoanResult, PoolError> {
        self.transact("flash_loan", |pool| pool.execute_flash_loan(initiator, receiver, request))
    }

    fn execute_flash_loan<R: FlashLoanReceiver<L>>(
        &mut self,
        initiator: AccountId,
        receiver: &mut R,
        request: &FlashLoanRequest,
    ) -> Result<FlashLoanResult, PoolError> {
        validate_flashloan(&self.state, &request.assets, &request.amounts, &request.modes)?;

        let exempt = self.state.is_flash_borrower(initiator);
        let premium_total = self.config.protocol.flash_loan_premium_total;
        let premiums = request
            .amounts
            .iter()
            .zip(&request.modes)
            .map(|(&amount, &mode)| match mode {
                InterestRateMode::None => calculate_premium(amount, premium_total, exempt),
                _ => Ok(0),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let target = receiver.address();
        for (&asset, &amount) in request.assets.iter().zip(&request.amounts) {
            self.disburse(asset, target, amount)?;
        }

        let outcome = receiver.execute_operation(
            &mut FlashLoanContext::new(self, target),
            &request.assets,
            &request.amounts,
            &premiums,
            initiator,
            &request.params,
        );
        callback_outcome(outcome)?;

        let mut opened_debt = Vec::new();
        for (i, &asset) in request.assets.iter().enumerate() {
            let amount = request.amounts[i];
            let mode = request.modes[i];
            match mode {
                InterestRateMode::None => {
                    self.settle_flash_loan(asset, target, initiator, amount, premiums[i])?;
                }
                _ => {
                    // the disbursal becomes a borrow; the funds already left custody
                    let id = self.state.reserve_id(asset)?;
                    let reserve = self.reserve_mut(id)?;
                    reserve.virtual_underlying_balance = checked_add(reserve.virtual_underlying_balance, amount)?;
                    self.execute_borrow(BorrowArgs {
                        caller: initiator,
                        asset,
                        amount,
                        rate_mode: mode,
                        on_behalf_of: request.on_behalf_of,
                        release_underlying: false,
                    })?;
                    self.emit_event(EventPayload::FlashLoan(FlashLoanEvent {
                        receiver: target,
                        initiator,
                        asset,
                        amount,
                        mode,
                        premium: 0,
                    }));
                    opened_debt.push(asset);
                }
            }
        }

        for &asset in &request.assets {
            self.ensure_custody_backed(asset)?;
        }
        Ok(FlashLoanResult { premiums, opened_debt })
    }

    /// Single-asset flash loan. Always repaid with premium.
    pub fn flash_loan_simple<R: FlashLoanReceiver<L>>(
        &mut self,
        initiator: AccountId,
        receiver: &mut R,
        asset: AssetId,
        amount: u128,
        params: &[u8],
    ) -> Result<u128, PoolError> {
        self.transact("flash_loan_simple", |pool| {
            validate_flashloan_simple(pool.state.reserve_by_asset(asset)?, amount)?;
            let exempt = pool.state.is_flash_borrower(initiator);
            let premium = calculate_premium(amount, pool.config.protocol.flash_loan_premium_total, exempt)?;

            let target = receiver.address();
            pool.disburse(asset, target, amount)?;
            let outcome =
                receiver.execute_operation_simple(&mut FlashLoanContext::new(pool, target), asset, amount, premium, initiator, params);
            callback_outcome(outcome)?;
            pool.settle_flash_loan(asset, target, initiator, amount, premium)?;
            pool.ensure_custody_backed(asset)?;
            Ok(premium)
        })
    }

    /// Custody must still hold at least what the reserve tracks once the loan settles.
    fn ensure_custody_backed(&self, asset: AssetId) -> Result<(), PoolError> {
        let held = self.ledger.balance_of(asset, self.config.protocol.custody_account);
        let tracked = self.state.reserve_by_asset(asset)?.virtual_underlying_balance;
        if held < tracked {
            warn!(%asset, held, tracked, "custody short after flash loan");
            return Err(CallbackError::CustodyShortfall { asset, held, tracked }.into());
        }
        Ok(())
    }

    fn disburse(&mut self, asset: AssetId, to: AccountId, amount: u128) -> Result<(), PoolError> {
        let id = self.state.reserve_id(asset)?;
        let reserve = self.reserve_mut(id)?;
        reserve.virtual_underlying_balance = checked_sub(reserve.virtual_underlying_balance, amount)?;
        self.push(asset, to, amount)
    }

    /// Pulls back `amount + premium`, pays the supplier share of the premium
    /// into the liquidity index and books the protocol share for the treasury.
    fn settle_flash_loan(
        &mut self,
        asset: AssetId,
        receiver: AccountId,
        initiator: AccountId,
        amount: u128,
        premium: u128,
    ) -> Result<(), PoolError> {
        let id = self.state.reserve_id(asset)?;
        let mut cache = self.cache_and_update(id)?;
        let (to_protocol, to_suppliers) = split_premium(premium, self.config.protocol.flash_loan_premium_to_protocol)?;

        let index = cache.next_liquidity_index;
        let scaled_supply = self.state.receipt_tokens.get(id.index()).map_or(0, |t| t.scaled_total_supply());
        let reserve = self.reserve_mut(id)?;
        let total_liquidity = index.scale(checked_add(scaled_supply, reserve.accrued_to_treasury)?, Rounding::HalfUp)?;

        if to_suppliers != 0 && total_liquidity != 0 {
            cache.next_liquidity_index = reserve.cumulate_to_liquidity_index(total_liquidity, to_suppliers)?;
        }
        if to_protocol != 0 {
            let scaled = cache.next_liquidity_index.unscale(to_protocol, Rounding::Down)?;
            reserve.accrued_to_treasury = checked_add(reserve.accrued_to_treasury, scaled)?;
        }

        let owed = checked_add(amount, premium)?;
        self.update_rates(id, &cache, owed, 0)?;

        let custody = self.config.protocol.custody_account;
        if self.ledger.transfer_from(asset, custody, receiver, custody, owed).is_err() {
            return Err(CallbackError::RepaymentFailed { asset }.into());
        }

        debug!(%asset, %receiver, %initiator, amount, premium, to_protocol, "flash loan settled");
        self.emit_event(EventPayload::FlashLoan(FlashLoanEvent {
            receiver,
            initiator,
            asset,
            amount,
            mode: InterestRateMode::None,
            premium,
        }));
        Ok(())
    }
}
