// 10.0: flash loan receiver interface and premium math. execution lives in pool/flash_loans.rs.

use crate::errors::PoolError;
use crate::ledger::{TokenError, TokenLedger};
use crate::math::{percent_mul, MathError, Rounding};
use crate::pool::Pool;
use crate::types::{AccountId, AssetId, Bps, InterestRateMode, RequestedAmount};

/// What a receiver can touch while it holds the funds. Token movements are
/// bound to the receiver's own account, the pool is readable, and pool entry
/// points are reachable only to be refused as re-entrant.
pub struct FlashLoanContext<'a, L: TokenLedger + Clone> {
    pool: &'a mut Pool<L>,
    receiver: AccountId,
}

impl<'a, L: TokenLedger + Clone> FlashLoanContext<'a, L> {
    pub(crate) fn new(pool: &'a mut Pool<L>, receiver: AccountId) -> Self {
        Self { pool, receiver }
    }

    pub fn receiver(&self) -> AccountId {
        self.receiver
    }

    pub fn pool(&self) -> &Pool<L> {
        self.pool
    }

    pub fn custody(&self) -> AccountId {
        self.pool.custody()
    }

    pub fn balance_of(&self, asset: AssetId) -> u128 {
        self.pool.ledger().balance_of(asset, self.receiver)
    }

    /// Sends the receiver's own tokens.
    pub fn transfer(&mut self, asset: AssetId, to: AccountId, amount: u128) -> Result<(), TokenError> {
        let from = self.receiver;
        self.pool.ledger.transfer(asset, from, to, amount)
    }

    /// Spends an allowance `owner` granted to the receiver.
    pub fn transfer_from(&mut self, asset: AssetId, owner: AccountId, to: AccountId, amount: u128) -> Result<(), TokenError> {
        let spender = self.receiver;
        self.pool.ledger.transfer_from(asset, spender, owner, to, amount)
    }

    pub fn approve(&mut self, asset: AssetId, spender: AccountId, amount: u128) {
        let owner = self.receiver;
        self.pool.ledger.approve(asset, owner, spender, amount);
    }

    pub fn force_approve(&mut self, asset: AssetId, spender: AccountId, amount: u128) {
        let owner = self.receiver;
        self.pool.ledger.force_approve(asset, owner, spender, amount);
    }

    pub fn supply(&mut self, asset: AssetId, amount: u128, on_behalf_of: AccountId) -> Result<(), PoolError> {
        let caller = self.receiver;
        self.pool.supply(caller, asset, amount, on_behalf_of)
    }

    pub fn withdraw(&mut self, asset: AssetId, amount: RequestedAmount, to: AccountId) -> Result<u128, PoolError> {
        let caller = self.receiver;
        self.pool.withdraw(caller, asset, amount, to)
    }

    pub fn borrow(&mut self, asset: AssetId, amount: u128, rate_mode: InterestRateMode, on_behalf_of: AccountId) -> Result<(), PoolError> {
        let caller = self.receiver;
        self.pool.borrow(caller, asset, amount, rate_mode, on_behalf_of)
    }

    pub fn repay(
        &mut self,
        asset: AssetId,
        amount: RequestedAmount,
        rate_mode: InterestRateMode,
        on_behalf_of: AccountId,
    ) -> Result<u128, PoolError> {
        let caller = self.receiver;
        self.pool.repay(caller, asset, amount, rate_mode, on_behalf_of)
    }
}

/// Contract a flash loan target implements. The pool hands over the funds,
/// calls back with a [`FlashLoanContext`], then settles.
pub trait FlashLoanReceiver<L: TokenLedger + Clone> {
    /// Account the loaned funds are sent to and pulled back from.
    fn address(&self) -> AccountId;

    fn execute_operation(
        &mut self,
        ctx: &mut FlashLoanContext<'_, L>,
        assets: &[AssetId],
        amounts: &[u128],
        premiums: &[u128],
        initiator: AccountId,
        params: &[u8],
    ) -> Result<bool, PoolError>;

    /// Single-asset form. Defaults to the multi-asset callback.
    fn execute_operation_simple(
        &mut self,
        ctx: &mut FlashLoanContext<'_, L>,
        asset: AssetId,
        amount: u128,
        premium: u128,
        initiator: AccountId,
        params: &[u8],
    ) -> Result<bool, PoolError> {
        self.execute_operation(ctx, &[asset], &[amount], &[premium], initiator, params)
    }
}

/// Multi-asset request. `modes[i]` picks how leg `i` settles:
/// `None` repays with premium, `Variable` opens debt for `on_behalf_of`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashLoanRequest {
    pub assets: Vec<AssetId>,
    pub amounts: Vec<u128>,
    pub modes: Vec<InterestRateMode>,
    pub on_behalf_of: AccountId,
    pub params: Vec<u8>,
}

/// Premium owed on `amount`, rounded up. Zero for fee-exempt initiators.
pub fn calculate_premium(amount: u128, premium_total: Bps, exempt: bool) -> Result<u128, MathError> {
    if exempt {
        return Ok(0);
    }
    percent_mul(amount, premium_total.value(), Rounding::Up)
}

/// Splits a premium into (protocol share, supplier share). The protocol share rounds down.
pub fn split_premium(premium: u128, to_protocol: Bps) -> Result<(u128, u128), MathError> {
    let protocol = percent_mul(premium, to_protocol.value(), Rounding::Down)?;
    Ok((protocol, premium - protocol))
}
