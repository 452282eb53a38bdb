// 9.2 ledger.rs: token movement interface. the pool never holds balances itself, it asks the
// enclosing runtime's token ledger to move underlying. InMemoryLedger is the mocked version.

use crate::types::{AccountId, AssetId};
use std::collections::HashMap;
use std::fmt::Debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("{account} holds {balance} of {asset}, {requested} requested")]
    InsufficientBalance {
        asset: AssetId,
        account: AccountId,
        balance: u128,
        requested: u128,
    },

    #[error("{spender} may move {allowance} of {asset} for {owner}, {requested} requested")]
    InsufficientAllowance {
        asset: AssetId,
        owner: AccountId,
        spender: AccountId,
        allowance: u128,
        requested: u128,
    },

    #[error("balance overflow")]
    Overflow,
}

/// Fungible-token operations the pool consumes.
pub trait TokenLedger: Debug {
    fn balance_of(&self, asset: AssetId, account: AccountId) -> u128;

    fn transfer(&mut self, asset: AssetId, from: AccountId, to: AccountId, amount: u128) -> Result<(), TokenError>;

    /// Moves `amount` from `from` to `to` against `spender`'s allowance.
    fn transfer_from(
        &mut self,
        asset: AssetId,
        spender: AccountId,
        from: AccountId,
        to: AccountId,
        amount: u128,
    ) -> Result<(), TokenError>;

    fn approve(&mut self, asset: AssetId, owner: AccountId, spender: AccountId, amount: u128);

    fn allowance(&self, asset: AssetId, owner: AccountId, spender: AccountId) -> u128;

    /// Resets the allowance to zero before setting it, for tokens that refuse
    /// to change a non-zero allowance directly.
    fn force_approve(&mut self, asset: AssetId, owner: AccountId, spender: AccountId, amount: u128) {
        self.approve(asset, owner, spender, 0);
        self.approve(asset, owner, spender, amount);
    }
}

/// MOCKED. balances in a hash map, no real chain.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    balances: HashMap<(AssetId, AccountId), u128>,
    allowances: HashMap<(AssetId, AccountId, AccountId), u128>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Faucet for tests and the sim.
    pub fn mint(&mut self, asset: AssetId, to: AccountId, amount: u128) -> Result<(), TokenError> {
        let balance = self.balances.entry((asset, to)).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(TokenError::Overflow)?;
        Ok(())
    }

    pub fn total_of(&self, asset: AssetId) -> u128 {
        self.balances
            .iter()
            .filter(|((a, _), _)| *a == asset)
            .map(|(_, balance)| *balance)
            .sum()
    }

    fn debit(&mut self, asset: AssetId, from: AccountId, amount: u128) -> Result<(), TokenError> {
        let balance = self.balance_of(asset, from);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                asset,
                account: from,
                balance,
                requested: amount,
            });
        }
        self.balances.insert((asset, from), balance - amount);
        Ok(())
    }
}

impl TokenLedger for InMemoryLedger {
    fn balance_of(&self, asset: AssetId, account: AccountId) -> u128 {
        self.balances.get(&(asset, account)).copied().unwrap_or(0)
    }

    fn transfer(&mut self, asset: AssetId, from: AccountId, to: AccountId, amount: u128) -> Result<(), TokenError> {
        if from == to {
            let balance = self.balance_of(asset, from);
            if balance < amount {
                return Err(TokenError::InsufficientBalance { asset, account: from, balance, requested: amount });
            }
            return Ok(());
        }
        // check the credit side first so a failed transfer leaves nothing half-done
        let to_balance = self.balance_of(asset, to);
        let credited = to_balance.checked_add(amount).ok_or(TokenError::Overflow)?;
        self.debit(asset, from, amount)?;
        self.balances.insert((asset, to), credited);
        Ok(())
    }

    fn transfer_from(
        &mut self,
        asset: AssetId,
        spender: AccountId,
        from: AccountId,
        to: AccountId,
        amount: u128,
    ) -> Result<(), TokenError> {
        if spender != from {
            let allowance = self.allowance(asset, from, spender);
            if allowance < amount {
                return Err(TokenError::InsufficientAllowance {
                    asset,
                    owner: from,
                    spender,
                    allowance,
                    requested: amount,
                });
            }
            self.transfer(asset, from, to, amount)?;
            self.allowances.insert((asset, from, spender), allowance - amount);
            return Ok(());
        }
        self.transfer(asset, from, to, amount)
    }

    fn approve(&mut self, asset: AssetId, owner: AccountId, spender: AccountId, amount: u128) {
        self.allowances.insert((asset, owner, spender), amount);
    }

    fn allowance(&self, asset: AssetId, owner: AccountId, spender: AccountId) -> u128 {
        self.allowances.get(&(asset, owner, spender)).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOLD: AssetId = AssetId(1);
    const ALICE: AccountId = AccountId(10);
    const BOB: AccountId = AccountId(11);
    const POOL: AccountId = AccountId(0);

    #[test]
    fn transfer_moves_balance() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(GOLD, ALICE, 100).unwrap();
        ledger.transfer(GOLD, ALICE, BOB, 40).unwrap();
        assert_eq!(ledger.balance_of(GOLD, ALICE), 60);
        assert_eq!(ledger.balance_of(GOLD, BOB), 40);
        assert_eq!(ledger.total_of(GOLD), 100);
    }

    #[test]
    fn insufficient_balance_changes_nothing() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(GOLD, ALICE, 10).unwrap();
        let err = ledger.transfer(GOLD, ALICE, BOB, 11).unwrap_err();
        assert!(matches!(err, TokenError::InsufficientBalance { balance: 10, requested: 11, .. }));
        assert_eq!(ledger.balance_of(GOLD, ALICE), 10);
        assert_eq!(ledger.balance_of(GOLD, BOB), 0);
    }

    #[test]
    fn transfer_from_spends_allowance() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(GOLD, ALICE, 100).unwrap();
        ledger.approve(GOLD, ALICE, POOL, 50);

        ledger.transfer_from(GOLD, POOL, ALICE, POOL, 30).unwrap();
        assert_eq!(ledger.allowance(GOLD, ALICE, POOL), 20);
        assert_eq!(ledger.balance_of(GOLD, POOL), 30);

        let err = ledger.transfer_from(GOLD, POOL, ALICE, POOL, 21).unwrap_err();
        assert!(matches!(err, TokenError::InsufficientAllowance { allowance: 20, .. }));
    }

    #[test]
    fn force_approve_overwrites() {
        let mut ledger = InMemoryLedger::new();
        ledger.approve(GOLD, ALICE, POOL, 5);
        ledger.force_approve(GOLD, ALICE, POOL, 9);
        assert_eq!(ledger.allowance(GOLD, ALICE, POOL), 9);
    }
}
