// 9.0 oracle.rs: price source and sentinel interfaces. the pool never fetches prices itself,
// it asks whatever implements these. a static in-memory oracle is provided for tests and the sim.

use crate::types::AssetId;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Prices are quoted in the base currency with 8 decimals (1 unit = 1e8).
pub const BASE_CURRENCY_DECIMALS: u8 = 8;
pub const BASE_CURRENCY_UNIT: u128 = 100_000_000;

/// Implement this to plug in a real oracle network.
pub trait PriceOracle: Debug {
    /// Price of one whole token of `asset`, or None if unavailable.
    fn asset_price(&self, asset: AssetId) -> Option<u128>;
}

/// Circuit breaker consulted before borrows and liquidations, e.g. after an
/// L2 sequencer outage.
pub trait PriceOracleSentinel: Debug {
    fn is_borrow_allowed(&self) -> bool;
    fn is_liquidation_allowed(&self) -> bool;
}

/// Fixed prices set by hand. Clones share the same price table so a test can
/// keep a handle and move prices after handing the oracle to the pool.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceOracle {
    prices: Arc<RwLock<HashMap<AssetId, u128>>>,
}

impl StaticPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(self, asset: AssetId, price: u128) -> Self {
        self.set_price(asset, price);
        self
    }

    pub fn set_price(&self, asset: AssetId, price: u128) {
        if let Ok(mut prices) = self.prices.write() {
            prices.insert(asset, price);
        }
    }

    pub fn remove_price(&self, asset: AssetId) {
        if let Ok(mut prices) = self.prices.write() {
            prices.remove(&asset);
        }
    }
}

impl PriceOracle for StaticPriceOracle {
    fn asset_price(&self, asset: AssetId) -> Option<u128> {
        let prices = self.prices.read().ok()?;
        prices.get(&asset).copied().filter(|price| *price > 0)
    }
}

/// Sentinel with switchable flags. Clones share state.
#[derive(Debug, Clone)]
pub struct StaticSentinel {
    borrow_allowed: Arc<AtomicBool>,
    liquidation_allowed: Arc<AtomicBool>,
}

impl Default for StaticSentinel {
    fn default() -> Self {
        Self {
            borrow_allowed: Arc::new(AtomicBool::new(true)),
            liquidation_allowed: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl StaticSentinel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_borrow_allowed(&self, allowed: bool) {
        self.borrow_allowed.store(allowed, Ordering::SeqCst);
    }

    pub fn set_liquidation_allowed(&self, allowed: bool) {
        self.liquidation_allowed.store(allowed, Ordering::SeqCst);
    }
}

impl PriceOracleSentinel for StaticSentinel {
    fn is_borrow_allowed(&self) -> bool {
        self.borrow_allowed.load(Ordering::SeqCst)
    }

    fn is_liquidation_allowed(&self) -> bool {
        self.liquidation_allowed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_oracle_shares_prices_between_clones() {
        let oracle = StaticPriceOracle::new().with_price(AssetId(1), BASE_CURRENCY_UNIT);
        let handle = oracle.clone();
        handle.set_price(AssetId(1), 2 * BASE_CURRENCY_UNIT);
        assert_eq!(oracle.asset_price(AssetId(1)), Some(2 * BASE_CURRENCY_UNIT));
        assert_eq!(oracle.asset_price(AssetId(2)), None);
    }

    #[test]
    fn zero_price_is_unavailable() {
        let oracle = StaticPriceOracle::new().with_price(AssetId(1), 0);
        assert_eq!(oracle.asset_price(AssetId(1)), None);
    }

    #[test]
    fn sentinel_flags() {
        let sentinel = StaticSentinel::new();
        assert!(sentinel.is_borrow_allowed());
        let handle = sentinel.clone();
        handle.set_liquidation_allowed(false);
        assert!(!sentinel.is_liquidation_allowed());
        assert!(sentinel.is_borrow_allowed());
    }
}
