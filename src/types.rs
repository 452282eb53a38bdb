// 1.0: all the primitives live here. nothing in the pool works without these types.
// IDs, timestamps, basis points, rate modes. each is a newtype so the compiler catches mixups.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Underlying token identity (a tokenized commodity, a stablecoin, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

// 1.1: dense slot in the reserve arena. receipt and debt tokens share it as their identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReserveId(pub u16);

impl ReserveId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset#{}", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "account#{}", self.0)
    }
}

// 1.2: basis points. 100 bps = 1%, 10_000 bps = 100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Bps(pub u16);

impl Bps {
    pub const ZERO: Bps = Bps(0);
    pub const ONE_HUNDRED_PERCENT: Bps = Bps(10_000);

    pub fn new(bps: u16) -> Self {
        Self(bps)
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn as_fraction(&self) -> Decimal {
        Decimal::new(self.0 as i64, 4)
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

// 1.3: second-resolution ledger timestamp. comes from the enclosing runtime's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp().max(0) as u64)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Seconds elapsed since `earlier`, zero if the clock has not moved forward.
    pub fn elapsed_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn plus_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp(self.0 as i64, 0) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%SZ")),
            None => write!(f, "{}s", self.0),
        }
    }
}

/// How a debt position accrues interest. `None` is only meaningful for flash
/// loans, where it selects plain repayment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterestRateMode {
    None,
    Fixed,
    Variable,
}

// 1.4: amount requested by withdraw/repay. `All` resolves to the user's full balance or debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestedAmount {
    Exact(u128),
    All,
}

impl RequestedAmount {
    pub fn resolve(&self, full: u128) -> u128 {
        match self {
            RequestedAmount::Exact(amount) => *amount,
            RequestedAmount::All => full,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, RequestedAmount::All)
    }
}

impl From<u128> for RequestedAmount {
    fn from(amount: u128) -> Self {
        RequestedAmount::Exact(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn bps_conversion() {
        assert_eq!(Bps::new(100).as_fraction(), dec!(0.01));
        assert_eq!(Bps::new(8000).as_fraction(), dec!(0.8));
        assert_eq!(Bps::ONE_HUNDRED_PERCENT.as_fraction(), dec!(1));
    }

    #[test]
    fn timestamp_elapsed_never_negative() {
        let earlier = Timestamp::from_secs(100);
        let later = Timestamp::from_secs(160);
        assert_eq!(later.elapsed_since(earlier), 60);
        assert_eq!(earlier.elapsed_since(later), 0);
    }

    #[test]
    fn requested_amount_resolves_all() {
        assert_eq!(RequestedAmount::All.resolve(1050), 1050);
        assert_eq!(RequestedAmount::from(10).resolve(1050), 10);
        assert!(RequestedAmount::All.is_all());
    }

    #[test]
    fn timestamp_display_is_utc() {
        assert_eq!(Timestamp::from_secs(0).to_string(), "1970-01-01T00:00:00Z");
    }
}
