// 4.3: efficiency-mode categories. baskets of correlated assets (e.g. several gold tokens)
// get tighter risk params when a user opts in.

use crate::types::{AssetId, Bps, ReserveId};
use serde::{Deserialize, Serialize};

/// Category 0 is reserved for "no e-mode".
pub const NO_EMODE: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EModeCategory {
    pub id: u8,
    pub ltv: Bps,
    pub liquidation_threshold: Bps,
    pub liquidation_bonus: Bps,
    // when set, every eligible reserve is priced off this asset
    pub price_source: Option<AssetId>,
    pub label: String,
    // reserve slots tagged with this category, kept in sync by the pool
    pub eligible_reserves: u64,
}

impl EModeCategory {
    pub fn new(id: u8, ltv: Bps, liquidation_threshold: Bps, liquidation_bonus: Bps, label: impl Into<String>) -> Self {
        Self {
            id,
            ltv,
            liquidation_threshold,
            liquidation_bonus,
            price_source: None,
            label: label.into(),
            eligible_reserves: 0,
        }
    }

    pub fn with_price_source(mut self, asset: AssetId) -> Self {
        self.price_source = Some(asset);
        self
    }

    pub fn is_eligible(&self, reserve: ReserveId) -> bool {
        reserve.index() < 64 && self.eligible_reserves & (1u64 << reserve.index()) != 0
    }

    pub fn set_eligible(&mut self, reserve: ReserveId, eligible: bool) {
        if reserve.index() >= 64 {
            return;
        }
        let bit = 1u64 << reserve.index();
        if eligible {
            self.eligible_reserves |= bit;
        } else {
            self.eligible_reserves &= !bit;
        }
    }
}

/// Same bound checks as a reserve's own params.
pub fn validate_category(category: &EModeCategory) -> Result<(), crate::config::ConfigError> {
    use crate::config::ConfigError;

    if category.id == NO_EMODE {
        return Err(ConfigError::InvalidReserve {
            reason: "e-mode category 0 is reserved".to_string(),
        });
    }
    if category.ltv > category.liquidation_threshold || category.liquidation_threshold.is_zero() {
        return Err(ConfigError::InvalidReserve {
            reason: "e-mode needs a non-zero threshold with ltv at or below it".to_string(),
        });
    }
    if category.liquidation_bonus <= Bps::ONE_HUNDRED_PERCENT {
        return Err(ConfigError::InvalidReserve {
            reason: "e-mode liquidation bonus must be above 100%".to_string(),
        });
    }
    let effective = category.liquidation_threshold.value() as u128 * category.liquidation_bonus.value() as u128 / 10_000;
    if effective > 10_000 {
        return Err(ConfigError::InvalidReserve {
            reason: "e-mode threshold times bonus must not exceed 100%".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligibility_bitmap() {
        let mut category = EModeCategory::new(1, Bps(9_000), Bps(9_300), Bps(10_200), "precious metals");
        category.set_eligible(ReserveId(3), true);
        category.set_eligible(ReserveId(10), true);
        assert!(category.is_eligible(ReserveId(3)));
        assert!(!category.is_eligible(ReserveId(4)));
        category.set_eligible(ReserveId(3), false);
        assert!(!category.is_eligible(ReserveId(3)));
        assert_eq!(category.eligible_reserves, 1 << 10);
    }

    #[test]
    fn validation() {
        let category = EModeCategory::new(1, Bps(9_000), Bps(9_300), Bps(10_200), "metals");
        assert!(validate_category(&category).is_ok());

        let reserved = EModeCategory::new(NO_EMODE, Bps(9_000), Bps(9_300), Bps(10_200), "none");
        assert!(validate_category(&reserved).is_err());

        let too_generous = EModeCategory::new(2, Bps(9_000), Bps(9_700), Bps(10_500), "x");
        assert!(validate_category(&too_generous).is_err());
    }
}
