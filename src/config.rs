// 7.0 config.rs: protocol-wide settings in one place. premiums, close factor, treasury.
// 7.1 per-reserve risk parameters live in reserve.rs (ReserveConfig), rate curves in interest.rs.

use crate::math::Wad;
use crate::types::{AccountId, Bps};
use crate::user_config::MAX_RESERVES;
use serde::{Deserialize, Serialize};

/** 7.2: protocol parameters shared by every reserve */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    // Account that holds the pool's underlying on the token ledger
    pub custody_account: AccountId,
    // Receives reserve-factor accruals and protocol fees
    pub treasury: AccountId,
    // Flash loan premium charged to the receiver
    pub flash_loan_premium_total: Bps,
    // Share of the premium routed to treasury (rest goes to suppliers)
    pub flash_loan_premium_to_protocol: Bps,
    // Cap on a single fixed-rate borrow as a share of available liquidity
    pub max_fixed_rate_borrow_size_percent: Bps,
    // Share of debt liquidatable when HF is at or above the threshold
    pub default_close_factor: Bps,
    // Share of debt liquidatable below the threshold
    pub max_close_factor: Bps,
    pub close_factor_hf_threshold: Wad,
    // Below this HF a liquidation goes through even if the sentinel says no
    pub sentinel_liquidation_min_hf: Wad,
    pub max_reserves: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            custody_account: AccountId(0),
            treasury: AccountId(1),
            flash_loan_premium_total: Bps(9),      // 0.09%
            flash_loan_premium_to_protocol: Bps(0),
            max_fixed_rate_borrow_size_percent: Bps(2_500), // 25%
            default_close_factor: Bps(5_000),      // 50%
            max_close_factor: Bps(10_000),         // 100%
            close_factor_hf_threshold: Wad::from_raw(950_000_000_000_000_000), // 0.95
            sentinel_liquidation_min_hf: Wad::from_raw(950_000_000_000_000_000),
            max_reserves: MAX_RESERVES,
        }
    }
}

impl ProtocolConfig {
    // Zero-fee flash loans and no protocol cut, for local testing
    pub fn testnet() -> Self {
        Self {
            flash_loan_premium_total: Bps(0),
            ..Self::default()
        }
    }

    // Conservative production settings
    pub fn mainnet_conservative() -> Self {
        Self {
            flash_loan_premium_total: Bps(9),
            flash_loan_premium_to_protocol: Bps(3_000), // 30% of premium
            max_fixed_rate_borrow_size_percent: Bps(1_000),
            max_reserves: 32,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.custody_account == self.treasury {
            return Err(ConfigError::InvalidProtocol {
                reason: "custody and treasury must be distinct accounts".to_string(),
            });
        }

        if self.flash_loan_premium_total > Bps::ONE_HUNDRED_PERCENT
            || self.flash_loan_premium_to_protocol > Bps::ONE_HUNDRED_PERCENT
        {
            return Err(ConfigError::InvalidFees {
                reason: "flash loan premiums must be at most 100%".to_string(),
            });
        }

        if self.default_close_factor.is_zero()
            || self.default_close_factor > self.max_close_factor
            || self.max_close_factor > Bps::ONE_HUNDRED_PERCENT
        {
            return Err(ConfigError::InvalidLiquidation {
                reason: "close factors must satisfy 0 < default <= max <= 100%".to_string(),
            });
        }

        if self.close_factor_hf_threshold > Wad::ONE {
            return Err(ConfigError::InvalidLiquidation {
                reason: "close factor threshold must not exceed 1.0".to_string(),
            });
        }

        if self.max_fixed_rate_borrow_size_percent > Bps::ONE_HUNDRED_PERCENT {
            return Err(ConfigError::InvalidProtocol {
                reason: "fixed borrow size cap must be at most 100%".to_string(),
            });
        }

        if self.max_reserves == 0 || self.max_reserves > MAX_RESERVES {
            return Err(ConfigError::InvalidProtocol {
                reason: format!("max reserves must be in 1..={}", MAX_RESERVES),
            });
        }

        Ok(())
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid protocol config: {reason}")]
    InvalidProtocol { reason: String },

    #[error("invalid fees: {reason}")]
    InvalidFees { reason: String },

    #[error("invalid liquidation params: {reason}")]
    InvalidLiquidation { reason: String },

    #[error("invalid reserve params: {reason}")]
    InvalidReserve { reason: String },

    #[error("invalid rate curve: {reason}")]
    InvalidRateCurve { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> ProtocolConfig {
        match self {
            Environment::Development => ProtocolConfig::default(),
            Environment::Testnet => ProtocolConfig::testnet(),
            Environment::Mainnet => ProtocolConfig::mainnet_conservative(),
        }
    }
}
