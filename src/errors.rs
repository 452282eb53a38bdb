// 5.0: named failure conditions. every predicate in the gate maps to exactly one variant,
// so callers can match on what went wrong instead of parsing strings.

use crate::ledger::TokenError;
use crate::math::MathError;
use crate::types::{AccountId, AssetId, InterestRateMode, ReserveId};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("reserve {0:?} is not active")]
    ReserveInactive(ReserveId),

    #[error("reserve {0:?} is frozen")]
    ReserveFrozen(ReserveId),

    #[error("reserve {0:?} is paused")]
    ReservePaused(ReserveId),

    #[error("borrowing is not enabled on reserve {0:?}")]
    BorrowingNotEnabled(ReserveId),

    #[error("fixed-rate borrowing is not enabled on reserve {0:?}")]
    FixedRateBorrowingNotEnabled(ReserveId),

    #[error("flash loans are not enabled on reserve {0:?}")]
    FlashLoanNotEnabled(ReserveId),

    #[error("unsupported interest rate mode {0:?}")]
    InvalidInterestRateMode(InterestRateMode),

    #[error("e-mode category {0} does not exist")]
    EModeCategoryNotFound(u8),

    #[error("reserve {reserve:?} is not in the user's e-mode category {category}")]
    InconsistentEModeCategory { reserve: ReserveId, category: u8 },

    #[error("asset {0} is already listed")]
    ReserveAlreadyListed(AssetId),

    #[error("reserve arena is full ({0} slots)")]
    NoMoreReservesAllowed(usize),

    #[error("collateral reserve {0:?} is not enabled as collateral by the user")]
    CollateralNotEnabled(ReserveId),

    #[error("reserve {0:?} has zero ltv and cannot back new debt")]
    ZeroLtvCollateral(ReserveId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapacityError {
    #[error("supply cap exceeded on reserve {0:?}")]
    SupplyCapExceeded(ReserveId),

    #[error("borrow cap exceeded on reserve {0:?}")]
    BorrowCapExceeded(ReserveId),

    #[error("isolation debt ceiling exceeded on reserve {0:?}")]
    DebtCeilingExceeded(ReserveId),

    #[error("reserve {reserve:?} has {available} available, {requested} requested")]
    InsufficientLiquidity { reserve: ReserveId, available: u128, requested: u128 },

    #[error("requested {requested} exceeds balance {balance}")]
    NotEnoughAvailableUserBalance { requested: u128, balance: u128 },

    #[error("fixed-rate borrow of {requested} exceeds the allowed {max}")]
    FixedBorrowTooLarge { requested: u128, max: u128 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SolvencyError {
    #[error("collateral balance is zero")]
    CollateralBalanceZero,

    #[error("collateral cannot cover the new borrow")]
    CollateralCannotCoverNewBorrow,

    #[error("health factor would drop below 1.0")]
    HealthFactorLowerThanThreshold,

    #[error("health factor is not below 1.0, position cannot be liquidated")]
    HealthFactorNotBelowThreshold,

    #[error("fixed-rate borrow against same-asset collateral is not allowed")]
    CollateralSameAsBorrowingCurrency,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    #[error("price oracle sentinel does not allow borrowing")]
    BorrowNotAllowedBySentinel,

    #[error("price oracle sentinel does not allow liquidation")]
    LiquidationNotAllowedBySentinel,

    #[error("isolated collateral cannot be combined with other collateral")]
    IsolationModeCollateralMix,

    #[error("reserve {0:?} cannot be borrowed against isolated collateral")]
    AssetNotBorrowableInIsolation(ReserveId),

    #[error("siloed borrowing violation")]
    SiloedBorrowingViolation,

    #[error("{0} is not allowed to move funds on behalf of {1}")]
    NotApproved(AccountId, AccountId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    #[error("flash loan receiver returned false")]
    ReturnedFalse,

    #[error("flash loan receiver reverted: {0}")]
    Reverted(String),

    #[error("flash loan receiver left insufficient funds to settle {asset}")]
    RepaymentFailed { asset: AssetId },

    #[error("custody holds {held} of {asset} but the reserve tracks {tracked}")]
    CustodyShortfall { asset: AssetId, held: u128, tracked: u128 },
}

/// The named condition every failure rolls up to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Capacity,
    Solvency,
    Authorization,
    Arithmetic,
    Callback,
    Operational,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Configuration => "ConfigurationError",
            ErrorCategory::Capacity => "CapacityError",
            ErrorCategory::Solvency => "SolvencyError",
            ErrorCategory::Authorization => "AuthorizationError",
            ErrorCategory::Arithmetic => "ArithmeticError",
            ErrorCategory::Callback => "CallbackError",
            ErrorCategory::Operational => "OperationalError",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("capacity: {0}")]
    Capacity(#[from] CapacityError),

    #[error("solvency: {0}")]
    Solvency(#[from] SolvencyError),

    #[error("authorization: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("arithmetic: {0}")]
    Arithmetic(#[from] MathError),

    #[error("callback: {0}")]
    Callback(#[from] CallbackError),

    #[error("token transfer failed: {0}")]
    Token(#[from] TokenError),

    #[error("asset {0} is not listed")]
    ReserveNotFound(AssetId),

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("re-entrant call into the pool")]
    Reentrancy,

    #[error("no price available for asset {0}")]
    PriceUnavailable(AssetId),

    #[error("user has no {0:?} debt on this reserve")]
    NoDebtOfSelectedType(InterestRateMode),

    #[error("user has no balance to withdraw")]
    UnderlyingBalanceZero,

    #[error("flash loan assets, amounts and modes differ in length")]
    InconsistentFlashLoanParams,

    #[error("invalid reserve parameters: {0}")]
    InvalidConfig(#[from] crate::config::ConfigError),
}

impl PoolError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PoolError::Configuration(_) | PoolError::InvalidConfig(_) => ErrorCategory::Configuration,
            PoolError::Capacity(_) => ErrorCategory::Capacity,
            PoolError::Solvency(_) => ErrorCategory::Solvency,
            PoolError::Authorization(_) => ErrorCategory::Authorization,
            PoolError::Arithmetic(_) => ErrorCategory::Arithmetic,
            PoolError::Callback(_) => ErrorCategory::Callback,
            PoolError::Token(_)
            | PoolError::ReserveNotFound(_)
            | PoolError::InvalidAmount
            | PoolError::Reentrancy
            | PoolError::PriceUnavailable(_)
            | PoolError::NoDebtOfSelectedType(_)
            | PoolError::UnderlyingBalanceZero
            | PoolError::InconsistentFlashLoanParams => ErrorCategory::Operational,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_wrapped_condition() {
        let err: PoolError = CapacityError::SupplyCapExceeded(ReserveId(0)).into();
        assert_eq!(err.category(), ErrorCategory::Capacity);

        let err: PoolError = MathError::Overflow.into();
        assert_eq!(err.category(), ErrorCategory::Arithmetic);

        let err: PoolError = CallbackError::ReturnedFalse.into();
        assert_eq!(err.category(), ErrorCategory::Callback);
        assert_eq!(err.category().to_string(), "CallbackError");

        assert_eq!(PoolError::Reentrancy.category(), ErrorCategory::Operational);
    }

    #[test]
    fn messages_carry_context() {
        let err = PoolError::from(ConfigurationError::ReserveFrozen(ReserveId(2)));
        assert_eq!(err.to_string(), "configuration: reserve ReserveId(2) is frozen");
    }
}
