// lending-core: collateralized lending pool accounting and risk engine.
// risk-first architecture: solvency checks run before any state is written.
// all computation is deterministic integer fixed point with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: AssetId, AccountId, ReserveId, Bps, Timestamp
//   2.x  math.rs: wad/ray fixed point, rounding, 256-bit intermediates
//   3.x  user_config.rs: per-user borrowing/collateral bitmap
//   4.0  reserve.rs: reserve config, cache, index accrual, rate updates
//   4.1  interest.rs: linear/compounded interest, rate strategies
//   4.2  tokens.rs: scaled receipt/debt tokens, fixed-rate debt token
//   4.3  emode.rs: efficiency-mode categories
//   4.4  state.rs: reserve arena and per-user maps
//   5.x  errors.rs: named failure conditions
//   6.0  validation.rs: pre-action predicate checks
//   6.1  isolation.rs: isolation mode and debt ceilings
//   6.2  liquidation.rs: close factor and collateral seizure math
//   6.3  account.rs: cross-reserve account data and health factor
//   7.x  config.rs: protocol params, env presets
//   8.x  pool/: entry points: supply, borrow, liquidation, flash loans
//   9.0  oracle.rs: price source and sentinel (mocked)
//   9.2  ledger.rs: underlying token movement (mocked)
//   10.x flash_loan.rs: receiver interface, callback context and premium math
//   11.x events.rs: state transition events for audit

// accounting modules
pub mod account;
pub mod interest;
pub mod math;
pub mod reserve;
pub mod state;
pub mod tokens;
pub mod types;
pub mod user_config;

// risk and safety modules
pub mod emode;
pub mod errors;
pub mod isolation;
pub mod liquidation;
pub mod validation;

// execution and integration modules
pub mod config;
pub mod events;
pub mod flash_loan;
pub mod ledger;
pub mod oracle;
pub mod pool;

// re exports for convenience
pub use account::{calculate_user_account_data, UserAccountData};
pub use config::{ConfigError, Environment, ProtocolConfig};
pub use emode::{EModeCategory, NO_EMODE};
pub use errors::*;
pub use events::*;
pub use flash_loan::{FlashLoanContext, FlashLoanReceiver, FlashLoanRequest};
pub use interest::{DefaultInterestRateStrategy, FixedRatesStrategy, InterestRateParams, InterestRateStrategy, InterestRates};
pub use ledger::{InMemoryLedger, TokenError, TokenLedger};
pub use liquidation::CollateralSeizure;
pub use math::{MathError, Ray, Rounding, Wad, RAY, WAD};
pub use oracle::{PriceOracle, PriceOracleSentinel, StaticPriceOracle, StaticSentinel, BASE_CURRENCY_UNIT};
pub use pool::*;
pub use reserve::{ReserveConfig, ReserveData};
pub use types::*;
pub use user_config::UserConfiguration;
