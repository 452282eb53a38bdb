// 8.0: the pool. owns reserve state, the token ledger handle and the event log, and runs every
// user-facing action as one all-or-nothing transaction. each entry point lives in its own file.

mod config;
mod core;
mod supply;
mod borrow;
mod liquidations;
mod flash_loans;
mod results;

pub use config::EngineConfig;
pub use core::Pool;
pub use results::{FlashLoanResult, LiquidationResult, ReserveSnapshot};
