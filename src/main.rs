//! Lending Pool Core Simulation.
//!
//! Walks the pool through its main flows: supplying and earning interest,
//! borrowing and liquidation, flash loans, isolation mode and e-mode.
//! Set `RUST_LOG=debug` to see every entry point.

use lending_core::interest::{per_second_to_annual, SECONDS_PER_YEAR};
use lending_core::*;
use rust_decimal::Decimal;
use std::error::Error;
use tracing_subscriber::EnvFilter;

type SimResult = Result<(), Box<dyn Error>>;

const USDC: AssetId = AssetId(1);
const GOLD: AssetId = AssetId(2);
const SILVER: AssetId = AssetId(3);
const PLATINUM: AssetId = AssetId(4);
const GOLD_B: AssetId = AssetId(5);

const USDC_UNIT: u128 = 1_000_000;
const GOLD_UNIT: u128 = 1_000_000_000_000_000_000;
const SILVER_UNIT: u128 = 1_000_000;
const PLATINUM_UNIT: u128 = 100_000_000;
const DOLLAR: u128 = BASE_CURRENCY_UNIT;

fn main() -> SimResult {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Lending Pool Core Simulation");
    println!("Commodity Collateral, Scaled Balances, Full Lifecycle\n");

    scenario_1_supply_and_accrual()?;
    scenario_2_borrow_and_liquidation()?;
    scenario_3_flash_loan()?;
    scenario_4_isolation_mode()?;
    scenario_5_emode()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn units(amount: u128, decimals: u8) -> Decimal {
    Decimal::from_i128_with_scale(amount as i128, decimals as u32).normalize()
}

fn base(amount: u128) -> Decimal {
    units(amount, oracle::BASE_CURRENCY_DECIMALS).round_dp(2)
}

fn apr(rate: Ray) -> Decimal {
    (per_second_to_annual(rate) * Decimal::ONE_HUNDRED).round_dp(2)
}

fn new_pool() -> Result<(Pool<InMemoryLedger>, StaticPriceOracle), Box<dyn Error>> {
    let oracle = StaticPriceOracle::new()
        .with_price(USDC, DOLLAR)
        .with_price(GOLD, 2_000 * DOLLAR)
        .with_price(SILVER, 30 * DOLLAR)
        .with_price(PLATINUM, 1_000 * DOLLAR)
        .with_price(GOLD_B, 2_000 * DOLLAR);
    let mut pool = Pool::new(EngineConfig::default(), InMemoryLedger::new(), Box::new(oracle.clone()))?;
    pool.set_time(Timestamp::from_secs(1_700_000_000))?;
    pool.init_reserve_with_params(USDC, ReserveConfig::stablecoin(6), &InterestRateParams::stablecoin())?;
    pool.init_reserve_with_params(GOLD, ReserveConfig::gold_token(18), &InterestRateParams::volatile_commodity())?;
    Ok((pool, oracle))
}

fn fund(pool: &mut Pool<InMemoryLedger>, asset: AssetId, user: AccountId, amount: u128) -> Result<(), TokenError> {
    let custody = pool.custody();
    pool.ledger_mut().mint(asset, user, amount)?;
    pool.ledger_mut().approve(asset, user, custody, u128::MAX);
    Ok(())
}

/// Suppliers earn what borrowers pay, minus the reserve factor.
fn scenario_1_supply_and_accrual() -> SimResult {
    println!("Scenario 1: Supply and Interest Accrual\n");

    let (mut pool, _oracle) = new_pool()?;
    let alice = AccountId(100);
    let bob = AccountId(101);

    fund(&mut pool, USDC, alice, 10_000 * USDC_UNIT)?;
    fund(&mut pool, GOLD, bob, 5 * GOLD_UNIT)?;
    pool.supply(alice, USDC, 10_000 * USDC_UNIT, alice)?;
    pool.supply(bob, GOLD, 5 * GOLD_UNIT, bob)?;
    println!("  Alice supplies 10,000 USDC");
    println!("  Bob supplies 5 GOLD ($10,000) as collateral\n");

    pool.borrow(bob, USDC, 5_000 * USDC_UNIT, InterestRateMode::Variable, bob)?;
    let reserve = pool.reserve_snapshot(USDC)?;
    println!("  Bob borrows 5,000 USDC at a variable rate");
    println!(
        "  USDC borrow APR {}%, supply APR {}%\n",
        apr(reserve.variable_borrow_rate),
        apr(reserve.liquidity_rate)
    );

    pool.advance_time(SECONDS_PER_YEAR)?;
    let (debt, _) = pool.debt_balances(USDC, bob)?;
    let supplied = pool.receipt_balance(USDC, alice)?;
    println!("  One year later:");
    println!("  Bob owes {} USDC", units(debt, 6));
    println!("  Alice's receipt balance is {} USDC", units(supplied, 6));
    println!("  Supply index {}\n", pool.normalized_income(USDC)?.to_decimal().round_dp(6));

    fund(&mut pool, USDC, bob, debt)?;
    let repaid = pool.repay(bob, USDC, RequestedAmount::All, InterestRateMode::Variable, bob)?;
    pool.mint_to_treasury(&[USDC])?;
    let withdrawn = pool.withdraw(alice, USDC, RequestedAmount::All, alice)?;
    let treasury = pool.receipt_balance(USDC, pool.treasury())?;

    println!("  Bob repays {} USDC in full", units(repaid, 6));
    println!("  Alice withdraws {} USDC", units(withdrawn, 6));
    println!("  Treasury holds {} USDC of receipt tokens\n", units(treasury, 6));
    Ok(())
}

/// A position drops below HF 1 and is partially closed by a liquidator.
fn scenario_2_borrow_and_liquidation() -> SimResult {
    println!("Scenario 2: Borrow and Liquidation\n");

    let (mut pool, oracle) = new_pool()?;
    let silver = ReserveConfig {
        ltv: Bps(7_500),
        liquidation_threshold: Bps(8_000),
        liquidation_bonus: Bps(11_000),
        ..ReserveConfig::gold_token(6)
    };
    pool.init_reserve_with_params(SILVER, silver, &InterestRateParams::volatile_commodity())?;

    let alice = AccountId(100);
    let carol = AccountId(102);
    let liquidator = AccountId(200);

    fund(&mut pool, USDC, alice, 10_000 * USDC_UNIT)?;
    pool.supply(alice, USDC, 10_000 * USDC_UNIT, alice)?;
    fund(&mut pool, SILVER, carol, 100 * SILVER_UNIT)?;
    pool.supply(carol, SILVER, 100 * SILVER_UNIT, carol)?;
    pool.borrow(carol, USDC, 2_250 * USDC_UNIT, InterestRateMode::Variable, carol)?;

    let data = pool.user_account_data(carol)?;
    println!("  Carol supplies 100 SILVER @ $30 and borrows 2,250 USDC");
    println!(
        "  Collateral ${}, debt ${}, health factor {}\n",
        base(data.total_collateral_base),
        base(data.total_debt_base),
        data.health_factor
    );

    oracle.set_price(SILVER, 26 * DOLLAR);
    let data = pool.user_account_data(carol)?;
    println!("  SILVER falls to $26");
    println!("  Health factor now {}\n", data.health_factor);

    fund(&mut pool, USDC, liquidator, 5_000 * USDC_UNIT)?;
    let result = pool.liquidation_call(liquidator, SILVER, USDC, carol, 1_000 * USDC_UNIT, false)?;
    println!("  Liquidator covers {} USDC (close factor {} bps)", units(result.debt_covered, 6), result.close_factor.value());
    println!("  Liquidator receives {} SILVER", units(result.collateral_to_liquidator, 6));
    println!("  Protocol fee {} SILVER to treasury", units(result.protocol_fee, 6));

    let data = pool.user_account_data(carol)?;
    println!("  Carol's health factor after: {}\n", data.health_factor);
    Ok(())
}

/// Borrows the whole pool's USDC for one callback and returns it with a premium.
#[derive(Debug)]
struct ArbitrageReceiver {
    address: AccountId,
    repay: bool,
    reentered: Option<PoolError>,
}

impl FlashLoanReceiver<InMemoryLedger> for ArbitrageReceiver {
    fn address(&self) -> AccountId {
        self.address
    }

    fn execute_operation(
        &mut self,
        ctx: &mut FlashLoanContext<'_, InMemoryLedger>,
        assets: &[AssetId],
        amounts: &[u128],
        premiums: &[u128],
        _initiator: AccountId,
        _params: &[u8],
    ) -> Result<bool, PoolError> {
        // a nested pool call is refused while the loan is out
        self.reentered = ctx.supply(assets[0], 1, self.address).err();

        let custody = ctx.custody();
        for ((&asset, &amount), &premium) in assets.iter().zip(amounts).zip(premiums) {
            ctx.force_approve(asset, custody, amount + premium);
        }
        Ok(self.repay)
    }
}

fn scenario_3_flash_loan() -> SimResult {
    println!("Scenario 3: Flash Loan\n");

    let (mut pool, _oracle) = new_pool()?;
    let alice = AccountId(100);
    let initiator = AccountId(300);
    fund(&mut pool, USDC, alice, 1_000_000 * USDC_UNIT)?;
    pool.supply(alice, USDC, 1_000_000 * USDC_UNIT, alice)?;

    let index_before = pool.normalized_income(USDC)?;
    let mut receiver = ArbitrageReceiver {
        address: AccountId(301),
        repay: true,
        reentered: None,
    };
    // the trade's profit covers the premium
    fund(&mut pool, USDC, receiver.address, 900 * USDC_UNIT)?;
    let premium = pool.flash_loan_simple(initiator, &mut receiver, USDC, 1_000_000 * USDC_UNIT, &[])?;
    println!("  Receiver borrows 1,000,000 USDC for one callback");
    println!("  Premium paid: {} USDC", units(premium, 6));
    if let Some(err) = &receiver.reentered {
        println!("  Nested supply during the callback: {}", err);
    }
    println!(
        "  Supply index {} -> {}\n",
        index_before.to_decimal().round_dp(8),
        pool.normalized_income(USDC)?.to_decimal().round_dp(8)
    );

    let custody_before = pool.ledger().balance_of(USDC, pool.custody());
    receiver.repay = false;
    let err = pool
        .flash_loan_simple(initiator, &mut receiver, USDC, 500_000 * USDC_UNIT, &[])
        .err();
    println!("  A receiver that reports failure: {:?}", err.map(|e| e.to_string()));
    println!(
        "  Custody balance unchanged: {}\n",
        pool.ledger().balance_of(USDC, pool.custody()) == custody_before
    );
    Ok(())
}

/// A thinly traded commodity can back a capped amount of stablecoin debt only.
fn scenario_4_isolation_mode() -> SimResult {
    println!("Scenario 4: Isolation Mode\n");

    let (mut pool, _oracle) = new_pool()?;
    pool.init_reserve_with_params(
        PLATINUM,
        ReserveConfig::isolated_commodity(8, 1_000),
        &InterestRateParams::volatile_commodity(),
    )?;

    let alice = AccountId(100);
    let dave = AccountId(103);
    fund(&mut pool, USDC, alice, 10_000 * USDC_UNIT)?;
    pool.supply(alice, USDC, 10_000 * USDC_UNIT, alice)?;
    fund(&mut pool, GOLD, alice, 10 * GOLD_UNIT)?;
    pool.supply(alice, GOLD, 10 * GOLD_UNIT, alice)?;

    fund(&mut pool, PLATINUM, dave, 10 * PLATINUM_UNIT)?;
    pool.supply(dave, PLATINUM, 10 * PLATINUM_UNIT, dave)?;
    println!("  Dave supplies 10 PLATINUM ($10,000), debt ceiling $1,000");

    pool.borrow(dave, USDC, 800 * USDC_UNIT, InterestRateMode::Variable, dave)?;
    println!("  Dave borrows 800 USDC");
    println!(
        "  Isolated debt: ${}",
        units(pool.reserve_data(PLATINUM)?.isolation_mode_total_debt, 18)
    );

    let over = pool.borrow(dave, USDC, 300 * USDC_UNIT, InterestRateMode::Variable, dave);
    println!("  300 more USDC: {}", over.err().map(|e| e.to_string()).unwrap_or_default());

    let gold = pool.borrow(dave, GOLD, GOLD_UNIT / 10, InterestRateMode::Variable, dave);
    println!("  Borrow GOLD: {}", gold.err().map(|e| e.to_string()).unwrap_or_default());

    fund(&mut pool, GOLD, dave, GOLD_UNIT)?;
    pool.supply(dave, GOLD, GOLD_UNIT, dave)?;
    let gold_id = pool.state().reserve_id(GOLD)?;
    println!(
        "  Dave supplies 1 GOLD, enabled as collateral: {}\n",
        pool.user_configuration(dave).is_using_as_collateral(gold_id)
    );
    Ok(())
}

/// Two gold tokens in one category borrow against each other at 90% ltv.
fn scenario_5_emode() -> SimResult {
    println!("Scenario 5: Efficiency Mode\n");

    let (mut pool, _oracle) = new_pool()?;
    pool.set_emode_category(EModeCategory::new(1, Bps(9_000), Bps(9_300), Bps(10_200), "gold"))?;
    let mut gold = ReserveConfig::gold_token(18);
    gold.emode_category = 1;
    pool.configure_reserve(GOLD, gold)?;
    pool.init_reserve_with_params(GOLD_B, gold, &InterestRateParams::volatile_commodity())?;

    let alice = AccountId(100);
    let eve = AccountId(104);
    fund(&mut pool, GOLD_B, alice, 20 * GOLD_UNIT)?;
    pool.supply(alice, GOLD_B, 20 * GOLD_UNIT, alice)?;
    fund(&mut pool, GOLD, eve, 10 * GOLD_UNIT)?;
    pool.supply(eve, GOLD, 10 * GOLD_UNIT, eve)?;

    let before = pool.user_account_data(eve)?;
    pool.set_user_emode(eve, 1)?;
    let after = pool.user_account_data(eve)?;
    println!("  Eve supplies 10 GOLD ($20,000)");
    println!("  Borrowing power outside e-mode: ${}", base(before.available_borrows_base));
    println!("  Borrowing power in the gold category: ${}\n", base(after.available_borrows_base));

    pool.borrow(eve, GOLD_B, 85 * GOLD_UNIT / 10, InterestRateMode::Variable, eve)?;
    let data = pool.user_account_data(eve)?;
    println!("  Eve borrows 8.5 GOLD_B, health factor {}", data.health_factor);

    let leave = pool.set_user_emode(eve, NO_EMODE);
    println!("  Leaving e-mode: {}", leave.err().map(|e| e.to_string()).unwrap_or_default());
    println!("  Eve stays in category {}\n", pool.user_emode(eve));
    Ok(())
}
