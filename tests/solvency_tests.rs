//! Solvency invariant tests.
//!
//! These tests drive the pool through random sequences of user actions and
//! time jumps and check the invariants that keep it solvent after every step.

use lending_core::*;
use proptest::prelude::*;
use std::sync::Arc;

const COLL: AssetId = AssetId(1);
const DEBT: AssetId = AssetId(2);
const ISO: AssetId = AssetId(3);
const UNIT: u128 = 1_000_000;
const USERS: u64 = 4;

#[derive(Debug, Clone)]
enum Action {
    Supply { user: u64, amount: u128 },
    Withdraw { user: u64, amount: u128 },
    Borrow { user: u64, amount: u128 },
    Repay { user: u64, amount: u128 },
    RepayAll { user: u64 },
    Advance { secs: u64 },
    MintToTreasury,
}

fn account(user: u64) -> AccountId {
    AccountId(100 + user)
}

// Strategies for generating test data
fn amount_strategy() -> impl Strategy<Value = u128> {
    (1u128..5_000u128).prop_map(|x| x * UNIT / 10) // 0.1 to 500 tokens
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0..USERS, amount_strategy()).prop_map(|(user, amount)| Action::Supply { user, amount }),
        (0..USERS, amount_strategy()).prop_map(|(user, amount)| Action::Withdraw { user, amount }),
        (0..USERS, amount_strategy()).prop_map(|(user, amount)| Action::Borrow { user, amount }),
        (0..USERS, amount_strategy()).prop_map(|(user, amount)| Action::Repay { user, amount }),
        (0..USERS).prop_map(|user| Action::RepayAll { user }),
        (1u64..90 * 24 * 3600).prop_map(|secs| Action::Advance { secs }),
        Just(Action::MintToTreasury),
    ]
}

fn market() -> Pool<InMemoryLedger> {
    let oracle = StaticPriceOracle::new()
        .with_price(COLL, BASE_CURRENCY_UNIT)
        .with_price(DEBT, BASE_CURRENCY_UNIT);
    let mut pool = Pool::new(EngineConfig::default(), InMemoryLedger::new(), Box::new(oracle)).unwrap();
    pool.set_time(Timestamp::from_secs(1_000_000)).unwrap();
    pool.init_reserve_with_params(COLL, ReserveConfig::gold_token(6), &InterestRateParams::volatile_commodity())
        .unwrap();
    pool.init_reserve_with_params(DEBT, ReserveConfig::stablecoin(6), &InterestRateParams::stablecoin())
        .unwrap();

    let custody = pool.custody();
    for user in 0..USERS {
        let who = account(user);
        for asset in [COLL, DEBT] {
            pool.ledger_mut().mint(asset, who, 1_000_000 * UNIT).unwrap();
            pool.ledger_mut().approve(asset, who, custody, u128::MAX);
        }
        pool.supply(who, COLL, 2_000 * UNIT, who).unwrap();
    }
    pool.supply(account(0), DEBT, 1_000 * UNIT, account(0)).unwrap();
    pool
}

fn apply(pool: &mut Pool<InMemoryLedger>, action: &Action) {
    // rejected actions are part of the exploration
    let _ = match *action {
        Action::Supply { user, amount } => pool.supply(account(user), DEBT, amount, account(user)).map(|_| ()),
        Action::Withdraw { user, amount } => pool
            .withdraw(account(user), DEBT, RequestedAmount::Exact(amount), account(user))
            .map(|_| ()),
        Action::Borrow { user, amount } => pool
            .borrow(account(user), DEBT, amount, InterestRateMode::Variable, account(user)),
        Action::Repay { user, amount } => pool
            .repay(account(user), DEBT, RequestedAmount::Exact(amount), InterestRateMode::Variable, account(user))
            .map(|_| ()),
        Action::RepayAll { user } => pool
            .repay(account(user), DEBT, RequestedAmount::All, InterestRateMode::Variable, account(user))
            .map(|_| ()),
        Action::Advance { secs } => pool.advance_time(secs),
        Action::MintToTreasury => pool.mint_to_treasury(&[DEBT]),
    };
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Indices only ever grow.
    #[test]
    fn indices_never_decrease(actions in proptest::collection::vec(action_strategy(), 1..40)) {
        let mut pool = market();
        let mut last = pool.reserve_snapshot(DEBT).unwrap();

        for action in &actions {
            apply(&mut pool, action);
            let now = pool.reserve_snapshot(DEBT).unwrap();
            prop_assert!(now.normalized_income >= last.normalized_income, "income index fell after {:?}", action);
            prop_assert!(now.normalized_debt >= last.normalized_debt, "debt index fell after {:?}", action);
            last = now;
        }
    }

    /// The virtual balance mirrors what custody actually holds.
    #[test]
    fn virtual_balance_matches_custody(actions in proptest::collection::vec(action_strategy(), 1..40)) {
        let mut pool = market();
        for action in &actions {
            apply(&mut pool, action);
            for asset in [COLL, DEBT] {
                let held = pool.ledger().balance_of(asset, pool.custody());
                let tracked = pool.reserve_data(asset).unwrap().virtual_underlying_balance;
                prop_assert_eq!(held, tracked, "{} drifted after {:?}", asset, action);
            }
        }
    }

    /// What suppliers and the treasury can claim never exceeds what the pool
    /// holds plus what borrowers owe, up to rounding.
    #[test]
    fn claims_are_covered(actions in proptest::collection::vec(action_strategy(), 1..40)) {
        let mut pool = market();
        for (step, action) in actions.iter().enumerate() {
            apply(&mut pool, action);

            let snap = pool.reserve_snapshot(DEBT).unwrap();
            let treasury_claim = snap.normalized_income.scale(snap.accrued_to_treasury, Rounding::Down).unwrap();
            let claims = snap.total_supplied + treasury_claim;
            let backing = snap.available_liquidity + snap.total_variable_debt + snap.total_fixed_debt;
            let slack = 2 * (step as u128 + 1);
            prop_assert!(
                claims <= backing + slack,
                "claims {} exceed backing {} after {:?}", claims, backing, action
            );
        }
    }

    /// Every successful action leaves the acting user healthy.
    #[test]
    fn borrowers_stay_healthy_without_price_moves(
        amounts in proptest::collection::vec(amount_strategy(), 1..20),
    ) {
        let mut pool = market();
        let user = account(1);
        for amount in amounts {
            if pool.borrow(user, DEBT, amount, InterestRateMode::Variable, user).is_ok() {
                let data = pool.user_account_data(user).unwrap();
                prop_assert!(data.health_factor >= Wad::ONE);
                prop_assert!(data.total_debt_base <= data.total_collateral_base);
            }
        }
    }

    /// Zero debt means an infinite health factor, whatever is supplied.
    #[test]
    fn zero_debt_is_always_healthy(
        supplies in proptest::collection::vec((0..USERS, amount_strategy()), 1..20),
        secs in 0u64..365 * 24 * 3600,
    ) {
        let mut pool = market();
        for (user, amount) in supplies {
            pool.supply(account(user), DEBT, amount, account(user)).unwrap();
        }
        pool.advance_time(secs).unwrap();
        for user in 0..USERS {
            let data = pool.user_account_data(account(user)).unwrap();
            prop_assert!(data.health_factor.is_max());
            prop_assert_eq!(data.total_debt_base, 0);
        }
    }

    /// Isolated borrowing never pushes the running total past the ceiling.
    #[test]
    fn isolation_ceiling_never_exceeded(
        steps in proptest::collection::vec((any::<bool>(), amount_strategy()), 1..30),
    ) {
        let ceiling_whole = 1_000u128;
        let mut pool = market();
        pool.init_reserve(
            ISO,
            ReserveConfig::isolated_commodity(6, ceiling_whole),
            Arc::new(FixedRatesStrategy { rates: InterestRates::default() }),
        )
        .unwrap();
        pool.set_oracle(Box::new(
            StaticPriceOracle::new()
                .with_price(COLL, BASE_CURRENCY_UNIT)
                .with_price(DEBT, BASE_CURRENCY_UNIT)
                .with_price(ISO, BASE_CURRENCY_UNIT),
        ))
        .unwrap();
        pool.supply(account(0), DEBT, 100_000 * UNIT, account(0)).unwrap();

        let isolated = AccountId(500);
        let custody = pool.custody();
        pool.ledger_mut().mint(ISO, isolated, 100_000 * UNIT).unwrap();
        pool.ledger_mut().mint(DEBT, isolated, 100_000 * UNIT).unwrap();
        pool.ledger_mut().approve(ISO, isolated, custody, u128::MAX);
        pool.ledger_mut().approve(DEBT, isolated, custody, u128::MAX);
        pool.supply(isolated, ISO, 100_000 * UNIT, isolated).unwrap();

        for (borrow, amount) in steps {
            let _ = if borrow {
                pool.borrow(isolated, DEBT, amount, InterestRateMode::Variable, isolated)
            } else {
                pool.repay(isolated, DEBT, RequestedAmount::Exact(amount), InterestRateMode::Variable, isolated)
                    .map(|_| ())
            };
            let total = pool.reserve_data(ISO).unwrap().isolation_mode_total_debt;
            prop_assert!(total <= ceiling_whole * WAD);
        }
    }
}

/// Two lenders on one reserve end up with interest in proportion to their deposits.
#[test]
fn interest_is_shared_pro_rata() {
    let mut pool = market();
    let a = account(2);
    let b = account(3);
    pool.supply(a, DEBT, 100 * UNIT, a).unwrap();
    pool.supply(b, DEBT, 300 * UNIT, b).unwrap();
    pool.borrow(account(1), DEBT, 800 * UNIT, InterestRateMode::Variable, account(1)).unwrap();

    pool.advance_time(365 * 24 * 3600).unwrap();
    let earned_a = pool.receipt_balance(DEBT, a).unwrap() - 100 * UNIT;
    let earned_b = pool.receipt_balance(DEBT, b).unwrap() - 300 * UNIT;
    assert!(earned_a > 0);
    assert!(earned_b.abs_diff(3 * earned_a) <= 3);
}

/// Closing every position after a year of accrual pays out every claim. What
/// stays behind is the gap between compounded debt and linear supply interest.
#[test]
fn full_unwind_leaves_only_treasury_claim() {
    let mut pool = market();
    let borrower = account(1);
    pool.borrow(borrower, DEBT, 400 * UNIT, InterestRateMode::Variable, borrower).unwrap();
    pool.advance_time(365 * 24 * 3600).unwrap();
    pool.repay(borrower, DEBT, RequestedAmount::All, InterestRateMode::Variable, borrower).unwrap();
    pool.mint_to_treasury(&[DEBT]).unwrap();

    let lender = account(0);
    pool.withdraw(lender, DEBT, RequestedAmount::All, lender).unwrap();
    let treasury = pool.treasury();
    let treasury_claim = pool.receipt_balance(DEBT, treasury).unwrap();
    pool.withdraw(treasury, DEBT, RequestedAmount::All, treasury).unwrap();

    assert!(treasury_claim > 0);
    let surplus = pool.ledger().balance_of(DEBT, pool.custody());
    assert!(surplus < UNIT / 10, "surplus {}", surplus);
}
