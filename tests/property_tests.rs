//! Property-based tests for the fixed-point and risk math.
//!
//! These tests verify invariants hold under random inputs.

use lending_core::account::{calculate_available_borrows, calculate_health_factor};
use lending_core::interest::{calculate_compounded_interest, calculate_linear_interest};
use lending_core::liquidation::{calculate_actual_debt_to_cover, calculate_available_collateral_to_liquidate, SeizureInputs};
use lending_core::math::{mul_div, percent_div, percent_mul, to_wad_units};
use lending_core::tokens::ScaledBalanceToken;
use lending_core::*;
use proptest::prelude::*;

// Strategies for generating test data
fn amount_strategy() -> impl Strategy<Value = u128> {
    1u128..1_000_000_000_000_000_000_000u128 // up to 1e21 base units
}

fn debt_strategy() -> impl Strategy<Value = u128> {
    1_000_000_000u128..1_000_000_000_000_000_000_000u128
}

fn index_strategy() -> impl Strategy<Value = Ray> {
    (RAY..3 * RAY).prop_map(Ray::from_raw) // 1.0 to 3.0
}

fn bps_strategy() -> impl Strategy<Value = u16> {
    0u16..=10_000u16
}

fn rate_strategy() -> impl Strategy<Value = Ray> {
    // up to ~300% a year, per second
    (0u128..100_000_000_000_000_000_000u128).prop_map(Ray::from_raw)
}

fn price_strategy() -> impl Strategy<Value = u128> {
    (1u128..10_000_000u128).prop_map(|x| x * 1_000) // $0.00001 to $10,000 at 8 decimals
}

proptest! {
    /// Rounding modes are ordered and at most one unit apart.
    #[test]
    fn rounding_modes_are_ordered(a in 0u128..u64::MAX as u128, b in 0u128..u64::MAX as u128, d in 1u128..u64::MAX as u128) {
        let down = mul_div(a, b, d, Rounding::Down).unwrap();
        let half = mul_div(a, b, d, Rounding::HalfUp).unwrap();
        let up = mul_div(a, b, d, Rounding::Up).unwrap();
        prop_assert!(down <= half && half <= up);
        prop_assert!(up - down <= 1);
    }

    /// Exact divisions don't depend on the rounding mode.
    #[test]
    fn exact_division_ignores_rounding(a in amount_strategy(), d in 1u128..1_000_000u128) {
        let product = a.checked_mul(d).unwrap();
        for rounding in [Rounding::Down, Rounding::HalfUp, Rounding::Up] {
            prop_assert_eq!(mul_div(product, 1, d, rounding).unwrap(), a);
        }
    }

    /// Scaling down then back up never hands out more than was put in.
    #[test]
    fn scale_round_trip_never_inflates(amount in amount_strategy(), index in index_strategy()) {
        let scaled = index.unscale(amount, Rounding::Down).unwrap();
        prop_assert!(index.scale(scaled, Rounding::Down).unwrap() <= amount);

        // burn side rounds up, so it covers the full amount
        let burned = index.unscale(amount, Rounding::Up).unwrap();
        prop_assert!(index.scale(burned, Rounding::Up).unwrap() >= amount);
    }

    /// Percentages behave like their decimal counterparts.
    #[test]
    fn percent_identities(amount in amount_strategy(), bps in bps_strategy()) {
        prop_assert_eq!(percent_mul(amount, 10_000, Rounding::Down).unwrap(), amount);
        prop_assert_eq!(percent_div(amount, 10_000, Rounding::Down).unwrap(), amount);
        prop_assert!(percent_mul(amount, bps, Rounding::Down).unwrap() <= amount);
    }

    /// Wad normalization preserves order across decimals.
    #[test]
    fn wad_units_are_monotonic(a in amount_strategy(), b in amount_strategy(), decimals in 0u8..=18u8) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            to_wad_units(lo, decimals, Rounding::Down).unwrap() <= to_wad_units(hi, decimals, Rounding::Down).unwrap()
        );
    }

    /// Compounded growth is never below linear growth over the same window.
    #[test]
    fn compounding_dominates_linear(rate in rate_strategy(), secs in 0u64..5 * 365 * 24 * 3600) {
        let start = Timestamp::from_secs(1_000);
        let end = start.plus_secs(secs);
        let linear = calculate_linear_interest(rate, start, end).unwrap();
        let compounded = calculate_compounded_interest(rate, start, end).unwrap();
        prop_assert!(linear >= Ray::ONE);
        prop_assert!(compounded >= linear);
    }

    /// More collateral never lowers the health factor; more debt never raises it.
    #[test]
    fn health_factor_is_monotonic(
        collateral in amount_strategy(),
        extra in amount_strategy(),
        debt in debt_strategy(),
        threshold in 1u16..=10_000u16,
    ) {
        let lt = Bps(threshold);
        let base = calculate_health_factor(collateral, debt, lt).unwrap();
        let richer = calculate_health_factor(collateral + extra, debt, lt).unwrap();
        let poorer = calculate_health_factor(collateral, debt + extra, lt).unwrap();
        prop_assert!(richer >= base);
        prop_assert!(poorer <= base);
        prop_assert!(calculate_health_factor(collateral, 0, lt).unwrap().is_max());
    }

    /// Borrowing the whole available amount lands exactly on the ltv line.
    #[test]
    fn available_borrows_respect_ltv(collateral in amount_strategy(), debt in amount_strategy(), ltv in bps_strategy()) {
        let available = calculate_available_borrows(collateral, debt, Bps(ltv)).unwrap();
        let capacity = percent_mul(collateral, ltv, Rounding::Down).unwrap();
        prop_assert!(debt + available <= capacity.max(debt));
    }

    /// Close factor caps cover; seizure never exceeds the user's balance.
    #[test]
    fn seizure_is_bounded(
        total_debt in amount_strategy(),
        requested in amount_strategy(),
        balance in amount_strategy(),
        collateral_price in price_strategy(),
        debt_price in price_strategy(),
        bonus in 10_001u16..=12_500u16,
        fee in bps_strategy(),
        close in prop_oneof![Just(5_000u16), Just(10_000u16)],
    ) {
        let cover = calculate_actual_debt_to_cover(total_debt, requested, Bps(close)).unwrap();
        prop_assert!(cover <= requested);
        prop_assert!(cover <= total_debt);

        let seizure = calculate_available_collateral_to_liquidate(&SeizureInputs {
            collateral_price,
            collateral_decimals: 6,
            debt_price,
            debt_decimals: 18,
            debt_to_cover: cover,
            user_collateral_balance: balance,
            liquidation_bonus: Bps(bonus),
            liquidation_protocol_fee: Bps(fee),
        })
        .unwrap();
        prop_assert!(seizure.total_seized() <= balance);
        prop_assert!(seizure.debt_to_cover <= cover);
        prop_assert!(seizure.protocol_fee <= seizure.total_seized());
    }

    /// Premiums round up, so any non-zero fee on a non-zero loan is at least one unit.
    #[test]
    fn flash_premium_rounds_up(amount in amount_strategy(), bps in 1u16..=10_000u16) {
        let premium = lending_core::flash_loan::calculate_premium(amount, Bps(bps), false).unwrap();
        prop_assert!(premium >= 1);
        prop_assert!(premium >= percent_mul(amount, bps, Rounding::Down).unwrap());
        prop_assert_eq!(lending_core::flash_loan::calculate_premium(amount, Bps(bps), true).unwrap(), 0);
    }

    /// Bitmap flags for one reserve never leak into another.
    #[test]
    fn user_config_bits_are_independent(a in 0u16..64, b in 0u16..64, borrowing in any::<bool>(), collateral in any::<bool>()) {
        prop_assume!(a != b);
        let mut config = UserConfiguration::new();
        config.set_borrowing(ReserveId(a), borrowing);
        config.set_using_as_collateral(ReserveId(a), collateral);
        prop_assert_eq!(config.is_borrowing(ReserveId(a)), borrowing);
        prop_assert_eq!(config.is_using_as_collateral(ReserveId(a)), collateral);
        prop_assert!(!config.is_using_as_collateral_or_borrowing(ReserveId(b)));
        prop_assert_eq!(config.is_empty(), !borrowing && !collateral);
    }

    /// Scaled balances always sum to the scaled total.
    #[test]
    fn scaled_token_totals_add_up(ops in proptest::collection::vec((0u64..5, 1u128..1_000_000u128, any::<bool>()), 1..50)) {
        let mut token = ScaledBalanceToken::new();
        for (user, amount, mint) in ops {
            let who = AccountId(user);
            if mint {
                token.mint_scaled(who, amount).unwrap();
            } else {
                let burn = amount.min(token.scaled_balance_of(who));
                token.burn_scaled(who, burn).unwrap();
            }
        }
        let sum: u128 = token.holders().map(|(_, balance)| *balance).sum();
        prop_assert_eq!(sum, token.scaled_total_supply());
    }
}
