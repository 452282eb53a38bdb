// 6.1: isolation mode. a reserve with a non-zero debt ceiling can only back debt on its own,
// and the total debt borrowed against it (in wad) is capped by that ceiling.

use crate::errors::{AuthorizationError, CapacityError, PoolError};
use crate::math::{checked_add, to_wad_units, Rounding};
use crate::reserve::{ReserveConfig, ReserveData};
use crate::state::PoolState;
use crate::types::{AccountId, ReserveId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IsolationModeState {
    pub active: bool,
    pub collateral: Option<ReserveId>,
    // wad
    pub debt_ceiling: u128,
}

/// Isolation is in force when the user's single enabled collateral is an
/// isolated reserve. The collateral is located from the user's own bitmap.
pub fn get_isolation_mode_state(state: &PoolState, user: AccountId) -> IsolationModeState {
    let config = state.user_config(user);
    if !config.is_using_as_collateral_one() {
        return IsolationModeState::default();
    }
    let Some(id) = config.first_collateral() else {
        return IsolationModeState::default();
    };
    match state.reserve(id) {
        Some(reserve) if reserve.config.is_isolated() => IsolationModeState {
            active: true,
            collateral: Some(id),
            debt_ceiling: reserve.config.debt_ceiling,
        },
        _ => IsolationModeState::default(),
    }
}

/// Whether `reserve` may be switched on as collateral for `user`, either on
/// request or as a side effect of a first supply or received receipt tokens:
/// ltv must be non-zero, and isolated assets never mix with other collateral.
pub fn validate_use_as_collateral(state: &PoolState, user: AccountId, reserve: &ReserveConfig) -> bool {
    if reserve.ltv.is_zero() {
        return false;
    }
    if !state.user_config(user).is_using_as_collateral_any() {
        return true;
    }
    let isolation = get_isolation_mode_state(state, user);
    !isolation.active && !reserve.is_isolated()
}

/// Borrow-side checks while isolated: the asset must be flagged borrowable in
/// isolation and the running total must stay under the ceiling.
pub fn validate_isolated_borrow(
    state: &PoolState,
    isolation: &IsolationModeState,
    borrowed: &ReserveData,
    amount: u128,
) -> Result<(), PoolError> {
    if !isolation.active {
        return Ok(());
    }
    if !borrowed.config.borrowable_in_isolation {
        return Err(AuthorizationError::AssetNotBorrowableInIsolation(borrowed.id).into());
    }
    let Some(collateral) = isolation.collateral.and_then(|id| state.reserve(id)) else {
        return Ok(());
    };
    let added = to_wad_units(amount, borrowed.config.decimals, Rounding::Up)?;
    let next = checked_add(collateral.isolation_mode_total_debt, added)?;
    if next > isolation.debt_ceiling {
        return Err(CapacityError::DebtCeilingExceeded(collateral.id).into());
    }
    Ok(())
}

/// Adds a borrow to the isolated collateral's running total. Returns the
/// collateral slot and new total when isolation applies.
pub fn increase_isolated_debt(
    state: &mut PoolState,
    isolation: &IsolationModeState,
    borrowed_decimals: u8,
    amount: u128,
) -> Result<Option<(ReserveId, u128)>, PoolError> {
    if !isolation.active {
        return Ok(None);
    }
    let Some(id) = isolation.collateral else {
        return Ok(None);
    };
    let added = to_wad_units(amount, borrowed_decimals, Rounding::Up)?;
    let Some(reserve) = state.reserves.get_mut(id.index()) else {
        return Ok(None);
    };
    let next = checked_add(reserve.isolation_mode_total_debt, added)?;
    if next > isolation.debt_ceiling {
        return Err(CapacityError::DebtCeilingExceeded(id).into());
    }
    reserve.isolation_mode_total_debt = next;
    Ok(Some((id, next)))
}

/// Removes a repayment from the running total, floored at zero.
pub fn decrease_isolated_debt(
    state: &mut PoolState,
    user: AccountId,
    repaid_decimals: u8,
    amount: u128,
) -> Result<Option<(ReserveId, u128)>, PoolError> {
    let isolation = get_isolation_mode_state(state, user);
    if !isolation.active {
        return Ok(None);
    }
    let Some(id) = isolation.collateral else {
        return Ok(None);
    };
    let removed = to_wad_units(amount, repaid_decimals, Rounding::Down)?;
    let Some(reserve) = state.reserves.get_mut(id.index()) else {
        return Ok(None);
    };
    reserve.isolation_mode_total_debt = reserve.isolation_mode_total_debt.saturating_sub(removed);
    Ok(Some((id, reserve.isolation_mode_total_debt)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::WAD;
    use crate::reserve::ReserveConfig;
    use crate::types::{AssetId, Timestamp};

    const USER: AccountId = AccountId(10);

    fn state() -> PoolState {
        let mut state = PoolState::new();
        let configs = [
            ReserveConfig::stablecoin(6),
            ReserveConfig::gold_token(18),
            ReserveConfig::isolated_commodity(8, 1_000),
        ];
        for (i, config) in configs.into_iter().enumerate() {
            let id = ReserveId(i as u16);
            state.reserves.push(ReserveData::new(id, AssetId(i as u32 + 1), config, Timestamp(0)));
            state.asset_index.insert(AssetId(i as u32 + 1), id);
        }
        state
    }

    #[test]
    fn isolation_follows_actual_collateral() {
        let mut state = state();
        assert!(!get_isolation_mode_state(&state, USER).active);

        state.user_config_mut(USER).set_using_as_collateral(ReserveId(2), true);
        let isolation = get_isolation_mode_state(&state, USER);
        assert!(isolation.active);
        assert_eq!(isolation.collateral, Some(ReserveId(2)));
        assert_eq!(isolation.debt_ceiling, 1_000 * WAD);
    }

    #[test]
    fn isolated_collateral_does_not_mix() {
        let mut state = state();
        let stable = state.reserves[0].config;
        let isolated = state.reserves[2].config;

        // first collateral can be anything with ltv
        assert!(validate_use_as_collateral(&state, USER, &isolated));

        state.user_config_mut(USER).set_using_as_collateral(ReserveId(2), true);
        assert!(!validate_use_as_collateral(&state, USER, &stable));

        let mut other = PoolState::clone(&state);
        other.user_config_mut(USER).set_using_as_collateral(ReserveId(2), false);
        other.user_config_mut(USER).set_using_as_collateral(ReserveId(1), true);
        assert!(!validate_use_as_collateral(&other, USER, &isolated));
        assert!(validate_use_as_collateral(&other, USER, &stable));
    }

    #[test]
    fn zero_ltv_never_enabled() {
        let state = state();
        let mut config = ReserveConfig::gold_token(18);
        config.ltv = crate::types::Bps::ZERO;
        assert!(!validate_use_as_collateral(&state, USER, &config));
    }

    #[test]
    fn ceiling_is_enforced_and_repay_floors_at_zero() {
        let mut state = state();
        state.user_config_mut(USER).set_using_as_collateral(ReserveId(2), true);
        let isolation = get_isolation_mode_state(&state, USER);

        // 600 + 400 units of a 6-decimal stablecoin
        let stable = state.reserves[0].clone();
        validate_isolated_borrow(&state, &isolation, &stable, 600_000_000).unwrap();
        increase_isolated_debt(&mut state, &isolation, 6, 600_000_000).unwrap();
        increase_isolated_debt(&mut state, &isolation, 6, 400_000_000).unwrap();
        assert_eq!(state.reserves[2].isolation_mode_total_debt, 1_000 * WAD);

        let err = validate_isolated_borrow(&state, &isolation, &stable, 1).unwrap_err();
        assert!(matches!(err, PoolError::Capacity(CapacityError::DebtCeilingExceeded(ReserveId(2)))));

        let (_, total) = decrease_isolated_debt(&mut state, USER, 6, 2_000_000_000).unwrap().unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn asset_must_be_borrowable_in_isolation() {
        let mut state = state();
        state.user_config_mut(USER).set_using_as_collateral(ReserveId(2), true);
        let isolation = get_isolation_mode_state(&state, USER);
        let gold = state.reserves[1].clone();
        let err = validate_isolated_borrow(&state, &isolation, &gold, 1).unwrap_err();
        assert!(matches!(err, PoolError::Authorization(AuthorizationError::AssetNotBorrowableInIsolation(_))));
    }
}
