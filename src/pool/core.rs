// 8.0 pool/core.rs: the pool struct, the transaction wrapper, listing/admin actions and queries.

use super::config::EngineConfig;
use super::results::ReserveSnapshot;
use crate::account::{calculate_user_account_data, debt_balances, receipt_balance, UserAccountData};
use crate::emode::{validate_category, EModeCategory, NO_EMODE};
use crate::errors::{ConfigurationError, PoolError};
use crate::events::{
    Event, EventCollector, EventEmitter, EventPayload, ReserveConfiguredEvent, ReserveDataUpdatedEvent,
    ReserveListedEvent,
};
use crate::config::ConfigError;
use crate::interest::{DefaultInterestRateStrategy, InterestRateParams, InterestRateStrategy};
use crate::ledger::TokenLedger;
use crate::math::Rounding;
use crate::oracle::{PriceOracle, PriceOracleSentinel};
use crate::reserve::{ReserveCache, ReserveConfig, ReserveData};
use crate::state::PoolState;
use crate::tokens::{FixedRateDebtToken, ScaledBalanceToken};
use crate::types::{AccountId, AssetId, ReserveId, Timestamp};
use crate::user_config::UserConfiguration;
use std::sync::Arc;
use tracing::{debug, info, warn};

/** 8.1: main pool struct. all state lives here */
#[derive(Debug)]
pub struct Pool<L: TokenLedger + Clone> {
    pub(super) config: EngineConfig,
    pub(super) state: PoolState,
    pub(crate) ledger: L,
    pub(super) oracle: Box<dyn PriceOracle>,
    pub(super) sentinel: Option<Box<dyn PriceOracleSentinel>>,
    pub(super) events: EventCollector,
    pub(super) current_time: Timestamp,
    // held while an entry point runs, including during flash loan callbacks
    pub(super) entered: bool,
}

impl<L: TokenLedger + Clone> Pool<L> {
    pub fn new(config: EngineConfig, ledger: L, oracle: Box<dyn PriceOracle>) -> Result<Self, PoolError> {
        config.validate()?;
        let events = EventCollector::new(config.max_events);
        Ok(Self {
            config,
            state: PoolState::new(),
            ledger,
            oracle,
            sentinel: None,
            events,
            current_time: Timestamp::from_secs(0),
            entered: false,
        })
    }

    // 8.1.1: transaction wrapper

    /// Runs `f` as one transaction. State, ledger and clock are checkpointed
    /// first and restored if `f` fails; events raised inside only reach the log
    /// on success. A second entry while one is in flight fails with `Reentrancy`.
    pub(super) fn transact<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut Self) -> Result<T, PoolError>,
    ) -> Result<T, PoolError> {
        self.ensure_idle(operation)?;
        self.entered = true;
        let state_checkpoint = self.state.clone();
        let ledger_checkpoint = self.ledger.clone();
        let time_checkpoint = self.current_time;

        let result = f(self);
        self.entered = false;

        match &result {
            Ok(_) => self.events.commit(),
            Err(err) => {
                warn!(operation, error = %err, category = %err.category(), "transaction rolled back");
                self.state = state_checkpoint;
                self.ledger = ledger_checkpoint;
                self.current_time = time_checkpoint;
                self.events.discard();
            }
        }
        result
    }

    /// Setters that bypass `transact` still refuse to run mid-transaction.
    fn ensure_idle(&self, operation: &'static str) -> Result<(), PoolError> {
        if self.entered {
            warn!(operation, "re-entrant call rejected");
            return Err(PoolError::Reentrancy);
        }
        Ok(())
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        self.events.emit(self.current_time, payload);
    }

    // 8.1.2: clock

    /// Moves the pool clock. Time never runs backwards; an earlier timestamp is ignored.
    pub fn set_time(&mut self, timestamp: Timestamp) -> Result<(), PoolError> {
        self.ensure_idle("set_time")?;
        if timestamp < self.current_time {
            warn!(current = %self.current_time, requested = %timestamp, "ignoring clock regression");
            return Ok(());
        }
        self.current_time = timestamp;
        Ok(())
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, secs: u64) -> Result<(), PoolError> {
        self.ensure_idle("advance_time")?;
        self.current_time = self.current_time.plus_secs(secs);
        Ok(())
    }

    /// Sets the pool clock to the wall clock.
    pub fn sync_clock(&mut self) -> Result<(), PoolError> {
        self.set_time(Timestamp::now())
    }

    // 8.1.3: listing and admin

    /// Lists `asset` in the next free slot with fresh receipt and debt tokens.
    pub fn init_reserve(
        &mut self,
        asset: AssetId,
        config: ReserveConfig,
        strategy: Arc<dyn InterestRateStrategy>,
    ) -> Result<ReserveId, PoolError> {
        self.transact("init_reserve", |pool| {
            config.validate()?;
            if pool.state.asset_index.contains_key(&asset) {
                return Err(ConfigurationError::ReserveAlreadyListed(asset).into());
            }
            let max = pool.config.protocol.max_reserves.min(crate::user_config::MAX_RESERVES);
            if pool.state.reserves_count() >= max {
                return Err(ConfigurationError::NoMoreReservesAllowed(max).into());
            }

            let id = ReserveId(pool.state.reserves_count() as u16);
            pool.assign_emode(id, NO_EMODE, config.emode_category)?;

            let state = &mut pool.state;
            state.reserves.push(ReserveData::new(id, asset, config, pool.current_time));
            state.asset_index.insert(asset, id);
            state.receipt_tokens.push(ScaledBalanceToken::new());
            state.variable_debt_tokens.push(ScaledBalanceToken::new());
            state.fixed_debt_tokens.push(FixedRateDebtToken::new());
            state.strategies.push(strategy);

            // seed the fixed rate so the first fixed borrow has a quote
            let cache = pool.cache_and_update(id)?;
            pool.update_rates(id, &cache, 0, 0)?;

            info!(%asset, slot = id.0, "reserve listed");
            pool.emit_event(EventPayload::ReserveListed(ReserveListedEvent {
                asset,
                reserve_index: id.0,
            }));
            Ok(id)
        })
    }

    /// Lists `asset` with the default kinked rate curve built from `params`.
    pub fn init_reserve_with_params(
        &mut self,
        asset: AssetId,
        config: ReserveConfig,
        params: &InterestRateParams,
    ) -> Result<ReserveId, PoolError> {
        let strategy = DefaultInterestRateStrategy::new(params).map_err(|err| ConfigError::InvalidRateCurve {
            reason: err.to_string(),
        })?;
        self.init_reserve(asset, config, Arc::new(strategy))
    }

    /// Replaces a reserve's parameters. Interest is accrued under the old
    /// parameters first, then rates are recomputed under the new ones.
    pub fn configure_reserve(&mut self, asset: AssetId, config: ReserveConfig) -> Result<(), PoolError> {
        self.transact("configure_reserve", |pool| pool.apply_reserve_config(asset, config))
    }

    pub fn set_reserve_active(&mut self, asset: AssetId, active: bool) -> Result<(), PoolError> {
        self.update_reserve_config(asset, |config| config.active = active)
    }

    pub fn set_reserve_frozen(&mut self, asset: AssetId, frozen: bool) -> Result<(), PoolError> {
        self.update_reserve_config(asset, |config| config.frozen = frozen)
    }

    pub fn set_reserve_paused(&mut self, asset: AssetId, paused: bool) -> Result<(), PoolError> {
        self.update_reserve_config(asset, |config| config.paused = paused)
    }

    fn update_reserve_config(&mut self, asset: AssetId, edit: impl FnOnce(&mut ReserveConfig)) -> Result<(), PoolError> {
        self.transact("configure_reserve", |pool| {
            let mut config = pool.state.reserve_by_asset(asset)?.config;
            edit(&mut config);
            pool.apply_reserve_config(asset, config)
        })
    }

    fn apply_reserve_config(&mut self, asset: AssetId, config: ReserveConfig) -> Result<(), PoolError> {
        config.validate()?;
        let id = self.state.reserve_id(asset)?;
        let mut cache = self.cache_and_update(id)?;

        let previous = self.reserve(id)?.config.emode_category;
        self.assign_emode(id, previous, config.emode_category)?;

        self.reserve_mut(id)?.config = config;
        cache.config = config;
        self.update_rates(id, &cache, 0, 0)?;

        debug!(%asset, ?config, "reserve configured");
        self.emit_event(EventPayload::ReserveConfigured(ReserveConfiguredEvent { asset, config }));
        Ok(())
    }

    /// Swaps the rate strategy, accruing under the old one first.
    pub fn set_reserve_interest_rate_strategy(
        &mut self,
        asset: AssetId,
        strategy: Arc<dyn InterestRateStrategy>,
    ) -> Result<(), PoolError> {
        self.transact("set_reserve_interest_rate_strategy", |pool| {
            let id = pool.state.reserve_id(asset)?;
            let cache = pool.cache_and_update(id)?;
            if let Some(slot) = pool.state.strategies.get_mut(id.index()) {
                *slot = strategy;
            }
            pool.update_rates(id, &cache, 0, 0)?;
            Ok(())
        })
    }

    /// Adds or replaces an e-mode category. Eligibility is derived from the
    /// listed reserves that already point at it.
    pub fn set_emode_category(&mut self, mut category: EModeCategory) -> Result<(), PoolError> {
        self.transact("set_emode_category", |pool| {
            validate_category(&category)?;
            category.eligible_reserves = 0;
            for reserve in &pool.state.reserves {
                if reserve.config.emode_category == category.id {
                    if reserve.config.liquidation_threshold > category.liquidation_threshold {
                        return Err(ConfigError::InvalidLiquidation {
                            reason: format!(
                                "category {} threshold is below reserve {:?} threshold",
                                category.id, reserve.id
                            ),
                        }
                        .into());
                    }
                    category.set_eligible(reserve.id, true);
                }
            }
            info!(category = category.id, label = %category.label, "e-mode category set");
            pool.state.emode_categories.insert(category.id, category);
            Ok(())
        })
    }

    fn assign_emode(&mut self, id: ReserveId, previous: u8, next: u8) -> Result<(), PoolError> {
        if next != NO_EMODE && !self.state.emode_categories.contains_key(&next) {
            return Err(ConfigurationError::EModeCategoryNotFound(next).into());
        }
        if let Some(category) = self.state.emode_categories.get_mut(&previous) {
            category.set_eligible(id, false);
        }
        if let Some(category) = self.state.emode_categories.get_mut(&next) {
            category.set_eligible(id, true);
        }
        Ok(())
    }

    /// Marks `account` as exempt from flash loan premiums.
    pub fn set_flash_borrower(&mut self, account: AccountId, exempt: bool) -> Result<(), PoolError> {
        self.transact("set_flash_borrower", |pool| {
            if exempt {
                pool.state.flash_borrowers.insert(account);
            } else {
                pool.state.flash_borrowers.remove(&account);
            }
            debug!(%account, exempt, "flash borrower updated");
            Ok(())
        })
    }

    pub fn set_oracle(&mut self, oracle: Box<dyn PriceOracle>) -> Result<(), PoolError> {
        self.ensure_idle("set_oracle")?;
        self.oracle = oracle;
        Ok(())
    }

    pub fn set_sentinel(&mut self, sentinel: Option<Box<dyn PriceOracleSentinel>>) -> Result<(), PoolError> {
        self.ensure_idle("set_sentinel")?;
        self.sentinel = sentinel;
        Ok(())
    }

    // 8.1.4: reserve plumbing shared by the entry points

    pub(super) fn reserve(&self, id: ReserveId) -> Result<&ReserveData, PoolError> {
        self.state.reserve(id).ok_or_else(|| PoolError::ReserveNotFound(self.asset_of(id)))
    }

    pub(super) fn reserve_mut(&mut self, id: ReserveId) -> Result<&mut ReserveData, PoolError> {
        let asset = self.asset_of(id);
        self.state.reserves.get_mut(id.index()).ok_or(PoolError::ReserveNotFound(asset))
    }

    fn asset_of(&self, id: ReserveId) -> AssetId {
        self.state
            .asset_index
            .iter()
            .find(|(_, slot)| **slot == id)
            .map(|(asset, _)| *asset)
            .unwrap_or(AssetId(u32::MAX))
    }

    pub(super) fn receipt_token_mut(&mut self, id: ReserveId) -> Result<&mut ScaledBalanceToken, PoolError> {
        let asset = self.asset_of(id);
        self.state.receipt_tokens.get_mut(id.index()).ok_or(PoolError::ReserveNotFound(asset))
    }

    pub(super) fn variable_debt_token_mut(&mut self, id: ReserveId) -> Result<&mut ScaledBalanceToken, PoolError> {
        let asset = self.asset_of(id);
        self.state
            .variable_debt_tokens
            .get_mut(id.index())
            .ok_or(PoolError::ReserveNotFound(asset))
    }

    pub(super) fn fixed_debt_token_mut(&mut self, id: ReserveId) -> Result<&mut FixedRateDebtToken, PoolError> {
        let asset = self.asset_of(id);
        self.state
            .fixed_debt_tokens
            .get_mut(id.index())
            .ok_or(PoolError::ReserveNotFound(asset))
    }

    /// Snapshots the reserve and accrues interest to the current time.
    pub(super) fn cache_and_update(&mut self, id: ReserveId) -> Result<ReserveCache, PoolError> {
        let now = self.current_time;
        let i = id.index();
        let (Some(variable), Some(fixed)) = (self.state.variable_debt_tokens.get(i), self.state.fixed_debt_tokens.get(i))
        else {
            return Err(PoolError::ReserveNotFound(self.asset_of(id)));
        };
        let mut cache = self.reserve(id)?.cache(variable, fixed, now)?;
        self.reserve_mut(id)?.update_state(&mut cache, now)?;
        Ok(cache)
    }

    /// Re-reads debt totals into `cache` after token mints or burns.
    pub(super) fn refresh_cache(&self, id: ReserveId, cache: &mut ReserveCache) -> Result<(), PoolError> {
        let i = id.index();
        let (Some(variable), Some(fixed)) = (self.state.variable_debt_tokens.get(i), self.state.fixed_debt_tokens.get(i))
        else {
            return Err(PoolError::ReserveNotFound(self.asset_of(id)));
        };
        cache.refresh_debt(variable, fixed, self.current_time)?;
        Ok(())
    }

    /// Recomputes rates from `cache` and moves the virtual balance, then
    /// announces the new reserve state.
    pub(super) fn update_rates(
        &mut self,
        id: ReserveId,
        cache: &ReserveCache,
        liquidity_added: u128,
        liquidity_taken: u128,
    ) -> Result<(), PoolError> {
        let strategy = self
            .state
            .strategies
            .get(id.index())
            .cloned()
            .ok_or_else(|| PoolError::ReserveNotFound(self.asset_of(id)))?;
        let reserve = self.reserve_mut(id)?;
        let rates = reserve.update_interest_rates(cache, strategy.as_ref(), liquidity_added, liquidity_taken)?;
        let payload = EventPayload::ReserveDataUpdated(ReserveDataUpdatedEvent {
            asset: reserve.asset,
            liquidity_rate: rates.liquidity_rate,
            fixed_borrow_rate: rates.fixed_borrow_rate,
            variable_borrow_rate: rates.variable_borrow_rate,
            liquidity_index: cache.next_liquidity_index,
            variable_borrow_index: cache.next_variable_borrow_index,
        });
        self.emit_event(payload);
        Ok(())
    }

    /// Pulls `amount` of `asset` from `from` into custody. The owner must have
    /// approved the custody account.
    pub(super) fn pull(&mut self, asset: AssetId, from: AccountId, amount: u128) -> Result<(), PoolError> {
        let custody = self.config.protocol.custody_account;
        self.ledger.transfer_from(asset, custody, from, custody, amount)?;
        Ok(())
    }

    pub(super) fn push(&mut self, asset: AssetId, to: AccountId, amount: u128) -> Result<(), PoolError> {
        let custody = self.config.protocol.custody_account;
        self.ledger.transfer(asset, custody, to, amount)?;
        Ok(())
    }

    pub(super) fn set_using_as_collateral(&mut self, id: ReserveId, user: AccountId, enabled: bool) -> Result<(), PoolError> {
        self.state.user_config_mut(user).set_using_as_collateral(id, enabled);
        let asset = self.reserve(id)?.asset;
        let event = crate::events::CollateralToggleEvent { asset, user };
        self.emit_event(if enabled {
            EventPayload::CollateralEnabled(event)
        } else {
            EventPayload::CollateralDisabled(event)
        });
        Ok(())
    }

    // 8.1.5: queries

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &PoolState {
        &self.state
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Direct ledger access for funding accounts and approvals between
    /// transactions. Flash loan receivers only see their own account through
    /// `FlashLoanContext`.
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn custody(&self) -> AccountId {
        self.config.protocol.custody_account
    }

    pub fn treasury(&self) -> AccountId {
        self.config.protocol.treasury
    }

    pub fn events(&self) -> &[Event] {
        self.events.events()
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn reserves_list(&self) -> Vec<AssetId> {
        self.state.reserves_list()
    }

    pub fn reserve_data(&self, asset: AssetId) -> Result<&ReserveData, PoolError> {
        self.state.reserve_by_asset(asset)
    }

    pub fn emode_category(&self, id: u8) -> Option<&EModeCategory> {
        self.state.emode_category(id)
    }

    pub fn user_emode(&self, user: AccountId) -> u8 {
        self.state.user_emode(user)
    }

    pub fn user_configuration(&self, user: AccountId) -> UserConfiguration {
        self.state.user_config(user)
    }

    pub fn normalized_income(&self, asset: AssetId) -> Result<crate::math::Ray, PoolError> {
        Ok(self.state.reserve_by_asset(asset)?.normalized_income(self.current_time)?)
    }

    pub fn normalized_debt(&self, asset: AssetId) -> Result<crate::math::Ray, PoolError> {
        Ok(self.state.reserve_by_asset(asset)?.normalized_debt(self.current_time)?)
    }

    /// Receipt balance in underlying units, as of now.
    pub fn receipt_balance(&self, asset: AssetId, user: AccountId) -> Result<u128, PoolError> {
        let id = self.state.reserve_id(asset)?;
        receipt_balance(&self.state, id, user, self.current_time)
    }

    pub fn scaled_receipt_balance(&self, asset: AssetId, user: AccountId) -> Result<u128, PoolError> {
        let id = self.state.reserve_id(asset)?;
        Ok(self.state.scaled_receipt_balance(id, user))
    }

    /// (variable, fixed) debt in underlying units, as of now.
    pub fn debt_balances(&self, asset: AssetId, user: AccountId) -> Result<(u128, u128), PoolError> {
        let id = self.state.reserve_id(asset)?;
        debt_balances(&self.state, id, user, self.current_time)
    }

    pub fn borrow_allowance(&self, asset: AssetId, delegator: AccountId, delegatee: AccountId) -> u128 {
        self.state.borrow_allowance(asset, delegator, delegatee)
    }

    pub fn user_account_data(&self, user: AccountId) -> Result<UserAccountData, PoolError> {
        let emode = self.state.user_emode(user);
        calculate_user_account_data(&self.state, self.oracle.as_ref(), user, emode, self.current_time)
    }

    pub fn reserve_snapshot(&self, asset: AssetId) -> Result<ReserveSnapshot, PoolError> {
        let id = self.state.reserve_id(asset)?;
        let reserve = self.reserve(id)?;
        let now = self.current_time;
        let income = reserve.normalized_income(now)?;
        let debt = reserve.normalized_debt(now)?;
        let i = id.index();

        let total_supplied = match self.state.receipt_tokens.get(i) {
            Some(token) => token.total_supply(income, Rounding::Down)?,
            None => 0,
        };
        let total_variable_debt = match self.state.variable_debt_tokens.get(i) {
            Some(token) => token.total_supply(debt, Rounding::Up)?,
            None => 0,
        };
        let total_fixed_debt = match self.state.fixed_debt_tokens.get(i) {
            Some(token) => token.total_supply(now)?,
            None => 0,
        };

        Ok(ReserveSnapshot {
            asset,
            normalized_income: income,
            normalized_debt: debt,
            liquidity_rate: reserve.current_liquidity_rate,
            variable_borrow_rate: reserve.current_variable_borrow_rate,
            fixed_borrow_rate: reserve.current_fixed_borrow_rate,
            total_supplied,
            total_variable_debt,
            total_fixed_debt,
            available_liquidity: reserve.virtual_underlying_balance,
            accrued_to_treasury: reserve.accrued_to_treasury,
            as_of: now,
        })
    }
}
