// 11.0: pool event log. each committed action leaves a record of what moved: reserve listings,
// balance changes, liquidations, flash loans, index updates. one payload struct per kind.
// records raised inside a pool transaction wait in a pending buffer until it commits.

use crate::math::Ray;
use crate::reserve::ReserveConfig;
use crate::types::{AccountId, AssetId, InterestRateMode, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    // Listing events
    ReserveListed(ReserveListedEvent),
    ReserveConfigured(ReserveConfiguredEvent),

    // Position events
    Supply(SupplyEvent),
    Withdraw(WithdrawEvent),
    Borrow(BorrowEvent),
    Repay(RepayEvent),
    CollateralEnabled(CollateralToggleEvent),
    CollateralDisabled(CollateralToggleEvent),
    UserEModeSet(UserEModeSetEvent),

    // Risk events
    LiquidationCall(LiquidationCallEvent),
    IsolationModeTotalDebtUpdated(IsolationDebtEvent),

    // Flash loans
    FlashLoan(FlashLoanEvent),

    // Reserve accounting events
    ReserveDataUpdated(ReserveDataUpdatedEvent),
    MintedToTreasury(MintedToTreasuryEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveListedEvent {
    pub asset: AssetId,
    pub reserve_index: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveConfiguredEvent {
    pub asset: AssetId,
    pub config: ReserveConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyEvent {
    pub asset: AssetId,
    pub user: AccountId,
    pub on_behalf_of: AccountId,
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawEvent {
    pub asset: AssetId,
    pub user: AccountId,
    pub to: AccountId,
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowEvent {
    pub asset: AssetId,
    pub user: AccountId,
    pub on_behalf_of: AccountId,
    pub amount: u128,
    pub rate_mode: InterestRateMode,
    pub borrow_rate: Ray,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepayEvent {
    pub asset: AssetId,
    pub user: AccountId,
    pub repayer: AccountId,
    pub amount: u128,
    pub use_receipt_tokens: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralToggleEvent {
    pub asset: AssetId,
    pub user: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEModeSetEvent {
    pub user: AccountId,
    pub category: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationCallEvent {
    pub collateral_asset: AssetId,
    pub debt_asset: AssetId,
    pub user: AccountId,
    pub debt_to_cover: u128,
    pub liquidated_collateral: u128,
    pub protocol_fee: u128,
    pub liquidator: AccountId,
    pub receive_receipt_token: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolationDebtEvent {
    pub asset: AssetId,
    // wad
    pub total_debt: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashLoanEvent {
    pub receiver: AccountId,
    pub initiator: AccountId,
    pub asset: AssetId,
    pub amount: u128,
    pub mode: InterestRateMode,
    pub premium: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveDataUpdatedEvent {
    pub asset: AssetId,
    pub liquidity_rate: Ray,
    pub fixed_borrow_rate: Ray,
    pub variable_borrow_rate: Ray,
    pub liquidity_index: Ray,
    pub variable_borrow_index: Ray,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintedToTreasuryEvent {
    pub asset: AssetId,
    pub amount: u128,
}

pub trait EventEmitter {
    fn emit(&mut self, timestamp: Timestamp, payload: EventPayload);
}

/// Committed events plus a pending buffer for the transaction in flight.
#[derive(Debug)]
pub struct EventCollector {
    events: Vec<Event>,
    pending: Vec<Event>,
    next_id: u64,
    max_events: usize,
}

impl Default for EventCollector {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl EventCollector {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Vec::new(),
            pending: Vec::new(),
            next_id: 1,
            max_events,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn pending(&self) -> &[Event] {
        &self.pending
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Moves pending events into the log, dropping the oldest past the limit.
    pub fn commit(&mut self) {
        self.events.append(&mut self.pending);
        if self.events.len() > self.max_events {
            let excess = self.events.len() - self.max_events;
            self.events.drain(0..excess);
        }
    }

    /// Drops pending events. Ids handed out stay consumed.
    pub fn discard(&mut self) {
        self.pending.clear();
    }
}

impl EventEmitter for EventCollector {
    fn emit(&mut self, timestamp: Timestamp, payload: EventPayload) {
        let id = self.next_id();
        self.pending.push(Event::new(id, timestamp, payload));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supply(amount: u128) -> EventPayload {
        EventPayload::Supply(SupplyEvent {
            asset: AssetId(1),
            user: AccountId(10),
            on_behalf_of: AccountId(10),
            amount,
        })
    }

    #[test]
    fn pending_events_need_commit() {
        let mut collector = EventCollector::new(10);
        collector.emit(Timestamp(5), supply(100));
        assert!(collector.events().is_empty());
        assert_eq!(collector.pending().len(), 1);

        collector.commit();
        assert_eq!(collector.events().len(), 1);
        assert_eq!(collector.events()[0].id, EventId(1));
        assert!(collector.pending().is_empty());
    }

    #[test]
    fn discard_drops_pending_only() {
        let mut collector = EventCollector::new(10);
        collector.emit(Timestamp(1), supply(1));
        collector.commit();
        collector.emit(Timestamp(2), supply(2));
        collector.discard();
        collector.commit();
        assert_eq!(collector.events().len(), 1);
    }

    #[test]
    fn oldest_events_are_drained() {
        let mut collector = EventCollector::new(2);
        for i in 0..3 {
            collector.emit(Timestamp(i), supply(i as u128));
        }
        collector.commit();
        assert_eq!(collector.events().len(), 2);
        assert_eq!(collector.events()[0].id, EventId(2));
    }

    #[test]
    fn events_serialize() {
        let event = Event::new(EventId(7), Timestamp(9), supply(42));
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
