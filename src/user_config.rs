// 3.0: per-user reserve bitmap. two bits per reserve slot:
// bit 2*id is "borrowing", bit 2*id+1 is "using as collateral".

use crate::types::ReserveId;
use serde::{Deserialize, Serialize};

/// Two bits per reserve in a u128 gives 64 reserve slots.
pub const MAX_RESERVES: usize = 64;

const BORROWING_MASK: u128 = 0x5555_5555_5555_5555_5555_5555_5555_5555;
const COLLATERAL_MASK: u128 = BORROWING_MASK << 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserConfiguration(u128);

impl UserConfiguration {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn raw(&self) -> u128 {
        self.0
    }

    fn borrowing_bit(reserve: ReserveId) -> u128 {
        debug_assert!(reserve.index() < MAX_RESERVES);
        1u128 << (reserve.index() * 2)
    }

    fn collateral_bit(reserve: ReserveId) -> u128 {
        Self::borrowing_bit(reserve) << 1
    }

    pub fn set_borrowing(&mut self, reserve: ReserveId, borrowing: bool) {
        let bit = Self::borrowing_bit(reserve);
        if borrowing {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    pub fn set_using_as_collateral(&mut self, reserve: ReserveId, using: bool) {
        let bit = Self::collateral_bit(reserve);
        if using {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    pub fn is_using_as_collateral_or_borrowing(&self, reserve: ReserveId) -> bool {
        self.0 & (Self::borrowing_bit(reserve) | Self::collateral_bit(reserve)) != 0
    }

    pub fn is_borrowing(&self, reserve: ReserveId) -> bool {
        self.0 & Self::borrowing_bit(reserve) != 0
    }

    pub fn is_using_as_collateral(&self, reserve: ReserveId) -> bool {
        self.0 & Self::collateral_bit(reserve) != 0
    }

    pub fn is_borrowing_any(&self) -> bool {
        self.0 & BORROWING_MASK != 0
    }

    pub fn is_using_as_collateral_any(&self) -> bool {
        self.0 & COLLATERAL_MASK != 0
    }

    /// Exactly one reserve enabled as collateral.
    pub fn is_using_as_collateral_one(&self) -> bool {
        (self.0 & COLLATERAL_MASK).count_ones() == 1
    }

    pub fn is_borrowing_one(&self) -> bool {
        (self.0 & BORROWING_MASK).count_ones() == 1
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Lowest reserve slot enabled as collateral.
    pub fn first_collateral(&self) -> Option<ReserveId> {
        let collateral = self.0 & COLLATERAL_MASK;
        if collateral == 0 {
            return None;
        }
        Some(ReserveId((collateral.trailing_zeros() / 2) as u16))
    }

    /// Lowest reserve slot with an outstanding borrow.
    pub fn first_borrowed(&self) -> Option<ReserveId> {
        let borrowing = self.0 & BORROWING_MASK;
        if borrowing == 0 {
            return None;
        }
        Some(ReserveId((borrowing.trailing_zeros() / 2) as u16))
    }

    /// Reserve slots with either bit set, ascending.
    pub fn active_reserves(&self) -> impl Iterator<Item = ReserveId> + '_ {
        (0..MAX_RESERVES)
            .map(|i| ReserveId(i as u16))
            .filter(move |id| self.is_using_as_collateral_or_borrowing(*id))
    }
}
