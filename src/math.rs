//! Deterministic fixed-point arithmetic.
//!
//! Two scales are used across the crate: wad (1e18) for health factors and
//! isolation-mode debt, ray (1e27) for indices and rates. Token amounts are
//! plain `u128` in the asset's own decimals. Every product is formed in 256
//! bits and narrowed back with an explicit overflow check, so nothing ever
//! wraps. Callers pick the rounding direction: amounts credited to users round
//! down, amounts collected by the protocol round up.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

mod wide {
    #![allow(clippy::all)]
    uint::construct_uint! {
        pub struct U256(4);
    }
}

use wide::U256;

pub const WAD: u128 = 1_000_000_000_000_000_000;
pub const HALF_WAD: u128 = WAD / 2;
pub const RAY: u128 = 1_000_000_000_000_000_000_000_000_000;
pub const HALF_RAY: u128 = RAY / 2;
pub const WAD_RAY_RATIO: u128 = 1_000_000_000;
pub const PERCENTAGE_FACTOR: u128 = 10_000;

const WAD_DECIMALS: u32 = 18;
const RAY_DECIMALS: u32 = 27;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("arithmetic overflow")]
    Overflow,

    #[error("arithmetic underflow")]
    Underflow,

    #[error("division by zero")]
    DivisionByZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Down,
    HalfUp,
    Up,
}

fn narrow(value: U256) -> Result<u128, MathError> {
    if value.bits() > 128 {
        return Err(MathError::Overflow);
    }
    Ok(value.low_u128())
}

/// `a * b / denominator` with a 256-bit intermediate.
pub fn mul_div(a: u128, b: u128, denominator: u128, rounding: Rounding) -> Result<u128, MathError> {
    mul_div_wide(&[a, b], &[denominator], rounding)
}

/// Product of `factors` divided by the product of `divisors`, rounded once at
/// the end. Used where a chain of conversions would otherwise round twice.
pub fn mul_div_wide(factors: &[u128], divisors: &[u128], rounding: Rounding) -> Result<u128, MathError> {
    let mut numerator = U256::one();
    for factor in factors {
        numerator = numerator
            .checked_mul(U256::from(*factor))
            .ok_or(MathError::Overflow)?;
    }

    let mut denominator = U256::one();
    for divisor in divisors {
        if *divisor == 0 {
            return Err(MathError::DivisionByZero);
        }
        denominator = denominator
            .checked_mul(U256::from(*divisor))
            .ok_or(MathError::Overflow)?;
    }

    let quotient = numerator / denominator;
    let remainder = numerator % denominator;

    let round_up = match rounding {
        Rounding::Down => false,
        Rounding::Up => !remainder.is_zero(),
        // remainder >= denominator / 2, written so it cannot overflow
        Rounding::HalfUp => !remainder.is_zero() && remainder >= denominator - remainder,
    };

    let rounded = if round_up {
        quotient
            .checked_add(U256::one())
            .ok_or(MathError::Overflow)?
    } else {
        quotient
    };

    narrow(rounded)
}

pub fn checked_add(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

pub fn checked_sub(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}

pub fn pow10(exp: u32) -> Result<u128, MathError> {
    10u128.checked_pow(exp).ok_or(MathError::Overflow)
}

// 2.1: percentage math on basis points.

pub fn percent_mul(amount: u128, bps: u16, rounding: Rounding) -> Result<u128, MathError> {
    mul_div(amount, bps as u128, PERCENTAGE_FACTOR, rounding)
}

pub fn percent_div(amount: u128, bps: u16, rounding: Rounding) -> Result<u128, MathError> {
    mul_div(amount, PERCENTAGE_FACTOR, bps as u128, rounding)
}

/// Converts a token amount with `decimals` into an 18-decimal wad quantity.
pub fn to_wad_units(amount: u128, decimals: u8, rounding: Rounding) -> Result<u128, MathError> {
    let decimals = decimals as u32;
    if decimals <= WAD_DECIMALS {
        amount
            .checked_mul(pow10(WAD_DECIMALS - decimals)?)
            .ok_or(MathError::Overflow)
    } else {
        mul_div(amount, 1, pow10(decimals - WAD_DECIMALS)?, rounding)
    }
}

fn fixed_to_decimal(mut raw: u128, mut scale: u32) -> Decimal {
    loop {
        if raw <= i128::MAX as u128 {
            if let Ok(value) = Decimal::try_from_i128_with_scale(raw as i128, scale) {
                return value.normalize();
            }
        }
        if scale == 0 {
            return Decimal::MAX;
        }
        raw /= 10;
        scale -= 1;
    }
}

fn decimal_to_fixed(value: Decimal, target_scale: u32) -> Result<u128, MathError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(MathError::Underflow);
    }
    let mantissa = value.mantissa().unsigned_abs();
    let scale = value.scale();
    if scale <= target_scale {
        mantissa
            .checked_mul(pow10(target_scale - scale)?)
            .ok_or(MathError::Overflow)
    } else {
        Ok(mantissa / pow10(scale - target_scale)?)
    }
}

// 2.2: ray (1e27) quantities: indices, per-second rates, utilization ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Ray(u128);

impl Ray {
    pub const ZERO: Ray = Ray(0);
    pub const ONE: Ray = Ray(RAY);

    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn from_ratio(numerator: u128, denominator: u128, rounding: Rounding) -> Result<Self, MathError> {
        mul_div(numerator, RAY, denominator, rounding).map(Self)
    }

    pub fn from_decimal(value: Decimal) -> Result<Self, MathError> {
        decimal_to_fixed(value, RAY_DECIMALS).map(Self)
    }

    pub fn to_decimal(&self) -> Decimal {
        fixed_to_decimal(self.0, RAY_DECIMALS)
    }

    pub fn mul(&self, other: Ray) -> Result<Ray, MathError> {
        self.mul_rounded(other, Rounding::HalfUp)
    }

    pub fn mul_rounded(&self, other: Ray, rounding: Rounding) -> Result<Ray, MathError> {
        mul_div(self.0, other.0, RAY, rounding).map(Ray)
    }

    pub fn div(&self, other: Ray) -> Result<Ray, MathError> {
        self.div_rounded(other, Rounding::HalfUp)
    }

    pub fn div_rounded(&self, other: Ray, rounding: Rounding) -> Result<Ray, MathError> {
        mul_div(self.0, RAY, other.0, rounding).map(Ray)
    }

    pub fn checked_add(&self, other: Ray) -> Result<Ray, MathError> {
        checked_add(self.0, other.0).map(Ray)
    }

    pub fn checked_sub(&self, other: Ray) -> Result<Ray, MathError> {
        checked_sub(self.0, other.0).map(Ray)
    }

    pub fn saturating_sub(&self, other: Ray) -> Ray {
        Ray(self.0.saturating_sub(other.0))
    }

    pub fn mul_int(&self, factor: u128) -> Result<Ray, MathError> {
        self.0.checked_mul(factor).map(Ray).ok_or(MathError::Overflow)
    }

    pub fn div_int(&self, divisor: u128) -> Result<Ray, MathError> {
        if divisor == 0 {
            return Err(MathError::DivisionByZero);
        }
        Ok(Ray(self.0 / divisor))
    }

    /// `amount * self`: converts a scaled balance into underlying units.
    pub fn scale(&self, amount: u128, rounding: Rounding) -> Result<u128, MathError> {
        mul_div(amount, self.0, RAY, rounding)
    }

    /// `amount / self`: converts underlying units into a scaled balance.
    pub fn unscale(&self, amount: u128, rounding: Rounding) -> Result<u128, MathError> {
        mul_div(amount, RAY, self.0, rounding)
    }

    pub fn to_wad(&self) -> Wad {
        let quotient = self.0 / WAD_RAY_RATIO;
        let remainder = self.0 % WAD_RAY_RATIO;
        if remainder >= WAD_RAY_RATIO / 2 {
            Wad(quotient + 1)
        } else {
            Wad(quotient)
        }
    }
}

impl fmt::Display for Ray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

// 2.3: wad (1e18) quantities: health factors, isolation-mode debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Wad(u128);

impl Wad {
    pub const ZERO: Wad = Wad(0);
    pub const ONE: Wad = Wad(WAD);
    /// Stands in for an unbounded value (health factor with no debt).
    pub const MAX: Wad = Wad(u128::MAX);

    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_max(&self) -> bool {
        self.0 == u128::MAX
    }

    pub fn from_ratio(numerator: u128, denominator: u128, rounding: Rounding) -> Result<Self, MathError> {
        mul_div(numerator, WAD, denominator, rounding).map(Self)
    }

    pub fn from_decimal(value: Decimal) -> Result<Self, MathError> {
        decimal_to_fixed(value, WAD_DECIMALS).map(Self)
    }

    pub fn to_decimal(&self) -> Decimal {
        if self.is_max() {
            return Decimal::MAX;
        }
        fixed_to_decimal(self.0, WAD_DECIMALS)
    }

    pub fn mul(&self, other: Wad) -> Result<Wad, MathError> {
        self.mul_rounded(other, Rounding::HalfUp)
    }

    pub fn mul_rounded(&self, other: Wad, rounding: Rounding) -> Result<Wad, MathError> {
        mul_div(self.0, other.0, WAD, rounding).map(Wad)
    }

    pub fn div(&self, other: Wad) -> Result<Wad, MathError> {
        self.div_rounded(other, Rounding::HalfUp)
    }

    pub fn div_rounded(&self, other: Wad, rounding: Rounding) -> Result<Wad, MathError> {
        mul_div(self.0, WAD, other.0, rounding).map(Wad)
    }

    pub fn to_ray(&self) -> Result<Ray, MathError> {
        self.0
            .checked_mul(WAD_RAY_RATIO)
            .map(Ray)
            .ok_or(MathError::Overflow)
    }
}

impl fmt::Display for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_max() {
            write!(f, "inf")
        } else {
            write!(f, "{}", self.to_decimal())
        }
    }
}
