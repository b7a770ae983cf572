//! Decimal arithmetic helpers for money and stock quantities
//!
//! All calculations are done with `Decimal`. SQLite has no decimal column
//! type, so values are rounded and converted to `f64` at the storage
//! boundary and converted back on read.

use rust_decimal::prelude::*;

/// Money is kept to the cent
pub const MONEY_DECIMAL_PLACES: u32 = 2;

/// Unit costs and quantities keep four places (e.g. $5.00 / 12 units)
pub const PRECISE_DECIMAL_PLACES: u32 = 4;

/// Convert a stored `f64` back into a `Decimal`
#[inline]
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or_default()
        .round_dp(PRECISE_DECIMAL_PLACES)
}

/// Convert an optional stored `f64` into a `Decimal`
#[inline]
pub fn to_decimal_opt(value: Option<f64>) -> Option<Decimal> {
    value.map(to_decimal)
}

/// Round a money amount to cents, half away from zero
#[inline]
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a unit cost or quantity to four places
#[inline]
pub fn round_precise(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PRECISE_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a money amount to `f64` for storage
#[inline]
pub fn money_to_f64(value: Decimal) -> f64 {
    round_money(value).to_f64().unwrap_or_default()
}

/// Convert a unit cost or quantity to `f64` for storage
#[inline]
pub fn precise_to_f64(value: Decimal) -> f64 {
    round_precise(value).to_f64().unwrap_or_default()
}
