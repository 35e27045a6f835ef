//! Amount conversion between decimal currency units and integer minor units
//!
//! Amounts are held as `i64` minor units (paise/cents) everywhere inside Recurbill.
//! Floating point only appears at the boundary where callers hand in a decimal amount.

use crate::error::{DomainError, DomainResult};

/// Minor units per major currency unit
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Convert a decimal amount (e.g. `499.99`) to minor units, rounding to the nearest unit
pub fn to_minor_units(amount: f64) -> DomainResult<i64> {
    if !amount.is_finite() {
        return Err(DomainError::InvalidAmount(format!("{} is not a finite number", amount)));
    }

    let scaled = (amount * MINOR_UNITS_PER_MAJOR as f64).round();
    if scaled.abs() >= i64::MAX as f64 {
        return Err(DomainError::InvalidAmount(format!("{} is too large", amount)));
    }

    Ok(scaled as i64)
}

/// Convert minor units back to a decimal amount for display
pub fn to_major_units(amount_minor: i64) -> f64 {
    amount_minor as f64 / MINOR_UNITS_PER_MAJOR as f64
}

/// Format minor units as a two-decimal string (`49999` -> `"499.99"`)
pub fn format_minor(amount_minor: i64) -> String {
    format!("{:.2}", to_major_units(amount_minor))
}
