//! Fixed-point asset amounts.
//!
//! User input arrives as decimal text ("1.5", "0.00000001", "2e-3") and is
//! converted to integer base units without ever going through a float. A value
//! that would need a fractional base unit is rejected rather than rounded.
#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::fmt;

/// Decimal places of the funding asset (1 whole unit = 10^8 base units).
pub const DEFAULT_DECIMALS: u32 = 8;

/// Largest supported `decimals` value (10^38 still fits in a `u128`).
pub const MAX_DECIMALS: u32 = 38;

/// Amount in the smallest integer denomination of the funding asset.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BaseUnits(pub u128);

impl BaseUnits {
    pub const ZERO: BaseUnits = BaseUnits(0);

    pub const fn get(self) -> u128 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Render as a decimal string with trailing fractional zeros removed.
    ///
    /// `decimals` above [`MAX_DECIMALS`] is clamped.
    pub fn to_decimal_string(self, decimals: u32) -> String {
        let decimals = decimals.min(MAX_DECIMALS);
        let factor = 10u128.pow(decimals);
        let whole = self.0 / factor;
        let frac = self.0 % factor;
        if frac == 0 {
            return whole.to_string();
        }
        let width = decimals as usize;
        let frac = format!("{frac:0width$}");
        format!("{whole}.{}", frac.trim_end_matches('0'))
    }
}

impl fmt::Display for BaseUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("not a decimal number: {0:?}")]
    NotANumber(String),
    #[error("amount must be greater than zero")]
    NonPositive,
    #[error("amount is not a whole number of base units ({decimals} decimals)")]
    SubUnitPrecision { decimals: u32 },
    #[error("amount is too large")]
    Overflow,
    #[error("unsupported decimals: {0}")]
    UnsupportedDecimals(u32),
}

/// Parse a positive decimal string into base units scaled by `10^decimals`.
///
/// Accepted syntax: optional sign, digits with an optional fractional part,
/// and an optional `e`/`E` exponent. Leading/trailing whitespace is ignored.
pub fn parse_decimal(input: &str, decimals: u32) -> Result<BaseUnits, AmountError> {
    if decimals > MAX_DECIMALS {
        return Err(AmountError::UnsupportedDecimals(decimals));
    }
    let s = input.trim();
    if s.is_empty() {
        return Err(AmountError::Empty);
    }
    let not_a_number = || AmountError::NotANumber(s.to_string());

    let (negative, body) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(i) => {
            let exp: i64 = body[i + 1..].parse().map_err(|_| not_a_number())?;
            (&body[..i], exp)
        }
        None => (body, 0),
    };

    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(not_a_number());
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(not_a_number());
    }

    let frac_len = i64::try_from(frac_part.len()).map_err(|_| AmountError::Overflow)?;
    let mut scale = i64::from(decimals)
        .checked_add(exponent)
        .and_then(|v| v.checked_sub(frac_len))
        .ok_or(AmountError::Overflow)?;

    let joined = format!("{int_part}{frac_part}");
    let mut digits = joined.trim_start_matches('0');
    // Trailing zeros absorb a negative scale: "1.500000000" is still exact.
    while scale < 0 {
        match digits.strip_suffix('0') {
            Some(rest) => {
                digits = rest;
                scale += 1;
            }
            None => break,
        }
    }

    if digits.is_empty() || negative {
        return Err(AmountError::NonPositive);
    }
    if scale < 0 {
        return Err(AmountError::SubUnitPrecision { decimals });
    }

    let value: u128 = digits.parse().map_err(|_| AmountError::Overflow)?;
    let scale = u32::try_from(scale).map_err(|_| AmountError::Overflow)?;
    let factor = 10u128.checked_pow(scale).ok_or(AmountError::Overflow)?;
    value
        .checked_mul(factor)
        .map(BaseUnits)
        .ok_or(AmountError::Overflow)
}
