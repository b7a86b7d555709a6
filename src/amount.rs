//! Decimal amount text <-> smallest-unit integers.
//!
//! Every amount that crosses a text boundary (CLI arguments, node JSON)
//! goes through [`parse_amount`]. Precision loss is an error, never a
//! rounding decision.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("amount {0:?} is not a plain decimal number")]
    NotDecimal(String),

    #[error("amount {text:?} has more than {max_precision} significant decimal places")]
    TooPrecise { text: String, max_precision: u32 },

    #[error("amount {0:?} does not fit in 64 bits")]
    Overflow(String),
}

/// Converts `text` into units of `10^-decimals`.
///
/// At most `max_precision` significant fractional digits are accepted;
/// trailing zeros do not count. `max_precision` must not exceed `decimals`.
pub fn parse_amount(text: &str, decimals: u32, max_precision: u32) -> Result<u64, AmountError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AmountError::Empty);
    }

    let (whole, fraction) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if whole.is_empty()
        || !all_digits(whole)
        || !all_digits(fraction)
        || (text.contains('.') && fraction.is_empty())
    {
        return Err(AmountError::NotDecimal(text.to_string()));
    }

    let significant = fraction.trim_end_matches('0');
    let limit = max_precision.min(decimals);
    if significant.len() as u32 > limit {
        return Err(AmountError::TooPrecise {
            text: text.to_string(),
            max_precision: limit,
        });
    }

    let overflow = || AmountError::Overflow(text.to_string());
    let scale = 10u64.checked_pow(decimals).ok_or_else(overflow)?;
    let whole_units: u64 = whole.parse().map_err(|_| overflow())?;

    let mut fraction_units: u64 = 0;
    for digit in significant.bytes() {
        fraction_units = fraction_units * 10 + u64::from(digit - b'0');
    }
    fraction_units *= 10u64.pow(decimals - significant.len() as u32);

    whole_units
        .checked_mul(scale)
        .and_then(|v| v.checked_add(fraction_units))
        .ok_or_else(overflow)
}

/// Renders `value` with exactly `decimals` fractional digits.
pub fn format_amount(value: u64, decimals: u32) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let scale = 10u64.pow(decimals);
    format!(
        "{}.{:0width$}",
        value / scale,
        value % scale,
        width = decimals as usize
    )
}
