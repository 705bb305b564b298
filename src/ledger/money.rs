// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Exact money handling.
//!
//! The ledger stores integer minor units (kobo) end to end; decimal amounts
//! only exist at the API boundary. Two decimal places, no floats anywhere.

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AmountParseError {
    #[error("amount must be a valid positive number")]
    Invalid,

    #[error("amount must have at most 2 decimal places")]
    TooPrecise,

    #[error("amount is too large")]
    Overflow,
}

/// Parse a decimal string (`"5000"`, `"25.50"`) into minor units.
///
/// Rejects empty strings, signs, more than two decimal places, and zero.
pub fn parse_amount_to_minor(amount: &str) -> Result<u64, AmountParseError> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(AmountParseError::Invalid);
    }

    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.len() > 2 {
        return Err(AmountParseError::Invalid);
    }

    let whole_part = parts[0];
    if whole_part.is_empty() || !whole_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(AmountParseError::Invalid);
    }

    let whole = whole_part
        .parse::<u64>()
        .map_err(|_| AmountParseError::Overflow)?;

    let fraction_part = if parts.len() == 2 { parts[1] } else { "" };
    if !fraction_part.chars().all(|c| c.is_ascii_digit()) || fraction_part.len() > 2 {
        return Err(AmountParseError::TooPrecise);
    }

    let fraction = if fraction_part.is_empty() {
        0
    } else if fraction_part.len() == 1 {
        fraction_part
            .parse::<u64>()
            .map_err(|_| AmountParseError::Invalid)?
            * 10
    } else {
        fraction_part
            .parse::<u64>()
            .map_err(|_| AmountParseError::Invalid)?
    };

    let minor = whole
        .checked_mul(100)
        .and_then(|base| base.checked_add(fraction))
        .ok_or(AmountParseError::Overflow)?;

    if minor == 0 {
        return Err(AmountParseError::Invalid);
    }

    Ok(minor)
}

/// Format minor units as a two-decimal string (`500000` → `"5000.00"`).
pub fn format_minor(minor: u64) -> String {
    format!("{}.{:02}", minor / 100, minor % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_amounts() {
        assert_eq!(parse_amount_to_minor("5000"), Ok(500_000));
        assert_eq!(parse_amount_to_minor("25.5"), Ok(2_550));
        assert_eq!(parse_amount_to_minor("25.50"), Ok(2_550));
        assert_eq!(parse_amount_to_minor(" 1.01 "), Ok(101));
    }

    #[test]
    fn rejects_non_positive_and_malformed() {
        assert_eq!(parse_amount_to_minor("0"), Err(AmountParseError::Invalid));
        assert_eq!(parse_amount_to_minor("0.00"), Err(AmountParseError::Invalid));
        assert_eq!(parse_amount_to_minor(""), Err(AmountParseError::Invalid));
        assert_eq!(parse_amount_to_minor("-5"), Err(AmountParseError::Invalid));
        assert_eq!(parse_amount_to_minor("1.2.3"), Err(AmountParseError::Invalid));
        assert_eq!(parse_amount_to_minor("abc"), Err(AmountParseError::Invalid));
    }

    #[test]
    fn rejects_too_many_decimals() {
        assert_eq!(
            parse_amount_to_minor("1.234"),
            Err(AmountParseError::TooPrecise)
        );
    }

    #[test]
    fn rejects_overflow() {
        assert_eq!(
            parse_amount_to_minor("999999999999999999999"),
            Err(AmountParseError::Overflow)
        );
    }

    #[test]
    fn formats_minor_units() {
        assert_eq!(format_minor(500_000), "5000.00");
        assert_eq!(format_minor(2_550), "25.50");
        assert_eq!(format_minor(101), "1.01");
        assert_eq!(format_minor(0), "0.00");
    }
}
