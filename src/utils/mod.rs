//! Utility functions for formatting and common operations
//!
//! This module provides centralized formatting utilities for consistent
//! display of amounts, percentages and metric cells throughout the application.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::metrics::MetricCell;

/// Placeholder shown for values that could not be computed
pub const NO_VALUE: &str = "-";

/// Core formatting function with full control over output.
///
/// Formats a Decimal value with `,` as thousands separator and `.` as
/// decimal separator, rounded half-up to `places` decimal places.
///
/// # Arguments
/// * `value` - The decimal value to format
/// * `places` - Number of decimal places
/// * `width` - Minimum width for padding (0 for no padding, right-aligned)
///
/// # Examples
/// ```
/// use perfana::utils::format_number_with_width;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_number_with_width(dec!(1234.567), 2, 0), "1,234.57");
/// assert_eq!(format_number_with_width(dec!(1234), 2, 12), "    1,234.00");
/// ```
pub fn format_number_with_width(value: Decimal, places: u32, width: usize) -> String {
    let rounded = value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
    let is_negative = rounded < Decimal::ZERO;
    let formatted = format!("{:.*}", places as usize, rounded.abs());
    let (integer_part, decimal_part) = match formatted.split_once('.') {
        Some((int, dec)) => (int.to_string(), Some(dec.to_string())),
        None => (formatted.clone(), None),
    };

    let with_separators: String = integer_part
        .chars()
        .rev()
        .enumerate()
        .flat_map(|(i, c)| {
            if i > 0 && i % 3 == 0 {
                vec![',', c]
            } else {
                vec![c]
            }
        })
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let sign = if is_negative { "-" } else { "" };
    let result = match decimal_part {
        Some(dec) => format!("{}{}.{}", sign, with_separators, dec),
        None => format!("{}{}", sign, with_separators),
    };

    if width > 0 && result.len() < width {
        format!("{:>width$}", result, width = width)
    } else {
        result
    }
}

// ============ Convenience functions ============

/// Amount with two decimal places: "1,234.56"
///
/// # Examples
/// ```
/// use perfana::utils::format_amount;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_amount(dec!(1234.56)), "1,234.56");
/// assert_eq!(format_amount(dec!(-500)), "-500.00");
/// ```
pub fn format_amount(value: Decimal) -> String {
    format_number_with_width(value, 2, 0)
}

/// A fraction shown as a percentage: "12.35%"
///
/// # Examples
/// ```
/// use perfana::utils::format_percent;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_percent(dec!(0.12345)), "12.35%");
/// assert_eq!(format_percent(dec!(-0.5)), "-50.00%");
/// ```
pub fn format_percent(value: Decimal) -> String {
    format!("{}%", format_number_with_width(value * Decimal::ONE_HUNDRED, 2, 0))
}

/// A ratio with four decimal places
pub fn format_ratio(value: Decimal) -> String {
    format_number_with_width(value, 4, 0)
}

/// A metric cell, with [`NO_VALUE`] when it has no value
pub fn format_cell(cell: &MetricCell, percent: bool) -> String {
    match cell {
        Ok(v) if percent => format_percent(*v),
        Ok(v) => format_ratio(*v),
        Err(_) => NO_VALUE.to_string(),
    }
}
