//! Value formatting for printed documents
//!
//! Dates use `dd/mm/yyyy HH:MM` in one fixed timezone; numbers use a comma
//! decimal separator and space thousands grouping.

use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use rust_decimal::Decimal;

/// `dd/mm/yyyy HH:MM` in `tz`
pub fn format_datetime<T: TimeZone>(at: &DateTime<T>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%d/%m/%Y %H:%M").to_string()
}

/// `dd/mm/yyyy` in `tz`
pub fn format_date<T: TimeZone>(at: &DateTime<T>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%d/%m/%Y").to_string()
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(c);
    }
    grouped
}

/// Fixed `places` decimals, e.g. `1 234,50`
pub fn format_decimal(value: Decimal, places: u32) -> String {
    let rounded = value.round_dp(places);
    let text = format!("{:.*}", places as usize, rounded.abs());
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };

    let mut out = String::new();
    if rounded.is_sign_negative() && !rounded.is_zero() {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part));
    if let Some(frac) = frac_part {
        out.push(',');
        out.push_str(frac);
    }
    out
}

/// `1 234,50 EUR`; `default_currency` when the record has none
pub fn format_amount(value: Decimal, currency: Option<&str>, default_currency: &str) -> String {
    let code = currency
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(default_currency);
    format!("{} {}", format_decimal(value, 2), code.to_uppercase())
}

/// `-18 °C`, `2,5 °C`
pub fn format_temperature(value: Decimal) -> String {
    let normalized = value.normalize();
    let places = normalized.scale().min(1);
    format!("{} °C", format_decimal(normalized, places))
}

/// `1 520,5 kg`; trailing zeros dropped
pub fn format_weight(value: Decimal) -> String {
    let normalized = value.round_dp(2).normalize();
    format!("{} kg", format_decimal(normalized, normalized.scale()))
}
