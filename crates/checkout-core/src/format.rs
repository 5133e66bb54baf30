//! Display formatting for amounts

use rust_decimal::Decimal;

/// Group the integer part of an amount with spaces: `1234567.5` -> `1 234 567.5`
pub fn format_amount(amount: Decimal) -> String {
    let normalized = amount.normalize();
    let raw = normalized.abs().to_string();
    let (int_part, frac_part) = match raw.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (raw.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }

    let sign = if normalized.is_sign_negative() && !normalized.is_zero() { "-" } else { "" };
    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Format a string-typed price; unparsable input is returned unchanged
pub fn format_price(raw: &str) -> String {
    raw.trim()
        .parse::<Decimal>()
        .map_or_else(|_| raw.to_string(), format_amount)
}

/// Amount followed by its currency code
pub fn format_money(amount: Decimal, currency: &str) -> String {
    format!("{} {}", format_amount(amount), currency.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_thousands_grouping() {
        assert_eq!(format_amount(dec!(0)), "0");
        assert_eq!(format_amount(dec!(999)), "999");
        assert_eq!(format_amount(dec!(1030)), "1 030");
        assert_eq!(format_amount(dec!(1234567.50)), "1 234 567.5");
        assert_eq!(format_amount(dec!(-25000)), "-25 000");
    }

    #[test]
    fn test_string_prices() {
        assert_eq!(format_price("15000"), "15 000");
        assert_eq!(format_price(" 2500.75 "), "2 500.75");
        assert_eq!(format_price("free"), "free");
    }

    #[test]
    fn test_money() {
        assert_eq!(format_money(dec!(1030), "xof"), "1 030 XOF");
    }
}
