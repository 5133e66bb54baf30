//! Supported countries
//!
//! Markets the checkout form knows about, with the dial code prefilled in the
//! phone field and the local currency.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Country {
    /// ISO 3166-1 alpha-2
    pub code: &'static str,
    pub name: &'static str,
    pub dial_code: &'static str,
    pub currency: &'static str,
}

const fn country(code: &'static str, name: &'static str, dial_code: &'static str, currency: &'static str) -> Country {
    Country {
        code,
        name,
        dial_code,
        currency,
    }
}

/// Fallback when detection fails
pub const DEFAULT_COUNTRY: Country = country("CI", "Côte d'Ivoire", "+225", "XOF");

pub const COUNTRIES: &[Country] = &[
    country("BJ", "Benin", "+229", "XOF"),
    country("BF", "Burkina Faso", "+226", "XOF"),
    DEFAULT_COUNTRY,
    country("GW", "Guinea-Bissau", "+245", "XOF"),
    country("ML", "Mali", "+223", "XOF"),
    country("NE", "Niger", "+227", "XOF"),
    country("SN", "Senegal", "+221", "XOF"),
    country("TG", "Togo", "+228", "XOF"),
    country("CM", "Cameroon", "+237", "XAF"),
    country("CF", "Central African Republic", "+236", "XAF"),
    country("TD", "Chad", "+235", "XAF"),
    country("CG", "Congo", "+242", "XAF"),
    country("GA", "Gabon", "+241", "XAF"),
    country("GQ", "Equatorial Guinea", "+240", "XAF"),
    country("GN", "Guinea", "+224", "GNF"),
    country("CD", "DR Congo", "+243", "CDF"),
    country("GH", "Ghana", "+233", "GHS"),
    country("NG", "Nigeria", "+234", "NGN"),
    country("KE", "Kenya", "+254", "KES"),
    country("RW", "Rwanda", "+250", "RWF"),
    country("UG", "Uganda", "+256", "UGX"),
    country("MA", "Morocco", "+212", "MAD"),
    country("FR", "France", "+33", "EUR"),
    country("BE", "Belgium", "+32", "EUR"),
    country("US", "United States", "+1", "USD"),
    country("CA", "Canada", "+1", "CAD"),
];

/// Look up a supported country by ISO code (case-insensitive)
pub fn find(code: &str) -> Option<&'static Country> {
    let code = code.trim();
    COUNTRIES.iter().find(|c| c.code.eq_ignore_ascii_case(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let ci = find("ci").unwrap();
        assert_eq!(ci.dial_code, "+225");
        assert_eq!(ci.currency, "XOF");
        assert!(find("ZZ").is_none());
        assert!(find("").is_none());
    }

    #[test]
    fn test_codes_are_unique() {
        for (i, a) in COUNTRIES.iter().enumerate() {
            assert!(COUNTRIES[i + 1..].iter().all(|b| b.code != a.code), "duplicate {}", a.code);
        }
    }
}
