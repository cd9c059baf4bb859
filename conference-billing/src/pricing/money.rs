//! Currency codes and rounding rules shared by the fee engine and the
//! e-invoice builder.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit of account. Only the USD/JOD pair is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Jod,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Jod => "JOD",
        }
    }

    /// Parse a stored currency code. "JD" and "JOD" are both accepted for the
    /// dinar, case-insensitively; anything else, including an empty code,
    /// is treated as USD.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "JD" | "JOD" => Currency::Jod,
            _ => Currency::Usd,
        }
    }

    pub fn is_jod(code: &str) -> bool {
        Self::from_code(code) == Currency::Jod
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round half away from zero to `dp` places.
pub fn round_to(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Round to cents.
pub fn round_money(value: Decimal) -> Decimal {
    round_to(value, 2)
}

/// Intermediate precision used for reverse-VAT arithmetic.
pub fn round_precise(value: Decimal) -> Decimal {
    round_to(value, 9)
}

/// Render with exactly three decimals (fils), as the e-invoice schema expects.
pub fn format_fils(value: Decimal) -> String {
    format!("{:.3}", round_to(value, 3))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_currency_parsing() {
        assert_eq!(Currency::from_code("JD"), Currency::Jod);
        assert_eq!(Currency::from_code("jod"), Currency::Jod);
        assert_eq!(Currency::from_code(" Jd "), Currency::Jod);
        assert_eq!(Currency::from_code("USD"), Currency::Usd);
        assert_eq!(Currency::from_code(""), Currency::Usd);
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        assert_eq!(round_money(dec!(2.345)), dec!(2.35));
        assert_eq!(round_money(dec!(-2.345)), dec!(-2.35));
        assert_eq!(round_money(dec!(2.344)), dec!(2.34));
    }

    #[test]
    fn test_format_fils_pads_and_rounds() {
        assert_eq!(format_fils(dec!(52.8)), "52.800");
        assert_eq!(format_fils(dec!(431.0344827586)), "431.034");
        assert_eq!(format_fils(dec!(0.0005)), "0.001");
        assert_eq!(format_fils(Decimal::ZERO), "0.000");
    }
}
