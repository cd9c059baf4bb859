//! Fee engine: turns a registration into a USD-normalized fee breakdown.

mod calculator;
mod money;

pub use calculator::{calculate_fees, FeeBreakdown};
pub use money::{format_fils, round_money, round_precise, round_to, Currency};

use anyhow::anyhow;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

/// Pricing parameters shared by the fee engine, invoice numbering and the
/// e-invoice builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Jordanian dinars per US dollar.
    pub exchange_rate: Decimal,
    /// Percentage added to participation and spouse fees.
    pub fees_tax_percent: Decimal,
    /// VAT percentage embedded in amounts reported on e-invoices.
    pub vat_percent: Decimal,
    pub invoice_serial_prefix: String,
    pub company_serial_prefix: String,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            exchange_rate: Decimal::new(71, 2),
            fees_tax_percent: Decimal::from(16),
            vat_percent: Decimal::from(16),
            invoice_serial_prefix: "G26".to_string(),
            company_serial_prefix: "C26".to_string(),
        }
    }
}

impl PricingConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.exchange_rate <= Decimal::ZERO {
            return Err(AppError::ConfigError(anyhow!(
                "Exchange rate must be positive, got {}",
                self.exchange_rate
            )));
        }
        if self.vat_percent < Decimal::ZERO || self.fees_tax_percent < Decimal::ZERO {
            return Err(AppError::ConfigError(anyhow!(
                "Tax percentages must not be negative"
            )));
        }
        if self.invoice_serial_prefix.is_empty() || self.company_serial_prefix.is_empty() {
            return Err(AppError::ConfigError(anyhow!(
                "Serial prefixes must not be empty"
            )));
        }
        Ok(())
    }

    /// Convert dinars to dollars, rounded to cents.
    pub fn usd_from_jd(&self, jd: Decimal) -> Decimal {
        if self.exchange_rate <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        round_money(jd / self.exchange_rate)
    }

    /// Convert dollars to dinars, rounded to cents.
    pub fn jd_from_usd(&self, usd: Decimal) -> Decimal {
        round_money(usd * self.exchange_rate)
    }

    /// VAT as a fraction, e.g. 0.16.
    pub fn vat_rate(&self) -> Decimal {
        self.vat_percent / Decimal::ONE_HUNDRED
    }
}
