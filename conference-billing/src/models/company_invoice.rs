//! Company (sponsor/exhibitor) invoice model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompanyInvoiceStatus {
    Pending,
    Paid,
}

impl CompanyInvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyInvoiceStatus::Pending => "PENDING",
            CompanyInvoiceStatus::Paid => "PAID",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "PAID" => CompanyInvoiceStatus::Paid,
            _ => CompanyInvoiceStatus::Pending,
        }
    }
}

/// Invoice issued directly to a company, numbered `C26NNNN`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyInvoice {
    pub invoice_id: Uuid,
    pub company_id: Uuid,
    pub serial_number: String,
    pub description: String,
    pub amount_jd: Decimal,
    pub amount_usd: Decimal,
    pub exchange_rate: Decimal,
    pub status: CompanyInvoiceStatus,
    pub payment_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

/// Input for issuing a company invoice. The amount is given in one currency
/// and converted to the other.
#[derive(Debug, Clone)]
pub struct CreateCompanyInvoice {
    pub company_id: Uuid,
    pub description: String,
    pub amount: Decimal,
    pub currency: String,
}
