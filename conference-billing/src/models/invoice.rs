//! Registration invoice model.

use crate::pricing::{round_money, FeeBreakdown};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The six chargeable categories of a registration invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeCategory {
    Participation,
    Spouse,
    Trip,
    SpouseTrip,
    AccommodationAmman,
    AccommodationDeadSea,
}

impl FeeCategory {
    pub const ALL: [FeeCategory; 6] = [
        FeeCategory::Participation,
        FeeCategory::Spouse,
        FeeCategory::Trip,
        FeeCategory::SpouseTrip,
        FeeCategory::AccommodationAmman,
        FeeCategory::AccommodationDeadSea,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeeCategory::Participation => "participation",
            FeeCategory::Spouse => "spouse",
            FeeCategory::Trip => "trip",
            FeeCategory::SpouseTrip => "spouse_trip",
            FeeCategory::AccommodationAmman => "accommodation_amman",
            FeeCategory::AccommodationDeadSea => "accommodation_dead_sea",
        }
    }

    /// Line description printed on PDFs and e-invoice items.
    pub fn label(&self) -> &'static str {
        match self {
            FeeCategory::Participation => "Participation Fees",
            FeeCategory::Spouse => "Spouse Fees",
            FeeCategory::Trip => "Trip Fees",
            FeeCategory::SpouseTrip => "Spouse Trip Fees",
            FeeCategory::AccommodationAmman => "Accommodation Amman",
            FeeCategory::AccommodationDeadSea => "Accommodation Dead Sea",
        }
    }
}

/// One category of an invoice. Amounts are in USD once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeLine {
    pub base_amount: Decimal,
    pub service_percent: Decimal,
    pub service_amount: Decimal,
    pub tax_percent: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub discount: Decimal,
    pub disclosure: Option<String>,
    pub paid: bool,
    /// Set once the paid amount of this line has been reported to the tax
    /// authority.
    #[serde(default)]
    pub reported: bool,
}

impl Default for FeeLine {
    fn default() -> Self {
        Self {
            base_amount: Decimal::ZERO,
            service_percent: Decimal::ZERO,
            service_amount: Decimal::ZERO,
            tax_percent: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            total: Decimal::ZERO,
            currency: "USD".to_string(),
            discount: Decimal::ZERO,
            disclosure: None,
            paid: false,
            reported: false,
        }
    }
}

impl FeeLine {
    /// Amount owed for this line after its discount, never negative.
    pub fn payable(&self) -> Decimal {
        (self.total - self.discount).max(Decimal::ZERO)
    }

    /// Discount actually applied; a discount larger than the line is capped.
    pub fn effective_discount(&self) -> Decimal {
        self.discount.min(self.total).max(Decimal::ZERO)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeeLines {
    pub participation: FeeLine,
    pub spouse: FeeLine,
    pub trip: FeeLine,
    pub spouse_trip: FeeLine,
    pub accommodation_amman: FeeLine,
    pub accommodation_dead_sea: FeeLine,
}

impl FeeLines {
    pub fn get(&self, category: FeeCategory) -> &FeeLine {
        match category {
            FeeCategory::Participation => &self.participation,
            FeeCategory::Spouse => &self.spouse,
            FeeCategory::Trip => &self.trip,
            FeeCategory::SpouseTrip => &self.spouse_trip,
            FeeCategory::AccommodationAmman => &self.accommodation_amman,
            FeeCategory::AccommodationDeadSea => &self.accommodation_dead_sea,
        }
    }

    pub fn get_mut(&mut self, category: FeeCategory) -> &mut FeeLine {
        match category {
            FeeCategory::Participation => &mut self.participation,
            FeeCategory::Spouse => &mut self.spouse,
            FeeCategory::Trip => &mut self.trip,
            FeeCategory::SpouseTrip => &mut self.spouse_trip,
            FeeCategory::AccommodationAmman => &mut self.accommodation_amman,
            FeeCategory::AccommodationDeadSea => &mut self.accommodation_dead_sea,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeeCategory, &FeeLine)> {
        FeeCategory::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    pub fn total_fees(&self) -> Decimal {
        self.iter().map(|(_, l)| l.total).sum()
    }

    pub fn total_discount(&self) -> Decimal {
        self.iter().map(|(_, l)| l.discount).sum()
    }

    /// Sum of the payable amounts of paid lines.
    pub fn paid_amount(&self) -> Decimal {
        self.iter()
            .filter(|(_, l)| l.paid)
            .map(|(_, l)| l.payable())
            .sum()
    }

    /// Paid lines not yet reported to the tax authority.
    pub fn unreported_paid(&self) -> Vec<FeeCategory> {
        self.iter()
            .filter(|(_, l)| l.paid && !l.reported)
            .map(|(c, _)| c)
            .collect()
    }

    /// Lines that actually carry a charge.
    pub fn charged(&self) -> Vec<FeeCategory> {
        self.iter()
            .filter(|(_, l)| l.total > Decimal::ZERO)
            .map(|(c, _)| c)
            .collect()
    }
}

/// How an invoice was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentSource {
    Online,
    System,
}

impl PaymentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentSource::Online => "ONLINE",
            PaymentSource::System => "SYSTEM",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "ONLINE" => PaymentSource::Online,
            _ => PaymentSource::System,
        }
    }
}

/// Outcome of the last e-invoice interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FawaterkomStatus {
    Submitted,
    Failed,
    Reversed,
}

impl FawaterkomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FawaterkomStatus::Submitted => "SUBMITTED",
            FawaterkomStatus::Failed => "FAILED",
            FawaterkomStatus::Reversed => "REVERSED",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "SUBMITTED" => FawaterkomStatus::Submitted,
            "REVERSED" => FawaterkomStatus::Reversed,
            _ => FawaterkomStatus::Failed,
        }
    }
}

/// Invoice document for a registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub registration_id: Uuid,
    pub serial_number: String,
    pub version: i32,
    /// Optimistic concurrency token, bumped on every write.
    pub revision: i64,
    pub lines: FeeLines,
    pub total_fees: Decimal,
    pub total_discount: Decimal,
    pub total_value_usd: Decimal,
    pub total_value_jd: Decimal,
    pub exchange_rate: Decimal,
    pub paid_amount: Decimal,
    pub balance: Decimal,
    pub paid_currency: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_source: Option<PaymentSource>,
    pub fawaterkom_invoice_id: Option<String>,
    pub fawaterkom_status: Option<FawaterkomStatus>,
    pub einvoice_uuid: Option<String>,
    pub einvoice_number: Option<String>,
    pub einvoice_total: Option<Decimal>,
    /// Number of e-invoices and credit notes issued for this invoice.
    pub einvoice_sequence: i32,
    pub qr_code: Option<String>,
    pub verification_url: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Invoice {
    /// Fresh, unpaid invoice from a fee breakdown.
    pub fn issue(
        registration_id: Uuid,
        serial_number: String,
        version: i32,
        fees: FeeBreakdown,
    ) -> Self {
        let now = Utc::now();
        Self {
            invoice_id: Uuid::new_v4(),
            registration_id,
            serial_number,
            version,
            revision: 0,
            lines: fees.lines,
            total_fees: fees.total_fees,
            total_discount: fees.total_discount,
            total_value_usd: fees.total_value_usd,
            total_value_jd: fees.total_value_jd,
            exchange_rate: fees.exchange_rate,
            paid_amount: Decimal::ZERO,
            balance: fees.total_value_usd,
            paid_currency: None,
            paid_at: None,
            payment_source: None,
            fawaterkom_invoice_id: None,
            fawaterkom_status: None,
            einvoice_uuid: None,
            einvoice_number: None,
            einvoice_total: None,
            einvoice_sequence: 0,
            qr_code: None,
            verification_url: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Recompute the aggregates from the category lines.
    pub fn recompute_totals(&mut self) {
        self.total_fees = round_money(self.lines.total_fees());
        self.total_discount = round_money(self.lines.total_discount());
        self.total_value_usd = round_money(self.total_fees - self.total_discount);
        self.total_value_jd = round_money(self.total_value_usd * self.exchange_rate);
        self.paid_amount = round_money(self.lines.paid_amount());
        self.balance = round_money(self.total_fees - self.total_discount - self.paid_amount);
    }

    /// Registration number `G260001` with the version suffix stripped.
    pub fn base_serial(&self) -> &str {
        self.serial_number
            .split_once('/')
            .map_or(self.serial_number.as_str(), |(base, _)| base)
    }
}
