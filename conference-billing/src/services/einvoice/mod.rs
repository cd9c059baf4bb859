//! National e-invoicing (Fawaterkom / JoFotara): document model, UBL 2.1
//! builder and gateway client.

pub mod client;
pub mod mapping;
pub mod ubl;

pub use client::{EInvoiceGateway, FawaterkomClient, FawaterkomCredentials, SubmissionResult};
pub use mapping::EInvoiceMapper;
pub use ubl::{build_invoice_xml, build_reversal_xml, document_totals, DocumentTotals};

use crate::pricing::round_precise;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Document type; serialized as the numeric code used by the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Invoice,
    CreditNote,
    DebitNote,
}

impl TransactionType {
    pub fn code(&self) -> u8 {
        match self {
            TransactionType::Invoice => 1,
            TransactionType::CreditNote => 2,
            TransactionType::DebitNote => 3,
        }
    }

    /// UBL `InvoiceTypeCode` value.
    pub fn type_code(&self) -> &'static str {
        match self {
            TransactionType::Invoice => "388",
            TransactionType::CreditNote => "381",
            TransactionType::DebitNote => "383",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    Receivable,
}

impl PaymentMethod {
    pub fn code(&self) -> u8 {
        match self {
            PaymentMethod::Cash => 1,
            PaymentMethod::Receivable => 2,
        }
    }
}

/// Tax-authority classification of the seller's invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceKind {
    Income,
    GeneralSales,
    SpecialSales,
}

impl InvoiceKind {
    pub fn code(&self) -> u8 {
        match self {
            InvoiceKind::Income => 1,
            InvoiceKind::GeneralSales => 2,
            InvoiceKind::SpecialSales => 3,
        }
    }
}

/// `InvoiceTypeCode@name`: `0`, payment method, invoice kind. `012` is a
/// cash general-sales invoice.
pub fn type_code_name(method: PaymentMethod, kind: InvoiceKind) -> String {
    format!("0{}{}", method.code(), kind.code())
}

/// One line of an e-invoice, with the tax already backed out of the
/// inclusive amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EInvoiceItem {
    pub item_name: String,
    pub item_qty: Decimal,
    /// Unit price before discount and tax.
    pub item_sale_price_exc: Decimal,
    pub item_disc_exc: Decimal,
    /// Line amount after discount, before tax.
    pub item_total: Decimal,
    pub item_tax: Decimal,
    /// Percentage, e.g. 16.
    pub item_tax_rate: Decimal,
}

impl EInvoiceItem {
    /// Derive an item from tax-inclusive amounts.
    pub fn from_inclusive(
        name: impl Into<String>,
        qty: Decimal,
        total_incl: Decimal,
        discount_incl: Decimal,
        tax_percent: Decimal,
    ) -> Self {
        let rate = tax_percent / Decimal::ONE_HUNDRED;
        let divisor = Decimal::ONE + rate;
        let total_exc = round_precise(total_incl / divisor);
        let discount_exc = round_precise(discount_incl / divisor);
        let line_price_exc = round_precise(total_exc + discount_exc);
        let qty = if qty > Decimal::ZERO { qty } else { Decimal::ONE };

        Self {
            item_name: name.into(),
            item_qty: qty,
            item_sale_price_exc: round_precise(line_price_exc / qty),
            item_disc_exc: discount_exc,
            item_total: total_exc,
            item_tax: round_precise(total_exc * rate),
            item_tax_rate: tax_percent,
        }
    }

    /// Pre-discount line amount.
    pub fn line_price_exc(&self) -> Decimal {
        round_precise(self.item_sale_price_exc * self.item_qty)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EInvoiceData {
    pub transaction_number: String,
    pub uuid: String,
    pub transaction_date: NaiveDate,
    pub transaction_type: TransactionType,
    pub payment_method: PaymentMethod,
    pub invoice_kind: InvoiceKind,
    /// Invoice counter value reported as the `ICV` document reference.
    pub sequence: i32,
    pub tax_number: String,
    pub activity_number: String,
    pub client_name: String,
    pub buyer_name: String,
    pub buyer_tax_number: Option<String>,
    pub city_code: String,
    pub postal_code: String,
    pub currency: String,
    /// Tax-inclusive amount actually paid.
    pub total: Decimal,
    pub total_discount: Decimal,
    pub total_tax: Decimal,
    pub special_tax: Decimal,
    pub note: Option<String>,
    pub items: Vec<EInvoiceItem>,
}

impl EInvoiceData {
    /// Refresh the document totals from the items.
    pub fn sum_items(&mut self) {
        self.total_discount = self.items.iter().map(|i| i.item_disc_exc).sum();
        self.total_tax = self.items.iter().map(|i| i.item_tax).sum();
    }
}

/// Credit note offsetting an earlier submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseEInvoiceData {
    pub invoice: EInvoiceData,
    pub original_uuid: String,
    pub original_number: String,
    /// Tax-inclusive total of the original submission.
    pub original_total: Decimal,
    pub reason: String,
}
