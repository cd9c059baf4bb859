//! Maps stored invoices onto e-invoice documents.

use super::{
    EInvoiceData, EInvoiceItem, FawaterkomCredentials, InvoiceKind, PaymentMethod,
    ReverseEInvoiceData, TransactionType,
};
use crate::config::FawaterkomConfig;
use crate::models::{FeeCategory, Invoice, PaymentSource, RegistrationDetails};
use crate::pricing::{Currency, PricingConfig};
use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::Secret;
use uuid::Uuid;

const ONLINE_ITEM_NAME: &str = "Conference Registration";

#[derive(Clone)]
pub struct EInvoiceMapper {
    seller: FawaterkomConfig,
    pricing: PricingConfig,
}

impl EInvoiceMapper {
    pub fn new(seller: FawaterkomConfig, pricing: PricingConfig) -> Self {
        Self { seller, pricing }
    }

    /// Company credentials, when the company has its own e-invoice account.
    pub fn credentials_for(&self, details: &RegistrationDetails) -> Option<FawaterkomCredentials> {
        let company = details.company.as_ref()?;
        match (
            company.fawaterkom_client_id.as_deref(),
            company.fawaterkom_secret_key.as_deref(),
        ) {
            (Some(id), Some(key)) if !id.is_empty() && !key.is_empty() => {
                Some(FawaterkomCredentials {
                    client_id: id.to_string(),
                    secret_key: Secret::new(key.to_string()),
                })
            }
            _ => None,
        }
    }

    /// Transaction number of the `sequence`-th document issued for an
    /// invoice: the serial itself first, then `-2`, `-3`... Credit notes
    /// carry an `R` before the counter.
    pub fn transaction_number(invoice: &Invoice, sequence: i32, credit_note: bool) -> String {
        match (credit_note, sequence) {
            (true, n) => format!("{}-R{}", invoice.serial_number, n),
            (false, n) if n <= 1 => invoice.serial_number.clone(),
            (false, n) => format!("{}-{}", invoice.serial_number, n),
        }
    }

    fn header(
        &self,
        invoice: &Invoice,
        details: &RegistrationDetails,
        sequence: i32,
        transaction_type: TransactionType,
    ) -> EInvoiceData {
        let payment_method = match invoice.payment_source {
            Some(PaymentSource::Online) => PaymentMethod::Receivable,
            _ => PaymentMethod::Cash,
        };
        EInvoiceData {
            transaction_number: Self::transaction_number(
                invoice,
                sequence,
                transaction_type == TransactionType::CreditNote,
            ),
            uuid: Uuid::new_v4().to_string(),
            transaction_date: Utc::now().date_naive(),
            transaction_type,
            payment_method,
            invoice_kind: InvoiceKind::GeneralSales,
            sequence,
            tax_number: self.seller.seller_tax_number.clone(),
            activity_number: self.seller.activity_number.clone(),
            client_name: self.seller.seller_name.clone(),
            buyer_name: details.registration.full_name(),
            buyer_tax_number: details.company.as_ref().and_then(|c| c.tax_number.clone()),
            city_code: self.seller.city_code.clone(),
            postal_code: self.seller.postal_code.clone(),
            currency: Currency::Jod.as_str().to_string(),
            total: Decimal::ZERO,
            total_discount: Decimal::ZERO,
            total_tax: Decimal::ZERO,
            special_tax: Decimal::ZERO,
            note: Some(format!("Conference registration {}", invoice.base_serial())),
            items: Vec::new(),
        }
    }

    /// Document reporting the given paid categories. `None` when none of
    /// them carries an amount.
    pub fn invoice_document(
        &self,
        invoice: &Invoice,
        details: &RegistrationDetails,
        categories: &[FeeCategory],
        sequence: i32,
    ) -> Option<EInvoiceData> {
        let mut data = self.header(invoice, details, sequence, TransactionType::Invoice);
        let mut total = Decimal::ZERO;
        for category in categories {
            let line = invoice.lines.get(*category);
            let total_incl = self.pricing.jd_from_usd(line.payable());
            if total_incl <= Decimal::ZERO {
                continue;
            }
            let discount_incl = self.pricing.jd_from_usd(line.effective_discount());
            data.items.push(EInvoiceItem::from_inclusive(
                category.label(),
                Decimal::ONE,
                total_incl,
                discount_incl,
                self.pricing.vat_percent,
            ));
            total += total_incl;
        }
        if data.items.is_empty() {
            return None;
        }
        data.total = total;
        data.sum_items();
        Some(data)
    }

    /// Single-line document for a payment collected online. `amount` is
    /// the gateway-reported figure in `currency`.
    pub fn online_document(
        &self,
        invoice: &Invoice,
        details: &RegistrationDetails,
        amount: Decimal,
        currency: Currency,
        sequence: i32,
    ) -> Option<EInvoiceData> {
        let total_incl = match currency {
            Currency::Jod => amount,
            Currency::Usd => self.pricing.jd_from_usd(amount),
        };
        if total_incl <= Decimal::ZERO {
            return None;
        }
        let mut data = self.header(invoice, details, sequence, TransactionType::Invoice);
        data.payment_method = PaymentMethod::Receivable;
        data.items.push(EInvoiceItem::from_inclusive(
            ONLINE_ITEM_NAME,
            Decimal::ONE,
            total_incl,
            Decimal::ZERO,
            self.pricing.vat_percent,
        ));
        data.total = total_incl;
        data.sum_items();
        Some(data)
    }

    /// Credit note refunding `refund_usd` against the last submission. `None`
    /// if nothing was submitted before or the refund is not positive.
    pub fn reversal_document(
        &self,
        invoice: &Invoice,
        details: &RegistrationDetails,
        refund_usd: Decimal,
        sequence: i32,
        reason: &str,
    ) -> Option<ReverseEInvoiceData> {
        let original_uuid = invoice.einvoice_uuid.clone()?;
        let original_number = invoice.einvoice_number.clone()?;
        let original_total = invoice.einvoice_total.unwrap_or(Decimal::ZERO);

        let refund_incl = self.pricing.jd_from_usd(refund_usd);
        if refund_incl <= Decimal::ZERO {
            return None;
        }
        let mut data = self.header(invoice, details, sequence, TransactionType::CreditNote);
        data.items.push(EInvoiceItem::from_inclusive(
            ONLINE_ITEM_NAME,
            Decimal::ONE,
            refund_incl,
            Decimal::ZERO,
            self.pricing.vat_percent,
        ));
        data.total = refund_incl;
        data.sum_items();

        Some(ReverseEInvoiceData {
            invoice: data,
            original_uuid,
            original_number,
            original_total,
            reason: reason.to_string(),
        })
    }
}
