//! Invoices billed straight to a company (`C26NNNN`).

use super::invoices::next_serial;
use super::metrics::INVOICES_TOTAL;
use super::store::BillingStore;
use crate::models::{CompanyInvoice, CompanyInvoiceStatus, CreateCompanyInvoice};
use crate::pricing::{round_money, Currency, PricingConfig};
use anyhow::anyhow;
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const MAX_SERIAL_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct CompanyInvoiceService {
    store: Arc<dyn BillingStore>,
    pricing: PricingConfig,
}

impl CompanyInvoiceService {
    pub fn new(store: Arc<dyn BillingStore>, pricing: PricingConfig) -> Self {
        Self { store, pricing }
    }

    #[instrument(skip(self, request), fields(company_id = %request.company_id))]
    pub async fn create(&self, request: CreateCompanyInvoice) -> Result<CompanyInvoice, AppError> {
        if request.amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow!("Amount must be positive")));
        }
        self.store
            .get_company(request.company_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("Company {} not found", request.company_id)))?;

        let amount = round_money(request.amount);
        let (amount_jd, amount_usd) = match Currency::from_code(&request.currency) {
            Currency::Jod => (amount, self.pricing.usd_from_jd(amount)),
            Currency::Usd => (self.pricing.jd_from_usd(amount), amount),
        };

        let prefix = &self.pricing.company_serial_prefix;
        for attempt in 1..=MAX_SERIAL_ATTEMPTS {
            let current = self.store.max_company_serial(prefix).await?;
            let invoice = CompanyInvoice {
                invoice_id: Uuid::new_v4(),
                company_id: request.company_id,
                serial_number: next_serial(prefix, current.as_deref())?,
                description: request.description.clone(),
                amount_jd,
                amount_usd,
                exchange_rate: self.pricing.exchange_rate,
                status: CompanyInvoiceStatus::Pending,
                payment_reference: None,
                paid_at: None,
                created_utc: Utc::now(),
            };

            match self.store.insert_company_invoice(&invoice).await {
                Ok(saved) => {
                    INVOICES_TOTAL.with_label_values(&["company"]).inc();
                    info!(serial_number = %saved.serial_number, amount_jd = %saved.amount_jd, "Company invoice created");
                    return Ok(saved);
                }
                Err(e) if e.is_conflict() => {
                    warn!(attempt, serial = %invoice.serial_number, "Company serial taken, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Conflict(anyhow!(
            "Could not allocate a company invoice serial after {} attempts",
            MAX_SERIAL_ATTEMPTS
        )))
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn mark_paid(
        &self,
        invoice_id: Uuid,
        payment_reference: Option<String>,
    ) -> Result<CompanyInvoice, AppError> {
        let mut invoice = self.get(invoice_id).await?;
        if invoice.status == CompanyInvoiceStatus::Paid {
            return Err(AppError::Conflict(anyhow!(
                "Company invoice {} is already paid",
                invoice.serial_number
            )));
        }
        invoice.status = CompanyInvoiceStatus::Paid;
        invoice.payment_reference = payment_reference;
        invoice.paid_at = Some(Utc::now());
        let saved = self.store.mark_company_invoice_paid(&invoice).await?;
        info!(serial_number = %saved.serial_number, "Company invoice paid");
        Ok(saved)
    }

    pub async fn get(&self, invoice_id: Uuid) -> Result<CompanyInvoice, AppError> {
        self.store
            .get_company_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("Company invoice {} not found", invoice_id)))
    }
}
