//! In-process [`BillingStore`] used for local runs and tests.

use super::store::BillingStore;
use crate::models::{
    Company, CompanyInvoice, CompanyInvoiceStatus, Invoice, PaymentStatus, RegistrationDetails,
    RegistrationStatus,
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use service_core::error::AppError;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    registrations: HashMap<Uuid, RegistrationDetails>,
    companies: HashMap<Uuid, Company>,
    invoices: HashMap<Uuid, Invoice>,
    company_invoices: HashMap<Uuid, CompanyInvoice>,
}

/// Enforces the same unique keys and revision checks as the Postgres store.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_registration(&self, details: RegistrationDetails) {
        let mut tables = self.tables.write().await;
        if let Some(company) = &details.company {
            tables.companies.insert(company.id, company.clone());
        }
        tables
            .registrations
            .insert(details.registration.id, details);
    }

    pub async fn insert_company(&self, company: Company) {
        self.tables
            .write()
            .await
            .companies
            .insert(company.id, company);
    }

    pub async fn invoices_for(&self, registration_id: Uuid) -> Vec<Invoice> {
        let tables = self.tables.read().await;
        let mut invoices: Vec<Invoice> = tables
            .invoices
            .values()
            .filter(|i| i.registration_id == registration_id)
            .cloned()
            .collect();
        invoices.sort_by_key(|i| i.version);
        invoices
    }
}

fn max_serial<'a>(serials: impl Iterator<Item = &'a str>, prefix: &str) -> Option<String> {
    serials
        .filter(|s| s.starts_with(prefix) && !s.contains('/'))
        .max_by_key(|s| (s.len(), *s))
        .map(str::to_string)
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn get_registration_details(
        &self,
        registration_id: Uuid,
    ) -> Result<Option<RegistrationDetails>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .registrations
            .get(&registration_id)
            .cloned())
    }

    async fn update_registration_status(
        &self,
        registration_id: Uuid,
        status: RegistrationStatus,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let details = tables
            .registrations
            .get_mut(&registration_id)
            .ok_or_else(|| AppError::NotFound(anyhow!("Registration {} not found", registration_id)))?;
        details.registration.status = status;
        Ok(())
    }

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        Ok(self.tables.read().await.invoices.get(&invoice_id).cloned())
    }

    async fn find_original_invoice(
        &self,
        registration_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .invoices
            .values()
            .find(|i| i.registration_id == registration_id && i.version == 1)
            .cloned())
    }

    async fn find_latest_invoice(
        &self,
        registration_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .invoices
            .values()
            .filter(|i| i.registration_id == registration_id)
            .max_by_key(|i| i.version)
            .cloned())
    }

    async fn count_invoices(&self, registration_id: Uuid) -> Result<i64, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .invoices
            .values()
            .filter(|i| i.registration_id == registration_id)
            .count() as i64)
    }

    async fn max_invoice_serial(&self, prefix: &str) -> Result<Option<String>, AppError> {
        let tables = self.tables.read().await;
        Ok(max_serial(
            tables.invoices.values().map(|i| i.serial_number.as_str()),
            prefix,
        ))
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<Invoice, AppError> {
        let mut tables = self.tables.write().await;
        let clash = tables.invoices.values().any(|existing| {
            existing.serial_number == invoice.serial_number
                || (existing.registration_id == invoice.registration_id
                    && existing.version == invoice.version)
        });
        if clash {
            return Err(AppError::Conflict(anyhow!(
                "Invoice {} (version {}) already exists",
                invoice.serial_number,
                invoice.version
            )));
        }
        tables.invoices.insert(invoice.invoice_id, invoice.clone());
        Ok(invoice.clone())
    }

    async fn update_invoice(
        &self,
        invoice: &Invoice,
        payment_status: Option<PaymentStatus>,
    ) -> Result<Invoice, AppError> {
        let mut tables = self.tables.write().await;
        let stored_revision = tables
            .invoices
            .get(&invoice.invoice_id)
            .map(|i| i.revision)
            .ok_or_else(|| AppError::NotFound(anyhow!("Invoice {} not found", invoice.invoice_id)))?;
        if stored_revision != invoice.revision {
            return Err(AppError::Conflict(anyhow!(
                "Invoice {} was modified concurrently",
                invoice.invoice_id
            )));
        }

        if let Some(status) = payment_status {
            let details = tables
                .registrations
                .get_mut(&invoice.registration_id)
                .ok_or_else(|| {
                    AppError::NotFound(anyhow!(
                        "Registration {} not found",
                        invoice.registration_id
                    ))
                })?;
            details.registration.payment_status = status;
        }

        let mut updated = invoice.clone();
        updated.revision += 1;
        updated.updated_utc = Utc::now();
        tables.invoices.insert(updated.invoice_id, updated.clone());
        Ok(updated)
    }

    async fn get_company(&self, company_id: Uuid) -> Result<Option<Company>, AppError> {
        Ok(self.tables.read().await.companies.get(&company_id).cloned())
    }

    async fn max_company_serial(&self, prefix: &str) -> Result<Option<String>, AppError> {
        let tables = self.tables.read().await;
        Ok(max_serial(
            tables
                .company_invoices
                .values()
                .map(|i| i.serial_number.as_str()),
            prefix,
        ))
    }

    async fn insert_company_invoice(
        &self,
        invoice: &CompanyInvoice,
    ) -> Result<CompanyInvoice, AppError> {
        let mut tables = self.tables.write().await;
        if tables
            .company_invoices
            .values()
            .any(|i| i.serial_number == invoice.serial_number)
        {
            return Err(AppError::Conflict(anyhow!(
                "Company invoice {} already exists",
                invoice.serial_number
            )));
        }
        tables
            .company_invoices
            .insert(invoice.invoice_id, invoice.clone());
        Ok(invoice.clone())
    }

    async fn get_company_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<Option<CompanyInvoice>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .company_invoices
            .get(&invoice_id)
            .cloned())
    }

    async fn mark_company_invoice_paid(
        &self,
        invoice: &CompanyInvoice,
    ) -> Result<CompanyInvoice, AppError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .company_invoices
            .get_mut(&invoice.invoice_id)
            .ok_or_else(|| {
                AppError::NotFound(anyhow!("Company invoice {} not found", invoice.invoice_id))
            })?;
        if stored.status != CompanyInvoiceStatus::Pending {
            return Err(AppError::Conflict(anyhow!(
                "Company invoice {} is already paid",
                stored.serial_number
            )));
        }
        stored.status = CompanyInvoiceStatus::Paid;
        stored.payment_reference = invoice.payment_reference.clone();
        stored.paid_at = invoice.paid_at;
        Ok(stored.clone())
    }
}
