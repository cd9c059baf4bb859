//! Persistence seam for billing data.

use crate::models::{
    Company, CompanyInvoice, Invoice, PaymentStatus, RegistrationDetails, RegistrationStatus,
};
use async_trait::async_trait;
use service_core::error::AppError;
use uuid::Uuid;

/// Storage operations the billing services rely on.
///
/// Writes that must be atomic with each other are single calls: an invoice
/// update and the registration payment status it implies go through
/// [`BillingStore::update_invoice`] together. Implementations report unique
/// key clashes and stale revisions as [`AppError::Conflict`].
#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    async fn get_registration_details(
        &self,
        registration_id: Uuid,
    ) -> Result<Option<RegistrationDetails>, AppError>;

    async fn update_registration_status(
        &self,
        registration_id: Uuid,
        status: RegistrationStatus,
    ) -> Result<(), AppError>;

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError>;

    /// The version 1 invoice of a registration, if one exists.
    async fn find_original_invoice(
        &self,
        registration_id: Uuid,
    ) -> Result<Option<Invoice>, AppError>;

    /// The highest version invoice of a registration.
    async fn find_latest_invoice(
        &self,
        registration_id: Uuid,
    ) -> Result<Option<Invoice>, AppError>;

    async fn count_invoices(&self, registration_id: Uuid) -> Result<i64, AppError>;

    /// Highest version 1 serial number starting with `prefix`.
    async fn max_invoice_serial(&self, prefix: &str) -> Result<Option<String>, AppError>;

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<Invoice, AppError>;

    /// Persist `invoice` if its revision still matches the stored one and, in
    /// the same transaction, set the registration's payment status. Returns
    /// the stored invoice with its revision bumped.
    async fn update_invoice(
        &self,
        invoice: &Invoice,
        payment_status: Option<PaymentStatus>,
    ) -> Result<Invoice, AppError>;

    async fn get_company(&self, company_id: Uuid) -> Result<Option<Company>, AppError>;

    async fn max_company_serial(&self, prefix: &str) -> Result<Option<String>, AppError>;

    async fn insert_company_invoice(
        &self,
        invoice: &CompanyInvoice,
    ) -> Result<CompanyInvoice, AppError>;

    async fn get_company_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<Option<CompanyInvoice>, AppError>;

    /// Flip a pending company invoice to paid. Conflict if it is not pending.
    async fn mark_company_invoice_paid(
        &self,
        invoice: &CompanyInvoice,
    ) -> Result<CompanyInvoice, AppError>;
}
