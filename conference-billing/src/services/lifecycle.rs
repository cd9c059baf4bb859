//! Admin invoice edits and e-invoice synchronisation.
//!
//! The database row is the source of truth. Discount and payment edits are
//! persisted first, together with the registration's payment status; the
//! e-invoice gateway is contacted afterwards and its outcome is recorded on
//! the invoice and returned to the caller. A gateway failure never rolls back
//! the edit: it leaves `fawaterkom_status = FAILED` for a manual resubmit.

use super::einvoice::{EInvoiceGateway, EInvoiceMapper, SubmissionResult};
use super::metrics::PAYMENT_AMOUNT_TOTAL;
use super::outbox::{BillingEvent, Outbox};
use super::store::BillingStore;
use crate::models::{
    FawaterkomStatus, FeeCategory, Invoice, PaymentSource, PaymentStatus, RegistrationDetails,
};
use crate::pricing::{round_money, Currency};
use anyhow::anyhow;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

const DEFAULT_REVERSAL_REASON: &str = "Overpayment correction";

/// Attempts at recording a gateway outcome when the row moved underneath.
const BOOKKEEPING_ATTEMPTS: usize = 3;

/// Edit of one fee category. Absent fields are left unchanged.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LineAdjustment {
    pub category: FeeCategory,
    pub discount: Option<Decimal>,
    #[validate(length(max = 500))]
    pub disclosure: Option<String>,
    pub paid: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct AdminInvoiceUpdate {
    #[serde(default)]
    #[validate(nested)]
    pub lines: Vec<LineAdjustment>,
    /// Revision the editor last saw; a mismatch is a conflict.
    pub expected_revision: Option<i64>,
    /// Queue a receipt email once the edit is saved.
    #[serde(default)]
    pub notify: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminSaveOutcome {
    pub success: bool,
    pub invoice: Invoice,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fawaterkom_result: Option<SubmissionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reversal_result: Option<SubmissionResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub invoice: Invoice,
    pub result: SubmissionResult,
}

/// Registration payment status implied by an invoice's totals. An overpaid
/// invoice counts as paid.
pub fn payment_status_for(invoice: &Invoice) -> PaymentStatus {
    if invoice.paid_amount <= Decimal::ZERO {
        PaymentStatus::Unpaid
    } else if invoice.balance <= Decimal::ZERO {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Partial
    }
}

/// Apply admin adjustments and recompute totals. Returns the categories that
/// went from unpaid to paid.
pub fn apply_adjustments(
    invoice: &mut Invoice,
    adjustments: &[LineAdjustment],
) -> Result<Vec<FeeCategory>, AppError> {
    let previously_paid: Vec<FeeCategory> = invoice
        .lines
        .iter()
        .filter(|(_, l)| l.paid)
        .map(|(c, _)| c)
        .collect();

    for adjustment in adjustments {
        let line = invoice.lines.get_mut(adjustment.category);
        if let Some(discount) = adjustment.discount {
            if discount < Decimal::ZERO {
                return Err(AppError::BadRequest(anyhow!(
                    "Discount for {} must not be negative",
                    adjustment.category.as_str()
                )));
            }
            line.discount = round_money(discount);
        }
        if let Some(disclosure) = &adjustment.disclosure {
            line.disclosure = Some(disclosure.trim().to_string()).filter(|d| !d.is_empty());
        }
        if let Some(paid) = adjustment.paid {
            line.paid = paid;
            if !paid {
                line.reported = false;
            }
        }
    }
    invoice.recompute_totals();

    Ok(invoice
        .lines
        .iter()
        .filter(|(c, l)| l.paid && !previously_paid.contains(c))
        .map(|(c, _)| c)
        .collect())
}

/// What a gateway call should leave behind on the invoice.
#[derive(Debug, Clone)]
struct Bookkeeping {
    status: FawaterkomStatus,
    sequence: i32,
    uuid: String,
    number: String,
    total: Decimal,
    reported: Vec<FeeCategory>,
    result: SubmissionResult,
}

impl Bookkeeping {
    fn apply(&self, invoice: &mut Invoice) {
        if !self.result.success {
            invoice.fawaterkom_status = Some(FawaterkomStatus::Failed);
            return;
        }
        invoice.fawaterkom_status = Some(self.status);
        invoice.einvoice_sequence = invoice.einvoice_sequence.max(self.sequence);
        if self.status == FawaterkomStatus::Submitted {
            invoice.einvoice_uuid = Some(self.uuid.clone());
            invoice.einvoice_number = Some(self.number.clone());
            invoice.einvoice_total = Some(self.total);
            invoice.fawaterkom_invoice_id = self.result.einvoice_uuid();
            if let Some(qr) = self.result.qr_code() {
                invoice.qr_code = Some(qr);
            }
            if let Some(url) = self.result.verification_url() {
                invoice.verification_url = Some(url);
            }
        }
        for category in &self.reported {
            invoice.lines.get_mut(*category).reported = true;
        }
    }
}

#[derive(Clone)]
pub struct InvoiceLifecycle {
    store: Arc<dyn BillingStore>,
    gateway: Arc<dyn EInvoiceGateway>,
    mapper: EInvoiceMapper,
    outbox: Outbox,
}

impl InvoiceLifecycle {
    pub fn new(
        store: Arc<dyn BillingStore>,
        gateway: Arc<dyn EInvoiceGateway>,
        mapper: EInvoiceMapper,
        outbox: Outbox,
    ) -> Self {
        Self {
            store,
            gateway,
            mapper,
            outbox,
        }
    }

    async fn load(&self, invoice_id: Uuid) -> Result<(Invoice, RegistrationDetails), AppError> {
        let invoice = self
            .store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("Invoice {} not found", invoice_id)))?;
        let details = self
            .store
            .get_registration_details(invoice.registration_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow!(
                    "Registration {} not found",
                    invoice.registration_id
                ))
            })?;
        Ok((invoice, details))
    }

    /// Save discounts, disclosures and paid flags, then bring the e-invoice
    /// up to date when a category was newly paid.
    #[instrument(skip(self, update), fields(invoice_id = %invoice_id))]
    pub async fn admin_save_invoice(
        &self,
        invoice_id: Uuid,
        update: AdminInvoiceUpdate,
    ) -> Result<AdminSaveOutcome, AppError> {
        update.validate()?;
        let (mut invoice, details) = self.load(invoice_id).await?;
        if let Some(expected) = update.expected_revision {
            if expected != invoice.revision {
                return Err(AppError::Conflict(anyhow!(
                    "Invoice {} was modified (revision {}, expected {})",
                    invoice.serial_number,
                    invoice.revision,
                    expected
                )));
            }
        }

        let previously_reported = invoice.paid_at.is_some();
        let newly_paid = apply_adjustments(&mut invoice, &update.lines)?;

        if invoice.paid_amount > Decimal::ZERO {
            invoice.paid_at.get_or_insert_with(Utc::now);
            invoice.paid_currency = Some(Currency::Jod.as_str().to_string());
            invoice.payment_source = Some(PaymentSource::System);
        }
        let payment_status = payment_status_for(&invoice);

        let mut saved = self
            .store
            .update_invoice(&invoice, Some(payment_status))
            .await?;
        info!(
            serial_number = %saved.serial_number,
            paid_amount = %saved.paid_amount,
            balance = %saved.balance,
            payment_status = payment_status.as_str(),
            newly_paid = newly_paid.len(),
            "Invoice saved"
        );

        let newly_paid_amount: Decimal = newly_paid
            .iter()
            .map(|c| saved.lines.get(*c).payable())
            .sum();
        if newly_paid_amount > Decimal::ZERO {
            PAYMENT_AMOUNT_TOTAL
                .with_label_values(&["USD", "system"])
                .inc_by(newly_paid_amount.to_f64().unwrap_or_default());
        }

        let mut fawaterkom_result = None;
        let mut reversal_result = None;
        if !newly_paid.is_empty() && saved.paid_amount > Decimal::ZERO {
            if previously_reported && saved.balance < Decimal::ZERO {
                let (invoice, result) = self
                    .reverse_saved(saved, &details, DEFAULT_REVERSAL_REASON)
                    .await?;
                saved = invoice;
                reversal_result = Some(result);
            }
            let categories = saved.lines.unreported_paid();
            let (invoice, result) = self.submit_categories(saved, &details, &categories).await?;
            saved = invoice;
            fawaterkom_result = result;
        }

        if update.notify {
            self.outbox.publish(BillingEvent::ReceiptRequested {
                invoice_id: saved.invoice_id,
            });
        }

        Ok(AdminSaveOutcome {
            success: true,
            invoice: saved,
            payment_status,
            fawaterkom_result,
            reversal_result,
        })
    }

    /// Report every paid category not yet reported. Used to retry after a
    /// failed submission.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn submit_to_fawaterkom(&self, invoice_id: Uuid) -> Result<SubmissionOutcome, AppError> {
        let (invoice, details) = self.load(invoice_id).await?;
        let categories = invoice.lines.unreported_paid();
        if categories.is_empty() {
            return Err(AppError::BadRequest(anyhow!(
                "Invoice {} has no paid amounts awaiting submission",
                invoice.serial_number
            )));
        }
        let serial_number = invoice.serial_number.clone();
        match self.submit_categories(invoice, &details, &categories).await? {
            (invoice, Some(result)) => Ok(SubmissionOutcome { invoice, result }),
            (_, None) => Err(AppError::BadRequest(anyhow!(
                "Invoice {} has no paid amounts awaiting submission",
                serial_number
            ))),
        }
    }

    /// Issue a credit note for an overpaid invoice. Returns a failed result
    /// without calling the gateway when there is nothing to refund.
    #[instrument(skip(self, reason), fields(invoice_id = %invoice_id))]
    pub async fn reverse_fawaterkom_invoice(
        &self,
        invoice_id: Uuid,
        reason: Option<String>,
    ) -> Result<SubmissionOutcome, AppError> {
        let (invoice, details) = self.load(invoice_id).await?;
        if invoice.balance >= Decimal::ZERO {
            return Ok(SubmissionOutcome {
                invoice,
                result: SubmissionResult::failed("Invoice is not overpaid; nothing to reverse"),
            });
        }
        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REVERSAL_REASON.to_string());
        let (invoice, result) = self.reverse_saved(invoice, &details, &reason).await?;
        Ok(SubmissionOutcome { invoice, result })
    }

    /// Report a payment collected through the hosted checkout as a single
    /// line, and mark every charged category reported on success.
    #[instrument(skip(self, invoice, details), fields(invoice_id = %invoice.invoice_id))]
    pub async fn submit_online_payment(
        &self,
        invoice: Invoice,
        details: &RegistrationDetails,
        amount: Decimal,
        currency: Currency,
    ) -> Result<SubmissionOutcome, AppError> {
        let sequence = invoice.einvoice_sequence + 1;
        let Some(data) = self
            .mapper
            .online_document(&invoice, details, amount, currency, sequence)
        else {
            return Ok(SubmissionOutcome {
                invoice,
                result: SubmissionResult::failed("Payment amount is zero; nothing to report"),
            });
        };

        let credentials = self.mapper.credentials_for(details);
        let result = self.gateway.send_invoice(&data, credentials.as_ref()).await;
        let bookkeeping = Bookkeeping {
            status: FawaterkomStatus::Submitted,
            sequence,
            uuid: data.uuid,
            number: data.transaction_number,
            total: data.total,
            reported: invoice.lines.charged(),
            result: result.clone(),
        };
        let invoice = self.record(invoice, &bookkeeping).await?;
        Ok(SubmissionOutcome { invoice, result })
    }

    /// Gives no result when the categories carry no amount, without
    /// contacting the gateway.
    async fn submit_categories(
        &self,
        invoice: Invoice,
        details: &RegistrationDetails,
        categories: &[FeeCategory],
    ) -> Result<(Invoice, Option<SubmissionResult>), AppError> {
        let sequence = invoice.einvoice_sequence + 1;
        let Some(data) = self
            .mapper
            .invoice_document(&invoice, details, categories, sequence)
        else {
            debug!(categories = categories.len(), "Paid categories carry no amount to report");
            return Ok((invoice, None));
        };

        let credentials = self.mapper.credentials_for(details);
        let result = self.gateway.send_invoice(&data, credentials.as_ref()).await;
        if result.success {
            info!(number = %data.transaction_number, total = %data.total, "E-invoice submitted");
        } else {
            warn!(number = %data.transaction_number, error = ?result.error, "E-invoice submission failed");
        }

        let bookkeeping = Bookkeeping {
            status: FawaterkomStatus::Submitted,
            sequence,
            uuid: data.uuid,
            number: data.transaction_number,
            total: data.total,
            reported: categories.to_vec(),
            result: result.clone(),
        };
        let invoice = self.record(invoice, &bookkeeping).await?;
        Ok((invoice, Some(result)))
    }

    async fn reverse_saved(
        &self,
        invoice: Invoice,
        details: &RegistrationDetails,
        reason: &str,
    ) -> Result<(Invoice, SubmissionResult), AppError> {
        let sequence = invoice.einvoice_sequence + 1;
        let refund = invoice.balance.abs();
        let Some(data) = self
            .mapper
            .reversal_document(&invoice, details, refund, sequence, reason)
        else {
            return Ok((
                invoice,
                SubmissionResult::failed("No earlier e-invoice submission to reverse"),
            ));
        };

        let credentials = self.mapper.credentials_for(details);
        let result = self.gateway.reverse_invoice(&data, credentials.as_ref()).await;
        if result.success {
            info!(number = %data.invoice.transaction_number, refund = %refund, "E-invoice reversed");
        } else {
            warn!(number = %data.invoice.transaction_number, error = ?result.error, "E-invoice reversal failed");
        }

        let bookkeeping = Bookkeeping {
            status: FawaterkomStatus::Reversed,
            sequence,
            uuid: data.invoice.uuid,
            number: data.invoice.transaction_number,
            total: data.invoice.total,
            reported: Vec::new(),
            result: result.clone(),
        };
        let invoice = self.record(invoice, &bookkeeping).await?;
        Ok((invoice, result))
    }

    /// Persist a gateway outcome, reloading and reapplying it if a concurrent
    /// edit bumped the revision in between.
    async fn record(&self, mut invoice: Invoice, bookkeeping: &Bookkeeping) -> Result<Invoice, AppError> {
        for attempt in 1..=BOOKKEEPING_ATTEMPTS {
            let mut updated = invoice.clone();
            bookkeeping.apply(&mut updated);
            match self.store.update_invoice(&updated, None).await {
                Ok(saved) => return Ok(saved),
                Err(e) if e.is_conflict() && attempt < BOOKKEEPING_ATTEMPTS => {
                    warn!(attempt, "Invoice changed while recording e-invoice outcome, reloading");
                    invoice = self
                        .store
                        .get_invoice(invoice.invoice_id)
                        .await?
                        .ok_or_else(|| AppError::NotFound(anyhow!("Invoice disappeared")))?;
                }
                Err(e) => return Err(e),
            }
        }
        Err(AppError::Conflict(anyhow!(
            "Could not record e-invoice outcome for invoice {}",
            invoice.serial_number
        )))
    }
}
