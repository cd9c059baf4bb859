//! Invoice issuing: idempotent creation, serial allocation and versions.

use super::metrics::INVOICES_TOTAL;
use super::outbox::{BillingEvent, Outbox};
use super::store::BillingStore;
use crate::models::{Invoice, RegistrationDetails, RegistrationStatus};
use crate::pricing::{calculate_fees, PricingConfig};
use anyhow::anyhow;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Attempts at inserting with a freshly allocated serial before giving up.
const MAX_SERIAL_ATTEMPTS: usize = 5;

const SERIAL_DIGITS: usize = 4;

/// Next serial after `current` within `prefix`: `G260007` → `G260008`, and
/// `G260001` when nothing has been issued yet.
pub fn next_serial(prefix: &str, current: Option<&str>) -> Result<String, AppError> {
    let last = match current {
        Some(serial) => {
            let digits = serial.strip_prefix(prefix).ok_or_else(|| {
                AppError::InternalError(anyhow!(
                    "Serial {} does not carry prefix {}",
                    serial,
                    prefix
                ))
            })?;
            digits.parse::<u32>().map_err(|e| {
                AppError::InternalError(anyhow!("Malformed serial number {}: {}", serial, e))
            })?
        }
        None => 0,
    };
    Ok(format!(
        "{}{:0width$}",
        prefix,
        last + 1,
        width = SERIAL_DIGITS
    ))
}

#[derive(Clone)]
pub struct InvoiceService {
    store: Arc<dyn BillingStore>,
    pricing: PricingConfig,
    outbox: Outbox,
}

impl InvoiceService {
    pub fn new(store: Arc<dyn BillingStore>, pricing: PricingConfig, outbox: Outbox) -> Self {
        Self {
            store,
            pricing,
            outbox,
        }
    }

    async fn load_details(&self, registration_id: Uuid) -> Result<RegistrationDetails, AppError> {
        self.store
            .get_registration_details(registration_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow!("Registration {} not found", registration_id))
            })
    }

    /// Issue the registration's invoice, or return the one already issued.
    #[instrument(skip(self), fields(registration_id = %registration_id))]
    pub async fn create_invoice(&self, registration_id: Uuid) -> Result<Invoice, AppError> {
        if let Some(existing) = self.store.find_original_invoice(registration_id).await? {
            return Ok(existing);
        }

        let details = self.load_details(registration_id).await?;
        let fees = calculate_fees(&details, &self.pricing)?;
        let prefix = &self.pricing.invoice_serial_prefix;

        for attempt in 1..=MAX_SERIAL_ATTEMPTS {
            let current = self.store.max_invoice_serial(prefix).await?;
            let serial = next_serial(prefix, current.as_deref())?;
            let invoice = Invoice::issue(registration_id, serial, 1, fees.clone());

            match self.store.insert_invoice(&invoice).await {
                Ok(saved) => {
                    INVOICES_TOTAL.with_label_values(&["original"]).inc();
                    info!(
                        invoice_id = %saved.invoice_id,
                        serial_number = %saved.serial_number,
                        total_usd = %saved.total_value_usd,
                        "Invoice created"
                    );
                    self.outbox.publish(BillingEvent::InvoiceIssued {
                        invoice_id: saved.invoice_id,
                    });
                    return Ok(saved);
                }
                Err(e) if e.is_conflict() => {
                    // Either the serial was taken or another request issued
                    // this registration's invoice first.
                    if let Some(existing) = self.store.find_original_invoice(registration_id).await? {
                        return Ok(existing);
                    }
                    warn!(attempt, serial = %invoice.serial_number, "Serial number taken, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Conflict(anyhow!(
            "Could not allocate an invoice serial after {} attempts",
            MAX_SERIAL_ATTEMPTS
        )))
    }

    /// Issue an additional version of the registration's invoice, numbered
    /// `{first serial}/{n}`. Earlier versions are left untouched.
    #[instrument(skip(self), fields(registration_id = %registration_id))]
    pub async fn create_versioned_invoice(&self, registration_id: Uuid) -> Result<Invoice, AppError> {
        let Some(original) = self.store.find_original_invoice(registration_id).await? else {
            return self.create_invoice(registration_id).await;
        };

        let details = self.load_details(registration_id).await?;
        let fees = calculate_fees(&details, &self.pricing)?;

        let count = self.store.count_invoices(registration_id).await?;
        let version = i32::try_from(count + 1)
            .map_err(|_| AppError::InternalError(anyhow!("Invoice version overflow")))?;
        let serial = format!("{}/{}", original.serial_number, version);
        let saved = self
            .store
            .insert_invoice(&Invoice::issue(registration_id, serial, version, fees))
            .await?;

        INVOICES_TOTAL.with_label_values(&["version"]).inc();
        info!(
            invoice_id = %saved.invoice_id,
            serial_number = %saved.serial_number,
            version,
            "Invoice version created"
        );
        self.outbox.publish(BillingEvent::InvoiceIssued {
            invoice_id: saved.invoice_id,
        });
        Ok(saved)
    }

    /// Confirm a submitted registration and issue its invoice.
    #[instrument(skip(self), fields(registration_id = %registration_id))]
    pub async fn confirm_registration(&self, registration_id: Uuid) -> Result<Invoice, AppError> {
        let details = self.load_details(registration_id).await?;
        match details.registration.status {
            RegistrationStatus::Submitted => {
                self.store
                    .update_registration_status(registration_id, RegistrationStatus::Confirmed)
                    .await?;
                info!("Registration confirmed");
            }
            RegistrationStatus::Confirmed => {}
            other => {
                return Err(AppError::BadRequest(anyhow!(
                    "Registration in status {} cannot be confirmed",
                    other.as_str()
                )));
            }
        }
        self.create_invoice(registration_id).await
    }

    /// Recompute an unpaid invoice in place after the registration changed,
    /// keeping its discounts and disclosures.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn recalculate_invoice(&self, invoice_id: Uuid) -> Result<Invoice, AppError> {
        let invoice = self.get_invoice(invoice_id).await?;
        if invoice.paid_amount > Decimal::ZERO {
            return Err(AppError::Conflict(anyhow!(
                "Invoice {} has payments recorded and cannot be recalculated",
                invoice.serial_number
            )));
        }

        let details = self.load_details(invoice.registration_id).await?;
        let fees = calculate_fees(&details, &self.pricing)?.with_adjustments_from(&invoice.lines);

        let mut updated = invoice;
        updated.lines = fees.lines;
        updated.exchange_rate = fees.exchange_rate;
        updated.recompute_totals();
        self.store.update_invoice(&updated, None).await
    }

    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<Invoice, AppError> {
        self.store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("Invoice {} not found", invoice_id)))
    }

    pub async fn latest_invoice(&self, registration_id: Uuid) -> Result<Invoice, AppError> {
        self.store
            .find_latest_invoice(registration_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow!(
                    "No invoice issued for registration {}",
                    registration_id
                ))
            })
    }

    pub async fn registration_details(
        &self,
        registration_id: Uuid,
    ) -> Result<RegistrationDetails, AppError> {
        self.load_details(registration_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_serial_increments() {
        assert_eq!(next_serial("G26", Some("G260007")).unwrap(), "G260008");
        assert_eq!(next_serial("G26", Some("G260099")).unwrap(), "G260100");
    }

    #[test]
    fn test_first_serial() {
        assert_eq!(next_serial("G26", None).unwrap(), "G260001");
        assert_eq!(next_serial("C26", None).unwrap(), "C260001");
    }

    #[test]
    fn test_serial_past_four_digits_keeps_counting() {
        assert_eq!(next_serial("G26", Some("G269999")).unwrap(), "G2610000");
    }

    #[test]
    fn test_malformed_serial_is_rejected() {
        assert!(next_serial("G26", Some("C260001")).is_err());
        assert!(next_serial("G26", Some("G26abc")).is_err());
    }
}
