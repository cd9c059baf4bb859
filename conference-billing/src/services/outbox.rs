//! Post-commit side effects: invoice and receipt emails.
//!
//! Services publish [`BillingEvent`]s after their database write succeeds.
//! The [`ReceiptWorker`] renders the PDF, stores it and mails it, retrying
//! with exponential backoff. A failed delivery never touches billing state.

use super::email::{EmailAttachment, EmailSender};
use super::metrics::RECEIPTS_TOTAL;
use super::pdf::{DocumentKind, InvoicePdfRenderer};
use super::storage::{receipt_key, Storage};
use super::store::BillingStore;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    /// A new invoice was issued; mail it to the registrant.
    InvoiceIssued { invoice_id: Uuid },
    /// Payment was recorded; mail a receipt.
    ReceiptRequested { invoice_id: Uuid },
}

impl BillingEvent {
    pub fn invoice_id(&self) -> Uuid {
        match self {
            BillingEvent::InvoiceIssued { invoice_id }
            | BillingEvent::ReceiptRequested { invoice_id } => *invoice_id,
        }
    }

    fn kind(&self) -> DocumentKind {
        match self {
            BillingEvent::InvoiceIssued { .. } => DocumentKind::Invoice,
            BillingEvent::ReceiptRequested { .. } => DocumentKind::Receipt,
        }
    }
}

/// Publishing half of the outbox. Cheap to clone.
#[derive(Clone)]
pub struct Outbox {
    tx: Option<mpsc::UnboundedSender<BillingEvent>>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BillingEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// An outbox that drops every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn publish(&self, event: BillingEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(event.clone()).is_err() {
            tracing::warn!(?event, "Outbox receiver dropped, event discarded");
        }
    }
}

pub struct ReceiptWorker {
    store: Arc<dyn BillingStore>,
    renderer: Arc<InvoicePdfRenderer>,
    storage: Arc<dyn Storage>,
    email: Arc<dyn EmailSender>,
    max_retry: Duration,
    shutdown: CancellationToken,
}

impl ReceiptWorker {
    pub fn new(
        store: Arc<dyn BillingStore>,
        renderer: Arc<InvoicePdfRenderer>,
        storage: Arc<dyn Storage>,
        email: Arc<dyn EmailSender>,
        max_retry: Duration,
    ) -> Self {
        Self {
            store,
            renderer,
            storage,
            email,
            max_retry,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Consume events until the channel closes or shutdown is requested.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<BillingEvent>) {
        tracing::info!("Receipt worker started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Receipt worker shutting down");
                    break;
                }
                event = rx.recv() => {
                    match event {
                        Some(event) => self.handle(event).await,
                        None => {
                            tracing::info!("Outbox closed, receipt worker exiting");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle(&self, event: BillingEvent) {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_retry),
            ..Default::default()
        };

        let result = retry(backoff, || async {
            self.deliver(&event).await.map_err(|e| match e {
                AppError::NotFound(_) | AppError::BadRequest(_) => backoff::Error::permanent(e),
                other => backoff::Error::transient(other),
            })
        })
        .await;

        match result {
            Ok(()) => {
                RECEIPTS_TOTAL.with_label_values(&["delivered"]).inc();
                tracing::info!(invoice_id = %event.invoice_id(), "Billing document delivered");
            }
            Err(e) => {
                RECEIPTS_TOTAL.with_label_values(&["failed"]).inc();
                tracing::error!(
                    invoice_id = %event.invoice_id(),
                    error = %e,
                    "Billing document delivery failed"
                );
            }
        }
    }

    /// Render, store and mail one document.
    pub async fn deliver(&self, event: &BillingEvent) -> Result<(), AppError> {
        let invoice = self
            .store
            .get_invoice(event.invoice_id())
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        let details = self
            .store
            .get_registration_details(invoice.registration_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Registration not found")))?;

        let kind = event.kind();
        let pdf = self.renderer.render(kind, &invoice, &details)?;

        let filename = receipt_key(&invoice.serial_number);
        if kind == DocumentKind::Receipt {
            self.storage.upload(&filename, pdf.clone()).await?;
        }

        let (subject, body) = match kind {
            DocumentKind::Invoice => (
                format!("Invoice {}", invoice.serial_number),
                format!(
                    "<p>Dear {},</p><p>Please find attached invoice {} for your conference registration.</p>",
                    details.registration.full_name(),
                    invoice.serial_number
                ),
            ),
            DocumentKind::Receipt => (
                format!("Payment receipt {}", invoice.serial_number),
                format!(
                    "<p>Dear {},</p><p>Thank you for your payment. Your receipt for invoice {} is attached.</p>",
                    details.registration.full_name(),
                    invoice.serial_number
                ),
            ),
        };

        self.email
            .send_email_with_attachment(
                &details.registration.email,
                &subject,
                &body,
                EmailAttachment {
                    filename: format!(
                        "{}-{}.pdf",
                        kind.title().to_lowercase(),
                        invoice.serial_number.replace('/', "-")
                    ),
                    content_type: "application/pdf".to_string(),
                    data: pdf,
                },
            )
            .await
    }
}
