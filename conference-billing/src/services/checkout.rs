//! Hosted checkout (NVP) payment gateway and online payment reconciliation.
//!
//! Requests and responses are `key=value&...` bodies posted to
//! `{base_url}/api/nvp/version/{api_version}`, authenticated with the
//! `apiUsername`/`apiPassword`/`merchant` fields.

use super::einvoice::SubmissionResult;
use super::lifecycle::InvoiceLifecycle;
use super::metrics::{CHECKOUT_REQUESTS_TOTAL, GATEWAY_REQUEST_DURATION, PAYMENT_AMOUNT_TOTAL};
use super::outbox::{BillingEvent, Outbox};
use super::store::BillingStore;
use crate::config::PaymentGatewayConfig;
use crate::models::{Invoice, PaymentSource, PaymentStatus, RegistrationDetails};
use crate::pricing::Currency;
use anyhow::anyhow;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Serialize;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const RESULT_SUCCESS: &str = "SUCCESS";
const PAID_ORDER_STATUSES: [&str; 2] = ["CAPTURED", "PURCHASED"];

/// Parsed NVP response.
pub type NvpResponse = HashMap<String, String>;

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub success_indicator: Option<String>,
    pub order_id: String,
    pub amount: Decimal,
    pub currency: Currency,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderStatus {
    pub result: Option<String>,
    pub status: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
}

impl OrderStatus {
    fn from_response(response: &NvpResponse) -> Self {
        Self {
            result: response.get("result").cloned(),
            status: response.get("status").cloned(),
            amount: response
                .get("amount")
                .or_else(|| response.get("totalCapturedAmount"))
                .and_then(|a| a.parse().ok()),
            currency: response.get("currency").cloned(),
        }
    }

    pub fn is_paid(&self) -> bool {
        self.result.as_deref() == Some(RESULT_SUCCESS)
            && self
                .status
                .as_deref()
                .is_some_and(|s| PAID_ORDER_STATUSES.contains(&s))
    }
}

/// `orderId` used with the gateway for an invoice.
pub fn order_id(registration_id: Uuid, invoice_id: Uuid) -> String {
    format!("{}-{}", registration_id, invoice_id)
}

#[derive(Clone)]
pub struct HostedCheckoutClient {
    client: Client,
    config: PaymentGatewayConfig,
}

impl HostedCheckoutClient {
    pub fn new(config: PaymentGatewayConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                AppError::ConfigError(anyhow!("Failed to build payment gateway HTTP client: {}", e))
            })?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/api/nvp/version/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_version
        )
    }

    async fn call(
        &self,
        operation: &str,
        params: Vec<(&str, String)>,
    ) -> Result<NvpResponse, AppError> {
        let mut fields: Vec<(&str, String)> = vec![
            ("apiOperation", operation.to_string()),
            ("apiUsername", self.config.api_username.clone()),
            (
                "apiPassword",
                self.config.api_password.expose_secret().clone(),
            ),
            ("merchant", self.config.merchant_id.clone()),
        ];
        fields.extend(params);

        let body = serde_urlencoded::to_string(&fields)
            .map_err(|e| AppError::InternalError(anyhow!("NVP encoding failed: {}", e)))?;

        let timer = GATEWAY_REQUEST_DURATION
            .with_label_values(&["checkout"])
            .start_timer();
        let response = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await;
        timer.observe_duration();

        let response = response.map_err(|e| {
            CHECKOUT_REQUESTS_TOTAL
                .with_label_values(&[operation, "transport_error"])
                .inc();
            AppError::BadGateway(format!("Payment gateway unreachable: {}", e))
        })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::BadGateway(format!("Payment gateway response unreadable: {}", e)))?;
        tracing::debug!(operation, status = %status, "Payment gateway response");

        serde_urlencoded::from_str::<NvpResponse>(&text)
            .map_err(|e| AppError::BadGateway(format!("Malformed payment gateway response: {}", e)))
    }

    /// Open a hosted checkout session. Fails unless the gateway answers
    /// `result=SUCCESS`.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn initiate_checkout(
        &self,
        order_id: &str,
        amount: Decimal,
        currency: Currency,
        description: &str,
    ) -> Result<CheckoutSession, AppError> {
        let response = self
            .call(
                "INITIATE_CHECKOUT",
                vec![
                    ("order.id", order_id.to_string()),
                    ("order.amount", format!("{:.2}", amount)),
                    ("order.currency", currency.as_str().to_string()),
                    ("order.description", description.to_string()),
                    ("interaction.operation", "PURCHASE".to_string()),
                    ("interaction.returnUrl", self.config.return_url.clone()),
                    ("interaction.merchant.name", self.config.merchant_name.clone()),
                ],
            )
            .await?;

        let result = response.get("result").map(String::as_str);
        if result != Some(RESULT_SUCCESS) {
            CHECKOUT_REQUESTS_TOTAL
                .with_label_values(&["INITIATE_CHECKOUT", "rejected"])
                .inc();
            let explanation = response
                .get("error.explanation")
                .cloned()
                .unwrap_or_else(|| format!("result={}", result.unwrap_or("missing")));
            return Err(AppError::BadGateway(format!(
                "Checkout session rejected: {}",
                explanation
            )));
        }

        let session_id = response.get("session.id").cloned().ok_or_else(|| {
            AppError::BadGateway("Checkout response carries no session.id".to_string())
        })?;
        CHECKOUT_REQUESTS_TOTAL
            .with_label_values(&["INITIATE_CHECKOUT", "success"])
            .inc();

        Ok(CheckoutSession {
            session_id,
            success_indicator: response.get("successIndicator").cloned(),
            order_id: order_id.to_string(),
            amount,
            currency,
        })
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn retrieve_order(&self, order_id: &str) -> Result<OrderStatus, AppError> {
        let response = self
            .call("RETRIEVE_ORDER", vec![("order.id", order_id.to_string())])
            .await?;
        let order = OrderStatus::from_response(&response);
        let outcome = if order.is_paid() { "paid" } else { "not_paid" };
        CHECKOUT_REQUESTS_TOTAL
            .with_label_values(&["RETRIEVE_ORDER", outcome])
            .inc();
        Ok(order)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentVerification {
    pub success: bool,
    pub order_status: OrderStatus,
    pub invoice: Invoice,
    pub payment_status: Option<PaymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fawaterkom_result: Option<SubmissionResult>,
}

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn BillingStore>,
    gateway: HostedCheckoutClient,
    lifecycle: InvoiceLifecycle,
    outbox: Outbox,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn BillingStore>,
        gateway: HostedCheckoutClient,
        lifecycle: InvoiceLifecycle,
        outbox: Outbox,
    ) -> Self {
        Self {
            store,
            gateway,
            lifecycle,
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

    /// Open a checkout session for the registration's latest invoice, in
    /// dinars for Jordanian companies and dollars otherwise.
    #[instrument(skip(self), fields(registration_id = %registration_id))]
    pub async fn create_checkout_session(
        &self,
        registration_id: Uuid,
    ) -> Result<CheckoutSession, AppError> {
        let details = self.load_details(registration_id).await?;
        let invoice = self
            .store
            .find_latest_invoice(registration_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow!(
                    "No invoice issued for registration {}",
                    registration_id
                ))
            })?;

        let (currency, amount) = if details.is_jordanian() {
            (Currency::Jod, invoice.total_value_jd)
        } else {
            (Currency::Usd, invoice.total_value_usd)
        };
        if amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow!(
                "Invoice {} has nothing to pay",
                invoice.serial_number
            )));
        }

        let session = self
            .gateway
            .initiate_checkout(
                &order_id(registration_id, invoice.invoice_id),
                amount,
                currency,
                &format!("Conference registration {}", invoice.serial_number),
            )
            .await?;
        info!(
            invoice_id = %invoice.invoice_id,
            amount = %amount,
            currency = currency.as_str(),
            "Checkout session created"
        );
        Ok(session)
    }

    /// Reconcile the gateway's view of an order with the invoice. A paid
    /// order settles every charged category; the e-invoice is then reported
    /// unless it already was, and a reporting failure is returned without
    /// undoing the payment.
    #[instrument(skip(self), fields(registration_id = %registration_id, invoice_id = %invoice_id))]
    pub async fn verify_and_update_payment(
        &self,
        registration_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<PaymentVerification, AppError> {
        let invoice = self
            .store
            .get_invoice(invoice_id)
            .await?
            .filter(|i| i.registration_id == registration_id)
            .ok_or_else(|| {
                AppError::NotFound(anyhow!(
                    "Invoice {} not found for registration {}",
                    invoice_id,
                    registration_id
                ))
            })?;
        let details = self.load_details(registration_id).await?;

        let order = self
            .gateway
            .retrieve_order(&order_id(registration_id, invoice_id))
            .await?;
        if !order.is_paid() {
            info!(result = ?order.result, status = ?order.status, "Order not paid");
            return Ok(PaymentVerification {
                success: false,
                order_status: order,
                invoice,
                payment_status: None,
                fawaterkom_result: None,
            });
        }

        let expected_currency = if details.is_jordanian() {
            Currency::Jod
        } else {
            Currency::Usd
        };
        let currency = order
            .currency
            .as_deref()
            .map(Currency::from_code)
            .unwrap_or(expected_currency);
        let amount = order.amount.unwrap_or(match currency {
            Currency::Jod => invoice.total_value_jd,
            Currency::Usd => invoice.total_value_usd,
        });

        let already_recorded =
            invoice.payment_source == Some(PaymentSource::Online) && invoice.balance <= Decimal::ZERO;
        let saved = if already_recorded {
            invoice
        } else {
            let mut updated = invoice;
            for category in updated.lines.charged() {
                updated.lines.get_mut(category).paid = true;
            }
            updated.recompute_totals();
            updated.paid_amount = amount;
            updated.paid_currency = Some(currency.as_str().to_string());
            updated.balance = Decimal::ZERO;
            updated.payment_source = Some(PaymentSource::Online);
            updated.paid_at.get_or_insert_with(Utc::now);

            let saved = self
                .store
                .update_invoice(&updated, Some(PaymentStatus::Paid))
                .await?;
            PAYMENT_AMOUNT_TOTAL
                .with_label_values(&[currency.as_str(), "online"])
                .inc_by(amount.to_f64().unwrap_or_default());
            info!(amount = %amount, currency = currency.as_str(), "Online payment recorded");
            self.outbox.publish(BillingEvent::ReceiptRequested {
                invoice_id: saved.invoice_id,
            });
            saved
        };

        // A desk submission may already cover some lines; only a fully
        // reported invoice is skipped.
        let (invoice, fawaterkom_result) = if saved.lines.unreported_paid().is_empty() {
            (saved, None)
        } else {
            let fallback = saved.clone();
            match self
                .lifecycle
                .submit_online_payment(saved, &details, amount, currency)
                .await
            {
                Ok(outcome) => (outcome.invoice, Some(outcome.result)),
                Err(e) => {
                    warn!(error = %e, "E-invoice bookkeeping failed after online payment");
                    (fallback, Some(SubmissionResult::failed(e.to_string())))
                }
            }
        };

        Ok(PaymentVerification {
            success: true,
            order_status: order,
            invoice,
            payment_status: Some(PaymentStatus::Paid),
            fawaterkom_result,
        })
    }
}
