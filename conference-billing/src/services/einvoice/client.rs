//! Fawaterkom HTTP client.
//!
//! Documents are posted as `{"invoice": "<base64 UBL>"}` with `Client-Id`
//! and `Secret-Key` headers. Calls never return `Err`: transport failures,
//! timeouts and non-2xx responses come back as a failed [`SubmissionResult`]
//! so the caller can record them without aborting its own write.

use super::ubl::{build_invoice_xml, build_reversal_xml};
use super::{EInvoiceData, ReverseEInvoiceData};
use crate::config::FawaterkomConfig;
use crate::services::metrics::{EINVOICE_SUBMISSIONS_TOTAL, GATEWAY_REQUEST_DURATION};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use serde_json::Value;
use service_core::error::AppError;
use std::time::Duration;

/// Per-company credentials overriding the configured defaults.
#[derive(Clone)]
pub struct FawaterkomCredentials {
    pub client_id: String,
    pub secret_key: Secret<String>,
}

impl std::fmt::Debug for FawaterkomCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FawaterkomCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Outcome of one gateway call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmissionResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    fn field(&self, key: &str) -> Option<String> {
        self.data
            .as_ref()
            .and_then(|d| d.get(key))
            .and_then(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }

    /// Gateway-assigned invoice id.
    pub fn einvoice_uuid(&self) -> Option<String> {
        self.field("EINV_INV_UUID")
    }

    pub fn qr_code(&self) -> Option<String> {
        self.field("EINV_QR")
    }

    pub fn verification_url(&self) -> Option<String> {
        self.field("EINV_VERIFICATION_URL")
    }
}

#[async_trait]
pub trait EInvoiceGateway: Send + Sync {
    async fn send_invoice(
        &self,
        data: &EInvoiceData,
        credentials: Option<&FawaterkomCredentials>,
    ) -> SubmissionResult;

    async fn reverse_invoice(
        &self,
        data: &ReverseEInvoiceData,
        credentials: Option<&FawaterkomCredentials>,
    ) -> SubmissionResult;
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    invoice: &'a str,
}

#[derive(Clone)]
pub struct FawaterkomClient {
    client: Client,
    config: FawaterkomConfig,
}

impl FawaterkomClient {
    pub fn new(config: FawaterkomConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Failed to build Fawaterkom HTTP client: {}", e))
            })?;
        Ok(Self { client, config })
    }

    pub fn is_configured(&self) -> bool {
        !self.config.client_id.is_empty() && !self.config.secret_key.expose_secret().is_empty()
    }

    async fn post(
        &self,
        operation: &str,
        xml: String,
        credentials: Option<&FawaterkomCredentials>,
    ) -> SubmissionResult {
        let (client_id, secret_key) = match credentials {
            Some(c) => (c.client_id.as_str(), c.secret_key.expose_secret().as_str()),
            None => (
                self.config.client_id.as_str(),
                self.config.secret_key.expose_secret().as_str(),
            ),
        };

        let encoded = STANDARD.encode(xml.as_bytes());
        let timer = GATEWAY_REQUEST_DURATION
            .with_label_values(&["fawaterkom"])
            .start_timer();

        let response = self
            .client
            .post(&self.config.base_url)
            .header("Client-Id", client_id)
            .header("Secret-Key", secret_key)
            .json(&SubmitRequest { invoice: &encoded })
            .send()
            .await;
        timer.observe_duration();

        let result = match response {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                tracing::debug!(status = %status, body = %body, "Fawaterkom response");
                if status.is_success() {
                    let data = serde_json::from_str::<Value>(&body)
                        .unwrap_or_else(|_| Value::String(body));
                    SubmissionResult::ok(data)
                } else {
                    SubmissionResult::failed(format!("HTTP {}: {}", status.as_u16(), body))
                }
            }
            Err(e) if e.is_timeout() => SubmissionResult::failed(format!("Request timed out: {}", e)),
            Err(e) => SubmissionResult::failed(format!("Request failed: {}", e)),
        };

        let outcome = if result.success { "success" } else { "failure" };
        EINVOICE_SUBMISSIONS_TOTAL
            .with_label_values(&[operation, outcome])
            .inc();
        if let Some(error) = &result.error {
            tracing::warn!(operation, error = %error, "Fawaterkom call failed");
        }
        result
    }
}

#[async_trait]
impl EInvoiceGateway for FawaterkomClient {
    #[tracing::instrument(skip(self, data, credentials), fields(number = %data.transaction_number))]
    async fn send_invoice(
        &self,
        data: &EInvoiceData,
        credentials: Option<&FawaterkomCredentials>,
    ) -> SubmissionResult {
        match build_invoice_xml(data) {
            Ok(xml) => self.post("submit", xml, credentials).await,
            Err(e) => SubmissionResult::failed(e.to_string()),
        }
    }

    #[tracing::instrument(skip(self, data, credentials), fields(number = %data.invoice.transaction_number))]
    async fn reverse_invoice(
        &self,
        data: &ReverseEInvoiceData,
        credentials: Option<&FawaterkomCredentials>,
    ) -> SubmissionResult {
        match build_reversal_xml(data) {
            Ok(xml) => self.post("reverse", xml, credentials).await,
            Err(e) => SubmissionResult::failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_fields() {
        let result = SubmissionResult::ok(json!({
            "EINV_INV_UUID": "abc-123",
            "EINV_QR": "base64qr",
            "EINV_STATUS": "SUBMITTED"
        }));
        assert_eq!(result.einvoice_uuid().as_deref(), Some("abc-123"));
        assert_eq!(result.qr_code().as_deref(), Some("base64qr"));
        assert_eq!(result.verification_url(), None);
    }

    #[test]
    fn test_failed_result_has_no_data() {
        let result = SubmissionResult::failed("HTTP 500: boom");
        assert!(!result.success);
        assert_eq!(result.einvoice_uuid(), None);
        assert_eq!(result.error.as_deref(), Some("HTTP 500: boom"));
    }
}
