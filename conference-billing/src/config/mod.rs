use crate::pricing::PricingConfig;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub pricing: PricingConfig,
    pub fawaterkom: FawaterkomConfig,
    pub payment_gateway: PaymentGatewayConfig,
    pub smtp: SmtpConfig,
    pub storage: StorageConfig,
    pub pdf: PdfConfig,
    pub outbox: OutboxConfig,
    pub telemetry: TelemetryConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub run_migrations: bool,
}

/// Seller identity and credentials for the national e-invoicing gateway.
#[derive(Deserialize, Clone, Debug)]
pub struct FawaterkomConfig {
    pub base_url: String,
    pub client_id: String,
    pub secret_key: Secret<String>,
    pub timeout_secs: u64,
    pub seller_name: String,
    pub seller_tax_number: String,
    /// Income source sequence assigned by the tax authority.
    pub activity_number: String,
    pub city_code: String,
    pub postal_code: String,
}

/// Hosted checkout (NVP) gateway settings.
#[derive(Deserialize, Clone, Debug)]
pub struct PaymentGatewayConfig {
    pub base_url: String,
    pub api_version: String,
    pub merchant_id: String,
    pub api_username: String,
    pub api_password: Secret<String>,
    pub merchant_name: String,
    pub return_url: String,
    pub timeout_secs: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
}

#[derive(Deserialize, Clone, Debug)]
pub struct StorageConfig {
    pub base_path: PathBuf,
}

#[derive(Deserialize, Clone, Debug)]
pub struct PdfConfig {
    pub invoice_template: Option<PathBuf>,
    pub receipt_template: Option<PathBuf>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct OutboxConfig {
    pub enabled: bool,
    pub max_retry_secs: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let pricing = PricingConfig {
            exchange_rate: parse_env("BILLING_EXCHANGE_RATE", "0.71")?,
            fees_tax_percent: parse_env("BILLING_FEES_TAX_PERCENT", "16")?,
            vat_percent: parse_env("BILLING_VAT_PERCENT", "16")?,
            invoice_serial_prefix: get_env("BILLING_INVOICE_PREFIX", Some("G26"), false)?,
            company_serial_prefix: get_env("BILLING_COMPANY_INVOICE_PREFIX", Some("C26"), false)?,
        };
        pricing.validate()?;

        Ok(Self {
            server: ServerConfig {
                host: get_env("BILLING_HOST", Some("0.0.0.0"), false)?,
                port: parse_env("BILLING_PORT", "3010")?,
            },
            database: DatabaseConfig {
                url: Secret::new(get_env("BILLING_DATABASE_URL", None, is_prod)?),
                max_connections: parse_env("BILLING_DATABASE_MAX_CONNECTIONS", "10")?,
                min_connections: parse_env("BILLING_DATABASE_MIN_CONNECTIONS", "1")?,
                run_migrations: parse_env("BILLING_RUN_MIGRATIONS", "true")?,
            },
            pricing,
            fawaterkom: FawaterkomConfig {
                base_url: get_env(
                    "FAWATERKOM_BASE_URL",
                    Some("https://backend.jofotara.gov.jo/core/invoices/"),
                    is_prod,
                )?,
                client_id: get_env("FAWATERKOM_CLIENT_ID", Some(""), is_prod)?,
                secret_key: Secret::new(get_env("FAWATERKOM_SECRET_KEY", Some(""), is_prod)?),
                timeout_secs: parse_env("FAWATERKOM_TIMEOUT_SECS", "30")?,
                seller_name: get_env("FAWATERKOM_SELLER_NAME", Some("Conference Organizer"), is_prod)?,
                seller_tax_number: get_env("FAWATERKOM_TAX_NUMBER", Some(""), is_prod)?,
                activity_number: get_env("FAWATERKOM_ACTIVITY_NUMBER", Some(""), is_prod)?,
                city_code: get_env("FAWATERKOM_CITY_CODE", Some("JO-AM"), false)?,
                postal_code: get_env("FAWATERKOM_POSTAL_CODE", Some("11181"), false)?,
            },
            payment_gateway: PaymentGatewayConfig {
                base_url: get_env(
                    "PAYMENT_GATEWAY_URL",
                    Some("https://test-gateway.mastercard.com"),
                    is_prod,
                )?,
                api_version: get_env("PAYMENT_GATEWAY_API_VERSION", Some("100"), false)?,
                merchant_id: get_env("PAYMENT_GATEWAY_MERCHANT_ID", Some(""), is_prod)?,
                api_username: get_env("PAYMENT_GATEWAY_API_USERNAME", Some(""), is_prod)?,
                api_password: Secret::new(get_env("PAYMENT_GATEWAY_API_PASSWORD", Some(""), is_prod)?),
                merchant_name: get_env("PAYMENT_GATEWAY_MERCHANT_NAME", Some("Conference"), false)?,
                return_url: get_env(
                    "PAYMENT_GATEWAY_RETURN_URL",
                    Some("http://localhost:3000/payment/complete"),
                    is_prod,
                )?,
                timeout_secs: parse_env("PAYMENT_GATEWAY_TIMEOUT_SECS", "30")?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                port: parse_env("SMTP_PORT", "587")?,
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: Secret::new(get_env("SMTP_PASSWORD", Some(""), is_prod)?),
                from_email: get_env("SMTP_FROM_EMAIL", Some("billing@example.com"), is_prod)?,
                from_name: get_env("SMTP_FROM_NAME", Some("Conference Billing"), false)?,
                enabled: parse_env("SMTP_ENABLED", "false")?,
            },
            storage: StorageConfig {
                base_path: PathBuf::from(get_env("BILLING_STORAGE_PATH", Some("./data/blobs"), false)?),
            },
            pdf: PdfConfig {
                invoice_template: env::var("BILLING_INVOICE_TEMPLATE").ok().map(PathBuf::from),
                receipt_template: env::var("BILLING_RECEIPT_TEMPLATE").ok().map(PathBuf::from),
            },
            outbox: OutboxConfig {
                enabled: parse_env("BILLING_OUTBOX_ENABLED", "true")?,
                max_retry_secs: parse_env("BILLING_OUTBOX_MAX_RETRY_SECS", "300")?,
            },
            telemetry: TelemetryConfig {
                log_level: get_env("RUST_LOG", Some("info,conference_billing=debug"), false)?,
                otlp_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                    .ok()
                    .filter(|s| !s.is_empty()),
            },
            service_name: "conference-billing".to_string(),
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim().parse::<T>().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
    })
}
