//! Shared fixtures for conference-billing integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use conference_billing::config::{
    Config, DatabaseConfig, FawaterkomConfig, OutboxConfig, PaymentGatewayConfig, PdfConfig,
    ServerConfig, SmtpConfig, StorageConfig, TelemetryConfig,
};
use conference_billing::models::{
    AccommodationBooking, AccommodationLocation, Company, Country, Hotel, HotelRoom,
    ParticipationType, PaymentStatus, Registration, RegistrationDetails, RegistrationStatus,
    RoomType, Spouse, Trip, TripBooking, TripParticipant,
};
use conference_billing::pricing::PricingConfig;
use conference_billing::services::einvoice::{
    EInvoiceData, EInvoiceGateway, EInvoiceMapper, FawaterkomCredentials, ReverseEInvoiceData,
    SubmissionResult,
};
use conference_billing::services::outbox::{BillingEvent, Outbox};
use conference_billing::services::pdf::{InvoicePdfRenderer, PdfCanvas, PdfTemplates, TextStyle};
use conference_billing::services::{
    BillingStore, CompanyInvoiceService, InvoiceLifecycle, InvoiceService, MemoryStore,
};
use conference_billing::startup::{router, AppState};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::Secret;
use serde_json::json;
use service_core::error::AppError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use uuid::Uuid;

pub const TEST_QR: &str = "AQhTZWxsZXIgQ28CCTAxMjM0NTY3OA==";
pub const TEST_VERIFICATION_URL: &str = "https://portal.jofotara.gov.jo/verify/abc";

pub fn fawaterkom_config(base_url: &str) -> FawaterkomConfig {
    FawaterkomConfig {
        base_url: base_url.to_string(),
        client_id: "default-client".to_string(),
        secret_key: Secret::new("default-secret".to_string()),
        timeout_secs: 5,
        seller_name: "Conference Organisers".to_string(),
        seller_tax_number: "12345678".to_string(),
        activity_number: "9876543".to_string(),
        city_code: "JO-AM".to_string(),
        postal_code: "11181".to_string(),
    }
}

pub fn payment_gateway_config(base_url: &str) -> PaymentGatewayConfig {
    PaymentGatewayConfig {
        base_url: base_url.to_string(),
        api_version: "100".to_string(),
        merchant_id: "TESTMERCHANT".to_string(),
        api_username: "merchant.TESTMERCHANT".to_string(),
        api_password: Secret::new("gateway-password".to_string()),
        merchant_name: "Conference".to_string(),
        return_url: "http://localhost:3000/payment/complete".to_string(),
        timeout_secs: 5,
    }
}

/// In-memory configuration; outbound URLs point at wiremock servers or
/// nowhere.
pub fn test_config(fawaterkom_url: &str, checkout_url: &str) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            url: Secret::new("memory://".to_string()),
            max_connections: 1,
            min_connections: 1,
            run_migrations: false,
        },
        pricing: PricingConfig::default(),
        fawaterkom: fawaterkom_config(fawaterkom_url),
        payment_gateway: payment_gateway_config(checkout_url),
        smtp: SmtpConfig {
            host: "smtp.test.local".to_string(),
            port: 587,
            user: "test".to_string(),
            password: Secret::new("test".to_string()),
            from_email: "test@example.com".to_string(),
            from_name: "Conference Billing".to_string(),
            enabled: false,
        },
        storage: StorageConfig {
            base_path: PathBuf::from("./target/test-blobs"),
        },
        pdf: PdfConfig {
            invoice_template: None,
            receipt_template: None,
        },
        outbox: OutboxConfig {
            enabled: false,
            max_retry_secs: 1,
        },
        telemetry: TelemetryConfig {
            log_level: "warn".to_string(),
            otlp_endpoint: None,
        },
        service_name: "conference-billing-test".to_string(),
    }
}

// Registration fixtures

pub fn participation_type(price: Decimal) -> ParticipationType {
    ParticipationType {
        id: Uuid::new_v4(),
        name: "Delegate".to_string(),
        price,
        spouse_price: dec!(200),
        special_price: dec!(150),
        currency: "USD".to_string(),
        fees: false,
        spouse: false,
        petra: false,
        petra_spouse: false,
        accommodation_amman: false,
        accommodation_aqaba: false,
    }
}

pub fn company(country: &str, code: &str) -> Company {
    Company {
        id: Uuid::new_v4(),
        name: format!("{} Trading Co", country),
        country: Some(Country {
            name: country.to_string(),
            code: Some(code.to_string()),
        }),
        tax_number: Some("55501234".to_string()),
        email: Some("accounts@example.com".to_string()),
        fawaterkom_client_id: None,
        fawaterkom_secret_key: None,
    }
}

pub fn jordanian_company() -> Company {
    company("Jordan", "JO")
}

/// Submitted registration with only a participation fee.
pub fn registration_details(participation_type: ParticipationType) -> RegistrationDetails {
    RegistrationDetails {
        registration: Registration {
            id: Uuid::new_v4(),
            first_name: "Rana".to_string(),
            last_name: "Haddad".to_string(),
            email: "rana@example.com".to_string(),
            status: RegistrationStatus::Submitted,
            payment_status: PaymentStatus::Unpaid,
            company_id: None,
            participation_type_id: participation_type.id,
            wants_accommodation_amman: false,
            wants_accommodation_dead_sea: false,
            created_utc: Utc::now(),
        },
        participation_type,
        company: None,
        spouse: None,
        trips: Vec::new(),
        accommodations: Vec::new(),
    }
}

pub fn with_company(mut details: RegistrationDetails, company: Company) -> RegistrationDetails {
    details.registration.company_id = Some(company.id);
    details.company = Some(company);
    details
}

pub fn spouse() -> Spouse {
    Spouse {
        id: Uuid::new_v4(),
        first_name: "Sami".to_string(),
        last_name: "Haddad".to_string(),
        is_active: true,
    }
}

pub fn trip_booking(price: Decimal, currency: &str, participant: TripParticipant) -> TripBooking {
    TripBooking {
        id: Uuid::new_v4(),
        trip: Trip {
            id: Uuid::new_v4(),
            name: "Petra day trip".to_string(),
            price,
            currency: currency.to_string(),
        },
        participant,
        is_active: true,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// Three nights in a double room at 100 with 10% service and 16% tax.
pub fn accommodation(location: AccommodationLocation, currency: &str) -> AccommodationBooking {
    AccommodationBooking {
        id: Uuid::new_v4(),
        location,
        hotel: Hotel {
            id: Uuid::new_v4(),
            name: "Grand Hotel".to_string(),
            currency: currency.to_string(),
            service_percent: dec!(10),
            tax_percent: dec!(16),
        },
        room: HotelRoom {
            id: Uuid::new_v4(),
            name: "Deluxe".to_string(),
            single_rate: dec!(80),
            double_rate: dec!(100),
        },
        room_type: RoomType::Double,
        check_in: date(2026, 3, 1),
        check_out: date(2026, 3, 4),
        is_active: true,
    }
}

// Fakes

#[derive(Debug, Clone)]
pub enum GatewayCall {
    Submit {
        data: EInvoiceData,
        client_id: Option<String>,
    },
    Reverse {
        data: ReverseEInvoiceData,
        client_id: Option<String>,
    },
}

/// E-invoice gateway that records every document and answers with a canned
/// result.
#[derive(Default)]
pub struct RecordingGateway {
    calls: Mutex<Vec<GatewayCall>>,
    failing: AtomicBool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let gateway = Self::default();
        gateway.set_failing(true);
        gateway
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().expect("gateway lock").clone()
    }

    pub fn submissions(&self) -> Vec<EInvoiceData> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Submit { data, .. } => Some(data),
                GatewayCall::Reverse { .. } => None,
            })
            .collect()
    }

    pub fn reversals(&self) -> Vec<ReverseEInvoiceData> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Reverse { data, .. } => Some(data),
                GatewayCall::Submit { .. } => None,
            })
            .collect()
    }

    fn respond(&self, uuid: &str) -> SubmissionResult {
        if self.failing.load(Ordering::SeqCst) {
            SubmissionResult::failed("HTTP 503: service unavailable")
        } else {
            SubmissionResult::ok(json!({
                "EINV_INV_UUID": format!("gw-{}", uuid),
                "EINV_QR": TEST_QR,
                "EINV_VERIFICATION_URL": TEST_VERIFICATION_URL,
                "EINV_STATUS": "SUBMITTED"
            }))
        }
    }
}

#[async_trait]
impl EInvoiceGateway for RecordingGateway {
    async fn send_invoice(
        &self,
        data: &EInvoiceData,
        credentials: Option<&FawaterkomCredentials>,
    ) -> SubmissionResult {
        self.calls.lock().expect("gateway lock").push(GatewayCall::Submit {
            data: data.clone(),
            client_id: credentials.map(|c| c.client_id.clone()),
        });
        self.respond(&data.uuid)
    }

    async fn reverse_invoice(
        &self,
        data: &ReverseEInvoiceData,
        credentials: Option<&FawaterkomCredentials>,
    ) -> SubmissionResult {
        self.calls.lock().expect("gateway lock").push(GatewayCall::Reverse {
            data: data.clone(),
            client_id: credentials.map(|c| c.client_id.clone()),
        });
        self.respond(&data.invoice.uuid)
    }
}

/// Canvas that keeps what was drawn.
#[derive(Default)]
pub struct RecordingCanvas {
    pub texts: Vec<(String, f32, f32)>,
    pub images: Vec<(usize, f32, f32, f32)>,
}

impl RecordingCanvas {
    pub fn has_text(&self, needle: &str) -> bool {
        self.texts.iter().any(|(t, _, _)| t.contains(needle))
    }
}

impl PdfCanvas for RecordingCanvas {
    fn draw_text(&mut self, text: &str, x: f32, y: f32, _style: TextStyle) {
        self.texts.push((text.to_string(), x, y));
    }

    fn draw_image(&mut self, encoded: &[u8], x: f32, y: f32, width: f32) -> Result<(), AppError> {
        self.images.push((encoded.len(), x, y, width));
        Ok(())
    }
}

// Service harness

/// Services wired around a [`MemoryStore`] and a [`RecordingGateway`], with
/// the outbox channel exposed for assertions.
pub struct TestServices {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<RecordingGateway>,
    pub invoices: InvoiceService,
    pub lifecycle: InvoiceLifecycle,
    pub company_invoices: CompanyInvoiceService,
    pub events: mpsc::UnboundedReceiver<BillingEvent>,
}

impl TestServices {
    pub fn new() -> Self {
        Self::with_gateway(RecordingGateway::new())
    }

    pub fn with_gateway(gateway: RecordingGateway) -> Self {
        Self::build(gateway, PricingConfig::default())
    }

    /// Pricing without the fees tax, so a participation price is also its
    /// invoiced total.
    pub fn untaxed() -> Self {
        Self::build(
            RecordingGateway::new(),
            PricingConfig {
                fees_tax_percent: Decimal::ZERO,
                ..PricingConfig::default()
            },
        )
    }

    pub fn build(gateway: RecordingGateway, pricing: PricingConfig) -> Self {
        let mut config = test_config("http://127.0.0.1:9/einvoice", "http://127.0.0.1:9");
        config.pricing = pricing;
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(gateway);
        let (outbox, events) = Outbox::channel();
        let dyn_store: Arc<dyn BillingStore> = store.clone();

        let invoices = InvoiceService::new(dyn_store.clone(), config.pricing.clone(), outbox.clone());
        let lifecycle = InvoiceLifecycle::new(
            dyn_store.clone(),
            gateway.clone(),
            EInvoiceMapper::new(config.fawaterkom.clone(), config.pricing.clone()),
            outbox,
        );
        let company_invoices = CompanyInvoiceService::new(dyn_store, config.pricing);

        Self {
            store,
            gateway,
            invoices,
            lifecycle,
            company_invoices,
            events,
        }
    }

    pub async fn seed(&self, details: RegistrationDetails) -> Uuid {
        let id = details.registration.id;
        self.store.insert_registration(details).await;
        id
    }

    /// Drain every event published so far.
    pub fn drain_events(&mut self) -> Vec<BillingEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// HTTP server on a random port backed by an in-memory store.
pub struct TestApp {
    pub address: String,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<RecordingGateway>,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn(checkout_url: &str) -> Self {
        let config = test_config("http://127.0.0.1:9/einvoice", checkout_url);
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RecordingGateway::new());
        let renderer = Arc::new(InvoicePdfRenderer::new(PdfTemplates::default()));

        let state = AppState::new(
            config,
            store.clone(),
            gateway.clone(),
            renderer,
            Outbox::disabled(),
        )
        .expect("Failed to build app state");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let port = listener
            .local_addr()
            .expect("Failed to read local address")
            .port();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.ok();
        });

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            store,
            gateway,
            client: reqwest::Client::new(),
        }
    }

    pub async fn seed(&self, details: RegistrationDetails) -> Uuid {
        let id = details.registration.id;
        self.store.insert_registration(details).await;
        id
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }
}
