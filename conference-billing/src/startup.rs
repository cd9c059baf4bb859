//! Application startup and lifecycle management.

use crate::config::Config;
use crate::handlers;
use crate::services::einvoice::{EInvoiceGateway, EInvoiceMapper, FawaterkomClient};
use crate::services::email::{EmailSender, SmtpEmailSender};
use crate::services::outbox::{Outbox, ReceiptWorker};
use crate::services::pdf::{InvoicePdfRenderer, PdfTemplates};
use crate::services::storage::{LocalStorage, Storage};
use crate::services::{
    BillingStore, CompanyInvoiceService, Database, HostedCheckoutClient, InvoiceLifecycle,
    InvoiceService, MemoryStore, PaymentService,
};
use axum::middleware::from_fn;
use axum::{
    routing::{get, post, put},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

const MEMORY_DATABASE_URL: &str = "memory://";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn BillingStore>,
    pub invoices: InvoiceService,
    pub lifecycle: InvoiceLifecycle,
    pub payments: PaymentService,
    pub company_invoices: CompanyInvoiceService,
    pub renderer: Arc<InvoicePdfRenderer>,
}

impl AppState {
    /// Wire the services around an existing store and e-invoice gateway.
    pub fn new(
        config: Config,
        store: Arc<dyn BillingStore>,
        gateway: Arc<dyn EInvoiceGateway>,
        renderer: Arc<InvoicePdfRenderer>,
        outbox: Outbox,
    ) -> Result<Self, AppError> {
        let pricing = config.pricing.clone();
        let invoices = InvoiceService::new(store.clone(), pricing.clone(), outbox.clone());
        let lifecycle = InvoiceLifecycle::new(
            store.clone(),
            gateway,
            EInvoiceMapper::new(config.fawaterkom.clone(), pricing.clone()),
            outbox.clone(),
        );
        let payments = PaymentService::new(
            store.clone(),
            HostedCheckoutClient::new(config.payment_gateway.clone())?,
            lifecycle.clone(),
            outbox,
        );
        let company_invoices = CompanyInvoiceService::new(store.clone(), pricing);

        Ok(Self {
            config,
            store,
            invoices,
            lifecycle,
            payments,
            company_invoices,
            renderer,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/registrations/:id/confirm",
            post(handlers::registrations::confirm_registration),
        )
        .route(
            "/registrations/:id/invoices",
            post(handlers::registrations::create_invoice),
        )
        .route(
            "/registrations/:id/invoices/versions",
            post(handlers::registrations::create_versioned_invoice),
        )
        .route(
            "/registrations/:id/invoices/latest",
            get(handlers::registrations::latest_invoice),
        )
        .route(
            "/registrations/:id/checkout",
            post(handlers::payments::create_checkout_session),
        )
        .route(
            "/registrations/:id/invoices/:invoice_id/payment/verify",
            post(handlers::payments::verify_payment),
        )
        .route(
            "/invoices/:id",
            get(handlers::invoices::get_invoice).put(handlers::invoices::admin_save_invoice),
        )
        .route("/invoices/:id/pdf", get(handlers::invoices::invoice_pdf))
        .route(
            "/invoices/:id/recalculate",
            post(handlers::invoices::recalculate_invoice),
        )
        .route(
            "/invoices/:id/fawaterkom/submit",
            post(handlers::invoices::submit_to_fawaterkom),
        )
        .route(
            "/invoices/:id/fawaterkom/reverse",
            post(handlers::invoices::reverse_fawaterkom_invoice),
        )
        .route(
            "/company-invoices",
            post(handlers::company_invoices::create_company_invoice),
        )
        .route(
            "/company-invoices/:id",
            get(handlers::company_invoices::get_company_invoice),
        )
        .route(
            "/company-invoices/:id/pay",
            put(handlers::company_invoices::mark_company_invoice_paid),
        )
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    worker: Option<(JoinHandle<()>, CancellationToken)>,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let store: Arc<dyn BillingStore> =
            if config.database.url.expose_secret() == MEMORY_DATABASE_URL {
                tracing::warn!("Using the in-memory store; data is lost on restart");
                Arc::new(MemoryStore::new())
            } else {
                let db = Database::new(
                    config.database.url.expose_secret(),
                    config.database.max_connections,
                    config.database.min_connections,
                )
                .await?;
                if config.database.run_migrations {
                    db.run_migrations().await?;
                }
                Arc::new(db)
            };

        let gateway = FawaterkomClient::new(config.fawaterkom.clone())?;
        if gateway.is_configured() {
            tracing::info!("Fawaterkom client initialized");
        } else {
            tracing::warn!("Fawaterkom credentials not configured - e-invoice submissions will fail");
        }

        let templates = PdfTemplates::load(
            config.pdf.invoice_template.as_deref(),
            config.pdf.receipt_template.as_deref(),
        )
        .await?;
        let renderer = Arc::new(InvoicePdfRenderer::new(templates));

        let (outbox, worker) = if config.outbox.enabled {
            let (outbox, rx) = Outbox::channel();
            let storage: Arc<dyn Storage> =
                Arc::new(LocalStorage::new(config.storage.base_path.clone()).await?);
            let email: Arc<dyn EmailSender> =
                Arc::new(SmtpEmailSender::new(config.smtp.clone())?);
            let worker = ReceiptWorker::new(
                store.clone(),
                renderer.clone(),
                storage,
                email,
                Duration::from_secs(config.outbox.max_retry_secs),
            );
            let token = worker.shutdown_token();
            let handle = tokio::spawn(worker.run(rx));
            (outbox, Some((handle, token)))
        } else {
            tracing::info!("Outbox disabled - invoice and receipt emails will not be sent");
            (Outbox::disabled(), None)
        };

        let state = AppState::new(
            config.clone(),
            store,
            Arc::new(gateway),
            renderer,
            outbox,
        )?;

        // Port 0 binds a random port for tests.
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();
        tracing::info!("Conference billing listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
            worker,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Serve until `shutdown` resolves, then stop the receipt worker.
    pub async fn run_until_stopped<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let result = axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await;

        if let Some((handle, token)) = self.worker {
            token.cancel();
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Receipt worker did not stop cleanly");
            }
        }

        result.map_err(|e| {
            tracing::error!("HTTP server error: {}", e);
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
