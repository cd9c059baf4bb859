//! Services module for conference-billing.

pub mod checkout;
pub mod company_invoices;
pub mod database;
pub mod einvoice;
pub mod email;
pub mod invoices;
pub mod lifecycle;
pub mod memory;
pub mod metrics;
pub mod outbox;
pub mod pdf;
pub mod storage;
pub mod store;

pub use checkout::{HostedCheckoutClient, PaymentService};
pub use company_invoices::CompanyInvoiceService;
pub use database::Database;
pub use invoices::InvoiceService;
pub use lifecycle::InvoiceLifecycle;
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use store::BillingStore;
