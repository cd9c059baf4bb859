//! Postgres implementation of [`BillingStore`].

use super::metrics::DB_QUERY_DURATION;
use super::store::BillingStore;
use crate::models::{
    AccommodationBooking, AccommodationLocation, Company, CompanyInvoice, CompanyInvoiceStatus,
    Country, FawaterkomStatus, FeeLines, Hotel, HotelRoom, Invoice, ParticipationType,
    PaymentSource, PaymentStatus, Registration, RegistrationDetails, RegistrationStatus,
    RoomType, Spouse, Trip, TripBooking, TripParticipant,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const INVOICE_COLUMNS: &str = r#"
    invoice_id, registration_id, serial_number, version, revision, lines,
    total_fees, total_discount, total_value_usd, total_value_jd, exchange_rate,
    paid_amount, balance, paid_currency, paid_at, payment_source,
    fawaterkom_invoice_id, fawaterkom_status, einvoice_uuid, einvoice_number,
    einvoice_total, einvoice_sequence, qr_code, verification_url, created_utc, updated_utc
"#;

const COMPANY_INVOICE_COLUMNS: &str = r#"
    invoice_id, company_id, serial_number, description, amount_jd, amount_usd,
    exchange_rate, status, payment_reference, paid_at, created_utc
"#;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "conference-billing"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn fetch_invoice_where(
        &self,
        clause: &str,
        registration_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let sql = format!("SELECT {} FROM invoices WHERE {}", INVOICE_COLUMNS, clause);
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(registration_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Invoice::from))
    }
}

// -----------------------------------------------------------------------------
// Row types
// -----------------------------------------------------------------------------

#[derive(FromRow)]
struct RegistrationRow {
    registration_id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    status: String,
    payment_status: String,
    company_id: Option<Uuid>,
    participation_type_id: Uuid,
    wants_accommodation_amman: bool,
    wants_accommodation_dead_sea: bool,
    created_utc: DateTime<Utc>,
}

impl From<RegistrationRow> for Registration {
    fn from(row: RegistrationRow) -> Self {
        Self {
            id: row.registration_id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            status: RegistrationStatus::from_string(&row.status),
            payment_status: PaymentStatus::from_string(&row.payment_status),
            company_id: row.company_id,
            participation_type_id: row.participation_type_id,
            wants_accommodation_amman: row.wants_accommodation_amman,
            wants_accommodation_dead_sea: row.wants_accommodation_dead_sea,
            created_utc: row.created_utc,
        }
    }
}

#[derive(FromRow)]
struct CompanyRow {
    company_id: Uuid,
    name: String,
    tax_number: Option<String>,
    email: Option<String>,
    fawaterkom_client_id: Option<String>,
    fawaterkom_secret_key: Option<String>,
    country_name: Option<String>,
    country_code: Option<String>,
}

impl From<CompanyRow> for Company {
    fn from(row: CompanyRow) -> Self {
        Self {
            id: row.company_id,
            name: row.name,
            country: row.country_name.map(|name| Country {
                name,
                code: row.country_code,
            }),
            tax_number: row.tax_number,
            email: row.email,
            fawaterkom_client_id: row.fawaterkom_client_id,
            fawaterkom_secret_key: row.fawaterkom_secret_key,
        }
    }
}

#[derive(FromRow)]
struct TripBookingRow {
    registration_trip_id: Uuid,
    participant: String,
    is_active: bool,
    trip_id: Uuid,
    trip_name: String,
    price: Decimal,
    currency: String,
}

impl From<TripBookingRow> for TripBooking {
    fn from(row: TripBookingRow) -> Self {
        Self {
            id: row.registration_trip_id,
            trip: Trip {
                id: row.trip_id,
                name: row.trip_name,
                price: row.price,
                currency: row.currency,
            },
            participant: TripParticipant::from_string(&row.participant),
            is_active: row.is_active,
        }
    }
}

#[derive(FromRow)]
struct AccommodationRow {
    accommodation_id: Uuid,
    location: String,
    room_type: String,
    check_in: NaiveDate,
    check_out: NaiveDate,
    is_active: bool,
    hotel_id: Uuid,
    hotel_name: String,
    hotel_currency: String,
    service_percent: Decimal,
    tax_percent: Decimal,
    room_id: Uuid,
    room_name: String,
    single_rate: Decimal,
    double_rate: Decimal,
}

impl From<AccommodationRow> for AccommodationBooking {
    fn from(row: AccommodationRow) -> Self {
        Self {
            id: row.accommodation_id,
            location: AccommodationLocation::from_string(&row.location),
            hotel: Hotel {
                id: row.hotel_id,
                name: row.hotel_name,
                currency: row.hotel_currency,
                service_percent: row.service_percent,
                tax_percent: row.tax_percent,
            },
            room: HotelRoom {
                id: row.room_id,
                name: row.room_name,
                single_rate: row.single_rate,
                double_rate: row.double_rate,
            },
            room_type: RoomType::from_string(&row.room_type),
            check_in: row.check_in,
            check_out: row.check_out,
            is_active: row.is_active,
        }
    }
}

#[derive(FromRow)]
struct InvoiceRow {
    invoice_id: Uuid,
    registration_id: Uuid,
    serial_number: String,
    version: i32,
    revision: i64,
    lines: Json<FeeLines>,
    total_fees: Decimal,
    total_discount: Decimal,
    total_value_usd: Decimal,
    total_value_jd: Decimal,
    exchange_rate: Decimal,
    paid_amount: Decimal,
    balance: Decimal,
    paid_currency: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    payment_source: Option<String>,
    fawaterkom_invoice_id: Option<String>,
    fawaterkom_status: Option<String>,
    einvoice_uuid: Option<String>,
    einvoice_number: Option<String>,
    einvoice_total: Option<Decimal>,
    einvoice_sequence: i32,
    qr_code: Option<String>,
    verification_url: Option<String>,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl From<InvoiceRow> for Invoice {
    fn from(row: InvoiceRow) -> Self {
        Self {
            invoice_id: row.invoice_id,
            registration_id: row.registration_id,
            serial_number: row.serial_number,
            version: row.version,
            revision: row.revision,
            lines: row.lines.0,
            total_fees: row.total_fees,
            total_discount: row.total_discount,
            total_value_usd: row.total_value_usd,
            total_value_jd: row.total_value_jd,
            exchange_rate: row.exchange_rate,
            paid_amount: row.paid_amount,
            balance: row.balance,
            paid_currency: row.paid_currency,
            paid_at: row.paid_at,
            payment_source: row.payment_source.as_deref().map(PaymentSource::from_string),
            fawaterkom_invoice_id: row.fawaterkom_invoice_id,
            fawaterkom_status: row
                .fawaterkom_status
                .as_deref()
                .map(FawaterkomStatus::from_string),
            einvoice_uuid: row.einvoice_uuid,
            einvoice_number: row.einvoice_number,
            einvoice_total: row.einvoice_total,
            einvoice_sequence: row.einvoice_sequence,
            qr_code: row.qr_code,
            verification_url: row.verification_url,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        }
    }
}

#[derive(FromRow)]
struct CompanyInvoiceRow {
    invoice_id: Uuid,
    company_id: Uuid,
    serial_number: String,
    description: String,
    amount_jd: Decimal,
    amount_usd: Decimal,
    exchange_rate: Decimal,
    status: String,
    payment_reference: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    created_utc: DateTime<Utc>,
}

impl From<CompanyInvoiceRow> for CompanyInvoice {
    fn from(row: CompanyInvoiceRow) -> Self {
        Self {
            invoice_id: row.invoice_id,
            company_id: row.company_id,
            serial_number: row.serial_number,
            description: row.description,
            amount_jd: row.amount_jd,
            amount_usd: row.amount_usd,
            exchange_rate: row.exchange_rate,
            status: CompanyInvoiceStatus::from_string(&row.status),
            payment_reference: row.payment_reference,
            paid_at: row.paid_at,
            created_utc: row.created_utc,
        }
    }
}

#[async_trait]
impl BillingStore for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self), fields(registration_id = %registration_id))]
    async fn get_registration_details(
        &self,
        registration_id: Uuid,
    ) -> Result<Option<RegistrationDetails>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_registration_details"])
            .start_timer();

        let registration = sqlx::query_as::<_, RegistrationRow>(
            r#"
            SELECT registration_id, first_name, last_name, email, status, payment_status,
                company_id, participation_type_id, wants_accommodation_amman,
                wants_accommodation_dead_sea, created_utc
            FROM registrations
            WHERE registration_id = $1
            "#,
        )
        .bind(registration_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(registration) = registration.map(Registration::from) else {
            return Ok(None);
        };

        let participation_type = sqlx::query_as::<_, ParticipationType>(
            r#"
            SELECT participation_type_id AS id, name, price, spouse_price, special_price, currency,
                fees, spouse, petra, petra_spouse, accommodation_amman, accommodation_aqaba
            FROM participation_types
            WHERE participation_type_id = $1
            "#,
        )
        .bind(registration.participation_type_id)
        .fetch_one(&self.pool)
        .await?;

        let company = match registration.company_id {
            Some(company_id) => self.get_company(company_id).await?,
            None => None,
        };

        let spouse = sqlx::query_as::<_, Spouse>(
            r#"
            SELECT spouse_id AS id, first_name, last_name, is_active
            FROM spouses
            WHERE registration_id = $1
            "#,
        )
        .bind(registration_id)
        .fetch_optional(&self.pool)
        .await?;

        let trips = sqlx::query_as::<_, TripBookingRow>(
            r#"
            SELECT rt.registration_trip_id, rt.participant, rt.is_active,
                t.trip_id, t.name AS trip_name, t.price, t.currency
            FROM registration_trips rt
            JOIN trips t ON t.trip_id = rt.trip_id
            WHERE rt.registration_id = $1
            ORDER BY t.name
            "#,
        )
        .bind(registration_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(TripBooking::from)
        .collect();

        let accommodations = sqlx::query_as::<_, AccommodationRow>(
            r#"
            SELECT a.accommodation_id, a.location, a.room_type, a.check_in, a.check_out, a.is_active,
                h.hotel_id, h.name AS hotel_name, h.currency AS hotel_currency,
                h.service_percent, h.tax_percent,
                r.room_id, r.name AS room_name, r.single_rate, r.double_rate
            FROM accommodations a
            JOIN hotels h ON h.hotel_id = a.hotel_id
            JOIN hotel_rooms r ON r.room_id = a.room_id
            WHERE a.registration_id = $1
            ORDER BY a.check_in
            "#,
        )
        .bind(registration_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(AccommodationBooking::from)
        .collect();

        timer.observe_duration();

        Ok(Some(RegistrationDetails {
            registration,
            participation_type,
            company,
            spouse,
            trips,
            accommodations,
        }))
    }

    #[instrument(skip(self), fields(registration_id = %registration_id, status = status.as_str()))]
    async fn update_registration_status(
        &self,
        registration_id: Uuid,
        status: RegistrationStatus,
    ) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE registrations SET status = $2 WHERE registration_id = $1")
            .bind(registration_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Registration {} not found",
                registration_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let sql = format!("SELECT {} FROM invoices WHERE invoice_id = $1", INVOICE_COLUMNS);
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await?;

        timer.observe_duration();
        Ok(row.map(Invoice::from))
    }

    async fn find_original_invoice(
        &self,
        registration_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        self.fetch_invoice_where("registration_id = $1 AND version = 1", registration_id)
            .await
    }

    async fn find_latest_invoice(
        &self,
        registration_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        self.fetch_invoice_where(
            "registration_id = $1 ORDER BY version DESC LIMIT 1",
            registration_id,
        )
        .await
    }

    async fn count_invoices(&self, registration_id: Uuid) -> Result<i64, AppError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE registration_id = $1")
                .bind(registration_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn max_invoice_serial(&self, prefix: &str) -> Result<Option<String>, AppError> {
        // Longer serials sort first so G2610000 ranks above G269999.
        let serial: Option<String> = sqlx::query_scalar(
            r#"
            SELECT serial_number
            FROM invoices
            WHERE serial_number LIKE $1 || '%' AND version = 1
            ORDER BY LENGTH(serial_number) DESC, serial_number DESC
            LIMIT 1
            "#,
        )
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?;
        Ok(serial)
    }

    #[instrument(skip(self, invoice), fields(registration_id = %invoice.registration_id, serial = %invoice.serial_number))]
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_invoice"])
            .start_timer();

        let sql = format!(
            r#"
            INSERT INTO invoices (
                invoice_id, registration_id, serial_number, version, revision, lines,
                total_fees, total_discount, total_value_usd, total_value_jd, exchange_rate,
                paid_amount, balance, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, 0, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            RETURNING {}
            "#,
            INVOICE_COLUMNS
        );
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(invoice.invoice_id)
            .bind(invoice.registration_id)
            .bind(&invoice.serial_number)
            .bind(invoice.version)
            .bind(Json(&invoice.lines))
            .bind(invoice.total_fees)
            .bind(invoice.total_discount)
            .bind(invoice.total_value_usd)
            .bind(invoice.total_value_jd)
            .bind(invoice.exchange_rate)
            .bind(invoice.paid_amount)
            .bind(invoice.balance)
            .bind(invoice.created_utc)
            .fetch_one(&self.pool)
            .await?;

        timer.observe_duration();

        info!(invoice_id = %row.invoice_id, serial = %row.serial_number, "Invoice inserted");

        Ok(row.into())
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.invoice_id, revision = invoice.revision))]
    async fn update_invoice(
        &self,
        invoice: &Invoice,
        payment_status: Option<PaymentStatus>,
    ) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE invoices
            SET revision = revision + 1,
                lines = $3,
                total_fees = $4,
                total_discount = $5,
                total_value_usd = $6,
                total_value_jd = $7,
                paid_amount = $8,
                balance = $9,
                paid_currency = $10,
                paid_at = $11,
                payment_source = $12,
                fawaterkom_invoice_id = $13,
                fawaterkom_status = $14,
                einvoice_uuid = $15,
                einvoice_number = $16,
                einvoice_total = $17,
                einvoice_sequence = $18,
                qr_code = $19,
                verification_url = $20,
                updated_utc = NOW()
            WHERE invoice_id = $1 AND revision = $2
            RETURNING {}
            "#,
            INVOICE_COLUMNS
        );
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(invoice.invoice_id)
            .bind(invoice.revision)
            .bind(Json(&invoice.lines))
            .bind(invoice.total_fees)
            .bind(invoice.total_discount)
            .bind(invoice.total_value_usd)
            .bind(invoice.total_value_jd)
            .bind(invoice.paid_amount)
            .bind(invoice.balance)
            .bind(&invoice.paid_currency)
            .bind(invoice.paid_at)
            .bind(invoice.payment_source.map(|s| s.as_str()))
            .bind(&invoice.fawaterkom_invoice_id)
            .bind(invoice.fawaterkom_status.map(|s| s.as_str()))
            .bind(&invoice.einvoice_uuid)
            .bind(&invoice.einvoice_number)
            .bind(invoice.einvoice_total)
            .bind(invoice.einvoice_sequence)
            .bind(&invoice.qr_code)
            .bind(&invoice.verification_url)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            warn!("Invoice revision is stale or invoice is missing");
            return match self.get_invoice(invoice.invoice_id).await? {
                Some(_) => Err(AppError::Conflict(anyhow::anyhow!(
                    "Invoice {} was modified concurrently",
                    invoice.invoice_id
                ))),
                None => Err(AppError::NotFound(anyhow::anyhow!(
                    "Invoice {} not found",
                    invoice.invoice_id
                ))),
            };
        };

        if let Some(status) = payment_status {
            let result = sqlx::query(
                "UPDATE registrations SET payment_status = $2 WHERE registration_id = $1",
            )
            .bind(invoice.registration_id)
            .bind(status.as_str())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(AppError::NotFound(anyhow::anyhow!(
                    "Registration {} not found",
                    invoice.registration_id
                )));
            }
        }

        tx.commit().await?;
        timer.observe_duration();

        info!(
            revision = row.revision,
            balance = %row.balance,
            "Invoice updated"
        );

        Ok(row.into())
    }

    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn get_company(&self, company_id: Uuid) -> Result<Option<Company>, AppError> {
        let row = sqlx::query_as::<_, CompanyRow>(
            r#"
            SELECT c.company_id, c.name, c.tax_number, c.email,
                c.fawaterkom_client_id, c.fawaterkom_secret_key,
                co.name AS country_name, co.code AS country_code
            FROM companies c
            LEFT JOIN countries co ON co.country_id = c.country_id
            WHERE c.company_id = $1
            "#,
        )
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Company::from))
    }

    async fn max_company_serial(&self, prefix: &str) -> Result<Option<String>, AppError> {
        let serial: Option<String> = sqlx::query_scalar(
            r#"
            SELECT serial_number
            FROM company_invoices
            WHERE serial_number LIKE $1 || '%'
            ORDER BY LENGTH(serial_number) DESC, serial_number DESC
            LIMIT 1
            "#,
        )
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?;
        Ok(serial)
    }

    #[instrument(skip(self, invoice), fields(company_id = %invoice.company_id, serial = %invoice.serial_number))]
    async fn insert_company_invoice(
        &self,
        invoice: &CompanyInvoice,
    ) -> Result<CompanyInvoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_company_invoice"])
            .start_timer();

        let sql = format!(
            r#"
            INSERT INTO company_invoices (
                invoice_id, company_id, serial_number, description, amount_jd, amount_usd,
                exchange_rate, status, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            COMPANY_INVOICE_COLUMNS
        );
        let row = sqlx::query_as::<_, CompanyInvoiceRow>(&sql)
            .bind(invoice.invoice_id)
            .bind(invoice.company_id)
            .bind(&invoice.serial_number)
            .bind(&invoice.description)
            .bind(invoice.amount_jd)
            .bind(invoice.amount_usd)
            .bind(invoice.exchange_rate)
            .bind(invoice.status.as_str())
            .bind(invoice.created_utc)
            .fetch_one(&self.pool)
            .await?;

        timer.observe_duration();
        Ok(row.into())
    }

    async fn get_company_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<Option<CompanyInvoice>, AppError> {
        let sql = format!(
            "SELECT {} FROM company_invoices WHERE invoice_id = $1",
            COMPANY_INVOICE_COLUMNS
        );
        let row = sqlx::query_as::<_, CompanyInvoiceRow>(&sql)
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(CompanyInvoice::from))
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.invoice_id))]
    async fn mark_company_invoice_paid(
        &self,
        invoice: &CompanyInvoice,
    ) -> Result<CompanyInvoice, AppError> {
        let sql = format!(
            r#"
            UPDATE company_invoices
            SET status = 'PAID', payment_reference = $2, paid_at = $3
            WHERE invoice_id = $1 AND status = 'PENDING'
            RETURNING {}
            "#,
            COMPANY_INVOICE_COLUMNS
        );
        let row = sqlx::query_as::<_, CompanyInvoiceRow>(&sql)
            .bind(invoice.invoice_id)
            .bind(&invoice.payment_reference)
            .bind(invoice.paid_at)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => match self.get_company_invoice(invoice.invoice_id).await? {
                Some(existing) => Err(AppError::Conflict(anyhow::anyhow!(
                    "Company invoice {} is already paid",
                    existing.serial_number
                ))),
                None => Err(AppError::NotFound(anyhow::anyhow!(
                    "Company invoice {} not found",
                    invoice.invoice_id
                ))),
            },
        }
    }
}
