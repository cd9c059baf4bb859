//! Company invoice endpoints.

use crate::models::{CompanyInvoice, CreateCompanyInvoice};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCompanyInvoiceRequest {
    pub company_id: Uuid,
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    pub amount: Decimal,
    /// `JD`/`JOD` or `USD`.
    #[validate(length(min = 2, max = 3))]
    pub currency: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct MarkPaidRequest {
    #[validate(length(max = 100))]
    pub payment_reference: Option<String>,
}

pub async fn create_company_invoice(
    State(state): State<AppState>,
    Json(payload): Json<CreateCompanyInvoiceRequest>,
) -> Result<(StatusCode, Json<CompanyInvoice>), AppError> {
    payload.validate()?;
    let invoice = state
        .company_invoices
        .create(CreateCompanyInvoice {
            company_id: payload.company_id,
            description: payload.description,
            amount: payload.amount,
            currency: payload.currency,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn get_company_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<CompanyInvoice>, AppError> {
    Ok(Json(state.company_invoices.get(invoice_id).await?))
}

pub async fn mark_company_invoice_paid(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    payload: Option<Json<MarkPaidRequest>>,
) -> Result<Json<CompanyInvoice>, AppError> {
    let Json(request) = payload.unwrap_or_default();
    request.validate()?;
    let invoice = state
        .company_invoices
        .mark_paid(invoice_id, request.payment_reference)
        .await?;
    Ok(Json(invoice))
}
