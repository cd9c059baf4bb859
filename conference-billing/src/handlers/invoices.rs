//! Invoice endpoints: reads, PDFs, admin edits and e-invoice actions.

use crate::models::Invoice;
use crate::services::lifecycle::{AdminInvoiceUpdate, AdminSaveOutcome, SubmissionOutcome};
use crate::services::pdf::DocumentKind;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.invoices.get_invoice(invoice_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct PdfQuery {
    #[serde(default)]
    pub receipt: bool,
}

/// Render the invoice (or its receipt) as a PDF.
pub async fn invoice_pdf(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Query(query): Query<PdfQuery>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = state.invoices.get_invoice(invoice_id).await?;
    let details = state
        .invoices
        .registration_details(invoice.registration_id)
        .await?;
    let kind = if query.receipt {
        DocumentKind::Receipt
    } else {
        DocumentKind::Invoice
    };

    let renderer = state.renderer.clone();
    let filename = format!(
        "{}-{}.pdf",
        kind.title().to_lowercase(),
        invoice.serial_number.replace('/', "-")
    );
    let pdf = tokio::task::spawn_blocking(move || renderer.render(kind, &invoice, &details))
        .await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("PDF task failed: {}", e)))??;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", filename),
            ),
        ],
        pdf,
    ))
}

/// Save discounts, disclosures and paid flags.
pub async fn admin_save_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<AdminInvoiceUpdate>,
) -> Result<Json<AdminSaveOutcome>, AppError> {
    let outcome = state
        .lifecycle
        .admin_save_invoice(invoice_id, payload)
        .await?;
    Ok(Json(outcome))
}

pub async fn recalculate_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.invoices.recalculate_invoice(invoice_id).await?))
}

pub async fn submit_to_fawaterkom(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<SubmissionOutcome>, AppError> {
    Ok(Json(state.lifecycle.submit_to_fawaterkom(invoice_id).await?))
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReverseRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

pub async fn reverse_fawaterkom_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    payload: Option<Json<ReverseRequest>>,
) -> Result<Json<SubmissionOutcome>, AppError> {
    let Json(request) = payload.unwrap_or_default();
    request.validate()?;
    let outcome = state
        .lifecycle
        .reverse_fawaterkom_invoice(invoice_id, request.reason)
        .await?;
    Ok(Json(outcome))
}
