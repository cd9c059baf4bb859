//! Registration-scoped invoice endpoints.

use crate::models::Invoice;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

/// Confirm a submitted registration and issue its invoice.
pub async fn confirm_registration(
    State(state): State<AppState>,
    Path(registration_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state.invoices.confirm_registration(registration_id).await?;
    Ok(Json(invoice))
}

/// Issue the registration's invoice; returns the existing one when already
/// issued.
pub async fn create_invoice(
    State(state): State<AppState>,
    Path(registration_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Invoice>), AppError> {
    let invoice = state.invoices.create_invoice(registration_id).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn create_versioned_invoice(
    State(state): State<AppState>,
    Path(registration_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Invoice>), AppError> {
    let invoice = state
        .invoices
        .create_versioned_invoice(registration_id)
        .await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn latest_invoice(
    State(state): State<AppState>,
    Path(registration_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state.invoices.latest_invoice(registration_id).await?;
    Ok(Json(invoice))
}
