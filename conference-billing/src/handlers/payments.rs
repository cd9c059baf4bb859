//! Hosted checkout endpoints.

use crate::services::checkout::{CheckoutSession, PaymentVerification};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

pub async fn create_checkout_session(
    State(state): State<AppState>,
    Path(registration_id): Path<Uuid>,
) -> Result<Json<CheckoutSession>, AppError> {
    let session = state
        .payments
        .create_checkout_session(registration_id)
        .await?;
    Ok(Json(session))
}

/// Called when the payer returns from the hosted page.
pub async fn verify_payment(
    State(state): State<AppState>,
    Path((registration_id, invoice_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<PaymentVerification>, AppError> {
    let verification = state
        .payments
        .verify_and_update_payment(registration_id, invoice_id)
        .await?;
    Ok(Json(verification))
}
