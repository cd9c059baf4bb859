//! HTTP handlers for conference-billing.

pub mod company_invoices;
pub mod invoices;
pub mod payments;
pub mod registrations;

use crate::services::get_metrics;
use crate::services::metrics::ERRORS_TOTAL;
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use service_core::error::AppError;

pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "conference-billing",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Ready once the store answers.
pub async fn readiness_check(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    readiness(state.store.health_check().await)
}

fn readiness(store_health: Result<(), AppError>) -> Result<Json<Value>, AppError> {
    match store_health {
        Ok(()) => Ok(Json(json!({ "status": "ready" }))),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            ERRORS_TOTAL.with_label_values(&["store_unavailable"]).inc();
            Err(AppError::ServiceUnavailable)
        }
    }
}

pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_when_store_answers() {
        let Json(body) = readiness(Ok(())).unwrap();
        assert_eq!(body["status"], "ready");
    }

    #[test]
    fn test_unreachable_store_is_unavailable() {
        let counter = ERRORS_TOTAL.with_label_values(&["store_unavailable"]);
        let before = counter.get();

        let err = readiness(Err(AppError::DatabaseError(anyhow::anyhow!("connection refused"))))
            .unwrap_err();

        assert!(matches!(err, AppError::ServiceUnavailable));
        assert!(counter.get() >= before + 1.0);
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
