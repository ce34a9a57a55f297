use crate::infra::{parse_date, AppState};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use chrono::{Local, NaiveDate};
use evisa::error::AppError;
use evisa::workflows::visa::eligibility::{
    format_display_date, minimum_expiry_for, parse_calendar_date,
};
use evisa::workflows::visa::{
    application_router, validate_passport_expiry, DraftStore, EligibilityResult, Notifier,
    PaymentProvider, VisaApplicationService,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub(crate) struct PassportEligibilityRequest {
    #[serde(default)]
    pub(crate) expiry: String,
    #[serde(default)]
    pub(crate) arrival: Option<String>,
    /// Evaluate as of this day instead of the server's calendar (YYYY-MM-DD).
    #[serde(default)]
    pub(crate) today: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PassportEligibilityResponse {
    pub(crate) today: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) minimum_expiry: Option<String>,
    pub(crate) result: EligibilityResult,
}

pub(crate) fn with_application_routes<D, P, N>(
    service: Arc<VisaApplicationService<D, P, N>>,
) -> axum::Router
where
    D: DraftStore + 'static,
    P: PaymentProvider + 'static,
    N: Notifier + 'static,
{
    application_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/eligibility/passport",
            axum::routing::post(passport_eligibility_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn passport_eligibility_endpoint(
    Json(payload): Json<PassportEligibilityRequest>,
) -> Result<Json<PassportEligibilityResponse>, AppError> {
    let PassportEligibilityRequest {
        expiry,
        arrival,
        today,
    } = payload;

    let today = match today {
        Some(raw) => parse_date(&raw).map_err(AppError::InvalidRequest)?,
        None => Local::now().date_naive(),
    };

    let minimum_expiry = arrival
        .as_deref()
        .and_then(parse_calendar_date)
        .and_then(minimum_expiry_for)
        .map(format_display_date);
    let result = validate_passport_expiry(&expiry, arrival.as_deref(), today);

    Ok(Json(PassportEligibilityResponse {
        today,
        minimum_expiry,
        result,
    }))
}
