use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::blueprint::{FieldSpec, StepId};
use super::domain::{FieldKey, FieldValue, SessionId};
use super::draft::DraftStore;
use super::notify::Notifier;
use super::payment::PaymentProvider;
use super::service::{ApplicationServiceError, CheckoutOutcome, VisaApplicationService};

/// Router exposing the step flow, draft-backed field updates, and checkout.
pub fn application_router<D, P, N>(service: Arc<VisaApplicationService<D, P, N>>) -> Router
where
    D: DraftStore + 'static,
    P: PaymentProvider + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/api/v1/form", get(form_handler::<D, P, N>))
        .route("/api/v1/applications", post(start_handler::<D, P, N>))
        .route(
            "/api/v1/applications/:session_id",
            get(view_handler::<D, P, N>).delete(abandon_handler::<D, P, N>),
        )
        .route(
            "/api/v1/applications/:session_id/fields",
            patch(update_fields_handler::<D, P, N>),
        )
        .route(
            "/api/v1/applications/:session_id/next",
            post(next_handler::<D, P, N>),
        )
        .route(
            "/api/v1/applications/:session_id/previous",
            post(previous_handler::<D, P, N>),
        )
        .route(
            "/api/v1/applications/:session_id/payment",
            get(payment_handler::<D, P, N>),
        )
        .route(
            "/api/v1/applications/:session_id/checkout",
            post(checkout_handler::<D, P, N>),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StartQuery {
    pub step: Option<String>,
    pub draft_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FieldUpdateRequest {
    pub fields: BTreeMap<FieldKey, FieldValue>,
}

#[derive(Debug, Serialize)]
struct StepSchema<'a> {
    id: StepId,
    title: &'a str,
    fields: Vec<&'a FieldSpec>,
}

pub(crate) async fn form_handler<D, P, N>(
    State(service): State<Arc<VisaApplicationService<D, P, N>>>,
) -> Response
where
    D: DraftStore + 'static,
    P: PaymentProvider + 'static,
    N: Notifier + 'static,
{
    let blueprint = service.blueprint();
    let steps: Vec<StepSchema<'_>> = blueprint
        .steps()
        .iter()
        .map(|step| StepSchema {
            id: step.id,
            title: &step.title,
            fields: step
                .fields
                .iter()
                .filter_map(|key| blueprint.field(*key))
                .collect(),
        })
        .collect();

    let payload = json!({
        "steps": steps,
        "fee": service.charge(),
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

pub(crate) async fn start_handler<D, P, N>(
    State(service): State<Arc<VisaApplicationService<D, P, N>>>,
    Query(query): Query<StartQuery>,
) -> Response
where
    D: DraftStore + 'static,
    P: PaymentProvider + 'static,
    N: Notifier + 'static,
{
    match service.start(query.draft_id, query.step).await {
        Ok(view) => (StatusCode::CREATED, axum::Json(view)).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn view_handler<D, P, N>(
    State(service): State<Arc<VisaApplicationService<D, P, N>>>,
    Path(session_id): Path<String>,
) -> Response
where
    D: DraftStore + 'static,
    P: PaymentProvider + 'static,
    N: Notifier + 'static,
{
    match service.view(&SessionId(session_id)).await {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn abandon_handler<D, P, N>(
    State(service): State<Arc<VisaApplicationService<D, P, N>>>,
    Path(session_id): Path<String>,
) -> Response
where
    D: DraftStore + 'static,
    P: PaymentProvider + 'static,
    N: Notifier + 'static,
{
    match service.abandon(&SessionId(session_id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn update_fields_handler<D, P, N>(
    State(service): State<Arc<VisaApplicationService<D, P, N>>>,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<FieldUpdateRequest>,
) -> Response
where
    D: DraftStore + 'static,
    P: PaymentProvider + 'static,
    N: Notifier + 'static,
{
    match service
        .update_fields(&SessionId(session_id), request.fields)
        .await
    {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn next_handler<D, P, N>(
    State(service): State<Arc<VisaApplicationService<D, P, N>>>,
    Path(session_id): Path<String>,
) -> Response
where
    D: DraftStore + 'static,
    P: PaymentProvider + 'static,
    N: Notifier + 'static,
{
    match service.next(&SessionId(session_id)).await {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn previous_handler<D, P, N>(
    State(service): State<Arc<VisaApplicationService<D, P, N>>>,
    Path(session_id): Path<String>,
) -> Response
where
    D: DraftStore + 'static,
    P: PaymentProvider + 'static,
    N: Notifier + 'static,
{
    match service.previous(&SessionId(session_id)).await {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn payment_handler<D, P, N>(
    State(service): State<Arc<VisaApplicationService<D, P, N>>>,
    Path(session_id): Path<String>,
) -> Response
where
    D: DraftStore + 'static,
    P: PaymentProvider + 'static,
    N: Notifier + 'static,
{
    match service.payment_readiness(&SessionId(session_id)).await {
        Ok(readiness) => {
            let payload = json!({
                "ready": readiness.is_ready(),
                "message": readiness.message(),
                "readiness": readiness,
                "amount": service.charge().display_amount(),
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn checkout_handler<D, P, N>(
    State(service): State<Arc<VisaApplicationService<D, P, N>>>,
    Path(session_id): Path<String>,
) -> Response
where
    D: DraftStore + 'static,
    P: PaymentProvider + 'static,
    N: Notifier + 'static,
{
    match service.checkout(&SessionId(session_id)).await {
        Ok(CheckoutOutcome::Completed(receipt)) => {
            (StatusCode::OK, axum::Json(receipt)).into_response()
        }
        Ok(CheckoutOutcome::PaymentFailed { reason }) => {
            let payload = json!({
                "error": reason,
            });
            (StatusCode::PAYMENT_REQUIRED, axum::Json(payload)).into_response()
        }
        Err(error) => service_error_response(error),
    }
}

fn service_error_response(error: ApplicationServiceError) -> Response {
    let status = match &error {
        ApplicationServiceError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        ApplicationServiceError::SessionBusy(_) => StatusCode::CONFLICT,
        ApplicationServiceError::FieldKindMismatch(_)
        | ApplicationServiceError::FinalValidationPending
        | ApplicationServiceError::PaymentNotReady(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ApplicationServiceError::Payment(_) => StatusCode::BAD_GATEWAY,
        ApplicationServiceError::Draft(_) | ApplicationServiceError::RegistryUnavailable => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let payload = match &error {
        ApplicationServiceError::PaymentNotReady(readiness) => json!({
            "error": error.to_string(),
            "readiness": readiness,
        }),
        _ => json!({
            "error": error.to_string(),
        }),
    };
    (status, axum::Json(payload)).into_response()
}
