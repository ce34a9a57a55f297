use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::workflows::visa::payment::SimulatedPaymentProvider;

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn start_session(router: &axum::Router, query: &str) -> Value {
    let response = router
        .clone()
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/v1/applications{query}"),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json_body(response).await
}

#[tokio::test]
async fn start_route_honours_and_normalizes_the_step_query() {
    let (service, _, _) = build_service();
    let router = application_router_with_service(Arc::new(service));

    let deep = start_session(&router, "?step=3").await;
    assert_eq!(deep["step"], json!(3));
    assert_eq!(deep["title"], json!("Passport Information & Upload"));

    let garbage = start_session(&router, "?step=2abc").await;
    assert_eq!(garbage["step"], json!(1));
    assert_eq!(garbage["step_query"], json!("step=1"));
    assert_eq!(garbage["progress"], json!(0.0));
}

#[tokio::test]
async fn unknown_sessions_return_not_found() {
    let (service, _, _) = build_service();
    let router = application_router_with_service(Arc::new(service));

    let response = router
        .oneshot(empty_request(Method::GET, "/api/v1/applications/nope"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = read_json_body(response).await;
    assert!(payload["error"]
        .as_str()
        .unwrap_or_default()
        .contains("not found"));
}

#[tokio::test]
async fn field_updates_reject_unknown_keys_and_wrong_shapes() {
    let (service, _, _) = build_service();
    let router = application_router_with_service(Arc::new(service));
    let session = start_session(&router, "").await;
    let id = session["session_id"].as_str().expect("session id").to_string();
    let uri = format!("/api/v1/applications/{id}/fields");

    let unknown = router
        .clone()
        .oneshot(json_request(
            Method::PATCH,
            &uri,
            json!({ "fields": { "favouriteColour": "blue" } }),
        ))
        .await
        .expect("route executes");
    assert_eq!(unknown.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let wrong_shape = router
        .clone()
        .oneshot(json_request(
            Method::PATCH,
            &uri,
            json!({ "fields": { "acceptTerms": "yes" } }),
        ))
        .await
        .expect("route executes");
    assert_eq!(wrong_shape.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let accepted = router
        .oneshot(json_request(
            Method::PATCH,
            &uri,
            json!({ "fields": { "surname": "Aliyeva", "acceptTerms": true } }),
        ))
        .await
        .expect("route executes");
    assert_eq!(accepted.status(), StatusCode::OK);
    let payload = read_json_body(accepted).await;
    assert_eq!(payload["fields"]["surname"], json!("Aliyeva"));
    assert_eq!(payload["fields"]["acceptTerms"], json!(true));
}

#[tokio::test]
async fn next_route_reports_blocking_errors() {
    let (service, _, _) = build_service();
    let router = application_router_with_service(Arc::new(service));
    let session = start_session(&router, "").await;
    let id = session["session_id"].as_str().expect("session id").to_string();

    let response = router
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/v1/applications/{id}/next"),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json_body(response).await;
    assert_eq!(payload["transition"]["outcome"], json!("blocked"));
    assert_eq!(
        payload["transition"]["errors"]["nationality"],
        json!("Nationality is required")
    );
    assert_eq!(payload["session"]["step"], json!(1));
}

#[tokio::test]
async fn payment_route_explains_why_checkout_is_hidden() {
    let (service, _, _) = build_service();
    let router = application_router_with_service(Arc::new(service));
    let session = start_session(&router, "").await;
    let id = session["session_id"].as_str().expect("session id").to_string();

    let response = router
        .clone()
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/v1/applications/{id}/payment"),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["ready"], json!(false));
    assert_eq!(payload["readiness"]["status"], json!("terms_not_accepted"));
    assert_eq!(payload["amount"], json!("$59.00 USD"));

    let checkout = router
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/v1/applications/{id}/checkout"),
        ))
        .await
        .expect("route executes");
    assert_eq!(checkout.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(checkout).await;
    assert_eq!(payload["readiness"]["status"], json!("terms_not_accepted"));
}

#[tokio::test]
async fn form_route_lists_steps_and_fee() {
    let (service, _, _) = build_service();
    let router = application_router_with_service(Arc::new(service));

    let response = router
        .oneshot(empty_request(Method::GET, "/api/v1/form"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json_body(response).await;
    let steps = payload["steps"].as_array().expect("steps array");
    assert_eq!(steps.len(), 4);
    assert_eq!(steps[3]["fields"][0]["key"], json!("acceptTerms"));
    assert_eq!(steps[0]["fields"][0]["kind"]["type"], json!("choice"));
    assert_eq!(payload["fee"]["amount_minor_units"], json!(5900));
}

#[tokio::test]
async fn checkout_handler_returns_payment_required_on_decline() {
    let (service, _, _) = build_service_with(Arc::new(SimulatedPaymentProvider::declining([
        "nigar@example.com",
    ])));
    let session_id = finalized_session(&service).await;

    let response = crate::workflows::visa::router::checkout_handler::<
        crate::workflows::visa::draft::InMemoryDraftStore,
        SimulatedPaymentProvider,
        crate::workflows::visa::notify::OutboxNotifier,
    >(State(Arc::new(service)), Path(session_id.0.clone()))
    .await;

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["error"], json!("Your card was declined."));
}

#[tokio::test]
async fn checkout_route_completes_a_finalized_application() {
    let (service, _, notifier) = build_service();
    let session_id = finalized_session(&service).await;
    let router = application_router_with_service(Arc::new(service));

    let response = router
        .clone()
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/v1/applications/{}/checkout", session_id.0),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["notification"]["status"], json!("delivered"));
    assert!(payload["transaction_id"]
        .as_str()
        .unwrap_or_default()
        .starts_with("pi_"));
    assert_eq!(notifier.sent().len(), 1);

    let gone = router
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/v1/applications/{}", session_id.0),
        ))
        .await
        .expect("route executes");
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_route_discards_the_session() {
    let (service, _, _) = build_service();
    let service = Arc::new(service);
    let router = application_router_with_service(service.clone());
    let session = start_session(&router, "").await;
    let id = session["session_id"].as_str().expect("session id").to_string();
    let uri = format!("/api/v1/applications/{id}");

    let response = router
        .clone()
        .oneshot(empty_request(Method::DELETE, &uri))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(service.session_count(), 0);

    let response = router
        .clone()
        .oneshot(empty_request(Method::GET, &uri))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .oneshot(empty_request(Method::DELETE, &uri))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
