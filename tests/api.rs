//! HTTP-level tests against the full router with a mocked database.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use sea_orm::{DatabaseBackend, MockDatabase};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use kanisa_backend::app;

use common::{build_state, test_config};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body read failed")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is not JSON")
}

fn mock_db() -> sea_orm::DatabaseConnection {
    MockDatabase::new(DatabaseBackend::Postgres).into_connection()
}

#[tokio::test]
async fn health_endpoint_responds() {
    let app = app(build_state(mock_db(), test_config(None)));
    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn payment_status_reports_unconfigured() {
    let app = app(build_state(mock_db(), test_config(None)));
    let response = app
        .oneshot(
            Request::get("/payments/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["is_configured"], json!(false));
    assert_eq!(body["provider"], json!("ZenoPay"));
}

#[tokio::test]
async fn webhook_rejects_bad_api_key() {
    let app = app(build_state(mock_db(), test_config(Some("secret"))));
    let payload = json!({
        "order_id": "o-1",
        "payment_status": "COMPLETED",
        "reference": "ref-1"
    });
    let response = app
        .oneshot(
            Request::post("/payments/webhook")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-api-key", "not-the-secret")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(body["code"], json!("unauthorized"));
}

#[tokio::test]
async fn webhook_requires_api_key_header() {
    let app = app(build_state(mock_db(), test_config(Some("secret"))));
    let payload = json!({
        "order_id": "o-1",
        "payment_status": "COMPLETED",
        "reference": "ref-1"
    });
    let response = app
        .oneshot(
            Request::post("/payments/webhook")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_fails_closed_when_gateway_unconfigured() {
    let app = app(build_state(mock_db(), test_config(None)));
    let payload = json!({
        "order_id": "o-1",
        "payment_status": "COMPLETED",
        "reference": "ref-1"
    });
    let response = app
        .oneshot(
            Request::post("/payments/webhook")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-api-key", "anything")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = body_json(response).await;
    assert_eq!(body["code"], json!("service_unavailable"));
}

#[tokio::test]
async fn registration_status_for_unknown_user_is_404() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<kanisa_backend::entities::users::Model>::new()])
        .into_connection();
    let app = app(build_state(db, test_config(None)));

    let response = app
        .oneshot(
            Request::get(format!("/auth/register/status/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["code"], json!("not_found"));
}

#[tokio::test]
async fn payment_creation_for_unknown_user_is_404() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<kanisa_backend::entities::users::Model>::new()])
        .into_connection();
    let app = app(build_state(db, test_config(Some("secret"))));

    let payload = json!({ "user_id": Uuid::new_v4(), "amount": 1000 });
    let response = app
        .oneshot(
            Request::post("/payments/create")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_payment_with_bad_phone_is_rejected() {
    let app = app(build_state(mock_db(), test_config(Some("secret"))));
    let payload = json!({
        "buyer_email": "buyer@example.com",
        "buyer_name": "Test Buyer",
        "buyer_phone": "0612345678",
        "amount": 1000
    });
    let response = app
        .oneshot(
            Request::post("/payments/test")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["code"], json!("validation_error"));
}
