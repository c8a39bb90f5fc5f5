//! Payment endpoints. The webhook route authenticates the caller with
//! the gateway API key in `x-api-key` and fails closed when no key is
//! configured.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;

use crate::error::ApiError;
use crate::models::payment::{
    CreatePaymentRequest, ListParams, ManualPaymentRequest, OrderStatusParams,
    OrderStatusResponse, PaymentAck, PaymentListResponse, PaymentRecordResponse, ServiceStatus,
    SyncReport, WebhookAck, WebhookPayload,
};
use crate::AppState;

pub async fn service_status(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(state.payments.service_status())
}

pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<Json<PaymentAck>, ApiError> {
    state.payments.create_user_payment(request).await.map(Json)
}

pub async fn create_test_payment(
    State(state): State<AppState>,
    Json(request): Json<ManualPaymentRequest>,
) -> Result<Json<PaymentAck>, ApiError> {
    state.payments.create_manual_payment(request).await.map(Json)
}

pub async fn order_status(
    State(state): State<AppState>,
    Query(params): Query<OrderStatusParams>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    state
        .payments
        .check_order_status(&params.order_id)
        .await
        .map(Json)
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<PaymentRecordResponse>, ApiError> {
    let record = state.payments.get_by_order_id(&order_id).await?;
    Ok(Json(PaymentRecordResponse {
        status: "ok",
        data: record,
    }))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<PaymentListResponse>, ApiError> {
    let (data, pagination) = state.payments.list(params).await?;
    Ok(Json(PaymentListResponse {
        status: "ok",
        data,
        pagination,
    }))
}

pub async fn sync_pending(State(state): State<AppState>) -> Result<Json<SyncReport>, ApiError> {
    state.payments.sync_pending_payments().await.map(Json)
}

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<WebhookPayload>,
) -> Result<Json<WebhookAck>, ApiError> {
    let expected = state.config.payment.api_key.as_deref().ok_or_else(|| {
        ApiError::ServiceUnavailable(
            "Payment service is not configured. Please contact administrator.".to_string(),
        )
    })?;
    let presented = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing API key".to_string()))?;
    if presented != expected {
        return Err(ApiError::Unauthorized("Invalid API key".to_string()));
    }

    state.payments.process_webhook(payload).await.map(Json)
}
