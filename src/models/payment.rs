use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::payments;

/// User-attributed payment: buyer details come from the account record.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    pub user_id: Uuid,
    pub amount: i64,
}

/// Manual/test payment: caller supplies all buyer fields directly.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualPaymentRequest {
    pub buyer_email: String,
    pub buyer_name: String,
    pub buyer_phone: String,
    pub amount: i64,
    pub user_id: Option<Uuid>,
}

/// Payload sent to the gateway's mobile-money initiation endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayInitiateRequest {
    pub order_id: String,
    pub buyer_email: String,
    pub buyer_name: String,
    pub buyer_phone: String,
    pub amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// Immediate gateway acknowledgment — not the final payment outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAck {
    pub status: String,
    #[serde(default)]
    pub resultcode: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusResponse {
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub resultcode: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Vec<OrderStatusData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusData {
    pub order_id: String,
    #[serde(default)]
    pub creation_date: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    pub payment_status: String,
    // The gateway calls this field `transid`
    #[serde(rename = "transid", default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub msisdn: Option<String>,
}

/// Inbound webhook body from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub order_id: String,
    pub payment_status: String,
    pub reference: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    pub message: &'static str,
}

/// Aggregate result of one reconciliation sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub total: usize,
    pub updated: usize,
    pub expired: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub is_configured: bool,
    pub provider: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListParams {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentListResponse {
    pub status: &'static str,
    pub data: Vec<payments::Model>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub limit: u64,
    pub offset: u64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentRecordResponse {
    pub status: &'static str,
    pub data: payments::Model,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderStatusParams {
    pub order_id: String,
}
