//! Mobile-money payments against the ZenoPay gateway.
//!
//! A PENDING row is persisted before the gateway is contacted, so every
//! initiation attempt is visible even when the gateway call fails. The
//! reconciliation sweep and the webhook path both converge rows toward
//! the gateway's view of the order.

use chrono::{Duration, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::payment_webhooks;
use crate::entities::payments::{self, PaymentChannel, PaymentStatus};
use crate::entities::prelude::*;
use crate::entities::users;
use crate::error::ApiError;
use crate::models::payment::{
    CreatePaymentRequest, GatewayInitiateRequest, ListParams, ManualPaymentRequest,
    OrderStatusData, OrderStatusResponse, Pagination, PaymentAck, ServiceStatus, SyncReport,
    WebhookAck, WebhookPayload,
};
use crate::services::zenopay::ZenoClient;

/// PENDING rows older than this are failed without a gateway query.
pub const PENDING_EXPIRY_MINUTES: i64 = 5;
/// Pause between consecutive gateway status calls during a sweep.
pub const SYNC_CALL_DELAY_MS: u64 = 500;

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

lazy_static! {
    static ref TZ_PHONE: Regex = Regex::new(r"^07\d{8}$").unwrap();
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    zeno: ZenoClient,
    webhook_url: Option<String>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        zeno: ZenoClient,
        webhook_url: Option<String>,
    ) -> Self {
        Self {
            db,
            zeno,
            webhook_url,
        }
    }

    fn conn(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Initiate a payment on behalf of a registered user. Buyer details
    /// come from the account record.
    pub async fn create_user_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<PaymentAck, ApiError> {
        validate_amount(request.amount)?;

        let user = Users::find_by_id(request.user_id)
            .one(self.conn())
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

        let buyer_email = user
            .email
            .clone()
            .ok_or_else(|| ApiError::Validation("User has no email on record".to_string()))?;
        let buyer_name = buyer_name_of(&user)?;
        let buyer_phone = user
            .phone
            .clone()
            .ok_or_else(|| ApiError::Validation("User has no phone number on record".to_string()))?;
        validate_phone(&buyer_phone)?;

        self.initiate(
            Some(user.id),
            buyer_email,
            buyer_name,
            buyer_phone,
            request.amount,
        )
        .await
    }

    /// Initiate a payment with caller-supplied buyer details. Used by
    /// the test endpoint and back-office flows.
    pub async fn create_manual_payment(
        &self,
        request: ManualPaymentRequest,
    ) -> Result<PaymentAck, ApiError> {
        validate_amount(request.amount)?;
        validate_phone(&request.buyer_phone)?;
        if request.buyer_email.trim().is_empty() || !request.buyer_email.contains('@') {
            return Err(ApiError::Validation(
                "A valid buyer email is required".to_string(),
            ));
        }
        if request.buyer_name.trim().is_empty() {
            return Err(ApiError::Validation("Buyer name is required".to_string()));
        }

        self.initiate(
            request.user_id,
            request.buyer_email,
            request.buyer_name,
            request.buyer_phone,
            request.amount,
        )
        .await
    }

    async fn initiate(
        &self,
        user_id: Option<Uuid>,
        buyer_email: String,
        buyer_name: String,
        buyer_phone: String,
        amount: i64,
    ) -> Result<PaymentAck, ApiError> {
        let order_id = Uuid::new_v4().to_string();

        let existing = Payments::find()
            .filter(payments::Column::OrderId.eq(order_id.as_str()))
            .one(self.conn())
            .await?;
        if existing.is_some() {
            return Err(ApiError::Conflict("Order ID already exists".to_string()));
        }

        let now = Utc::now().naive_utc();
        let record = payments::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            order_id: Set(order_id.clone()),
            buyer_email: Set(buyer_email.clone()),
            buyer_name: Set(buyer_name.clone()),
            buyer_phone: Set(buyer_phone.clone()),
            amount: Set(amount),
            payment_status: Set(PaymentStatus::Pending),
            payment_channel: Set(None),
            transaction_id: Set(None),
            reference: Set(None),
            msisdn: Set(None),
            webhook_url: Set(self.webhook_url.clone()),
            metadata: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Payments::insert(record)
            .exec_without_returning(self.conn())
            .await?;

        let gateway_request = GatewayInitiateRequest {
            order_id: order_id.clone(),
            buyer_email,
            buyer_name,
            buyer_phone,
            amount,
            webhook_url: self.webhook_url.clone(),
        };

        match self.zeno.initiate(&gateway_request).await {
            Ok(ack) => {
                tracing::info!(%order_id, amount, "payment initiated");
                Ok(ack)
            }
            Err(err) => {
                // The row must reflect the failed initiation before the
                // error propagates
                self.mark_failed(&order_id).await?;
                Err(err)
            }
        }
    }

    async fn mark_failed(&self, order_id: &str) -> Result<(), ApiError> {
        Payments::update_many()
            .col_expr(
                payments::Column::PaymentStatus,
                Expr::value(PaymentStatus::Failed),
            )
            .col_expr(
                payments::Column::UpdatedAt,
                Expr::value(Utc::now().naive_utc()),
            )
            .filter(payments::Column::OrderId.eq(order_id))
            .filter(payments::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .exec(self.conn())
            .await?;
        Ok(())
    }

    /// Query the gateway for an order and fold the answer into our row.
    pub async fn check_order_status(
        &self,
        order_id: &str,
    ) -> Result<OrderStatusResponse, ApiError> {
        let response = self.zeno.order_status(order_id).await?;
        if let Some(data) = response.data.first() {
            self.apply_gateway_update(order_id, data).await?;
        }
        Ok(response)
    }

    async fn apply_gateway_update(
        &self,
        order_id: &str,
        data: &OrderStatusData,
    ) -> Result<bool, ApiError> {
        let Some(status) = PaymentStatus::parse_gateway(&data.payment_status) else {
            tracing::warn!(order_id, status = %data.payment_status, "unrecognized gateway status");
            return Ok(false);
        };

        let mut update = Payments::update_many()
            .col_expr(payments::Column::PaymentStatus, Expr::value(status))
            .col_expr(
                payments::Column::UpdatedAt,
                Expr::value(Utc::now().naive_utc()),
            );
        if let Some(transaction_id) = &data.transaction_id {
            update = update.col_expr(
                payments::Column::TransactionId,
                Expr::value(transaction_id.clone()),
            );
        }
        if let Some(channel) = data.channel.as_deref().and_then(PaymentChannel::parse_gateway) {
            update = update.col_expr(payments::Column::PaymentChannel, Expr::value(channel));
        }
        if let Some(reference) = &data.reference {
            update = update.col_expr(payments::Column::Reference, Expr::value(reference.clone()));
        }
        if let Some(msisdn) = &data.msisdn {
            update = update.col_expr(payments::Column::Msisdn, Expr::value(msisdn.clone()));
        }

        let result = update
            .filter(payments::Column::OrderId.eq(order_id))
            .exec(self.conn())
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Record and apply an inbound gateway webhook. The audit row is
    /// written unconditionally; the payment row takes the reported
    /// status even over a terminal one (last write wins).
    pub async fn process_webhook(&self, payload: WebhookPayload) -> Result<WebhookAck, ApiError> {
        let metadata = payload
            .metadata
            .as_ref()
            .map(|m| m.to_string());

        let audit = payment_webhooks::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(payload.order_id.clone()),
            payment_status: Set(payload.payment_status.clone()),
            reference: Set(payload.reference.clone()),
            metadata: Set(metadata.clone()),
            created_at: Set(Utc::now().naive_utc()),
        };
        PaymentWebhooks::insert(audit)
            .exec_without_returning(self.conn())
            .await?;

        let Some(status) = PaymentStatus::parse_gateway(&payload.payment_status) else {
            tracing::warn!(
                order_id = %payload.order_id,
                status = %payload.payment_status,
                "webhook carried unrecognized status"
            );
            return Ok(WebhookAck {
                status: "ignored",
                message: "Unrecognized payment status",
            });
        };

        let mut update = Payments::update_many()
            .col_expr(payments::Column::PaymentStatus, Expr::value(status))
            .col_expr(
                payments::Column::Reference,
                Expr::value(payload.reference.clone()),
            )
            .col_expr(
                payments::Column::UpdatedAt,
                Expr::value(Utc::now().naive_utc()),
            );
        if let Some(metadata) = metadata {
            update = update.col_expr(payments::Column::Metadata, Expr::value(metadata));
        }

        let result = update
            .filter(payments::Column::OrderId.eq(payload.order_id.as_str()))
            .exec(self.conn())
            .await?;
        if result.rows_affected == 0 {
            tracing::warn!(order_id = %payload.order_id, "webhook for unknown order");
            return Err(ApiError::NotFound("Payment not found".to_string()));
        }

        tracing::info!(order_id = %payload.order_id, ?status, "webhook applied");
        Ok(WebhookAck {
            status: "ok",
            message: "Webhook processed",
        })
    }

    pub async fn get_by_order_id(&self, order_id: &str) -> Result<payments::Model, ApiError> {
        Payments::find()
            .filter(payments::Column::OrderId.eq(order_id))
            .one(self.conn())
            .await?
            .ok_or_else(|| ApiError::NotFound("Payment not found".to_string()))
    }

    pub async fn list(
        &self,
        params: ListParams,
    ) -> Result<(Vec<payments::Model>, Pagination), ApiError> {
        let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
        let offset = params.offset.unwrap_or(0);
        let records = Payments::find()
            .order_by_desc(payments::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(self.conn())
            .await?;
        let pagination = Pagination {
            limit,
            offset,
            count: records.len(),
        };
        Ok((records, pagination))
    }

    pub fn service_status(&self) -> ServiceStatus {
        if self.zeno.is_configured() {
            ServiceStatus {
                is_configured: true,
                provider: "ZenoPay",
                message: "Payment service is operational",
            }
        } else {
            ServiceStatus {
                is_configured: false,
                provider: "ZenoPay",
                message: "Payment service is not configured",
            }
        }
    }

    /// One reconciliation sweep over all PENDING rows. Stale rows are
    /// failed locally; the rest are checked against the gateway with a
    /// delay between calls. A record-level failure never aborts the
    /// sweep.
    pub async fn sync_pending_payments(&self) -> Result<SyncReport, ApiError> {
        let pending = Payments::find()
            .filter(payments::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .all(self.conn())
            .await?;

        let mut report = SyncReport {
            total: pending.len(),
            ..Default::default()
        };
        let now = Utc::now().naive_utc();
        let mut queried_gateway = false;

        for payment in pending {
            let expired = now - payment.created_at > Duration::minutes(PENDING_EXPIRY_MINUTES);

            let outcome = if expired {
                self.expire_payment(&payment.order_id).await.map(|_| {
                    report.expired += 1;
                })
            } else {
                if queried_gateway {
                    tokio::time::sleep(std::time::Duration::from_millis(SYNC_CALL_DELAY_MS)).await;
                }
                queried_gateway = true;
                self.reconcile_with_gateway(&payment.order_id)
                    .await
                    .map(|updated| {
                        if updated {
                            report.updated += 1;
                        }
                    })
            };

            if let Err(err) = outcome {
                report.failed += 1;
                report
                    .errors
                    .push(format!("{}: {err}", payment.order_id));
            }
        }

        tracing::info!(
            total = report.total,
            updated = report.updated,
            expired = report.expired,
            failed = report.failed,
            "payment sweep finished"
        );
        Ok(report)
    }

    async fn expire_payment(&self, order_id: &str) -> Result<(), ApiError> {
        self.mark_failed(order_id).await?;
        tracing::info!(order_id, "stale pending payment failed");
        Ok(())
    }

    async fn reconcile_with_gateway(&self, order_id: &str) -> Result<bool, ApiError> {
        let response = self.zeno.order_status(order_id).await?;
        let Some(data) = response.data.first() else {
            return Ok(false);
        };
        match PaymentStatus::parse_gateway(&data.payment_status) {
            Some(PaymentStatus::Pending) | None => Ok(false),
            Some(_) => self.apply_gateway_update(order_id, data).await,
        }
    }
}

fn validate_amount(amount: i64) -> Result<(), ApiError> {
    if amount <= 0 {
        return Err(ApiError::Validation(
            "Amount must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_phone(phone: &str) -> Result<(), ApiError> {
    if !TZ_PHONE.is_match(phone) {
        return Err(ApiError::Validation(
            "Invalid phone number format. Expected format: 07XXXXXXXX".to_string(),
        ));
    }
    Ok(())
}

fn buyer_name_of(user: &users::Model) -> Result<String, ApiError> {
    match (user.first_name.as_deref(), user.last_name.as_deref()) {
        (Some(first), Some(last)) => Ok(format!("{first} {last}")),
        (Some(first), None) => Ok(first.to_string()),
        _ => Err(ApiError::Validation(
            "User has no name on record".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaymentConfig;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn zeno(api_key: Option<&str>) -> ZenoClient {
        ZenoClient::new(&PaymentConfig {
            api_key: api_key.map(str::to_string),
            base_url: "https://zenoapi.com".to_string(),
            webhook_url: None,
            sync_interval_minutes: 5,
        })
    }

    fn pending_payment(minutes_old: i64) -> payments::Model {
        let created = Utc::now().naive_utc() - Duration::minutes(minutes_old);
        payments::Model {
            id: Uuid::new_v4(),
            user_id: None,
            order_id: Uuid::new_v4().to_string(),
            buyer_email: "buyer@example.com".to_string(),
            buyer_name: "Test Buyer".to_string(),
            buyer_phone: "0712345678".to_string(),
            amount: 1000,
            payment_status: PaymentStatus::Pending,
            payment_channel: None,
            transaction_id: None,
            reference: None,
            msisdn: None,
            webhook_url: None,
            metadata: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn phone_format_enforced() {
        assert!(validate_phone("0712345678").is_ok());
        assert!(validate_phone("0612345678").is_err());
        assert!(validate_phone("+255712345678").is_err());
        assert!(validate_phone("071234567").is_err());
        assert!(validate_phone("07123456789").is_err());
    }

    #[test]
    fn amount_must_be_positive() {
        assert!(validate_amount(1).is_ok());
        assert!(validate_amount(0).is_err());
        assert!(validate_amount(-5).is_err());
    }

    #[test]
    fn unconfigured_service_reports_it() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let svc = PaymentService::new(Arc::new(db), zeno(None), None);
        let status = svc.service_status();
        assert!(!status.is_configured);
        assert_eq!(status.provider, "ZenoPay");
    }

    #[tokio::test]
    async fn sweep_expires_stale_pending_without_gateway() {
        // Unconfigured gateway: the sweep must never reach it for
        // expired rows
        let stale = pending_payment(PENDING_EXPIRY_MINUTES + 5);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![stale]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let svc = PaymentService::new(Arc::new(db), zeno(None), None);

        let report = svc.sync_pending_payments().await.unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(report.expired, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn second_sweep_over_converged_state_reports_zero() {
        // First sweep fails the stale row; a repeat over the resulting
        // state finds nothing to update or expire
        let stale = pending_payment(PENDING_EXPIRY_MINUTES + 1);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![stale], Vec::<payments::Model>::new()])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let svc = PaymentService::new(Arc::new(db), zeno(None), None);

        let first = svc.sync_pending_payments().await.unwrap();
        assert_eq!(first.expired, 1);

        let second = svc.sync_pending_payments().await.unwrap();
        assert_eq!(second.total, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.expired, 0);
        assert_eq!(second.failed, 0);
    }

    #[tokio::test]
    async fn sweep_with_nothing_pending_is_a_noop() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<payments::Model>::new()])
            .into_connection();
        let svc = PaymentService::new(Arc::new(db), zeno(None), None);

        let report = svc.sync_pending_payments().await.unwrap();
        assert_eq!(report.total, 0);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn sweep_isolates_record_level_failures() {
        // Fresh pending row, gateway unconfigured: the status query
        // fails but the sweep still completes and reports it
        let fresh = pending_payment(1);
        let order_id = fresh.order_id.clone();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![fresh]])
            .into_connection();
        let svc = PaymentService::new(Arc::new(db), zeno(None), None);

        let report = svc.sync_pending_payments().await.unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains(&order_id));
    }

    #[tokio::test]
    async fn webhook_with_unknown_status_is_ignored_but_audited() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let svc = PaymentService::new(Arc::new(db), zeno(Some("k")), None);

        let ack = svc
            .process_webhook(WebhookPayload {
                order_id: "o-1".to_string(),
                payment_status: "SOMETHING_NEW".to_string(),
                reference: "ref-1".to_string(),
                metadata: None,
            })
            .await
            .unwrap();
        assert_eq!(ack.status, "ignored");
    }

    #[tokio::test]
    async fn webhook_overwrites_terminal_status() {
        // Last write wins: the update carries no status precondition,
        // only the order id filter
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
            ])
            .into_connection();
        let svc = PaymentService::new(Arc::new(db), zeno(Some("k")), None);

        let ack = svc
            .process_webhook(WebhookPayload {
                order_id: "o-1".to_string(),
                payment_status: "failed".to_string(),
                reference: "ref-2".to_string(),
                metadata: Some(serde_json::json!({"note": "late"})),
            })
            .await
            .unwrap();
        assert_eq!(ack.status, "ok");
    }

    #[tokio::test]
    async fn webhook_for_unknown_order_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .into_connection();
        let svc = PaymentService::new(Arc::new(db), zeno(Some("k")), None);

        let err = svc
            .process_webhook(WebhookPayload {
                order_id: "missing".to_string(),
                payment_status: "COMPLETED".to_string(),
                reference: "ref-3".to_string(),
                metadata: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }
}
