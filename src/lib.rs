use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::services::auth::AuthService;
use crate::services::payment::PaymentService;
use crate::services::registration::RegistrationService;

/// Each service holds its own `Arc<DatabaseConnection>`; the state only
/// carries the services and the configuration the handlers read.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub auth: AuthService,
    pub registration: RegistrationService,
    pub payments: PaymentService,
}

pub mod entities {
    pub mod prelude;

    pub mod customer_profiles;
    pub mod documents;
    pub mod otps;
    pub mod payment_webhooks;
    pub mod payments;
    pub mod users;
}

pub mod services {
    pub mod auth;
    pub mod notification;
    pub mod payment;
    pub mod registration;
    pub mod storage;
    pub mod zenopay;
}

pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod models;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/profile/{user_id}", get(handlers::auth::profile))
        .route(
            "/auth/password-reset/request",
            post(handlers::auth::request_password_reset),
        )
        .route("/auth/password-reset", post(handlers::auth::reset_password))
        .route(
            "/auth/register/step-1",
            post(handlers::registration::step1),
        )
        .route(
            "/auth/register/step-2",
            post(handlers::registration::step2),
        )
        .route(
            "/auth/register/step-3",
            post(handlers::registration::step3),
        )
        .route(
            "/auth/register/step-4",
            post(handlers::registration::step4),
        )
        .route(
            "/auth/register/step-5",
            post(handlers::registration::step5),
        )
        .route(
            "/auth/register/status/{user_id}",
            get(handlers::registration::status),
        )
        .route(
            "/auth/register/resend-otp",
            post(handlers::registration::resend_otp),
        )
        .route("/payments/status", get(handlers::payment::service_status))
        .route("/payments/create", post(handlers::payment::create_payment))
        .route(
            "/payments/test",
            post(handlers::payment::create_test_payment),
        )
        .route("/payments/order-status", get(handlers::payment::order_status))
        .route(
            "/payments/order/{order_id}",
            get(handlers::payment::get_payment),
        )
        .route("/payments/list", get(handlers::payment::list_payments))
        .route(
            "/payments/sync-pending",
            post(handlers::payment::sync_pending),
        )
        .route("/payments/webhook", post(handlers::payment::webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "Kanisa backend is running"
}
