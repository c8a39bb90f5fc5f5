use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kanisa_backend::config::AppConfig;
use kanisa_backend::jobs::payment_sync::start_payment_sync_job;
use kanisa_backend::services::auth::AuthService;
use kanisa_backend::services::notification::HttpNotifier;
use kanisa_backend::services::payment::PaymentService;
use kanisa_backend::services::registration::RegistrationService;
use kanisa_backend::services::storage::HttpObjectStorage;
use kanisa_backend::services::zenopay::ZenoClient;
use kanisa_backend::{app, AppState};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,kanisa_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env();

    // Connect to database
    if config.database_url.is_empty() {
        panic!("DATABASE_URL must be set");
    }
    tracing::info!("Connecting to database...");
    let db = Arc::new(
        Database::connect(&config.database_url)
            .await
            .expect("Failed to connect to database"),
    );

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(db.as_ref(), None)
        .await
        .expect("Failed to run migrations");

    let notifier = Arc::new(HttpNotifier::new(config.notifications.clone()));
    let storage = Arc::new(HttpObjectStorage::new(config.storage.clone()));
    let zeno = ZenoClient::new(&config.payment);

    let auth = AuthService::new(
        db.clone(),
        notifier,
        config.jwt.clone(),
        config.otp_invalidate_previous,
    );
    let registration =
        RegistrationService::new(db.clone(), auth.clone(), storage, config.upload.clone());
    let payments = PaymentService::new(db, zeno, config.payment.webhook_url.clone());

    start_payment_sync_job(payments.clone(), config.payment.sync_interval_minutes).await;

    let port = config.port;
    let state = AppState {
        config,
        auth,
        registration,
        payments,
    };

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .expect("Failed to bind server port");
    tracing::info!(
        "Server listening on {}",
        listener
            .local_addr()
            .expect("Failed to read local address")
    );

    axum::serve(listener, app(state))
        .await
        .expect("Server error");
}
