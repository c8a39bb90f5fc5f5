use std::sync::Arc;

use sea_orm::DatabaseConnection;

use kanisa_backend::config::{
    AppConfig, JwtConfig, NotificationConfig, PaymentConfig, StorageConfig, UploadConfig,
};
use kanisa_backend::services::auth::AuthService;
use kanisa_backend::services::notification::HttpNotifier;
use kanisa_backend::services::payment::PaymentService;
use kanisa_backend::services::registration::RegistrationService;
use kanisa_backend::services::storage::HttpObjectStorage;
use kanisa_backend::services::zenopay::ZenoClient;
use kanisa_backend::AppState;

pub fn test_config(zeno_api_key: Option<&str>) -> AppConfig {
    AppConfig {
        database_url: String::new(),
        port: 0,
        jwt: JwtConfig {
            secret: "integration-test-secret".to_string(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 7200,
        },
        notifications: NotificationConfig {
            sms_api_url: None,
            sms_api_key: None,
            sms_sender_id: "KANISA".to_string(),
            email_api_url: None,
            email_api_key: None,
            email_from: "Kanisa <noreply@kanisa.org>".to_string(),
        },
        storage: StorageConfig {
            endpoint: None,
            api_key: None,
            bucket: "uploads".to_string(),
            public_url: None,
        },
        payment: PaymentConfig {
            api_key: zeno_api_key.map(str::to_string),
            base_url: "https://zenoapi.com".to_string(),
            webhook_url: None,
            sync_interval_minutes: 5,
        },
        upload: UploadConfig {
            max_file_size: 5 * 1024 * 1024,
            allowed_mime_types: vec![
                "application/pdf".to_string(),
                "image/jpeg".to_string(),
                "image/png".to_string(),
            ],
        },
        otp_invalidate_previous: false,
    }
}

pub fn build_state(db: DatabaseConnection, config: AppConfig) -> AppState {
    let db = Arc::new(db);
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

    AppState {
        config,
        auth,
        registration,
        payments,
    }
}
