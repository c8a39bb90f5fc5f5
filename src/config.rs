//! Environment-derived configuration.
//!
//! Built once in `main` and handed to each service by value; business
//! logic never reads the environment directly.

use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub notifications: NotificationConfig,
    pub storage: StorageConfig,
    pub payment: PaymentConfig,
    pub upload: UploadConfig,
    /// When true, minting a new OTP voids all prior unused codes of the
    /// same purpose.
    pub otp_invalidate_previous: bool,
}

#[derive(Clone, Debug)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
}

#[derive(Clone, Debug)]
pub struct NotificationConfig {
    pub sms_api_url: Option<String>,
    pub sms_api_key: Option<String>,
    pub sms_sender_id: String,
    pub email_api_url: Option<String>,
    pub email_api_key: Option<String>,
    pub email_from: String,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub bucket: String,
    /// Base URL for durable object links; falls back to the endpoint.
    pub public_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PaymentConfig {
    /// Gateway API key; payment features fail closed when unset.
    pub api_key: Option<String>,
    pub base_url: String,
    pub webhook_url: Option<String>,
    /// Sweep interval in minutes; <= 0 disables the background job.
    pub sync_interval_minutes: i64,
}

#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub max_file_size: usize,
    pub allowed_mime_types: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or_default(),
            port: parse_env("PORT", 3001),
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET")
                    .unwrap_or_else(|_| "change-this-secret-in-production".to_string()),
                access_token_ttl_secs: parse_env("JWT_ACCESS_TOKEN_TTL_SECS", 3600),
                refresh_token_ttl_secs: parse_env("JWT_REFRESH_TOKEN_TTL_SECS", 7 * 86400),
            },
            notifications: NotificationConfig {
                sms_api_url: env::var("SMS_API_URL").ok(),
                sms_api_key: env::var("SMS_API_KEY").ok(),
                sms_sender_id: env::var("SMS_SENDER_ID").unwrap_or_else(|_| "KANISA".to_string()),
                email_api_url: env::var("EMAIL_API_URL").ok(),
                email_api_key: env::var("EMAIL_API_KEY").ok(),
                email_from: env::var("EMAIL_FROM")
                    .unwrap_or_else(|_| "Kanisa <noreply@kanisa.org>".to_string()),
            },
            storage: StorageConfig {
                endpoint: env::var("S3_ENDPOINT").ok(),
                api_key: env::var("S3_ACCESS_KEY").ok(),
                bucket: env::var("S3_BUCKET_NAME").unwrap_or_else(|_| "uploads".to_string()),
                public_url: env::var("S3_PUBLIC_URL").ok(),
            },
            payment: PaymentConfig {
                api_key: env::var("ZENO_API_KEY").ok(),
                base_url: env::var("ZENO_BASE_URL")
                    .unwrap_or_else(|_| "https://zenoapi.com".to_string()),
                webhook_url: env::var("ZENO_WEBHOOK_URL").ok(),
                sync_interval_minutes: parse_env("PAYMENT_SYNC_CRON_MINUTES", 5),
            },
            upload: UploadConfig {
                max_file_size: parse_env("MAX_FILE_SIZE", 5 * 1024 * 1024),
                allowed_mime_types: env::var("ALLOWED_DOCUMENT_TYPES")
                    .unwrap_or_else(|_| "application/pdf,image/jpeg,image/png".to_string())
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .collect(),
            },
            otp_invalidate_previous: env::var("OTP_INVALIDATE_PREVIOUS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_env() {
        // Keyed off variables that are never set in CI
        let cfg = AppConfig::from_env();
        assert_eq!(cfg.upload.allowed_mime_types.len(), 3);
        assert!(cfg.upload.allowed_mime_types.contains(&"image/png".to_string()));
        assert_eq!(cfg.upload.max_file_size, 5 * 1024 * 1024);
    }

    #[test]
    fn parse_env_falls_back_when_unset() {
        assert_eq!(parse_env("KANISA_TEST_NEVER_SET_INT", 42), 42);
    }
}
