//! Credential and OTP machinery shared by login, password reset and the
//! registration state machine.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::entities::otps::{self, OtpPurpose};
use crate::entities::prelude::*;
use crate::entities::users;
use crate::error::ApiError;
use crate::models::auth::{
    AuthResponse, AuthTokens, LoginRequest, MessageResponse, RequestPasswordResetRequest,
    ResetPasswordRequest, UserView,
};
use crate::services::notification::NotificationDispatcher;

pub const OTP_EXPIRY_MINUTES: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

// The connection lives behind an Arc: the mock backend used in tests
// removes Clone from DatabaseConnection itself.
#[derive(Clone)]
pub struct AuthService {
    db: Arc<DatabaseConnection>,
    notifier: Arc<dyn NotificationDispatcher>,
    jwt: JwtConfig,
    otp_invalidate_previous: bool,
}

#[derive(Debug)]
pub struct RegistrationOutcome {
    pub user: users::Model,
    pub message: String,
}

impl AuthService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        notifier: Arc<dyn NotificationDispatcher>,
        jwt: JwtConfig,
        otp_invalidate_previous: bool,
    ) -> Self {
        Self {
            db,
            notifier,
            jwt,
            otp_invalidate_previous,
        }
    }

    fn conn(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn notifier(&self) -> &Arc<dyn NotificationDispatcher> {
        &self.notifier
    }

    /// Create an account and dispatch a registration OTP. Shared core of
    /// registration step 1.
    pub async fn register(
        &self,
        first_name: String,
        last_name: String,
        email: Option<String>,
        phone: Option<String>,
        password: &str,
    ) -> Result<RegistrationOutcome, ApiError> {
        if email.is_none() && phone.is_none() {
            return Err(ApiError::Validation(
                "Either email or phone must be provided".to_string(),
            ));
        }
        validate_password_policy(password)?;

        if let Some(existing) = self
            .find_by_contact(email.as_deref(), phone.as_deref())
            .await?
        {
            if existing.email.is_some() && existing.email == email {
                return Err(ApiError::Conflict("Email already registered".to_string()));
            }
            return Err(ApiError::Conflict(
                "Phone number already registered".to_string(),
            ));
        }

        let now = Utc::now().naive_utc();
        let user = users::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email),
            phone: Set(phone),
            password: Set(hash_password(password)?),
            first_name: Set(Some(first_name)),
            last_name: Set(Some(last_name)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.conn())
        .await?;

        tracing::info!(user_id = %user.id, "user registered");

        let code = self.create_otp(user.id, OtpPurpose::Registration).await?;
        self.send_otp(&user, &code, "Registration").await;

        let channel = if user.email.is_some() { "email" } else { "phone number" };
        Ok(RegistrationOutcome {
            user,
            message: format!("Registration successful. Please verify your {channel}."),
        })
    }

    /// Mint a new OTP. Under the strict policy, all prior unused codes
    /// of the same purpose are voided first.
    pub async fn create_otp(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
    ) -> Result<String, ApiError> {
        if self.otp_invalidate_previous {
            Otps::update_many()
                .col_expr(otps::Column::IsUsed, Expr::value(true))
                .filter(otps::Column::UserId.eq(user_id))
                .filter(otps::Column::Purpose.eq(purpose))
                .filter(otps::Column::IsUsed.eq(false))
                .exec(self.conn())
                .await?;
        }

        let code = generate_otp_code();
        let now = Utc::now().naive_utc();
        let otp = otps::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            code: Set(code.clone()),
            purpose: Set(purpose),
            is_used: Set(false),
            expires_at: Set(now + Duration::minutes(OTP_EXPIRY_MINUTES)),
            created_at: Set(now),
        };
        Otps::insert(otp).exec_without_returning(self.conn()).await?;

        tracing::info!(%user_id, ?purpose, "OTP created");
        Ok(code)
    }

    /// Check and consume an OTP. The consumption is a conditional update
    /// on `is_used = false`, so a code verifies at most once even under
    /// concurrent attempts.
    pub async fn verify_otp(
        &self,
        user_id: Uuid,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<bool, ApiError> {
        let now = Utc::now().naive_utc();
        let otp = Otps::find()
            .filter(otps::Column::UserId.eq(user_id))
            .filter(otps::Column::Code.eq(code))
            .filter(otps::Column::Purpose.eq(purpose))
            .filter(otps::Column::IsUsed.eq(false))
            .filter(otps::Column::ExpiresAt.gt(now))
            .one(self.conn())
            .await?;

        let Some(otp) = otp else {
            return Ok(false);
        };

        let result = Otps::update_many()
            .col_expr(otps::Column::IsUsed, Expr::value(true))
            .filter(otps::Column::Id.eq(otp.id))
            .filter(otps::Column::IsUsed.eq(false))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Best-effort OTP delivery to the account's contact method.
    pub async fn send_otp(&self, user: &users::Model, code: &str, purpose_label: &str) {
        let body = format!(
            "Your verification code is: {code}. This code will expire in {OTP_EXPIRY_MINUTES} minutes."
        );
        let (recipient, subject) = if let Some(email) = &user.email {
            (email.as_str(), Some(format!("Your OTP Code - {purpose_label}")))
        } else if let Some(phone) = &user.phone {
            (phone.as_str(), None)
        } else {
            tracing::warn!(user_id = %user.id, "no contact method for OTP delivery");
            return;
        };

        let outcome = self.notifier.send(recipient, subject.as_deref(), &body).await;
        if outcome.success {
            tracing::info!(user_id = %user.id, "OTP dispatched");
        }
    }

    pub fn generate_tokens(&self, user: &users::Model) -> Result<AuthTokens, ApiError> {
        let now = Utc::now().timestamp();
        let key = EncodingKey::from_secret(self.jwt.secret.as_bytes());

        let access = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            typ: None,
            iat: now,
            exp: now + self.jwt.access_token_ttl_secs,
        };
        let refresh = Claims {
            typ: Some("refresh".to_string()),
            exp: now + self.jwt.refresh_token_ttl_secs,
            ..access.clone()
        };

        let encode = |claims: &Claims| {
            jsonwebtoken::encode(&Header::default(), claims, &key)
                .map_err(|e| ApiError::Internal(format!("token encode failed: {e}")))
        };
        Ok(AuthTokens {
            access_token: encode(&access)?,
            refresh_token: encode(&refresh)?,
        })
    }

    pub fn decode_token(&self, token: &str) -> Result<Claims, ApiError> {
        let key = DecodingKey::from_secret(self.jwt.secret.as_bytes());
        jsonwebtoken::decode::<Claims>(token, &key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))
    }

    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, ApiError> {
        if request.email.is_none() && request.phone.is_none() {
            return Err(ApiError::Validation(
                "Either email or phone is required".to_string(),
            ));
        }

        let user = self
            .find_by_contact(request.email.as_deref(), request.phone.as_deref())
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;

        if !user.is_active {
            return Err(ApiError::Unauthorized(
                "Account not verified. Please verify your account.".to_string(),
            ));
        }
        if !verify_password(&request.password, &user.password)? {
            return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
        }

        let tokens = self.generate_tokens(&user)?;
        tracing::info!(user_id = %user.id, "user logged in");
        Ok(AuthResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user: user.into(),
        })
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, ApiError> {
        let claims = self.decode_token(refresh_token)?;
        if claims.typ.as_deref() != Some("refresh") {
            return Err(ApiError::Unauthorized(
                "Refresh token required".to_string(),
            ));
        }
        let user_id: Uuid = claims
            .sub
            .parse()
            .map_err(|_| ApiError::Unauthorized("Invalid token subject".to_string()))?;
        let user = Users::find_by_id(user_id)
            .one(self.conn())
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
        self.generate_tokens(&user)
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<UserView, ApiError> {
        let user = Users::find_by_id(user_id)
            .one(self.conn())
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
        Ok(user.into())
    }

    /// Returns an identical message whether or not the account exists,
    /// to avoid account enumeration.
    pub async fn request_password_reset(
        &self,
        request: RequestPasswordResetRequest,
    ) -> Result<MessageResponse, ApiError> {
        if request.email.is_none() && request.phone.is_none() {
            return Err(ApiError::Validation(
                "Either email or phone is required".to_string(),
            ));
        }

        let generic = MessageResponse {
            message: "If an account exists, a password reset code has been sent.".to_string(),
        };

        let Some(user) = self
            .find_by_contact(request.email.as_deref(), request.phone.as_deref())
            .await?
        else {
            return Ok(generic);
        };

        let code = self.create_otp(user.id, OtpPurpose::PasswordReset).await?;
        self.send_otp(&user, &code, "Password Reset").await;
        tracing::info!(user_id = %user.id, "password reset requested");

        Ok(generic)
    }

    pub async fn reset_password(
        &self,
        request: ResetPasswordRequest,
    ) -> Result<MessageResponse, ApiError> {
        if request.email.is_none() && request.phone.is_none() {
            return Err(ApiError::Validation(
                "Either email or phone is required".to_string(),
            ));
        }
        validate_password_policy(&request.new_password)?;

        let user = self
            .find_by_contact(request.email.as_deref(), request.phone.as_deref())
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

        if !self
            .verify_otp(user.id, &request.code, OtpPurpose::PasswordReset)
            .await?
        {
            return Err(ApiError::Unauthorized("Invalid or expired OTP".to_string()));
        }

        let now = Utc::now().naive_utc();
        Users::update_many()
            .col_expr(
                users::Column::Password,
                Expr::value(hash_password(&request.new_password)?),
            )
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(user.id))
            .exec(self.conn())
            .await?;

        tracing::info!(user_id = %user.id, "password reset");

        // Confirmation is best-effort: delivery failure must not fail the reset
        if let Some(recipient) = user.email.as_deref().or(user.phone.as_deref()) {
            self.notifier
                .send(
                    recipient,
                    Some("Password Reset Successful"),
                    "Your password has been successfully reset.",
                )
                .await;
        }

        Ok(MessageResponse {
            message: "Password reset successful. You can now login with your new password."
                .to_string(),
        })
    }

    pub async fn resend_otp(
        &self,
        user: &users::Model,
        purpose: OtpPurpose,
    ) -> Result<MessageResponse, ApiError> {
        let code = self.create_otp(user.id, purpose).await?;
        let label = match purpose {
            OtpPurpose::PasswordReset => "Password Reset",
            _ => "Registration",
        };
        self.send_otp(user, &code, label).await;
        Ok(MessageResponse {
            message: "A new verification code has been sent.".to_string(),
        })
    }

    pub async fn find_by_contact(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<users::Model>, ApiError> {
        if email.is_none() && phone.is_none() {
            return Ok(None);
        }
        let mut condition = Condition::any();
        if let Some(email) = email {
            condition = condition.add(users::Column::Email.eq(email));
        }
        if let Some(phone) = phone {
            condition = condition.add(users::Column::Phone.eq(phone));
        }
        Ok(Users::find().filter(condition).one(self.conn()).await?)
    }
}

/// Hash a password with Argon2id in PHC format.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    let parsed = argon2::PasswordHash::new(hash)
        .map_err(|e| ApiError::Internal(format!("stored hash is malformed: {e}")))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(ApiError::Internal(format!("password verify failed: {e}"))),
    }
}

/// Password policy: at least 8 chars with upper, lower and digit.
pub fn validate_password_policy(password: &str) -> Result<(), ApiError> {
    let long_enough = password.chars().count() >= 8;
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if long_enough && has_upper && has_lower && has_digit {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "Password must be at least 8 characters with uppercase, lowercase and a digit"
                .to_string(),
        ))
    }
}

pub fn generate_otp_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_code_is_six_digits() {
        for _ in 0..100 {
            let code = generate_otp_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn password_policy_accepts_compliant() {
        assert!(validate_password_policy("Secure123").is_ok());
    }

    #[test]
    fn password_policy_rejects_weak() {
        assert!(validate_password_policy("short1A").is_err()); // too short
        assert!(validate_password_policy("alllowercase1").is_err());
        assert!(validate_password_policy("ALLUPPERCASE1").is_err());
        assert!(validate_password_policy("NoDigitsHere").is_err());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("Secure123").unwrap();
        assert!(verify_password("Secure123", &hash).unwrap());
        assert!(!verify_password("Wrong1234", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("pw", "not-a-hash").is_err());
    }

    #[test]
    fn token_round_trip_and_refresh_marker() {
        let jwt = JwtConfig {
            secret: "test-secret".to_string(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 7200,
        };
        let db = sea_orm::MockDatabase::new(sea_orm::DatabaseBackend::Postgres).into_connection();
        let notifier = Arc::new(crate::services::notification::testing::RecordingDispatcher::default());
        let service = AuthService::new(Arc::new(db), notifier, jwt, false);

        let user = test_user();
        let tokens = service.generate_tokens(&user).unwrap();

        let access = service.decode_token(&tokens.access_token).unwrap();
        assert_eq!(access.sub, user.id.to_string());
        assert_eq!(access.typ, None);

        let refresh = service.decode_token(&tokens.refresh_token).unwrap();
        assert_eq!(refresh.typ.as_deref(), Some("refresh"));

        assert!(service.decode_token("garbage").is_err());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let existing = test_user();
        let db = sea_orm::MockDatabase::new(sea_orm::DatabaseBackend::Postgres)
            .append_query_results([vec![existing]])
            .into_connection();
        let service = AuthService::new(
            Arc::new(db),
            Arc::new(crate::services::notification::testing::RecordingDispatcher::default()),
            JwtConfig {
                secret: "s".to_string(),
                access_token_ttl_secs: 3600,
                refresh_token_ttl_secs: 7200,
            },
            false,
        );

        let err = service
            .register(
                "John".to_string(),
                "Doe".to_string(),
                Some("j@x.com".to_string()),
                None,
                "Secure123",
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[tokio::test]
    async fn otp_lost_race_does_not_verify() {
        // A matching unused code exists, but another request consumes it
        // between the read and the conditional update
        let user = test_user();
        let now = Utc::now().naive_utc();
        let otp = crate::entities::otps::Model {
            id: Uuid::new_v4(),
            user_id: user.id,
            code: "123456".to_string(),
            purpose: OtpPurpose::Registration,
            is_used: false,
            expires_at: now + Duration::minutes(10),
            created_at: now,
        };
        let db = sea_orm::MockDatabase::new(sea_orm::DatabaseBackend::Postgres)
            .append_query_results([vec![otp]])
            .append_exec_results([sea_orm::MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let service = AuthService::new(
            Arc::new(db),
            Arc::new(crate::services::notification::testing::RecordingDispatcher::default()),
            JwtConfig {
                secret: "s".to_string(),
                access_token_ttl_secs: 3600,
                refresh_token_ttl_secs: 7200,
            },
            false,
        );

        let verified = service
            .verify_otp(user.id, "123456", OtpPurpose::Registration)
            .await
            .unwrap();
        assert!(!verified);
    }

    fn test_user() -> users::Model {
        let now = Utc::now().naive_utc();
        users::Model {
            id: Uuid::new_v4(),
            email: Some("j@x.com".to_string()),
            phone: None,
            password: "hash".to_string(),
            first_name: Some("John".to_string()),
            last_name: Some("Doe".to_string()),
            date_of_birth: None,
            tin_number: None,
            nida_number: None,
            role: crate::entities::users::UserRole::Customer,
            status: crate::entities::users::UserStatus::Pending,
            registration_step: 1,
            registration_completed: false,
            is_active: false,
            is_verified: false,
            created_at: now,
            updated_at: now,
        }
    }
}
