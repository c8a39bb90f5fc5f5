//! Five-step customer registration state machine.
//!
//! Step ordering is enforced twice: a precondition check against the
//! loaded account, and a conditional `UPDATE ... WHERE registration_step
//! = N` so a concurrent duplicate request cannot advance the same step
//! twice.

use chrono::{Datelike, NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::entities::customer_profiles;
use crate::entities::documents::{self, DocumentType, VerificationStatus};
use crate::entities::otps::OtpPurpose;
use crate::entities::prelude::*;
use crate::entities::users::{self, UserStatus};
use crate::error::ApiError;
use crate::models::auth::MessageResponse;
use crate::models::registration::{
    RegistrationStatusResponse, ResendOtpRequest, Step1Request, Step1Response, Step2Request,
    Step2Response, Step3Request, Step3Response, Step4Request, Step4Response, Step5Request,
    Step5Response, StepInfo, UploadedFile,
};
use crate::services::auth::AuthService;
use crate::services::storage::{sanitize_filename, ObjectStorage};

pub const TOTAL_STEPS: i32 = 5;
pub const MAX_DOCUMENTS_PER_UPLOAD: usize = 10;
pub const MINIMUM_AGE_YEARS: i32 = 18;

const STEPS: [StepInfo; 5] = [
    StepInfo {
        step: 1,
        title: "Account Details",
        description: "Provide your name, contact and password",
    },
    StepInfo {
        step: 2,
        title: "Verify Contact",
        description: "Enter the OTP sent to your email or phone",
    },
    StepInfo {
        step: 3,
        title: "Personal Details",
        description: "Provide your date of birth, TIN and NIDA numbers",
    },
    StepInfo {
        step: 4,
        title: "Business Documents",
        description: "Upload your business registration documents",
    },
    StepInfo {
        step: 5,
        title: "Business Address",
        description: "Provide your business address to finish",
    },
];

#[derive(Clone)]
pub struct RegistrationService {
    db: Arc<DatabaseConnection>,
    auth: AuthService,
    storage: Arc<dyn ObjectStorage>,
    upload: UploadConfig,
}

impl RegistrationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        auth: AuthService,
        storage: Arc<dyn ObjectStorage>,
        upload: UploadConfig,
    ) -> Self {
        Self {
            db,
            auth,
            storage,
            upload,
        }
    }

    fn conn(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Step 1: create the account and send the registration OTP.
    pub async fn step1(&self, request: Step1Request) -> Result<Step1Response, ApiError> {
        let (first_name, last_name) = split_full_name(&request.full_name)?;
        let outcome = self
            .auth
            .register(
                first_name,
                last_name,
                request.email,
                request.phone,
                &request.password,
            )
            .await?;
        Ok(Step1Response {
            user_id: outcome.user.id,
            message: outcome.message,
        })
    }

    /// Step 2: verify the OTP, activate the account and issue tokens.
    pub async fn step2(&self, request: Step2Request) -> Result<Step2Response, ApiError> {
        let user = self.load_user(request.user_id).await?;
        ensure_contact_matches(&user, request.email.as_deref(), request.phone.as_deref())?;

        if user.is_verified && user.registration_step >= 2 {
            return Err(ApiError::Conflict("Account already verified".to_string()));
        }
        ensure_at_step(&user, 2)?;

        if !self
            .auth
            .verify_otp(user.id, &request.otp, OtpPurpose::Registration)
            .await?
        {
            return Err(ApiError::Unauthorized("Invalid or expired OTP".to_string()));
        }

        // Status stays PENDING here; only step 5 finalization flips it
        // to ACTIVE
        let now = Utc::now().naive_utc();
        let result = Users::update_many()
            .col_expr(users::Column::IsVerified, Expr::value(true))
            .col_expr(users::Column::IsActive, Expr::value(true))
            .col_expr(users::Column::RegistrationStep, Expr::value(2))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(user.id))
            .filter(users::Column::RegistrationStep.eq(1))
            .exec(self.conn())
            .await?;
        if result.rows_affected == 0 {
            return Err(ApiError::Conflict(
                "Verification already processed".to_string(),
            ));
        }

        let mut user = user;
        user.is_verified = true;
        user.is_active = true;
        user.registration_step = 2;
        user.updated_at = now;

        let tokens = self.auth.generate_tokens(&user)?;
        tracing::info!(user_id = %user.id, "account verified");

        Ok(Step2Response {
            success: true,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user: user.into(),
            next_step: 3,
        })
    }

    /// Step 3: record personal identity details. A contact method left
    /// out at step 1 may be supplied here; it is adopted after a
    /// uniqueness check.
    pub async fn step3(&self, request: Step3Request) -> Result<Step3Response, ApiError> {
        let user = self.load_user(request.user_id).await?;
        if request.email.is_none() && request.phone.is_none() {
            return Err(ApiError::Validation(
                "Either email or phone must be provided".to_string(),
            ));
        }
        let new_email =
            contact_addition(user.email.as_deref(), request.email.as_deref(), "Email")?;
        let new_phone = contact_addition(
            user.phone.as_deref(),
            request.phone.as_deref(),
            "Phone number",
        )?;
        ensure_at_step(&user, 3)?;

        validate_age(request.date_of_birth, Utc::now().date_naive())?;

        if let Some(email) = new_email {
            let taken = Users::find()
                .filter(users::Column::Email.eq(email))
                .filter(users::Column::Id.ne(user.id))
                .one(self.conn())
                .await?;
            if taken.is_some() {
                return Err(ApiError::Conflict("Email already registered".to_string()));
            }
        }
        if let Some(phone) = new_phone {
            let taken = Users::find()
                .filter(users::Column::Phone.eq(phone))
                .filter(users::Column::Id.ne(user.id))
                .one(self.conn())
                .await?;
            if taken.is_some() {
                return Err(ApiError::Conflict(
                    "Phone number already registered".to_string(),
                ));
            }
        }

        let tin_taken = Users::find()
            .filter(users::Column::TinNumber.eq(request.tin_number.as_str()))
            .filter(users::Column::Id.ne(user.id))
            .one(self.conn())
            .await?;
        if tin_taken.is_some() {
            return Err(ApiError::Conflict(
                "TIN number already registered".to_string(),
            ));
        }
        let nida_taken = Users::find()
            .filter(users::Column::NidaNumber.eq(request.nida_number.as_str()))
            .filter(users::Column::Id.ne(user.id))
            .one(self.conn())
            .await?;
        if nida_taken.is_some() {
            return Err(ApiError::Conflict(
                "NIDA number already registered".to_string(),
            ));
        }

        let now = Utc::now().naive_utc();
        let mut update = Users::update_many()
            .col_expr(
                users::Column::DateOfBirth,
                Expr::value(request.date_of_birth),
            )
            .col_expr(
                users::Column::TinNumber,
                Expr::value(request.tin_number.clone()),
            )
            .col_expr(
                users::Column::NidaNumber,
                Expr::value(request.nida_number.clone()),
            )
            .col_expr(users::Column::RegistrationStep, Expr::value(3))
            .col_expr(users::Column::UpdatedAt, Expr::value(now));
        if let Some(email) = new_email {
            update = update.col_expr(users::Column::Email, Expr::value(email.to_string()));
        }
        if let Some(phone) = new_phone {
            update = update.col_expr(users::Column::Phone, Expr::value(phone.to_string()));
        }
        let result = update
            .filter(users::Column::Id.eq(user.id))
            .filter(users::Column::RegistrationStep.eq(2))
            .exec(self.conn())
            .await?;
        if result.rows_affected == 0 {
            return Err(ApiError::Conflict(
                "Step already processed".to_string(),
            ));
        }

        tracing::info!(user_id = %user.id, "personal details recorded");
        Ok(Step3Response {
            success: true,
            next_step: 4,
        })
    }

    /// Step 4: create the business profile and store uploaded documents.
    pub async fn step4(
        &self,
        request: Step4Request,
        files: Vec<UploadedFile>,
    ) -> Result<Step4Response, ApiError> {
        let user = self.load_user(request.user_id).await?;
        ensure_at_step(&user, 4)?;

        if request.business_name.trim().is_empty() {
            return Err(ApiError::Validation("Business name is required".to_string()));
        }
        if request.business_registration_number.trim().is_empty() {
            return Err(ApiError::Validation(
                "Business registration number is required".to_string(),
            ));
        }
        if files.is_empty() {
            return Err(ApiError::Validation(
                "At least one document is required".to_string(),
            ));
        }
        if files.len() > MAX_DOCUMENTS_PER_UPLOAD {
            return Err(ApiError::Validation(format!(
                "At most {MAX_DOCUMENTS_PER_UPLOAD} documents may be uploaded at once"
            )));
        }
        for file in &files {
            if !self
                .upload
                .allowed_mime_types
                .iter()
                .any(|t| t == &file.content_type)
            {
                return Err(ApiError::Validation(format!(
                    "Unsupported file type: {}",
                    file.content_type
                )));
            }
            if file.bytes.len() > self.upload.max_file_size {
                return Err(ApiError::Validation(format!(
                    "File {} exceeds the maximum allowed size",
                    file.file_name
                )));
            }
        }

        let brn_taken = CustomerProfiles::find()
            .filter(
                customer_profiles::Column::BusinessRegistrationNumber
                    .eq(request.business_registration_number.as_str()),
            )
            .filter(customer_profiles::Column::UserId.ne(user.id))
            .one(self.conn())
            .await?;
        if brn_taken.is_some() {
            return Err(ApiError::Conflict(
                "Business registration number already registered".to_string(),
            ));
        }

        // Uploads happen before the transaction; a rollback can orphan
        // objects but never leaves dangling document rows.
        let mut stored = Vec::with_capacity(files.len());
        for file in &files {
            let key = format!(
                "documents/{}/{}-{}",
                user.id,
                Uuid::new_v4(),
                sanitize_filename(&file.file_name)
            );
            let url = self
                .storage
                .put(&file.bytes, &file.content_type, &key)
                .await?;
            stored.push((file, url));
        }

        let now = Utc::now().naive_utc();
        let txn = self.db.begin().await?;

        self.upsert_profile(&txn, user.id, &request).await?;

        for (file, url) in &stored {
            let document_type = file
                .document_type
                .unwrap_or_else(|| determine_document_type(&file.file_name));
            let document = documents::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user.id),
                document_type: Set(document_type),
                file_url: Set(url.clone()),
                file_name: Set(file.file_name.clone()),
                file_size: Set(file.bytes.len() as i32),
                mime_type: Set(file.content_type.clone()),
                verification_status: Set(VerificationStatus::Pending),
                verified_by: Set(None),
                verified_at: Set(None),
                rejection_reason: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            };
            Documents::insert(document).exec_without_returning(&txn).await?;
        }

        let result = Users::update_many()
            .col_expr(users::Column::RegistrationStep, Expr::value(4))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(user.id))
            .filter(users::Column::RegistrationStep.eq(3))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ApiError::Conflict(
                "Step already processed".to_string(),
            ));
        }

        txn.commit().await?;

        tracing::info!(user_id = %user.id, documents = files.len(), "business documents stored");
        Ok(Step4Response {
            success: true,
            next_step: 5,
            documents_uploaded: files.len(),
        })
    }

    /// Step 5: record the business address and finalize the account.
    pub async fn step5(&self, request: Step5Request) -> Result<Step5Response, ApiError> {
        let user = self.load_user(request.user_id).await?;
        ensure_at_step(&user, 5)?;

        for (value, label) in [
            (&request.country, "Country"),
            (&request.region, "Region"),
            (&request.district, "District"),
            (&request.street, "Street"),
            (&request.house_number, "House number"),
        ] {
            if value.trim().is_empty() {
                return Err(ApiError::Validation(format!("{label} is required")));
            }
        }

        let now = Utc::now().naive_utc();
        let txn = self.db.begin().await?;

        let updated = CustomerProfiles::update_many()
            .col_expr(
                customer_profiles::Column::Country,
                Expr::value(request.country),
            )
            .col_expr(
                customer_profiles::Column::Region,
                Expr::value(request.region),
            )
            .col_expr(
                customer_profiles::Column::District,
                Expr::value(request.district),
            )
            .col_expr(
                customer_profiles::Column::Street,
                Expr::value(request.street),
            )
            .col_expr(
                customer_profiles::Column::HouseNumber,
                Expr::value(request.house_number),
            )
            .col_expr(customer_profiles::Column::UpdatedAt, Expr::value(now))
            .filter(customer_profiles::Column::UserId.eq(user.id))
            .exec(&txn)
            .await?;
        if updated.rows_affected == 0 {
            return Err(ApiError::NotFound(
                "Business profile not found. Complete step 4 first.".to_string(),
            ));
        }

        let result = Users::update_many()
            .col_expr(users::Column::RegistrationStep, Expr::value(5))
            .col_expr(users::Column::RegistrationCompleted, Expr::value(true))
            .col_expr(users::Column::Status, Expr::value(UserStatus::Active))
            .col_expr(users::Column::IsActive, Expr::value(true))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(user.id))
            .filter(users::Column::RegistrationStep.eq(4))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ApiError::Conflict(
                "Step already processed".to_string(),
            ));
        }

        txn.commit().await?;
        tracing::info!(user_id = %user.id, "registration completed");

        // Welcome message is best-effort
        if let Some(recipient) = user.email.as_deref().or(user.phone.as_deref()) {
            let name = user.first_name.as_deref().unwrap_or("there");
            self.auth
                .notifier()
                .send(
                    recipient,
                    Some("Welcome to Kanisa"),
                    &format!("Hi {name}, your registration is complete. Welcome aboard!"),
                )
                .await;
        }

        Ok(Step5Response {
            success: true,
            message: "Registration completed successfully".to_string(),
            registration_complete: true,
        })
    }

    pub async fn status(&self, user_id: Uuid) -> Result<RegistrationStatusResponse, ApiError> {
        let user = self.load_user(user_id).await?;
        let current = user.registration_step;
        let next_step = if user.registration_completed {
            None
        } else {
            STEPS.iter().find(|s| s.step == current + 1).cloned()
        };
        Ok(RegistrationStatusResponse {
            user_id: user.id,
            current_step: current,
            completed_steps: (1..=current.min(TOTAL_STEPS)).collect(),
            registration_completed: user.registration_completed,
            user: user.into(),
            next_step,
        })
    }

    pub async fn resend_otp(&self, request: ResendOtpRequest) -> Result<MessageResponse, ApiError> {
        let user = self.load_user(request.user_id).await?;
        ensure_contact_matches(&user, request.email.as_deref(), request.phone.as_deref())?;
        if request.purpose == OtpPurpose::Registration && user.is_verified {
            return Err(ApiError::Conflict("Account already verified".to_string()));
        }
        self.auth.resend_otp(&user, request.purpose).await
    }

    async fn load_user(&self, user_id: Uuid) -> Result<users::Model, ApiError> {
        Users::find_by_id(user_id)
            .one(self.conn())
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }

    async fn upsert_profile(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        request: &Step4Request,
    ) -> Result<(), ApiError> {
        let now = Utc::now().naive_utc();
        let existing = CustomerProfiles::find()
            .filter(customer_profiles::Column::UserId.eq(user_id))
            .one(txn)
            .await?;

        if existing.is_some() {
            CustomerProfiles::update_many()
                .col_expr(
                    customer_profiles::Column::BusinessName,
                    Expr::value(request.business_name.clone()),
                )
                .col_expr(
                    customer_profiles::Column::BusinessRegistrationNumber,
                    Expr::value(request.business_registration_number.clone()),
                )
                .col_expr(customer_profiles::Column::UpdatedAt, Expr::value(now))
                .filter(customer_profiles::Column::UserId.eq(user_id))
                .exec(txn)
                .await?;
        } else {
            let profile = customer_profiles::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                business_name: Set(request.business_name.clone()),
                business_registration_number: Set(request.business_registration_number.clone()),
                country: Set(None),
                region: Set(None),
                district: Set(None),
                street: Set(None),
                house_number: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            };
            CustomerProfiles::insert(profile)
                .exec_without_returning(txn)
                .await?;
        }
        Ok(())
    }
}

/// Precondition: the account must be exactly one step behind `step`.
fn ensure_at_step(user: &users::Model, step: i32) -> Result<(), ApiError> {
    let expected = step - 1;
    if user.registration_step < expected {
        return Err(ApiError::Validation(format!(
            "Please complete step {expected} first"
        )));
    }
    if user.registration_step >= step {
        return Err(ApiError::Conflict(format!(
            "Step {step} has already been completed"
        )));
    }
    Ok(())
}

fn ensure_contact_matches(
    user: &users::Model,
    email: Option<&str>,
    phone: Option<&str>,
) -> Result<(), ApiError> {
    if email.is_none() && phone.is_none() {
        return Err(ApiError::Validation(
            "Either email or phone must be provided".to_string(),
        ));
    }
    if let Some(email) = email {
        if user.email.as_deref() != Some(email) {
            return Err(ApiError::Validation(
                "Email does not match our records".to_string(),
            ));
        }
    }
    if let Some(phone) = phone {
        if user.phone.as_deref() != Some(phone) {
            return Err(ApiError::Validation(
                "Phone number does not match our records".to_string(),
            ));
        }
    }
    Ok(())
}

/// A supplied contact must match the stored one; when nothing is stored
/// it is adopted, subject to a uniqueness check by the caller.
fn contact_addition<'a>(
    stored: Option<&str>,
    supplied: Option<&'a str>,
    label: &str,
) -> Result<Option<&'a str>, ApiError> {
    match (stored, supplied) {
        (_, None) => Ok(None),
        (None, Some(new)) => Ok(Some(new)),
        (Some(current), Some(given)) if current == given => Ok(None),
        _ => Err(ApiError::Validation(format!(
            "{label} does not match our records"
        ))),
    }
}

fn split_full_name(full_name: &str) -> Result<(String, String), ApiError> {
    let mut parts = full_name.split_whitespace();
    let first = parts
        .next()
        .ok_or_else(|| ApiError::Validation("Full name is required".to_string()))?;
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        return Err(ApiError::Validation(
            "Full name must include first and last name".to_string(),
        ));
    }
    Ok((first.to_string(), rest.join(" ")))
}

/// Calendar-aware age check against today's date.
pub fn validate_age(date_of_birth: NaiveDate, today: NaiveDate) -> Result<(), ApiError> {
    if date_of_birth > today {
        return Err(ApiError::Validation(
            "Date of birth cannot be in the future".to_string(),
        ));
    }
    let mut age = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    if age < MINIMUM_AGE_YEARS {
        return Err(ApiError::Validation(format!(
            "You must be at least {MINIMUM_AGE_YEARS} years old to register"
        )));
    }
    Ok(())
}

/// Filename-keyword fallback when no explicit type accompanies a file.
pub fn determine_document_type(file_name: &str) -> DocumentType {
    let name = file_name.to_ascii_lowercase();
    if name.contains("driver") {
        DocumentType::DriversLicense
    } else if name.contains("registration") {
        DocumentType::BusinessRegistration
    } else if name.contains("national") || name.contains("nida") {
        DocumentType::NationalId
    } else {
        DocumentType::BusinessLicense
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::entities::otps;
    use crate::entities::users::UserRole;
    use crate::services::notification::testing::RecordingDispatcher;
    use crate::services::storage::testing::MemoryStorage;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn user_at_step(step: i32) -> users::Model {
        let now = Utc::now().naive_utc();
        users::Model {
            id: Uuid::new_v4(),
            email: Some("jane@example.com".to_string()),
            phone: Some("0712345678".to_string()),
            password: "hash".to_string(),
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            date_of_birth: None,
            tin_number: None,
            nida_number: None,
            role: UserRole::Customer,
            status: UserStatus::Pending,
            registration_step: step,
            registration_completed: false,
            is_active: false,
            is_verified: step >= 2,
            created_at: now,
            updated_at: now,
        }
    }

    fn service(db: DatabaseConnection) -> RegistrationService {
        let db = Arc::new(db);
        let jwt = JwtConfig {
            secret: "test-secret".to_string(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 7200,
        };
        let auth = AuthService::new(
            db.clone(),
            Arc::new(RecordingDispatcher::default()),
            jwt,
            false,
        );
        RegistrationService::new(
            db,
            auth,
            Arc::new(MemoryStorage::default()),
            UploadConfig {
                max_file_size: 5 * 1024 * 1024,
                allowed_mime_types: vec![
                    "application/pdf".to_string(),
                    "image/jpeg".to_string(),
                    "image/png".to_string(),
                ],
            },
        )
    }

    #[test]
    fn age_exactly_eighteen_today_passes() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();
        let dob = NaiveDate::from_ymd_opt(2008, 8, 29).unwrap();
        assert!(validate_age(dob, today).is_ok());
    }

    #[test]
    fn age_day_before_birthday_fails() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();
        let dob = NaiveDate::from_ymd_opt(2008, 8, 30).unwrap();
        assert!(validate_age(dob, today).is_err());
    }

    #[test]
    fn future_dob_fails() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();
        let dob = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        assert!(validate_age(dob, today).is_err());
    }

    #[test]
    fn document_type_heuristic() {
        assert_eq!(
            determine_document_type("drivers_license.pdf"),
            DocumentType::DriversLicense
        );
        assert_eq!(
            determine_document_type("business-registration.pdf"),
            DocumentType::BusinessRegistration
        );
        assert_eq!(
            determine_document_type("nida-card.png"),
            DocumentType::NationalId
        );
        assert_eq!(
            determine_document_type("scan001.pdf"),
            DocumentType::BusinessLicense
        );
    }

    #[test]
    fn full_name_splits_on_first_space() {
        let (first, last) = split_full_name("Jane Wanjiru Doe").unwrap();
        assert_eq!(first, "Jane");
        assert_eq!(last, "Wanjiru Doe");
        assert!(split_full_name("Jane").is_err());
        assert!(split_full_name("   ").is_err());
    }

    #[test]
    fn step_precondition_enforced() {
        let user = user_at_step(1);
        assert!(ensure_at_step(&user, 2).is_ok());
        assert!(matches!(
            ensure_at_step(&user, 3),
            Err(ApiError::Validation(_))
        ));
        let done = user_at_step(3);
        assert!(matches!(
            ensure_at_step(&done, 2),
            Err(ApiError::Conflict(_))
        ));
    }

    #[test]
    fn contact_mismatch_rejected() {
        let user = user_at_step(1);
        assert!(ensure_contact_matches(&user, Some("jane@example.com"), None).is_ok());
        assert!(ensure_contact_matches(&user, Some("other@example.com"), None).is_err());
        assert!(ensure_contact_matches(&user, None, Some("0799999999")).is_err());
        assert!(ensure_contact_matches(&user, None, None).is_err());
    }

    #[tokio::test]
    async fn step3_requires_verified_account() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![user_at_step(1)]])
            .into_connection();
        let svc = service(db);
        let user = user_at_step(1);

        let err = svc
            .step3(Step3Request {
                user_id: user.id,
                email: Some("jane@example.com".to_string()),
                phone: None,
                date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
                tin_number: "123-456-789".to_string(),
                nida_number: "19900101-00001-00001-01".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn contact_addition_rules() {
        assert_eq!(
            contact_addition(None, Some("a@x.com"), "Email").unwrap(),
            Some("a@x.com")
        );
        assert_eq!(
            contact_addition(Some("a@x.com"), Some("a@x.com"), "Email").unwrap(),
            None
        );
        assert!(contact_addition(Some("a@x.com"), Some("b@x.com"), "Email").is_err());
        assert_eq!(contact_addition(Some("a@x.com"), None, "Email").unwrap(), None);
    }

    #[tokio::test]
    async fn step3_adopts_contact_missing_from_step1() {
        // Registered by phone only at step 1; the email arrives here
        let mut user = user_at_step(2);
        user.email = None;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![user.clone()]])
            .append_query_results([Vec::<users::Model>::new()])
            .append_query_results([Vec::<users::Model>::new()])
            .append_query_results([Vec::<users::Model>::new()])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let svc = service(db);

        let response = svc
            .step3(Step3Request {
                user_id: user.id,
                email: Some("jane@example.com".to_string()),
                phone: None,
                date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
                tin_number: "123-456-789".to_string(),
                nida_number: "19900101-00001-00001-01".to_string(),
            })
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.next_step, 4);
    }

    #[tokio::test]
    async fn step3_rejects_contact_owned_by_another_account() {
        let mut user = user_at_step(2);
        user.email = None;
        let other = user_at_step(2);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![user.clone()]])
            .append_query_results([vec![other]])
            .into_connection();
        let svc = service(db);

        let err = svc
            .step3(Step3Request {
                user_id: user.id,
                email: Some("jane@example.com".to_string()),
                phone: None,
                date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
                tin_number: "123-456-789".to_string(),
                nida_number: "19900101-00001-00001-01".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[tokio::test]
    async fn step2_verifies_otp_and_activates() {
        let user = user_at_step(1);
        let now = Utc::now().naive_utc();
        let otp = otps::Model {
            id: Uuid::new_v4(),
            user_id: user.id,
            code: "123456".to_string(),
            purpose: OtpPurpose::Registration,
            is_used: false,
            expires_at: now + chrono::Duration::minutes(10),
            created_at: now,
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![user.clone()]])
            .append_query_results([vec![otp]])
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
        let svc = service(db);

        let response = svc
            .step2(Step2Request {
                user_id: user.id,
                otp: "123456".to_string(),
                email: Some("jane@example.com".to_string()),
                phone: None,
            })
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.next_step, 3);
        assert!(response.user.is_verified);
        assert!(response.user.is_active);
        // Finalization at step 5 owns the status transition
        assert_eq!(response.user.status, UserStatus::Pending);
        assert!(!response.access_token.is_empty());
    }

    #[tokio::test]
    async fn step2_rejects_wrong_otp() {
        let user = user_at_step(1);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![user.clone()]])
            .append_query_results([Vec::<otps::Model>::new()])
            .into_connection();
        let svc = service(db);

        let err = svc
            .step2(Step2Request {
                user_id: user.id,
                otp: "000000".to_string(),
                email: Some("jane@example.com".to_string()),
                phone: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }

    #[tokio::test]
    async fn status_unknown_user_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<users::Model>::new()])
            .into_connection();
        let svc = service(db);

        let err = svc.status(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }
}
