use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::documents::DocumentType;
use crate::entities::otps::OtpPurpose;
use crate::models::auth::UserView;

#[derive(Debug, Clone, Deserialize)]
pub struct Step1Request {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Step1Response {
    pub user_id: Uuid,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step2Request {
    pub user_id: Uuid,
    pub otp: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Step2Response {
    pub success: bool,
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserView,
    pub next_step: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step3Request {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: NaiveDate,
    pub tin_number: String,
    pub nida_number: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Step3Response {
    pub success: bool,
    pub next_step: i32,
}

/// One file extracted from the step-4 multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    /// Explicit type from the multipart field name; filename heuristic
    /// is the fallback.
    pub document_type: Option<DocumentType>,
}

#[derive(Debug, Clone)]
pub struct Step4Request {
    pub user_id: Uuid,
    pub business_name: String,
    pub business_registration_number: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Step4Response {
    pub success: bool,
    pub next_step: i32,
    pub documents_uploaded: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step5Request {
    pub user_id: Uuid,
    pub country: String,
    pub region: String,
    pub district: String,
    pub street: String,
    pub house_number: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Step5Response {
    pub success: bool,
    pub message: String,
    pub registration_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepInfo {
    pub step: i32,
    pub title: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationStatusResponse {
    pub user_id: Uuid,
    pub current_step: i32,
    pub completed_steps: Vec<i32>,
    pub registration_completed: bool,
    pub user: UserView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<StepInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResendOtpRequest {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub purpose: OtpPurpose,
}
