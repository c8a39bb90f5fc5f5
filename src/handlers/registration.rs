//! Registration endpoints. Step 4 accepts multipart: `user_id`,
//! `business_name` and `business_registration_number` are text fields,
//! every other part is a document whose field name may carry an
//! explicit document type.

use axum::extract::{Multipart, Path, State};
use axum::Json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::auth::MessageResponse;
use crate::models::registration::{
    RegistrationStatusResponse, ResendOtpRequest, Step1Request, Step1Response, Step2Request,
    Step2Response, Step3Request, Step3Response, Step4Request, Step4Response, Step5Request,
    Step5Response, UploadedFile,
};
use crate::AppState;

pub async fn step1(
    State(state): State<AppState>,
    Json(request): Json<Step1Request>,
) -> Result<Json<Step1Response>, ApiError> {
    state.registration.step1(request).await.map(Json)
}

pub async fn step2(
    State(state): State<AppState>,
    Json(request): Json<Step2Request>,
) -> Result<Json<Step2Response>, ApiError> {
    state.registration.step2(request).await.map(Json)
}

pub async fn step3(
    State(state): State<AppState>,
    Json(request): Json<Step3Request>,
) -> Result<Json<Step3Response>, ApiError> {
    state.registration.step3(request).await.map(Json)
}

pub async fn step4(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Step4Response>, ApiError> {
    let mut user_id = None;
    let mut business_name = None;
    let mut business_registration_number = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_part)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "user_id" => user_id = Some(field.text().await.map_err(bad_part)?),
            "business_name" => business_name = Some(field.text().await.map_err(bad_part)?),
            "business_registration_number" => {
                business_registration_number = Some(field.text().await.map_err(bad_part)?)
            }
            _ => {
                let file_name = field
                    .file_name()
                    .unwrap_or("document")
                    .to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(bad_part)?;
                files.push(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                    document_type: name.parse().ok(),
                });
            }
        }
    }

    let user_id: Uuid = user_id
        .ok_or_else(|| ApiError::Validation("user_id is required".to_string()))?
        .parse()
        .map_err(|_| ApiError::Validation("user_id must be a valid UUID".to_string()))?;
    let request = Step4Request {
        user_id,
        business_name: business_name
            .ok_or_else(|| ApiError::Validation("business_name is required".to_string()))?,
        business_registration_number: business_registration_number.ok_or_else(|| {
            ApiError::Validation("business_registration_number is required".to_string())
        })?,
    };

    state.registration.step4(request, files).await.map(Json)
}

pub async fn step5(
    State(state): State<AppState>,
    Json(request): Json<Step5Request>,
) -> Result<Json<Step5Response>, ApiError> {
    state.registration.step5(request).await.map(Json)
}

pub async fn status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<RegistrationStatusResponse>, ApiError> {
    state.registration.status(user_id).await.map(Json)
}

pub async fn resend_otp(
    State(state): State<AppState>,
    Json(request): Json<ResendOtpRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.registration.resend_otp(request).await.map(Json)
}

fn bad_part(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::Validation(format!("Invalid multipart body: {err}"))
}
