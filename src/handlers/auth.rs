use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::auth::{
    AuthResponse, AuthTokens, LoginRequest, MessageResponse, RefreshRequest,
    RequestPasswordResetRequest, ResetPasswordRequest, UserView,
};
use crate::AppState;

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    state.auth.login(request).await.map(Json)
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<AuthTokens>, ApiError> {
    state.auth.refresh(&request.refresh_token).await.map(Json)
}

pub async fn profile(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserView>, ApiError> {
    state.auth.profile(user_id).await.map(Json)
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<RequestPasswordResetRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.auth.request_password_reset(request).await.map(Json)
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.auth.reset_password(request).await.map(Json)
}
