//! API error taxonomy.
//!
//! Every service failure is one of these variants; the axum layer maps
//! them onto conventional REST status codes via `IntoResponse`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing input — 400
    #[error("{0}")]
    Validation(String),
    /// Unique-constraint violation — 409
    #[error("{0}")]
    Conflict(String),
    /// Unknown id — 404
    #[error("{0}")]
    NotFound(String),
    /// Bad credentials or OTP — 401
    #[error("{0}")]
    Unauthorized(String),
    /// Required third-party integration unconfigured — 503
    #[error("{0}")]
    ServiceUnavailable(String),
    /// Third-party gateway returned non-success; carries its status
    #[error("{message}")]
    Upstream { status: StatusCode, message: String },
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Stable machine-checkable reason string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Upstream { .. } => "upstream_error",
            Self::Database(_) | Self::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream { status, .. } => *status,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build an Upstream error from a gateway HTTP status, falling back
    /// to 502 when the status is not a valid HTTP code on our side.
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Internal(format!("http client error: {err}"))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }
        let body = ErrorResponse {
            code: self.code(),
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_rest_conventions() {
        assert_eq!(
            ApiError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Unauthorized("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::ServiceUnavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn upstream_carries_gateway_status() {
        let err = ApiError::upstream(422, "rejected");
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "upstream_error");
    }

    #[test]
    fn invalid_upstream_status_becomes_bad_gateway() {
        let err = ApiError::upstream(1000, "weird");
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
