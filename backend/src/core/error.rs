use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::core::FieldErrors;
use crate::db::StoreError;
use crate::services::ingest::IngestError;

/// Error surfaced to HTTP callers.
#[rustfmt::skip]
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidToken(String),

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    /// Reserved for upstream outages; gateway failures are currently logged and swallowed.
    #[error("{0}")]
    UpstreamUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Conflict(_) => "conflict",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::NotFound(_) => "not_found",
            Self::InvalidToken(_) => "invalid_token",
            Self::Validation(_) => "validation_error",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Internal(_) => "internal",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidToken(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn unauthenticated() -> Self {
        Self::Unauthenticated("Authentication required".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error_type = self.kind(), error_message = %self);
        } else {
            tracing::warn!(error_type = self.kind(), error_message = %self);
        }

        let body = match &self {
            Self::Validation(fields) => json!({
                "result": "error",
                "kind": self.kind(),
                "message": "Validation failed",
                "fields": fields,
            }),
            // internal details stay in the log
            Self::Internal(_) => json!({
                "result": "error",
                "kind": self.kind(),
                "message": "Internal server error",
            }),
            _ => json!({
                "result": "error",
                "kind": self.kind(),
                "message": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(_) => Self::NotFound(error.to_string()),
            StoreError::Conflict(_) => Self::Conflict(error.to_string()),
            StoreError::OperationFailed(_) => Self::Internal(error.to_string()),
        }
    }
}

impl From<FieldErrors> for ApiError {
    fn from(fields: FieldErrors) -> Self {
        Self::Validation(fields)
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Conflict(_) => Self::Conflict(error.to_string()),
            AuthError::InvalidCredentials => Self::Unauthenticated(error.to_string()),
            AuthError::UnknownEmail => Self::NotFound(error.to_string()),
            AuthError::InvalidResetToken => Self::InvalidToken(error.to_string()),
            AuthError::Validation(fields) => Self::Validation(fields),
            AuthError::PasswordHashingFailed(_) => Self::Internal(error.to_string()),
            AuthError::Store(e) => e.into(),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::Store(e) => e.into(),
            IngestError::ResolutionRaced(_) => Self::Internal(error.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let mut fields = FieldErrors::new();
        fields.add("body", rejection.body_text());
        Self::Validation(fields)
    }
}

/// `Json` extractor whose rejections use the API error body.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}
