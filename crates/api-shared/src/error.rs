//! Mapping from core errors to HTTP responses.
//!
//! Every failure leaves the service as `{"detail": "..."}` with a status
//! drawn from the core error taxonomy. Storage and serialisation failures
//! are logged server-side and reported as an opaque 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lers_core::CoreError;
use serde::Serialize;

pub type ApiResult<T> = Result<T, ApiError>;

/// JSON error envelope returned by every endpoint.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Human-readable description of the failure.
    pub detail: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn unauthenticated(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, detail)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Authentication(_) => StatusCode::UNAUTHORIZED,
            CoreError::Authorization(_) => StatusCode::FORBIDDEN,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::Storage(_) | CoreError::Serialization(_) => {
                tracing::error!(error = %err, "internal failure");
                return Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_core_errors_to_statuses() {
        let cases = [
            (CoreError::Validation("v".into()), StatusCode::BAD_REQUEST),
            (
                CoreError::Authentication("a".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (CoreError::Authorization("a".into()), StatusCode::FORBIDDEN),
            (CoreError::NotFound("n".into()), StatusCode::NOT_FOUND),
            (CoreError::Conflict("c".into()), StatusCode::CONFLICT),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn storage_errors_are_opaque() {
        let err = ApiError::from(CoreError::Storage(sqlx::Error::PoolClosed));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.detail, "internal server error");
    }
}
