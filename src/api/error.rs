//! API error handling for consistent JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::CoreError;

/// API error type that converts to JSON responses.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": true,
            "kind": self.kind,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::InvalidState(_) => StatusCode::CONFLICT,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::Capacity(_) => StatusCode::CONFLICT,
            CoreError::Unsupported(_) => StatusCode::BAD_REQUEST,
            CoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CoreError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_status_mapping() {
        let err: ApiError = CoreError::NotFound("meeting m1".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.kind, "not_found");

        let err: ApiError = CoreError::Capacity("full".into()).into();
        assert_eq!(err.status, StatusCode::CONFLICT);

        let err: ApiError = CoreError::Unsupported("pdf".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: ApiError = CoreError::ExternalService("upload".into()).into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);

        let err: ApiError = CoreError::Timeout("encoder".into()).into();
        assert_eq!(err.status, StatusCode::GATEWAY_TIMEOUT);
    }
}
