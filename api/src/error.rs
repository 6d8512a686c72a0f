use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use shared::lifecycle::LifecycleError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Typed HTTP failure. Every handler error becomes one of these; no raw
/// fault crosses the response boundary.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "Unauthorized",
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: "Forbidden",
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code,
            message: message.into(),
        }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "InternalError",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "code": self.code,
        }));
        (self.status, body).into_response()
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Unauthorized => Self::unauthorized("Unauthorized"),
            LifecycleError::Forbidden => Self::forbidden("Forbidden"),
            LifecycleError::NotFound(msg) => Self::not_found("NotFound", msg),
            LifecycleError::Conflict(msg) => Self::conflict("Conflict", msg),
            LifecycleError::Validation(msg) => Self::bad_request("ValidationError", msg),
            LifecycleError::Upstream => Self::internal("An unexpected storage error occurred"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_errors_map_to_expected_statuses() {
        let cases = [
            (LifecycleError::Unauthorized, StatusCode::UNAUTHORIZED),
            (LifecycleError::Forbidden, StatusCode::FORBIDDEN),
            (
                LifecycleError::NotFound("Patch not found"),
                StatusCode::NOT_FOUND,
            ),
            (
                LifecycleError::Conflict("Cannot archive the current patch version"),
                StatusCode::CONFLICT,
            ),
            (
                LifecycleError::Validation("Invalid device ID"),
                StatusCode::BAD_REQUEST,
            ),
            (LifecycleError::Upstream, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn upstream_error_stays_generic() {
        let err = ApiError::from(LifecycleError::Upstream);
        assert_eq!(err.message, "An unexpected storage error occurred");
    }
}
