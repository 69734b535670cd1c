use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppError {
    /// Malformed or missing input.
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    /// Caller lacks the role or ownership required by the operation.
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    /// Invariant violation, e.g. a second open lease on a room.
    #[error("{0}")]
    Conflict(String),
    /// Illegal lifecycle transition.
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    UnprocessableEntity(String),
    /// Upstream payment provider failure. Callers may retry.
    #[error("{0}")]
    Gateway(String),
    /// Store failure. The transaction was rolled back.
    #[error("{0}")]
    Dependency(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "validation_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "authorization_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::InvalidState(_) => "state_error",
            Self::UnprocessableEntity(_) => "unprocessable_entity",
            Self::Gateway(_) => "gateway_error",
            Self::Dependency(_) => "dependency_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "Request rejected");
        }
        (
            status,
            Json(json!({
                "detail": self.to_string(),
                "code": self.code(),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::AppError;

    #[test]
    fn lifecycle_errors_map_to_conflict_family() {
        assert_eq!(
            AppError::InvalidState("x".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Conflict("x".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(AppError::InvalidState("x".to_string()).code(), "state_error");
    }

    #[test]
    fn gateway_errors_are_distinct_from_internal() {
        assert_eq!(
            AppError::Gateway("down".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_ne!(
            AppError::Gateway("down".to_string()).code(),
            AppError::Internal("down".to_string()).code()
        );
    }
}
