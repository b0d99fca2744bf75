use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use thiserror::Error;
use tracing::error;

/// Domain failure taxonomy, translated into JSON at the axum boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Permission(String),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Failed to get database connection: {0}")]
    Pool(#[from] deadpool::managed::PoolError<diesel_async::pooled_connection::PoolError>),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    /// Whether the underlying diesel error is a unique-constraint violation.
    /// Used to recover lost-insert races as benign or validation outcomes.
    pub fn is_unique_violation(err: &diesel::result::Error) -> bool {
        matches!(
            err,
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Permission(_) => StatusCode::FORBIDDEN,
            ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::Database(diesel::result::Error::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Database(_) | ApiError::Pool(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("request failed: {}", self);
        }

        let message = match &self {
            // A missing row surfaces as diesel NotFound when handlers use first()
            ApiError::Database(diesel::result::Error::NotFound) => "Not found".to_string(),
            other => other.to_string(),
        };

        (
            status,
            Json(serde_json::json!({
                "error": message
            })),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_failures_convert_and_map_to_internal_error() {
        let err: ApiError = deadpool::managed::PoolError::Closed.into();
        assert!(matches!(err, ApiError::Pool(_)));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_rows_map_to_not_found() {
        let err = ApiError::Database(diesel::result::Error::NotFound);
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
