/// Error types for engagement-service
use crate::domain::EngagementKind;
use crate::repository::StoreError;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngagementError {
    /// No resolvable caller identity
    #[error("Unauthorized")]
    Unauthenticated,

    /// The caller already holds this engagement on the post
    #[error("{}", .0.conflict_message())]
    AlreadyEngaged(EngagementKind),

    #[error("Post not found")]
    PostNotFound,

    /// Any transport or storage fault; safe to retry
    #[error("{0}")]
    StoreUnavailable(String),
}

impl From<StoreError> for EngagementError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PostNotFound => EngagementError::PostNotFound,
            StoreError::ConstraintViolation | StoreError::Unavailable(_) => {
                EngagementError::StoreUnavailable(err.to_string())
            }
        }
    }
}

impl EngagementError {
    /// Short label used for metrics and logs
    pub fn outcome(&self) -> &'static str {
        match self {
            EngagementError::Unauthenticated => "unauthenticated",
            EngagementError::AlreadyEngaged(_) => "conflict",
            EngagementError::PostNotFound => "not_found",
            EngagementError::StoreUnavailable(_) => "error",
        }
    }
}

impl ResponseError for EngagementError {
    fn status_code(&self) -> StatusCode {
        match self {
            EngagementError::Unauthenticated => StatusCode::UNAUTHORIZED,
            EngagementError::AlreadyEngaged(_) => StatusCode::CONFLICT,
            EngagementError::PostNotFound => StatusCode::NOT_FOUND,
            EngagementError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string(),
        }))
    }
}

/// Result type alias for ledger operations
pub type EngagementResult<T> = Result<T, EngagementError>;
