use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use canvas_mail::MailError;
use canvas_types::api::ErrorResponse;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Access denied")]
    AccessDenied,

    #[error("{0}")]
    Validation(String),

    #[error("Invalid credentials")]
    Unauthorized,

    #[error("{0}")]
    Conflict(String),

    /// IMAP, SMTP or renderer failure.
    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Storage(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(format!("storage failure: {}", e))
    }
}

impl From<MailError> for ApiError {
    fn from(e: MailError) -> Self {
        match e {
            MailError::NotConfigured(_) => Self::Upstream("mail not configured".into()),
            MailError::Storage(e) => e.into(),
            MailError::Database(e) => Self::Internal(e),
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Internal(e) => error!("Internal error: {:#}", e),
            Self::Storage(msg) => error!("Storage error: {}", msg),
            Self::Upstream(msg) => warn!("Upstream failure: {}", msg),
            _ => {}
        }

        let status = self.status();
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(ApiError::NotFound("Board").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::AccessDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Upstream("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ApiError::Storage("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unconfigured_mail_is_upstream() {
        let err: ApiError = MailError::NotConfigured("IMAP host missing").into();
        assert!(matches!(err, ApiError::Upstream(ref m) if m == "mail not configured"));
    }
}
