use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Problems with the caller's request. Always detected before any backend call.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("price_min ({min_cents} cents) must not exceed price_max ({max_cents} cents)")]
    InvalidRange { min_cents: i64, max_cents: i64 },

    #[error("invalid price: {0}")]
    InvalidPrice(String),

    #[error("invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("redirect target rejected: {0}")]
    DisallowedUrl(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable kind carried by every error response.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "ValidationError",
            Error::NotFound(_) => "NotFoundError",
            Error::BackendUnavailable(_) => "BackendUnavailable",
            Error::Internal(_) => "InternalError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(ValidationError::DisallowedUrl(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Error::BackendUnavailable(err.to_string()),
            other => Error::Internal(format!("database: {other}")),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Error::BackendUnavailable(err.to_string())
        } else {
            Error::Internal(format!("search index: {err}"))
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Error::Validation(_) | Error::NotFound(_) => self.to_string(),
            Error::BackendUnavailable(detail) => {
                tracing::error!("backend unavailable: {detail}");
                "search backend is temporarily unavailable".to_string()
            }
            Error::Internal(detail) => {
                tracing::error!("internal error: {detail}");
                "internal server error".to_string()
            }
        };

        let body = Json(json!({
            "kind": self.kind(),
            "message": message,
        }));
        (status, body).into_response()
    }
}
