use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::client::ClientError;

/// Errors surfaced at the HTTP boundary.
#[derive(Debug, Error)]
pub enum AppError {
    /// Recoverable: the cache was left as it was, retry after the window.
    #[error("remote API rate limit reached, retry in about a minute")]
    RateLimited,

    #[error("a refresh is already running")]
    RefreshInProgress,

    #[error("WIP node not found. Run refresh first.")]
    WipNotConfigured,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("remote API error: {0}")]
    Remote(ClientError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ClientError> for AppError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::RateLimited => AppError::RateLimited,
            other => AppError::Remote(other),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::RefreshInProgress => StatusCode::CONFLICT,
            AppError::WipNotConfigured | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Remote(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::Internal(e) => tracing::error!("request failed: {e:#}"),
            AppError::Remote(e) => tracing::warn!("remote call failed: {e}"),
            _ => tracing::debug!("request rejected: {self}"),
        }
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
