use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::render::Page;

/// Request-level failures that end a request before a normal page is built.
///
/// Each variant renders as a full HTML page; nothing here crashes the server.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("rate limit exceeded for {ip}")]
    RateLimited { ip: String },

    /// The request log could not be written.
    #[error("request log unavailable: {0}")]
    LogStore(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::RateLimited { ip } => {
                tracing::warn!(ip = %ip, "Rate limit exceeded");
                (StatusCode::TOO_MANY_REQUESTS, Page::TooManyRequests.render()).into_response()
            }
            AppError::LogStore(err) => {
                tracing::error!(error = %err, "Request log write failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Page::error(self.to_string()).render(),
                )
                    .into_response()
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Page::error(msg.clone()).render(),
                )
                    .into_response()
            }
        }
    }
}
