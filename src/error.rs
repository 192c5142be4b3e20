use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("Missing API key. Set one of: ANTHROPIC_API_KEY, CLAUDE_API_KEY, or CLAUDE_KEY")]
    MissingApiKey,

    #[error("Storage is not configured. Set DATABASE_URL or pass --db")]
    StorageNotConfigured,

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Upstream model error: {0}")]
    Upstream(String),

    #[error("Too many requests")]
    RateLimited,

    #[error("Server error: {0}")]
    Server(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            Error::MissingApiKey
            | Error::StorageNotConfigured
            | Error::Storage(_)
            | Error::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// every api failure becomes a json body, never a hung connection
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
