use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::models::ParseCanteenError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("must be logged in")]
    Unauthenticated,

    #[error("not allowed for this account")]
    Forbidden,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("username already exists")]
    UsernameTaken,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    UnknownCanteen(#[from] ParseCanteenError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("message relay is not configured")]
    RelayDisabled,

    #[error("message relay failed: {0}")]
    Relay(#[from] reqwest::Error),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("template error: {0}")]
    Render(#[from] handlebars::RenderError),

    #[error("password hashing failed")]
    Hashing,
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::Conflict("username") => AppError::UsernameTaken,
            other => AppError::Store(other),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::UsernameTaken => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::UnknownCanteen(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RelayDisabled => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Relay(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(_) | AppError::Render(_) | AppError::Hashing => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details stay in the log.
        let message = if status.is_server_error() {
            error!(error = %self, "Request failed");
            match self {
                AppError::RelayDisabled | AppError::Relay(_) => self.to_string(),
                _ => "internal error".to_string(),
            }
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
