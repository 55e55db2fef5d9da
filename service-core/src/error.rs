use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Message returned for every server-side failure; details stay in the logs.
pub const GENERIC_ERROR_MESSAGE: &str = "something went wrong";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::InternalError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Name of the first field that failed validation, lowercased.
fn first_invalid_field(errors: &validator::ValidationErrors) -> String {
    let mut fields: Vec<String> = errors.errors().keys().map(|f| f.to_string()).collect();
    fields.sort_unstable();
    fields
        .into_iter()
        .next()
        .map(|field| field.to_lowercase())
        .unwrap_or_else(|| "invalid request body".to_string())
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match self {
            AppError::ValidationError(err) => first_invalid_field(&err),
            AppError::BadRequest(msg) => msg,
            AppError::PayloadTooLarge => "request body too large".to_string(),
            AppError::InternalError(err) | AppError::ConfigError(err) => {
                tracing::error!(error = ?err, "Request failed");
                GENERIC_ERROR_MESSAGE.to_string()
            }
        };

        (status, message).into_response()
    }
}
