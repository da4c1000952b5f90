// Mapping of import/read failures onto HTTP responses

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::api::models::StatusResponse;
use crate::error::ImportError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid_model(model_name: &str) -> Self {
        ApiError::BadRequest(format!("Invalid model name: {model_name}"))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) => msg.clone(),
            ApiError::Internal(_) => "Internal server error".to_string(),
        };
        HttpResponse::build(self.status_code()).json(StatusResponse::error(message))
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        if err.is_client_error() {
            ApiError::BadRequest(err.to_string())
        } else {
            tracing::error!(error = ?err, "import failed on storage");
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = ?err, "storage error on read path");
        ApiError::Internal(err.to_string())
    }
}
