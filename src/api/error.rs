use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::chat::ChatError;
use crate::core::FormError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Form(#[from] FormError),

    #[error("Invalid request data: {0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error(transparent)]
    Chat(#[from] ChatError),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Form(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Chat(ChatError::EmptyMessage) => StatusCode::BAD_REQUEST,
            ApiError::Chat(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };
        super::json_response(self.status(), body)
    }
}
