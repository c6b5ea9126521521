//! Application error type and its mapping to HTTP responses.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{FormRejection, JsonRejection, PathRejection},
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::{
    extraction::ExtractionError, ocr::OcrError, receipts::validation::SchemaError,
};

#[derive(Error, Debug)]
pub enum AppError {
    /// Missing, malformed, expired or tampered bearer token.
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("email already registered")]
    EmailTaken,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("extracted receipt does not match schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("ocr failed: {0}")]
    Ocr(#[from] OcrError),

    #[error("structured extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::EmailTaken | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Schema(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Ocr(_) | AppError::Extraction(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to return to clients.
    fn public_message(&self) -> String {
        match self {
            AppError::Unauthorized(_) => "Could not validate credentials".into(),
            AppError::InvalidCredentials => "Invalid credentials".into(),
            AppError::EmailTaken => "Email already registered".into(),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::PayloadTooLarge => "Request body too large".into(),
            AppError::Schema(e) => format!("Invalid receipt data: {}", e),
            AppError::NotFound(what) => format!("{} not found", what),
            AppError::Ocr(_) | AppError::Extraction(_) => "Extraction failed".into(),
            AppError::Internal(_) => "Internal server error".into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let body = Json(json!({ "error": self.public_message() }));
        let mut response = (status, body).into_response();
        if matches!(self, AppError::Unauthorized(_)) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

// axum's own extractor rejections carry serde and parser internals in their
// text. Log the detail and hand clients a fixed message.
fn rejected(status: StatusCode, detail: &dyn std::fmt::Display, message: &str) -> AppError {
    warn!(%status, error = %detail, "request rejected");
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::BadRequest(message.into())
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        rejected(e.status(), &e, "Invalid JSON body")
    }
}

impl From<FormRejection> for AppError {
    fn from(e: FormRejection) -> Self {
        rejected(e.status(), &e, "Invalid form body")
    }
}

impl From<PathRejection> for AppError {
    fn from(e: PathRejection) -> Self {
        rejected(e.status(), &e, "Invalid path parameter")
    }
}

impl From<MultipartRejection> for AppError {
    fn from(e: MultipartRejection) -> Self {
        rejected(e.status(), &e, "Expected a multipart/form-data body")
    }
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        rejected(e.status(), &e, "Invalid multipart body")
    }
}
