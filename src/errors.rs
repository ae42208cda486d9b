use crate::backend::BackendError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Every failure the store can report to a caller.
///
/// Each variant carries a stable [`StoreError::kind`] so clients can branch on
/// the failure without parsing messages.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("upload contained no files and no text")]
    EmptyUpload,
    #[error("unknown expiration policy `{0}`")]
    UnknownPolicy(String),
    #[error("archive member `{0}` appears more than once")]
    DuplicateMember(String),
    #[error("invalid upload: {0}")]
    InvalidUpload(String),
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("object `{0}` has expired")]
    Expired(String),
    #[error("stored data failed authentication")]
    Authentication,
    #[error("crypto failure: {0}")]
    Crypto(String),
    #[error("blob backend unavailable: {0}")]
    BackendUnavailable(#[from] BackendError),
    #[error("stored data is corrupt: {0}")]
    CorruptData(String),
    #[error("failed to build archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::EmptyUpload => "empty_upload",
            StoreError::UnknownPolicy(_) => "unknown_policy",
            StoreError::DuplicateMember(_) => "duplicate_member",
            StoreError::InvalidUpload(_) => "invalid_upload",
            StoreError::NotFound(_) => "not_found",
            StoreError::Expired(_) => "expired",
            StoreError::Authentication => "authentication",
            StoreError::Crypto(_) => "crypto",
            StoreError::BackendUnavailable(_) => "backend_unavailable",
            StoreError::CorruptData(_) => "corrupt_data",
            StoreError::Archive(_) => "archive",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            StoreError::EmptyUpload
            | StoreError::UnknownPolicy(_)
            | StoreError::DuplicateMember(_)
            | StoreError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Expired(_) => StatusCode::GONE,
            StoreError::Authentication
            | StoreError::Crypto(_)
            | StoreError::BackendUnavailable(_)
            | StoreError::CorruptData(_)
            | StoreError::Archive(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A lightweight wrapper for errors leaving the HTTP boundary.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status, kind and message.
    pub fn new(status: StatusCode, kind: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: msg.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "kind": self.kind,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let status = err.status();
        if status.is_server_error() {
            tracing::error!(kind = err.kind(), "request failed: {}", err);
        }
        AppError::new(status, err.kind(), err.to_string())
    }
}
