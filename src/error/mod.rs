//! Error types for the upload pipeline

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::scan::ScanError;
use crate::storage::StorageError;

/// Server-side upload pipeline error
///
/// Covers body parsing, storage uploads, and malware scanning. The
/// [`IntoResponse`] impl maps each kind to an HTTP status so handlers can
/// return `Result<Response, UploadError>` directly.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Malformed or truncated multipart body
    #[error("malformed multipart body: {0}")]
    Multipart(#[from] multer::Error),

    /// Request body declared JSON but failed to parse
    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),

    /// Request body declared urlencoded but failed to parse
    #[error("malformed urlencoded body: {0}")]
    UrlEncoded(#[from] serde_urlencoded::de::Error),

    /// Request body could not be read
    #[error("failed to read request body: {0}")]
    BodyRead(String),

    /// Content type is none of multipart, JSON, or urlencoded
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// A storage upload task failed; fails the whole fields/files resolution
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The malware scanner itself failed to run
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    /// The scanner flagged one or more files in the batch
    #[error("infected content: {infected} file(s) flagged by scanner")]
    InfectedContent {
        /// Number of infected files reported for the batch
        infected: u32,
    },

    /// Filesystem error while spooling temp files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// HTTP status this error maps to
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Multipart(_) | Self::Json(_) | Self::UrlEncoded(_) | Self::BodyRead(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::InfectedContent { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Storage(_) | Self::Scan(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "upload request failed");
        } else {
            tracing::warn!(error = %self, "upload request rejected");
        }
        (status, Json(json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}
