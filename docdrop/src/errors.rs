use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

use crate::extraction::ExtractionError;
use crate::pdf_services::PdfServicesError;
use crate::storage::StorageError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Upload exceeds `storage.max_file_size`
    #[error("File exceeds the maximum upload size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Upload directory error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// OCR/extraction pipeline error
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<PdfServicesError> for Error {
    fn from(e: PdfServicesError) -> Self {
        Error::Extraction(ExtractionError::Service(e))
    }
}

fn service_status(e: &PdfServicesError) -> StatusCode {
    match e {
        PdfServicesError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        PdfServicesError::Http(http) if http.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
        // Our own setup is broken, not the upstream
        PdfServicesError::Credentials { .. } | PdfServicesError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PdfServicesError::Authentication(_)
        | PdfServicesError::Api { .. }
        | PdfServicesError::JobFailed { .. }
        | PdfServicesError::InvalidResponse(_)
        | PdfServicesError::Http(_) => StatusCode::BAD_GATEWAY,
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Storage(storage_err) => match storage_err {
                StorageError::AlreadyExists { .. } => StatusCode::CONFLICT,
                StorageError::NotFound { .. } => StatusCode::NOT_FOUND,
                StorageError::InvalidFilename { .. } => StatusCode::BAD_REQUEST,
                StorageError::InitFailure { .. } | StorageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Extraction(extraction_err) => match extraction_err {
                ExtractionError::NotAPdf { .. } => StatusCode::BAD_REQUEST,
                ExtractionError::Output { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                ExtractionError::ArtifactMissing { .. } => StatusCode::BAD_GATEWAY,
                ExtractionError::Service(service_err) => service_status(service_err),
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } => message.clone(),
            Error::PayloadTooLarge { limit } => format!("File exceeds the maximum upload size of {limit} bytes"),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Storage(storage_err) => match storage_err {
                StorageError::AlreadyExists { .. } => "A file of that name already exists.".to_string(),
                StorageError::NotFound { name } => format!("Could not read the file '{name}'"),
                StorageError::InvalidFilename { name, reason } => format!("Invalid filename '{name}': {reason}"),
                StorageError::InitFailure { .. } | StorageError::Io(_) => "Storage error occurred".to_string(),
            },
            Error::Extraction(extraction_err) => match extraction_err {
                ExtractionError::NotAPdf { name } => format!("File '{name}' is not a PDF"),
                ExtractionError::Output { .. } => "Internal server error".to_string(),
                ExtractionError::ArtifactMissing { .. } => "PDF Services returned no result".to_string(),
                ExtractionError::Service(service_err) => match service_err {
                    PdfServicesError::Credentials { .. } | PdfServicesError::Io(_) => "Internal server error".to_string(),
                    PdfServicesError::Authentication(_) => "PDF Services rejected the configured credentials".to_string(),
                    PdfServicesError::JobFailed { operation, message } => {
                        format!("PDF Services could not complete the {operation} job: {message}")
                    }
                    PdfServicesError::Timeout { operation, .. } => format!("PDF Services {operation} job timed out"),
                    PdfServicesError::Api { .. } | PdfServicesError::InvalidResponse(_) | PdfServicesError::Http(_) => {
                        "PDF Services request failed".to_string()
                    }
                },
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Log full error details for debugging - different log levels based on severity
        if status.is_server_error() {
            match status {
                StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => tracing::warn!("Upstream error: {:#}", self),
                _ => tracing::error!("Internal service error: {:#}", self),
            }
        } else if status == StatusCode::CONFLICT {
            tracing::warn!("Conflict error: {}", self);
        } else {
            tracing::debug!("Client error: {}", self);
        }

        match &self {
            // Duplicate uploads name the conflicting file so clients can pick another
            Error::Storage(StorageError::AlreadyExists { name }) => {
                let body = json!({
                    "message": self.user_message(),
                    "name": name,
                });
                (status, Json(body)).into_response()
            }
            _ => (status, self.user_message()).into_response(),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
