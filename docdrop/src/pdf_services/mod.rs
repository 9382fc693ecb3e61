//! PDF processing service abstraction
//!
//! OCR and text extraction are not done locally: they are delegated to an external managed
//! service. This module defines the [`PdfServices`] trait, which treats that service as an opaque
//! `(file) -> file` function, plus the concrete backends:
//!
//! - [`adobe::AdobePdfServices`]: the Adobe PDF Services REST API
//! - [`dummy::DummyPdfServices`]: a local passthrough for development and tests

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::PdfServicesConfig;

pub mod adobe;
pub mod credentials;
pub mod dummy;

/// Create the configured PDF services backend
///
/// This is the single point where config is turned into a backend instance.
pub fn create_processor(config: &PdfServicesConfig) -> Result<Arc<dyn PdfServices>> {
    match config {
        PdfServicesConfig::Adobe(adobe_config) => Ok(Arc::new(adobe::AdobePdfServices::new(adobe_config.clone())?)),
        PdfServicesConfig::Dummy(dummy_config) => Ok(Arc::new(dummy::DummyPdfServices::from(dummy_config.clone()))),
    }
}

/// Result type for PDF service operations
pub type Result<T> = std::result::Result<T, PdfServicesError>;

/// Errors raised while talking to the external PDF service
#[derive(Debug, thiserror::Error)]
pub enum PdfServicesError {
    /// The credentials file is missing or malformed
    #[error("Failed to load PDF Services credentials from {}: {reason}", path.display())]
    Credentials { path: PathBuf, reason: String },

    /// The service rejected the credentials
    #[error("PDF Services authentication failed: {0}")]
    Authentication(String),

    /// The service answered with a non-success status
    #[error("PDF Services API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A submitted job finished in the `failed` state
    #[error("PDF Services {operation} job failed: {message}")]
    JobFailed { operation: &'static str, message: String },

    /// A submitted job didn't finish within the configured number of status checks
    #[error("PDF Services {operation} job still running after {attempts} status checks")]
    Timeout { operation: &'static str, attempts: u32 },

    /// The service answered, but not with what the protocol promises
    #[error("Unexpected PDF Services response: {0}")]
    InvalidResponse(String),

    #[error("HTTP request to PDF Services failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An external service able to OCR a PDF and extract its text
///
/// Both operations read a local file and write their result to a local destination path. They
/// block (asynchronously) until the service has produced the result; no retries are made.
#[async_trait]
pub trait PdfServices: Send + Sync {
    /// Convert `source` (possibly scanned or image-only) into a text-searchable PDF at `destination`
    async fn ocr(&self, source: &Path, destination: &Path) -> Result<()>;

    /// Extract the text elements of `source`, writing the zipped structured result to `destination`
    async fn extract_text(&self, source: &Path, destination: &Path) -> Result<()>;
}
