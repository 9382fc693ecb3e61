//! OCR-then-extract pipeline.
//!
//! Turns a stored PDF into two artifacts in the output directory:
//!
//! - `extract<yyyyMMdd'T'HHmmss>-<token>.pdf`: the text-searchable OCR result
//! - `extract<yyyyMMdd'T'HHmmss>-<token>.zip`: the extracted text elements of that result
//!
//! The token makes names unique even when several extractions start within the same second.
//! Artifacts are not indexed anywhere; they simply accumulate in the output directory.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::pdf_services::{PdfServices, PdfServicesError};
use crate::storage::{StoredFile, is_pdf};

const TOKEN_LEN: usize = 12;

pub type Result<T> = std::result::Result<T, ExtractionError>;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("File {name} is not a PDF")]
    NotAPdf { name: String },

    #[error("Failed to prepare output directory {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Service(#[from] PdfServicesError),

    /// The service reported success but left nothing usable at the destination
    #[error("PDF Services reported success but produced no output at {}", path.display())]
    ArtifactMissing { path: PathBuf },
}

/// The files produced by one extraction
#[derive(Debug, Clone)]
pub struct ExtractionArtifact {
    pub ocr_path: PathBuf,
    pub archive_path: PathBuf,
    pub archive_size: u64,
}

pub struct ExtractionPipeline {
    output_dir: PathBuf,
    services: Arc<dyn PdfServices>,
}

impl ExtractionPipeline {
    pub fn new(output_dir: impl Into<PathBuf>, services: Arc<dyn PdfServices>) -> Self {
        Self {
            output_dir: output_dir.into(),
            services,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// OCR `source`, then extract the text of the OCR result.
    ///
    /// Steps run strictly in sequence and are not retried. On failure any partial output is
    /// removed and the error is returned, never swallowed.
    #[instrument(skip_all, fields(filename = %source.name), err)]
    pub async fn extract_text_info(&self, source: &StoredFile) -> Result<ExtractionArtifact> {
        if !is_pdf(&source.name) {
            return Err(ExtractionError::NotAPdf {
                name: source.name.clone(),
            });
        }

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| ExtractionError::Output {
                path: self.output_dir.clone(),
                source,
            })?;

        let stem = output_stem(Local::now());
        let ocr_path = self.output_dir.join(format!("{stem}.pdf"));
        let archive_path = self.output_dir.join(format!("{stem}.zip"));

        let result = self.run(&source.path, &ocr_path, &archive_path).await;
        match result {
            Ok(archive_size) => {
                info!(
                    ocr = %ocr_path.display(),
                    archive = %archive_path.display(),
                    bytes = archive_size,
                    "Extraction finished"
                );
                Ok(ExtractionArtifact {
                    ocr_path,
                    archive_path,
                    archive_size,
                })
            }
            Err(e) => {
                error!(error = %e, "Extraction failed");
                remove_partial(&ocr_path).await;
                remove_partial(&archive_path).await;
                Err(e)
            }
        }
    }

    async fn run(&self, source: &Path, ocr_path: &Path, archive_path: &Path) -> Result<u64> {
        self.services.ocr(source, ocr_path).await?;
        require_output(ocr_path).await?;

        self.services.extract_text(ocr_path, archive_path).await?;
        require_output(archive_path).await
    }
}

/// `extract<yyyyMMdd'T'HHmmss>-<token>`, unique per call
pub fn output_stem(now: DateTime<Local>) -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("extract{}-{}", now.format("%Y%m%dT%H%M%S"), &token[..TOKEN_LEN])
}

/// Size of a non-empty regular file at `path`
async fn require_output(path: &Path) -> Result<u64> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() && metadata.len() > 0 => Ok(metadata.len()),
        _ => Err(ExtractionError::ArtifactMissing { path: path.to_path_buf() }),
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => warn!(path = %path.display(), "Removed partial extraction output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial extraction output"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf_services;
    use crate::storage::LocalFileStorage;
    use async_trait::async_trait;
    use std::collections::HashSet;

    /// Writes fixed bytes for each step instead of calling out
    struct FixedOutput;

    #[async_trait]
    impl PdfServices for FixedOutput {
        async fn ocr(&self, _source: &Path, destination: &Path) -> pdf_services::Result<()> {
            tokio::fs::write(destination, b"%PDF-1.7 searchable").await?;
            Ok(())
        }

        async fn extract_text(&self, source: &Path, destination: &Path) -> pdf_services::Result<()> {
            assert!(source.extension().is_some_and(|ext| ext == "pdf"));
            tokio::fs::write(destination, b"PK\x03\x04structured").await?;
            Ok(())
        }
    }

    /// OCR succeeds, extraction fails
    struct FailingExtract;

    #[async_trait]
    impl PdfServices for FailingExtract {
        async fn ocr(&self, _source: &Path, destination: &Path) -> pdf_services::Result<()> {
            tokio::fs::write(destination, b"%PDF").await?;
            Ok(())
        }

        async fn extract_text(&self, _source: &Path, _destination: &Path) -> pdf_services::Result<()> {
            Err(PdfServicesError::JobFailed {
                operation: "extract",
                message: "corrupt input".to_string(),
            })
        }
    }

    /// Claims success without writing anything
    struct SilentSuccess;

    #[async_trait]
    impl PdfServices for SilentSuccess {
        async fn ocr(&self, _source: &Path, _destination: &Path) -> pdf_services::Result<()> {
            Ok(())
        }

        async fn extract_text(&self, _source: &Path, _destination: &Path) -> pdf_services::Result<()> {
            Ok(())
        }
    }

    async fn stored(temp_dir: &tempfile::TempDir, name: &str) -> StoredFile {
        let storage = LocalFileStorage::new(temp_dir.path().join("uploads"));
        storage.init().await.unwrap();
        storage.save(name, &b"%PDF-1.4 scan"[..]).await.unwrap()
    }

    fn assert_stem_shape(stem: &str) {
        let rest = stem.strip_prefix("extract").expect("stem starts with 'extract'");
        let (timestamp, token) = rest.split_once('-').expect("stem has a token");
        assert_eq!(timestamp.len(), 15);
        assert_eq!(timestamp.as_bytes()[8], b'T');
        assert!(timestamp.chars().enumerate().all(|(i, c)| i == 8 || c.is_ascii_digit()));
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_extraction_produces_zip_matching_pattern() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = stored(&temp_dir, "scan.pdf").await;
        let output_dir = temp_dir.path().join("output/ExtractTextInfoFromPDF");
        let pipeline = ExtractionPipeline::new(&output_dir, Arc::new(FixedOutput));

        let artifact = pipeline.extract_text_info(&source).await.unwrap();

        assert_eq!(artifact.archive_path.parent(), Some(output_dir.as_path()));
        assert_eq!(artifact.archive_path.extension().unwrap(), "zip");
        assert_eq!(artifact.ocr_path.extension().unwrap(), "pdf");
        assert_eq!(artifact.ocr_path.file_stem(), artifact.archive_path.file_stem());
        assert_stem_shape(artifact.archive_path.file_stem().unwrap().to_str().unwrap());

        assert!(artifact.archive_size > 0);
        assert_eq!(std::fs::read(&artifact.archive_path).unwrap(), b"PK\x03\x04structured");
        assert_eq!(std::fs::read(&artifact.ocr_path).unwrap(), b"%PDF-1.7 searchable");
    }

    #[tokio::test]
    async fn test_extractions_in_the_same_second_do_not_collide() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = stored(&temp_dir, "scan.pdf").await;
        let pipeline = ExtractionPipeline::new(temp_dir.path().join("out"), Arc::new(FixedOutput));

        let first = pipeline.extract_text_info(&source).await.unwrap();
        let second = pipeline.extract_text_info(&source).await.unwrap();
        assert_ne!(first.archive_path, second.archive_path);

        let now = Local::now();
        let stems: HashSet<String> = (0..100).map(|_| output_stem(now)).collect();
        assert_eq!(stems.len(), 100);
    }

    #[tokio::test]
    async fn test_non_pdf_is_rejected_before_calling_out() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = stored(&temp_dir, "notes.txt").await;
        let output_dir = temp_dir.path().join("out");
        let pipeline = ExtractionPipeline::new(&output_dir, Arc::new(FailingExtract));

        let result = pipeline.extract_text_info(&source).await;

        assert!(matches!(result, Err(ExtractionError::NotAPdf { ref name }) if name == "notes.txt"));
        assert!(!output_dir.exists());
    }

    #[tokio::test]
    async fn test_service_failure_is_returned_and_partial_output_removed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = stored(&temp_dir, "scan.PDF").await;
        let output_dir = temp_dir.path().join("out");
        let pipeline = ExtractionPipeline::new(&output_dir, Arc::new(FailingExtract));

        let result = pipeline.extract_text_info(&source).await;

        assert!(matches!(
            result,
            Err(ExtractionError::Service(PdfServicesError::JobFailed { operation: "extract", .. }))
        ));
        assert_eq!(std::fs::read_dir(&output_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_success_without_output_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = stored(&temp_dir, "scan.pdf").await;
        let pipeline = ExtractionPipeline::new(temp_dir.path().join("out"), Arc::new(SilentSuccess));

        let result = pipeline.extract_text_info(&source).await;
        assert!(matches!(result, Err(ExtractionError::ArtifactMissing { .. })));
    }
}
