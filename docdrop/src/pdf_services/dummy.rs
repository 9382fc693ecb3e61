//! Local passthrough backend.
//!
//! Doesn't talk to any external service: both operations copy the source file to the
//! destination, optionally after a configured delay. Useful for development without
//! PDF Services credentials, and for exercising the HTTP surface in tests.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{PdfServices, Result};
use crate::config::DummyConfig;

pub struct DummyPdfServices {
    latency: Duration,
}

impl From<DummyConfig> for DummyPdfServices {
    fn from(config: DummyConfig) -> Self {
        Self { latency: config.latency }
    }
}

impl DummyPdfServices {
    async fn passthrough(&self, source: &Path, destination: &Path) -> Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let bytes = tokio::fs::copy(source, destination).await?;
        debug!(bytes, "Dummy PDF service copied source to destination");
        Ok(())
    }
}

#[async_trait]
impl PdfServices for DummyPdfServices {
    #[instrument(skip(self), err)]
    async fn ocr(&self, source: &Path, destination: &Path) -> Result<()> {
        self.passthrough(source, destination).await
    }

    #[instrument(skip(self), err)]
    async fn extract_text(&self, source: &Path, destination: &Path) -> Result<()> {
        self.passthrough(source, destination).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf_services::PdfServicesError;

    #[tokio::test]
    async fn test_both_operations_copy_the_source() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = temp_dir.path().join("in.pdf");
        std::fs::write(&source, b"%PDF-1.7").unwrap();

        let services = DummyPdfServices::from(DummyConfig::default());
        let ocr = temp_dir.path().join("ocr.pdf");
        let archive = temp_dir.path().join("text.zip");
        services.ocr(&source, &ocr).await.unwrap();
        services.extract_text(&ocr, &archive).await.unwrap();

        assert_eq!(std::fs::read(&ocr).unwrap(), b"%PDF-1.7");
        assert_eq!(std::fs::read(&archive).unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn test_missing_source_is_an_io_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let services = DummyPdfServices::from(DummyConfig::default());

        let result = services
            .ocr(&temp_dir.path().join("missing.pdf"), &temp_dir.path().join("out.pdf"))
            .await;
        assert!(matches!(result, Err(PdfServicesError::Io(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_applied() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = temp_dir.path().join("in.pdf");
        std::fs::write(&source, b"%PDF").unwrap();

        let services = DummyPdfServices::from(DummyConfig {
            latency: Duration::from_secs(30),
        });
        let started = tokio::time::Instant::now();
        services.ocr(&source, &temp_dir.path().join("out.pdf")).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(30));
    }
}
