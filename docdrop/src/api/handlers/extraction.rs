use crate::AppState;
use crate::api::handlers::files::attachment;
use crate::errors::{Error, Result};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderName, HeaderValue, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::instrument;

/// Where the OCR'd PDF was written
pub const OCR_PATH_HEADER: HeaderName = HeaderName::from_static("x-extraction-ocr-path");
/// Where the returned archive was written
pub const ARCHIVE_PATH_HEADER: HeaderName = HeaderName::from_static("x-extraction-archive-path");

fn path_header(path: &std::path::Path) -> Result<HeaderValue> {
    HeaderValue::from_str(&path.to_string_lossy()).map_err(|e| Error::Internal {
        operation: format!("encode output path {} as a header: {e}", path.display()),
    })
}

#[utoipa::path(
    post,
    path = "/files/{filename}/extract",
    tag = "extraction",
    summary = "Extract text from a PDF",
    description = "Run OCR on a stored PDF, then extract its text elements. Both steps are \
performed by the configured PDF service and run to completion before the response is sent.

The response body is the zipped extraction result. Both artifacts are also kept in the output \
directory; their paths are returned in the `x-extraction-ocr-path` and \
`x-extraction-archive-path` headers.",
    params(
        ("filename" = String, Path, description = "Stored file name; must have a .pdf extension")
    ),
    responses(
        (status = 200, description = "Extraction result archive", content_type = "application/zip"),
        (status = 400, description = "Invalid filename, or the file is not a PDF"),
        (status = 404, description = "File not found"),
        (status = 502, description = "The PDF service failed or rejected the request"),
        (status = 504, description = "The PDF service did not finish in time"),
        (status = 500, description = "Internal server error")
    )
)]
#[instrument(skip(state), err)]
pub async fn extract_file(State(state): State<AppState>, Path(filename): Path<String>) -> Result<Response> {
    let source = state.storage.load(&filename).await?;
    let artifact = state.extraction.extract_text_info(&source).await?;

    let archive = tokio::fs::File::open(&artifact.archive_path).await.map_err(|e| Error::Internal {
        operation: format!("open extraction archive {}: {e}", artifact.archive_path.display()),
    })?;
    let archive_name = artifact
        .archive_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "extract.zip".to_string());

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, attachment(&archive_name)?),
            (header::CONTENT_LENGTH, HeaderValue::from(artifact.archive_size)),
            (OCR_PATH_HEADER, path_header(&artifact.ocr_path)?),
            (ARCHIVE_PATH_HEADER, path_header(&artifact.archive_path)?),
        ],
        Body::from_stream(ReaderStream::new(archive)),
    )
        .into_response())
}
