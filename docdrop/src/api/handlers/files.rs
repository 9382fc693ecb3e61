use crate::AppState;
use crate::api::models::files::{DeleteAllResponse, FileDeleteResponse, FileInfo, FileListResponse, FileResponse, ListObject, file_url};
use crate::errors::{Error, Result};
use crate::storage::StorageError;
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::{StreamExt, TryStreamExt};
use std::fmt;
use std::io;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::instrument;

/// Marker carried inside the io error when an upload crosses `storage.max_file_size`
#[derive(Debug)]
struct UploadTooLarge;

impl fmt::Display for UploadTooLarge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("upload exceeds the maximum file size")
    }
}

impl std::error::Error for UploadTooLarge {}

/// Recover an upload-stream error from the io error it travelled in
fn stream_error(io_err: &io::Error, limit: u64) -> Option<Error> {
    let inner = io_err.get_ref()?;
    if inner.is::<UploadTooLarge>() {
        return Some(Error::PayloadTooLarge { limit });
    }

    let multipart_err = inner.downcast_ref::<MultipartError>()?;
    if multipart_err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Some(Error::PayloadTooLarge { limit })
    } else {
        Some(Error::BadRequest {
            message: format!("Failed to read file upload: {}", multipart_err.body_text()),
        })
    }
}

/// Translate a failed save
fn upload_error(err: StorageError, limit: u64) -> Error {
    let recovered = match &err {
        StorageError::Io(io_err) => stream_error(io_err, limit),
        _ => None,
    };
    recovered.unwrap_or_else(|| err.into())
}

/// `Content-Disposition: attachment` with both the plain and RFC 5987 encoded filename
pub(crate) fn attachment(name: &str) -> Result<HeaderValue> {
    let fallback: String = name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .collect::<String>()
        .replace('"', "'");
    let encoded: String = url::form_urlencoded::byte_serialize(name.as_bytes()).collect();
    let value = format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        encoded.replace('+', "%20")
    );
    HeaderValue::from_str(&value).map_err(|e| Error::Internal {
        operation: format!("build content disposition header: {e}"),
    })
}

#[utoipa::path(
    post,
    path = "/files",
    tag = "files",
    summary = "Upload file",
    description = "Store a file under the name it was uploaded with. Names are never overwritten: \
uploading a name that is already stored fails with 409.",
    request_body(
        content_type = "multipart/form-data",
        description = "A single `file` field; its filename becomes the stored name"
    ),
    responses(
        (status = 201, description = "File uploaded successfully", body = FileResponse),
        (status = 400, description = "Missing file field, missing or invalid filename"),
        (status = 409, description = "A file of that name already exists"),
        (status = 413, description = "Payload too large"),
        (status = 500, description = "Internal server error")
    )
)]
#[instrument(skip_all, err)]
pub async fn upload_file(State(state): State<AppState>, mut multipart: Multipart) -> Result<(StatusCode, Json<FileResponse>)> {
    let mut uploaded: Option<FileResponse> = None;

    // A request that fails after its file was stored must not leave the file behind
    if let Err(err) = receive_upload(&state, &mut multipart, &mut uploaded).await {
        if let Some(stored) = uploaded {
            match state.storage.delete(&stored.name).await {
                Ok(_) => tracing::debug!(filename = %stored.name, "Removed file from rejected upload"),
                Err(e) => tracing::warn!(filename = %stored.name, error = %e, "Failed to remove file from rejected upload"),
            }
        }
        return Err(err);
    }

    let uploaded = uploaded.ok_or_else(|| Error::BadRequest {
        message: "Please select a file to upload".to_string(),
    })?;
    Ok((StatusCode::CREATED, Json(uploaded)))
}

/// Drain the multipart body, storing its single `file` field into `uploaded`
async fn receive_upload(state: &AppState, multipart: &mut Multipart, uploaded: &mut Option<FileResponse>) -> Result<()> {
    let limit = state.config.storage.max_file_size;

    while let Some(field) = multipart.next_field().await.map_err(|e| Error::BadRequest {
        message: format!("Failed to parse multipart data: {}", e.body_text()),
    })? {
        if field.name() != Some("file") {
            tracing::debug!(field = ?field.name(), "Ignoring unknown multipart field");
            continue;
        }
        if uploaded.is_some() {
            return Err(Error::BadRequest {
                message: "Only one file can be uploaded per request".to_string(),
            });
        }

        let name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| Error::BadRequest {
                message: "The file field must carry a filename".to_string(),
            })?;

        tracing::info!(filename = %name, "Starting file upload");

        // Abort as soon as the limit is crossed rather than after buffering the whole body
        let mut received = 0u64;
        let chunks = field.map(move |chunk| {
            let chunk = chunk.map_err(io::Error::other)?;
            received += chunk.len() as u64;
            if received > limit {
                return Err(io::Error::other(UploadTooLarge));
            }
            Ok(chunk)
        });

        let stored = state
            .storage
            .save(&name, StreamReader::new(Box::pin(chunks)))
            .await
            .map_err(|e| upload_error(e, limit))?;

        *uploaded = Some(FileResponse {
            url: file_url(&stored.name),
            name: stored.name,
            size: stored.size,
        });
    }

    Ok(())
}

#[utoipa::path(
    get,
    path = "/files",
    tag = "files",
    summary = "List files",
    description = "List the names of all stored files, sorted by name.",
    responses(
        (status = 200, description = "List of files", body = FileListResponse),
        (status = 500, description = "Internal server error")
    )
)]
#[instrument(skip_all, err)]
pub async fn list_files(State(state): State<AppState>) -> Result<Json<FileListResponse>> {
    let mut names: Vec<String> = state.storage.load_all().try_collect().await?;
    names.sort();

    Ok(Json(FileListResponse {
        object: ListObject::List,
        data: names.into_iter().map(FileInfo::new).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/files/{filename}",
    tag = "files",
    summary = "Download file",
    description = "Stream the content of a stored file as an attachment.",
    params(
        ("filename" = String, Path, description = "Stored file name")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 400, description = "Invalid filename"),
        (status = 404, description = "File not found"),
        (status = 500, description = "Internal server error")
    )
)]
#[instrument(skip(state), err)]
pub async fn get_file(State(state): State<AppState>, Path(filename): Path<String>) -> Result<Response> {
    let stored = state.storage.load(&filename).await?;
    let file = stored.open().await?;

    let content_type = mime_guess::from_path(&stored.name).first_or_octet_stream();

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_str(content_type.as_ref()).unwrap_or(HeaderValue::from_static("application/octet-stream"))),
            (header::CONTENT_DISPOSITION, attachment(&stored.name)?),
            (header::CONTENT_LENGTH, HeaderValue::from(stored.size)),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

#[utoipa::path(
    delete,
    path = "/files/{filename}",
    tag = "files",
    summary = "Delete file",
    description = "Delete a stored file. Deleting a name that isn't stored is not an error; \
the response reports `deleted: false`.",
    params(
        ("filename" = String, Path, description = "Stored file name")
    ),
    responses(
        (status = 200, description = "Deletion result", body = FileDeleteResponse),
        (status = 400, description = "Invalid filename"),
        (status = 500, description = "Internal server error")
    )
)]
#[instrument(skip(state), err)]
pub async fn delete_file(State(state): State<AppState>, Path(filename): Path<String>) -> Result<Json<FileDeleteResponse>> {
    let deleted = state.storage.delete(&filename).await?;
    Ok(Json(FileDeleteResponse { name: filename, deleted }))
}

#[utoipa::path(
    delete,
    path = "/files",
    tag = "files",
    summary = "Delete all files",
    description = "Remove every stored file. The upload directory is recreated afterwards, so \
uploads keep working.",
    responses(
        (status = 200, description = "Deletion result", body = DeleteAllResponse),
        (status = 500, description = "Internal server error")
    )
)]
#[instrument(skip_all, err)]
pub async fn delete_all_files(State(state): State<AppState>) -> Result<Json<DeleteAllResponse>> {
    let deleted = state.storage.delete_all().await?;
    state.storage.init().await?;
    Ok(Json(DeleteAllResponse { deleted }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_error_recovers_size_limit() {
        let err = StorageError::Io(io::Error::other(UploadTooLarge));
        assert!(matches!(upload_error(err, 10), Error::PayloadTooLarge { limit: 10 }));
    }

    #[test]
    fn test_upload_error_passes_through_storage_errors() {
        let err = StorageError::AlreadyExists { name: "a.txt".into() };
        assert_eq!(upload_error(err, 10).status_code(), StatusCode::CONFLICT);

        let err = StorageError::Io(io::Error::other("disk full"));
        assert_eq!(upload_error(err, 10).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_attachment_header() {
        let value = attachment("report.pdf").unwrap();
        assert_eq!(
            value.to_str().unwrap(),
            "attachment; filename=\"report.pdf\"; filename*=UTF-8''report.pdf"
        );

        let value = attachment("résumé \"final\".pdf").unwrap();
        assert_eq!(
            value.to_str().unwrap(),
            "attachment; filename=\"r_sum_ 'final'.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9%20%22final%22.pdf"
        );
    }
}
