//! Adobe PDF Services REST client.
//!
//! Every operation follows the same asynchronous job protocol:
//!
//! 1. exchange the service-account client id/secret for a bearer token (`POST /token`)
//! 2. register an asset (`POST /assets`) and upload the bytes to the returned presigned URI
//! 3. submit the job (`POST /operation/<name>`), which answers `201` with a `Location` header
//! 4. poll the `Location` until the job is `done` or `failed`
//! 5. download the result from the presigned `downloadUri` in the final status
//!
//! Tokens are cached until shortly before they expire, so the OCR and extract steps of one
//! extraction normally share a single token.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::credentials::ServiceAccountCredentials;
use super::{PdfServices, PdfServicesError, Result};
use crate::config::AdobeConfig;

const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Tokens are refreshed this long before the service says they expire
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Used when the token response doesn't say how long the token lives
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Ocr,
    ExtractText,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Operation::Ocr => "ocr",
            Operation::ExtractText => "extract",
        }
    }

    fn endpoint(self) -> &'static str {
        match self {
            Operation::Ocr => "operation/ocr",
            Operation::ExtractText => "operation/extractpdf",
        }
    }

    fn request_body(self, asset_id: &str) -> serde_json::Value {
        match self {
            Operation::Ocr => json!({ "assetID": asset_id }),
            // Only textual elements; tables and figures are not requested
            Operation::ExtractText => json!({ "assetID": asset_id, "elementsToExtract": ["text"] }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct UploadTarget {
    #[serde(rename = "uploadUri")]
    upload_uri: Url,
    #[serde(rename = "assetID")]
    asset_id: String,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    status: String,
    /// Result of single-output operations such as OCR
    #[serde(default)]
    asset: Option<DownloadableAsset>,
    /// Zipped result of extract
    #[serde(default)]
    resource: Option<DownloadableAsset>,
    /// JSON result of extract
    #[serde(default)]
    content: Option<DownloadableAsset>,
    #[serde(default)]
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct DownloadableAsset {
    #[serde(rename = "downloadUri")]
    download_uri: Url,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ServiceError {
    fn describe(&self) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (None, Some(message)) => message.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => "no error details provided".to_string(),
        }
    }
}

struct CachedToken {
    session: Session,
    expires_at: Instant,
}

#[derive(Clone)]
struct Session {
    token: String,
    client_id: String,
}

impl Session {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token).header("x-api-key", &self.client_id)
    }
}

/// Client for the Adobe PDF Services REST API
pub struct AdobePdfServices {
    client: Client,
    config: AdobeConfig,
    token: Mutex<Option<CachedToken>>,
}

impl AdobePdfServices {
    pub fn new(config: AdobeConfig) -> Result<Self> {
        // reqwest is built without a crypto provider; `main` may already have installed one
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    /// Credentials from config if both halves are set there, otherwise from the credentials file.
    /// The file is read at call time, so it can be rotated without a restart.
    async fn credentials(&self) -> Result<ServiceAccountCredentials> {
        match (&self.config.client_id, &self.config.client_secret) {
            (Some(client_id), Some(client_secret)) => Ok(ServiceAccountCredentials::new(client_id, client_secret)),
            _ => ServiceAccountCredentials::from_file(&self.config.credentials_path).await,
        }
    }

    fn api_url(&self, path: &str) -> Result<Url> {
        ensure_slash(&self.config.base_url)
            .join(path)
            .map_err(|e| PdfServicesError::InvalidResponse(format!("Failed to construct {path} URL: {e}")))
    }

    /// Return a valid session, authenticating if there is no unexpired cached token
    async fn session(&self) -> Result<Session> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires_at > Instant::now()
        {
            return Ok(token.session.clone());
        }

        let credentials = self.credentials().await?;
        let response = self
            .client
            .post(self.api_url("token")?)
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if [StatusCode::BAD_REQUEST, StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN].contains(&status) {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "PDF Services rejected credentials");
            return Err(PdfServicesError::Authentication(error_message(&body)));
        }
        let token: TokenResponse = error_for_status(response).await?.json().await?;

        let lifetime = token.expires_in.map(Duration::from_secs).unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let session = Session {
            token: token.access_token,
            client_id: credentials.client_id,
        };
        *cached = Some(CachedToken {
            session: session.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        });

        info!(lifetime = %humantime::format_duration(lifetime), "Authenticated with PDF Services");
        Ok(session)
    }

    /// Register a new asset and upload the file's bytes to it
    async fn upload_asset(&self, session: &Session, source: &Path) -> Result<String> {
        let target: UploadTarget = error_for_status(
            session
                .authorize(self.client.post(self.api_url("assets")?))
                .json(&json!({ "mediaType": PDF_MEDIA_TYPE }))
                .send()
                .await?,
        )
        .await?
        .json()
        .await?;

        let content = tokio::fs::read(source).await?;
        let bytes = content.len();
        error_for_status(
            self.client
                .put(target.upload_uri)
                .header(header::CONTENT_TYPE, PDF_MEDIA_TYPE)
                .body(content)
                .send()
                .await?,
        )
        .await?;

        debug!(asset_id = %target.asset_id, bytes, "Uploaded asset");
        Ok(target.asset_id)
    }

    /// Submit a job for an uploaded asset, returning the URL to poll for its status
    async fn submit_job(&self, session: &Session, operation: Operation, asset_id: &str) -> Result<Url> {
        let response = error_for_status(
            session
                .authorize(self.client.post(self.api_url(operation.endpoint())?))
                .json(&operation.request_body(asset_id))
                .send()
                .await?,
        )
        .await?;

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| PdfServicesError::InvalidResponse(format!("{} job response has no Location header", operation.name())))?;

        // Relative locations are resolved against the API base
        Url::parse(location)
            .or_else(|_| self.api_url(location.trim_start_matches('/')))
            .map_err(|_| PdfServicesError::InvalidResponse(format!("Invalid job location '{location}'")))
    }

    /// Poll a job's status until it's done or failed, up to `max_poll_attempts` times
    async fn wait_for_job(&self, session: &Session, operation: Operation, location: &Url) -> Result<JobStatus> {
        for attempt in 1..=self.config.max_poll_attempts {
            let job: JobStatus = error_for_status(session.authorize(self.client.get(location.clone())).send().await?)
                .await?
                .json()
                .await?;

            match job.status.as_str() {
                "done" => {
                    debug!(operation = operation.name(), attempt, "Job finished");
                    return Ok(job);
                }
                "failed" => {
                    let message = job
                        .error
                        .as_ref()
                        .map(ServiceError::describe)
                        .unwrap_or_else(|| "no error details provided".to_string());
                    return Err(PdfServicesError::JobFailed {
                        operation: operation.name(),
                        message,
                    });
                }
                other => {
                    debug!(operation = operation.name(), attempt, status = other, "Job not finished yet");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }

        Err(PdfServicesError::Timeout {
            operation: operation.name(),
            attempts: self.config.max_poll_attempts,
        })
    }

    /// Stream a result from its presigned URI to `destination`
    async fn download(&self, uri: Url, destination: &Path) -> Result<u64> {
        let mut response = error_for_status(self.client.get(uri).send().await?).await?;

        let mut file = tokio::fs::File::create(destination).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }

    async fn run(&self, operation: Operation, source: &Path, destination: &Path) -> Result<()> {
        let result = self.run_job(operation, source, destination).await;
        if let Err(PdfServicesError::Api { status: 401, .. }) = &result {
            warn!(operation = operation.name(), "PDF Services rejected the access token, discarding it");
            *self.token.lock().await = None;
        }
        result
    }

    async fn run_job(&self, operation: Operation, source: &Path, destination: &Path) -> Result<()> {
        let session = self.session().await?;
        let asset_id = self.upload_asset(&session, source).await?;
        let location = self.submit_job(&session, operation, &asset_id).await?;
        let job = self.wait_for_job(&session, operation, &location).await?;

        let result = match operation {
            Operation::Ocr => job.asset,
            Operation::ExtractText => job.resource.or(job.content),
        }
        .ok_or_else(|| PdfServicesError::InvalidResponse(format!("{} job finished without a result", operation.name())))?;

        let bytes = self.download(result.download_uri, destination).await?;
        info!(
            operation = operation.name(),
            destination = %destination.display(),
            bytes,
            "Saved PDF Services result"
        );
        Ok(())
    }
}

#[async_trait]
impl PdfServices for AdobePdfServices {
    #[instrument(skip(self), err)]
    async fn ocr(&self, source: &Path, destination: &Path) -> Result<()> {
        self.run(Operation::Ocr, source, destination).await
    }

    #[instrument(skip(self), err)]
    async fn extract_text(&self, source: &Path, destination: &Path) -> Result<()> {
        self.run(Operation::ExtractText, source, destination).await
    }
}

/// Makes sure a url has a trailing slash, so that `join` appends rather than replaces the last
/// path segment.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        return url.clone();
    }
    let mut url = url.clone();
    let path = format!("{}/", url.path());
    url.set_path(&path);
    url
}

/// Turn non-success responses into [`PdfServicesError::Api`]
async fn error_for_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(PdfServicesError::Api {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Pull a human-readable message out of an error body.
///
/// The service uses `{"error": {"code", "message"}}` for most errors, but the token endpoint
/// answers with flat `{"error", "error_description"}` objects.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ErrorBody {
        Nested { error: ServiceError },
        Flat { error: String, error_description: Option<String> },
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody::Nested { error }) => error.describe(),
        Ok(ErrorBody::Flat {
            error,
            error_description: Some(description),
        }) => format!("{error}: {description}"),
        Ok(ErrorBody::Flat { error, .. }) => error,
        Err(_) if body.is_empty() => "empty response body".to_string(),
        Err(_) => body.to_string(),
    }
}
