//! Service-account credentials for Adobe PDF Services.
//!
//! The credentials file downloaded from the Adobe developer console looks like:
//!
//! ```json
//! {
//!   "client_credentials": {
//!     "client_id": "<id>",
//!     "client_secret": "<secret>"
//!   },
//!   "service_principal_credentials": {
//!     "organization_id": "<org>@AdobeOrg"
//!   }
//! }
//! ```

use serde::Deserialize;
use std::fmt;
use std::path::Path;

use super::{PdfServicesError, Result};

#[derive(Deserialize)]
struct CredentialsFile {
    client_credentials: ClientCredentials,
    #[serde(default)]
    service_principal_credentials: Option<ServicePrincipalCredentials>,
}

#[derive(Deserialize)]
struct ClientCredentials {
    client_id: String,
    client_secret: String,
}

#[derive(Deserialize)]
struct ServicePrincipalCredentials {
    organization_id: Option<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ServiceAccountCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub organization_id: Option<String>,
}

// Never print the secret
impl fmt::Debug for ServiceAccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("organization_id", &self.organization_id)
            .finish()
    }
}

impl ServiceAccountCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            organization_id: None,
        }
    }

    /// Read and parse a credentials file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let credentials_error = |reason: String| PdfServicesError::Credentials {
            path: path.to_path_buf(),
            reason,
        };

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| credentials_error(e.to_string()))?;
        let parsed: CredentialsFile = serde_json::from_str(&raw).map_err(|e| credentials_error(e.to_string()))?;

        if parsed.client_credentials.client_id.trim().is_empty() || parsed.client_credentials.client_secret.trim().is_empty() {
            return Err(credentials_error("client_id and client_secret must not be empty".to_string()));
        }

        Ok(Self {
            client_id: parsed.client_credentials.client_id,
            client_secret: parsed.client_credentials.client_secret,
            organization_id: parsed.service_principal_credentials.and_then(|principal| principal.organization_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_file_parses_console_format() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("pdfservices-api-credentials.json");
        std::fs::write(
            &path,
            r#"{
                "client_credentials": {"client_id": "abc", "client_secret": "shh"},
                "service_principal_credentials": {"organization_id": "org@AdobeOrg"}
            }"#,
        )
        .unwrap();

        let credentials = ServiceAccountCredentials::from_file(&path).await.unwrap();
        assert_eq!(credentials.client_id, "abc");
        assert_eq!(credentials.client_secret, "shh");
        assert_eq!(credentials.organization_id.as_deref(), Some("org@AdobeOrg"));
    }

    #[tokio::test]
    async fn test_from_file_without_service_principal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("creds.json");
        std::fs::write(&path, r#"{"client_credentials": {"client_id": "abc", "client_secret": "shh"}}"#).unwrap();

        let credentials = ServiceAccountCredentials::from_file(&path).await.unwrap();
        assert_eq!(credentials.organization_id, None);
    }

    #[tokio::test]
    async fn test_missing_or_invalid_file_is_a_credentials_error() {
        let temp_dir = tempfile::tempdir().unwrap();

        let missing = ServiceAccountCredentials::from_file(&temp_dir.path().join("nope.json")).await;
        assert!(matches!(missing, Err(PdfServicesError::Credentials { .. })));

        let garbage = temp_dir.path().join("garbage.json");
        std::fs::write(&garbage, "not json").unwrap();
        let invalid = ServiceAccountCredentials::from_file(&garbage).await;
        assert!(matches!(invalid, Err(PdfServicesError::Credentials { .. })));

        let blank = temp_dir.path().join("blank.json");
        std::fs::write(&blank, r#"{"client_credentials": {"client_id": " ", "client_secret": ""}}"#).unwrap();
        let empty = ServiceAccountCredentials::from_file(&blank).await;
        assert!(matches!(empty, Err(PdfServicesError::Credentials { .. })));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let credentials = ServiceAccountCredentials::new("abc", "super-secret");
        let printed = format!("{credentials:?}");
        assert!(printed.contains("abc"));
        assert!(!printed.contains("super-secret"));
    }
}
