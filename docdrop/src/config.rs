//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `DOCDROP_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `DOCDROP_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `DOCDROP_STORAGE__ROOT=/var/lib/docdrop/uploads` sets the `storage.root` field.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port` - HTTP server binding configuration
//! - **Storage**: `storage.root`, `storage.output_dir`, `storage.max_file_size`,
//!   `storage.clear_on_startup` - Where uploads and extraction results live
//! - **PDF services**: `pdf_services.adobe` or `pdf_services.dummy` - Which backend performs OCR
//!   and text extraction
//! - **CORS**: `cors.allowed_origins`, `cors.allow_credentials`, `cors.max_age`
//! - **Telemetry**: `enable_otel_export`
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! DOCDROP_PORT=8080
//!
//! # Provide PDF Services credentials without a credentials file
//! DOCDROP_PDF_SERVICES__ADOBE__CLIENT_ID=...
//! DOCDROP_PDF_SERVICES__ADOBE__CLIENT_SECRET=...
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Component, Path, PathBuf},
    time::Duration,
};
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "DOCDROP_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Upload and extraction output locations
    pub storage: StorageConfig,
    /// Backend performing OCR and text extraction
    pub pdf_services: PdfServicesConfig,
    /// CORS settings for browser clients
    pub cors: CorsConfig,
    /// Export traces over OTLP (configured via the standard `OTEL_*` environment variables)
    pub enable_otel_export: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            storage: StorageConfig::default(),
            pdf_services: PdfServicesConfig::default(),
            cors: CorsConfig::default(),
            enable_otel_export: false,
        }
    }
}

/// Local filesystem layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Flat directory holding uploaded files (default: `uploads`)
    pub root: PathBuf,
    /// Directory extraction results are written to (default: `output/ExtractTextInfoFromPDF`)
    pub output_dir: PathBuf,
    /// Largest accepted upload in bytes (default: 50 MiB)
    pub max_file_size: u64,
    /// Delete everything under `root` before initializing it at startup (default: false)
    pub clear_on_startup: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("uploads"),
            output_dir: PathBuf::from("output/ExtractTextInfoFromPDF"),
            max_file_size: 50 * 1024 * 1024,
            clear_on_startup: false,
        }
    }
}

/// PDF services backend configuration.
///
/// Exactly one backend is configured, keyed by name:
///
/// ```yaml
/// pdf_services:
///   adobe:
///     credentials_path: pdfservices-api-credentials.json
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfServicesConfig {
    /// Adobe PDF Services REST API
    /// Credentials can be set via:
    /// - `DOCDROP_PDF_SERVICES__ADOBE__CLIENT_ID`
    /// - `DOCDROP_PDF_SERVICES__ADOBE__CLIENT_SECRET`
    ///
    /// or, if either is unset, read from `credentials_path` on each extraction.
    Adobe(AdobeConfig),
    /// Local passthrough that copies its input, for development and testing
    Dummy(DummyConfig),
}

impl Default for PdfServicesConfig {
    fn default() -> Self {
        Self::Adobe(AdobeConfig::default())
    }
}

/// Adobe PDF Services configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdobeConfig {
    /// API base URL; the token endpoint is `<base_url>/token` (default: `https://pdf-services.adobe.io`)
    pub base_url: Url,
    /// Service-account credentials file downloaded from the Adobe developer console
    pub credentials_path: PathBuf,
    /// Client id, overriding the credentials file when set together with `client_secret`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Client secret, overriding the credentials file when set together with `client_id`
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    /// Timeout for each individual HTTP request (default: 60s)
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Delay between job status checks (default: 2s)
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Status checks before a running job is given up on (default: 150)
    pub max_poll_attempts: u32,
}

impl Default for AdobeConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("https://pdf-services.adobe.io").unwrap(),
            credentials_path: PathBuf::from("pdfservices-api-credentials.json"),
            client_id: None,
            client_secret: None,
            request_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
            max_poll_attempts: 150,
        }
    }
}

// Config is debug-logged at startup, so the secret is redacted
impl fmt::Debug for AdobeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdobeConfig")
            .field("base_url", &self.base_url.as_str())
            .field("credentials_path", &self.credentials_path)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("max_poll_attempts", &self.max_poll_attempts)
            .finish()
    }
}

/// Dummy backend configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DummyConfig {
    /// Artificial delay before each operation completes (default: none)
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
    /// Custom headers to expose to the browser (in addition to CORS-safelisted headers)
    pub exposed_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            allow_credentials: false,
            max_age: Some(3600),
            exposed_headers: vec![
                "content-disposition".to_string(),
                "x-extraction-ocr-path".to_string(),
                "x-extraction-archive-path".to_string(),
            ],
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |message: String| Error::Internal {
            operation: format!("Config validation: {message}"),
        };

        if self.storage.max_file_size == 0 {
            return Err(invalid("storage.max_file_size must be positive".to_string()));
        }

        // Clearing the root on startup would also wipe extraction results nested inside it
        if normalize(&self.storage.output_dir).starts_with(normalize(&self.storage.root)) {
            return Err(invalid(format!(
                "storage.output_dir ({}) must not be inside storage.root ({})",
                self.storage.output_dir.display(),
                self.storage.root.display()
            )));
        }

        if let PdfServicesConfig::Adobe(adobe) = &self.pdf_services {
            if adobe.poll_interval.is_zero() {
                return Err(invalid("pdf_services.adobe.poll_interval must be positive".to_string()));
            }
            if adobe.max_poll_attempts == 0 {
                return Err(invalid("pdf_services.adobe.max_poll_attempts must be at least 1".to_string()));
            }
            if adobe.client_id.is_some() != adobe.client_secret.is_some() {
                return Err(invalid(
                    "pdf_services.adobe.client_id and client_secret must be set together; \
                     leave both unset to use the credentials file"
                        .to_string(),
                ));
            }
        }

        if self.cors.allowed_origins.is_empty() {
            return Err(invalid(
                "CORS allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            ));
        }

        // Validate that wildcard is not used with credentials
        let has_wildcard = self.cors.allowed_origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.cors.allow_credentials {
            return Err(invalid(
                "CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins.".to_string(),
            ));
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("DOCDROP_").split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Lexically clean a path: drop `.` components and fold `..` into the preceding component.
/// Symlinks are not resolved.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) => {}
                _ => normalized.push(component),
            },
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(config: &str) -> Args {
        Args {
            config: config.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_defaults_without_config_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.bind_address(), "0.0.0.0:3001");
            assert_eq!(config.storage.root, PathBuf::from("uploads"));
            assert_eq!(config.storage.output_dir, PathBuf::from("output/ExtractTextInfoFromPDF"));
            assert!(!config.storage.clear_on_startup);

            let PdfServicesConfig::Adobe(adobe) = config.pdf_services else {
                panic!("expected the adobe backend by default");
            };
            assert_eq!(adobe.base_url.as_str(), "https://pdf-services.adobe.io/");
            assert_eq!(adobe.credentials_path, PathBuf::from("pdfservices-api-credentials.json"));
            assert_eq!(adobe.poll_interval, Duration::from_secs(2));

            Ok(())
        });
    }

    #[test]
    fn test_yaml_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 9000
storage:
  root: /srv/docdrop/uploads
  output_dir: /srv/docdrop/output
  max_file_size: 1048576
  clear_on_startup: true
pdf_services:
  adobe:
    credentials_path: /etc/docdrop/credentials.json
    poll_interval: 500ms
    request_timeout: 2m
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.port, 9000);
            assert_eq!(config.storage.root, PathBuf::from("/srv/docdrop/uploads"));
            assert_eq!(config.storage.max_file_size, 1024 * 1024);
            assert!(config.storage.clear_on_startup);

            let PdfServicesConfig::Adobe(adobe) = config.pdf_services else {
                panic!("expected the adobe backend");
            };
            assert_eq!(adobe.credentials_path, PathBuf::from("/etc/docdrop/credentials.json"));
            assert_eq!(adobe.poll_interval, Duration::from_millis(500));
            assert_eq!(adobe.request_timeout, Duration::from_secs(120));
            assert_eq!(adobe.max_poll_attempts, 150); // default

            Ok(())
        });
    }

    #[test]
    fn test_dummy_backend() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
pdf_services:
  dummy:
    latency: 1s
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;
            let PdfServicesConfig::Dummy(dummy) = config.pdf_services else {
                panic!("expected the dummy backend");
            };
            assert_eq!(dummy.latency, Duration::from_secs(1));

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
storage:
  root: yaml-uploads
"#,
            )?;

            jail.set_env("DOCDROP_HOST", "127.0.0.1");
            jail.set_env("DOCDROP_PORT", "8080");
            jail.set_env("DOCDROP_PDF_SERVICES__ADOBE__CLIENT_ID", "env-id");
            jail.set_env("DOCDROP_PDF_SERVICES__ADOBE__CLIENT_SECRET", "env-secret");

            let config = Config::load(&args("test.yaml"))?;

            // Env vars should override
            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 8080);
            let PdfServicesConfig::Adobe(adobe) = config.pdf_services else {
                panic!("expected the adobe backend");
            };
            assert_eq!(adobe.client_id.as_deref(), Some("env-id"));
            assert_eq!(adobe.client_secret.as_deref(), Some("env-secret"));

            // YAML values should be preserved
            assert_eq!(config.storage.root, PathBuf::from("yaml-uploads"));

            Ok(())
        });
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
storage:
  rooot: typo
"#,
            )?;

            assert!(Config::load(&args("test.yaml")).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_config_validation_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_output_inside_root() {
        let mut config = Config::default();
        config.storage.output_dir = config.storage.root.join("results");
        assert!(config.validate().is_err());

        config.storage.output_dir = config.storage.root.clone();
        assert!(config.validate().is_err());

        // Spelling the same directory differently doesn't get around the check
        config.storage.root = PathBuf::from("uploads");
        config.storage.output_dir = PathBuf::from("./uploads/x");
        assert!(config.validate().is_err());

        config.storage.root = PathBuf::from("./data/../uploads/");
        config.storage.output_dir = PathBuf::from("uploads/./results");
        assert!(config.validate().is_err());

        config.storage.output_dir = PathBuf::from("uploads/../output");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("./uploads/./x")), PathBuf::from("uploads/x"));
        assert_eq!(normalize(Path::new("a/b/../c")), PathBuf::from("a/c"));
        assert_eq!(normalize(Path::new("../shared")), PathBuf::from("../shared"));
        assert_eq!(normalize(Path::new("/srv/../srv/uploads")), PathBuf::from("/srv/uploads"));
    }

    #[test]
    fn test_config_validation_zero_limits() {
        let mut config = Config::default();
        config.storage.max_file_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pdf_services = PdfServicesConfig::Adobe(AdobeConfig {
            max_poll_attempts: 0,
            ..Default::default()
        });
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pdf_services = PdfServicesConfig::Adobe(AdobeConfig {
            poll_interval: Duration::ZERO,
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_half_configured_credentials() {
        let mut config = Config::default();
        config.pdf_services = PdfServicesConfig::Adobe(AdobeConfig {
            client_id: Some("id".to_string()),
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_client_secret() {
        let adobe = AdobeConfig {
            client_id: Some("id".to_string()),
            client_secret: Some("hunter2".to_string()),
            ..Default::default()
        };
        let printed = format!("{adobe:?}");
        assert!(printed.contains("id"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_config_validation_cors_wildcard_with_credentials() {
        let mut config = Config::default();
        config.cors.allow_credentials = true;
        assert!(config.validate().is_err());

        config.cors.allowed_origins = vec![CorsOrigin::Url(Url::parse("https://app.example.com").unwrap())];
        assert!(config.validate().is_ok());
    }
}
