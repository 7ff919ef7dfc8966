//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. The file path defaults to `config.yaml` and can be set via
//! the `-f` flag or the `IMGVAULT_CONFIG` environment variable.
//!
//! ## Loading Priority
//!
//! Sources merge in order, later sources overriding earlier ones:
//!
//! 1. **YAML config file** - base configuration (default: `config.yaml`)
//! 2. **Environment variables** - `IMGVAULT_`-prefixed variables, with
//!    `__` separating nested keys (`IMGVAULT_STORAGE__ACCOUNT_NAME=...`)
//! 3. **AZURE_STORAGE_CONNECTION_STRING** - special case: overrides
//!    `storage.connection_string` when set
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port`
//! - **Storage**: `storage.backend` (`azure` or `memory`), account
//!   credentials, `storage.image_container`, `storage.thumbnail_container`,
//!   optional `storage.blob_endpoint` for Azurite/emulators
//! - **Upload**: `upload.max_body_size` request body cap for `/Blob/Upload`
//! - **CORS**: `cors.allowed_origins`, `cors.allow_credentials`, `cors.max_age`
//! - **Telemetry**: `enable_otel_export`

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

/// Simple CLI args - just for specifying the config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "IMGVAULT_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
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
    /// Blob storage account and container settings
    pub storage: StorageConfig,
    /// Upload request limits
    pub upload: UploadConfig,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            storage: StorageConfig::default(),
            upload: UploadConfig::default(),
            cors: CorsConfig::default(),
            enable_otel_export: false,
        }
    }
}

/// Which storage backend serves blob operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Azure Blob Storage over the Blob REST API
    Azure,
    /// Process-local map, for development and tests
    Memory,
}

/// Blob storage account and container configuration.
///
/// Read once at startup and shared read-only with every request handler.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Storage account name
    pub account_name: String,
    /// Storage account key (base64)
    pub account_key: String,
    /// Connection string; parsed for account name/key/endpoint when the
    /// explicit fields are empty
    pub connection_string: String,
    /// Container receiving uploaded images
    pub image_container: String,
    /// Container a downstream thumbnail pipeline fills. When empty,
    /// uploads are acknowledged as accepted-but-not-fully-processed.
    pub thumbnail_container: String,
    /// Blob service endpoint override (Azurite, emulators)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_endpoint: Option<Url>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Azure,
            account_name: String::new(),
            account_key: String::new(),
            connection_string: String::new(),
            image_container: String::new(),
            thumbnail_container: String::new(),
            blob_endpoint: None,
        }
    }
}

impl StorageConfig {
    /// Whether the account credentials needed for uploads are present.
    pub fn has_credentials(&self) -> bool {
        !self.account_name.is_empty() && !self.account_key.is_empty()
    }

    /// Whether a thumbnail container is configured.
    pub fn thumbnails_enabled(&self) -> bool {
        !self.thumbnail_container.is_empty()
    }
}

/// Upload request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// Maximum multipart body size in bytes for `/Blob/Upload`
    pub max_body_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_body_size: 50 * 1024 * 1024, // 50 MB
        }
    }
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
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            allow_credentials: false,
            max_age: None,
        }
    }
}

/// A single allowed CORS origin.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

impl Serialize for CorsOrigin {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CorsOrigin::Wildcard => serializer.serialize_str("*"),
            CorsOrigin::Url(url) => serializer.serialize_str(url.as_str()),
        }
    }
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
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("IMGVAULT_").split("__"))
            // Common connection-string pattern used by Azure tooling
            .merge(
                Env::raw()
                    .only(&["AZURE_STORAGE_CONNECTION_STRING"])
                    .map(|_| "storage__connection_string".into())
                    .split("__"),
            )
    }

    /// Validate the configuration for consistency.
    ///
    /// Missing storage credentials or container names are NOT startup
    /// errors here; the upload policy reports them per request.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.upload.max_body_size == 0 {
            anyhow::bail!("upload.max_body_size must be greater than zero");
        }

        if self.storage.thumbnails_enabled() && self.storage.thumbnail_container == self.storage.image_container {
            anyhow::bail!(
                "storage.thumbnail_container must differ from storage.image_container ({})",
                self.storage.image_container
            );
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args_for(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn defaults_without_a_config_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&args_for("missing.yaml"))?;

            assert_eq!(config.host, "0.0.0.0");
            assert_eq!(config.port, 8080);
            assert_eq!(config.storage.backend, StorageBackend::Azure);
            assert!(config.storage.image_container.is_empty());
            assert!(!config.storage.thumbnails_enabled());
            assert_eq!(config.upload.max_body_size, 50 * 1024 * 1024);
            assert_eq!(config.cors.allowed_origins, vec![CorsOrigin::Wildcard]);
            Ok(())
        });
    }

    #[test]
    fn yaml_storage_section_is_loaded() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 9090
storage:
  backend: memory
  account_name: acme
  account_key: c2VjcmV0
  image_container: images
  thumbnail_container: thumbnails
cors:
  allowed_origins:
    - "*"
    - https://app.example.com
"#,
            )?;

            let config = Config::load(&args_for("test.yaml"))?;

            assert_eq!(config.port, 9090);
            assert_eq!(config.storage.backend, StorageBackend::Memory);
            assert!(config.storage.has_credentials());
            assert_eq!(config.storage.image_container, "images");
            assert!(config.storage.thumbnails_enabled());
            assert_eq!(config.cors.allowed_origins.len(), 2);
            assert!(matches!(config.cors.allowed_origins[1], CorsOrigin::Url(_)));
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
storage:
  account_name: from-yaml
  image_container: images
"#,
            )?;
            jail.set_env("IMGVAULT_STORAGE__ACCOUNT_NAME", "from-env");
            jail.set_env("IMGVAULT_PORT", "3030");

            let config = Config::load(&args_for("test.yaml"))?;

            assert_eq!(config.storage.account_name, "from-env");
            assert_eq!(config.port, 3030);
            assert_eq!(config.storage.image_container, "images");
            Ok(())
        });
    }

    #[test]
    fn azure_connection_string_env_is_mapped() {
        Jail::expect_with(|jail| {
            jail.set_env(
                "AZURE_STORAGE_CONNECTION_STRING",
                "AccountName=acme;AccountKey=c2VjcmV0;",
            );

            let config = Config::load(&args_for("missing.yaml"))?;
            assert_eq!(config.storage.connection_string, "AccountName=acme;AccountKey=c2VjcmV0;");
            Ok(())
        });
    }

    #[test]
    fn identical_containers_fail_validation() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
storage:
  image_container: images
  thumbnail_container: images
"#,
            )?;

            assert!(Config::load(&args_for("test.yaml")).is_err());
            Ok(())
        });
    }

    #[test]
    fn unknown_fields_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "no_such_option: true\n")?;
            assert!(Config::load(&args_for("test.yaml")).is_err());
            Ok(())
        });
    }
}
