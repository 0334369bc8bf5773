//! Configuration management for CMR services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Object storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// PDF export configuration
    #[serde(default)]
    pub export: ExportConfig,

    /// Attachment limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum accepted request body in bytes (photos arrive base64-encoded)
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply pending SQL migrations at startup
    #[serde(default = "default_enabled")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Base URL of the storage REST API, e.g. https://project.example/storage/v1
    #[serde(default = "default_storage_url")]
    pub url: String,

    /// Service key sent as bearer token
    pub service_key: Option<String>,

    /// Bucket for general document photos
    #[serde(default = "default_photos_bucket")]
    pub photos_bucket: String,

    /// Bucket for signature images
    #[serde(default = "default_signatures_bucket")]
    pub signatures_bucket: String,

    /// Bucket for reserve photos
    #[serde(default = "default_reserves_bucket")]
    pub reserves_bucket: String,

    /// Lifetime of signed URLs in seconds
    #[serde(default = "default_signed_url_ttl")]
    pub signed_url_ttl_secs: u64,

    /// Request timeout in seconds
    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// JWT secret for token validation
    pub jwt_secret: Option<String>,

    /// JWT expiration in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    /// Page width in PDF points
    #[serde(default = "default_page_width")]
    pub page_width: f32,

    /// Page height in PDF points
    #[serde(default = "default_page_height")]
    pub page_height: f32,

    /// Margin applied on all four sides, in points
    #[serde(default = "default_margin")]
    pub margin: f32,

    /// IANA timezone used for every printed date
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Currency printed when a record has none
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// Legal notice stamped in every page footer
    #[serde(default = "default_legal_notice")]
    pub legal_notice: String,

    /// Timeout for fetching a single embedded image
    #[serde(default = "default_image_timeout")]
    pub image_timeout_secs: u64,

    /// Images are downscaled so their longest edge fits this many pixels
    #[serde(default = "default_image_max_edge")]
    pub image_max_edge_px: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// General photos per document
    #[serde(default = "default_max_photos")]
    pub max_photos_per_document: usize,

    /// Maximum decoded upload size in bytes
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_enabled")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_body() -> usize { 16 * 1024 * 1024 }
fn default_database_url() -> String { "postgres://localhost/cmr".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_storage_url() -> String { "http://localhost:5000/storage/v1".to_string() }
fn default_photos_bucket() -> String { "cmr-photos".to_string() }
fn default_signatures_bucket() -> String { "cmr-signatures".to_string() }
fn default_reserves_bucket() -> String { "cmr-reserves".to_string() }
fn default_signed_url_ttl() -> u64 { 3600 }
fn default_storage_timeout() -> u64 { 30 }
fn default_jwt_expiration() -> u64 { 3600 }
fn default_page_width() -> f32 { 595.28 }
fn default_page_height() -> f32 { 841.89 }
fn default_margin() -> f32 { 40.0 }
fn default_timezone() -> String { "Europe/Paris".to_string() }
fn default_currency() -> String { "EUR".to_string() }
fn default_legal_notice() -> String {
    "Lettre de voiture internationale - Convention CMR (Genève, 19 mai 1956)".to_string()
}
fn default_image_timeout() -> u64 { 10 }
fn default_image_max_edge() -> u32 { 1024 }
fn default_max_photos() -> usize { 3 }
fn default_max_upload() -> usize { 8 * 1024 * 1024 }
fn default_log_level() -> String { "info".to_string() }
fn default_enabled() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "cmr-gateway".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get signed URL lifetime as Duration
    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.storage.signed_url_ttl_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_body_bytes: default_max_body(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            run_migrations: default_enabled(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: default_storage_url(),
            service_key: None,
            photos_bucket: default_photos_bucket(),
            signatures_bucket: default_signatures_bucket(),
            reserves_bucket: default_reserves_bucket(),
            signed_url_ttl_secs: default_signed_url_ttl(),
            timeout_secs: default_storage_timeout(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_expiration_secs: default_jwt_expiration(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page_width: default_page_width(),
            page_height: default_page_height(),
            margin: default_margin(),
            timezone: default_timezone(),
            default_currency: default_currency(),
            legal_notice: default_legal_notice(),
            image_timeout_secs: default_image_timeout(),
            image_max_edge_px: default_image_max_edge(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_photos_per_document: default_max_photos(),
            max_upload_bytes: default_max_upload(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_enabled(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
            export: ExportConfig::default(),
            limits: LimitsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.limits.max_photos_per_document, 3);
        assert_eq!(config.export.default_currency, "EUR");
        assert_eq!(config.export.timezone, "Europe/Paris");
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/cmr");
    }

    #[test]
    fn test_signed_url_ttl() {
        let config = AppConfig::default();
        assert_eq!(config.signed_url_ttl(), Duration::from_secs(3600));
    }
}
