//! Configuration module for ScribeVault.

use serde::Deserialize;
use std::path::Path;

use crate::{Result, VaultError};

/// Web API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// Host address to bind.
    #[serde(default = "default_web_host")]
    pub host: String,
    /// Port number for the API.
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Shared secret used to verify bearer tokens (HS256).
    #[serde(default)]
    pub jwt_secret: String,
}

fn default_web_host() -> String {
    "0.0.0.0".to_string()
}

fn default_web_port() -> u16 {
    8080
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            cors_origins: vec![],
            jwt_secret: String::new(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/scribevault.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// File storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    /// Directory for assembled files.
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    /// Directory for staged chunks.
    #[serde(default = "default_staging_path")]
    pub staging_path: String,
    /// Maximum size of one chunk in bytes.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size_bytes: u64,
    /// Maximum size of an assembled upload in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
    /// Maximum number of chunks in one upload.
    #[serde(default = "default_max_total_chunks")]
    pub max_total_chunks: u32,
}

fn default_storage_path() -> String {
    "data/files".to_string()
}

fn default_staging_path() -> String {
    "data/staging".to_string()
}

fn default_max_chunk_size() -> u64 {
    4 * 1024 * 1024 // 4 MiB
}

fn default_max_upload_size() -> u64 {
    2048
}

fn default_max_total_chunks() -> u32 {
    10_000
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            staging_path: default_staging_path(),
            max_chunk_size_bytes: default_max_chunk_size(),
            max_upload_size_mb: default_max_upload_size(),
            max_total_chunks: default_max_total_chunks(),
        }
    }
}

impl FilesConfig {
    /// Maximum assembled upload size in bytes.
    pub fn max_upload_size_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }
}

/// Upload session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadsConfig {
    /// Sessions idle for longer than this are discarded.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    /// How often the stale-session sweep runs.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_session_ttl() -> u64 {
    86400 // 24 hours
}

fn default_sweep_interval() -> u64 {
    3600 // 1 hour
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// URL ingestion configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Connection timeout in seconds.
    #[serde(default = "default_ingest_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_ingest_total_timeout")]
    pub total_timeout_secs: u64,
    /// Maximum downloaded size in megabytes.
    #[serde(default = "default_ingest_max_size")]
    pub max_download_size_mb: u64,
    /// Maximum number of redirects.
    #[serde(default = "default_ingest_max_redirects")]
    pub max_redirects: usize,
    /// Hosts whose links are stored by reference instead of downloaded.
    #[serde(default = "default_embeddable_hosts")]
    pub embeddable_hosts: Vec<String>,
    /// Allow fetching from loopback, private and internal hosts.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

fn default_ingest_connect_timeout() -> u64 {
    10
}

fn default_ingest_total_timeout() -> u64 {
    120
}

fn default_ingest_max_size() -> u64 {
    512
}

fn default_ingest_max_redirects() -> usize {
    5
}

fn default_embeddable_hosts() -> Vec<String> {
    [
        "youtube.com",
        "youtu.be",
        "vimeo.com",
        "dailymotion.com",
        "soundcloud.com",
        "loom.com",
        "wistia.com",
        "twitch.tv",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_ingest_connect_timeout(),
            total_timeout_secs: default_ingest_total_timeout(),
            max_download_size_mb: default_ingest_max_size(),
            max_redirects: default_ingest_max_redirects(),
            embeddable_hosts: default_embeddable_hosts(),
            allow_private_hosts: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/scribevault.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Web API configuration.
    #[serde(default)]
    pub web: WebConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// File storage configuration.
    #[serde(default)]
    pub files: FilesConfig,
    /// Upload session configuration.
    #[serde(default)]
    pub uploads: UploadsConfig,
    /// URL ingestion configuration.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(VaultError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| VaultError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `SCRIBEVAULT_JWT_SECRET`: Override the JWT secret key
    pub fn apply_env_overrides(&mut self) {
        if let Ok(jwt_secret) = std::env::var("SCRIBEVAULT_JWT_SECRET") {
            if !jwt_secret.is_empty() {
                self.web.jwt_secret = jwt_secret;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.web.jwt_secret.is_empty() {
            return Err(VaultError::Config(
                "jwt_secret is not set. \
                 Set it in config.toml or via SCRIBEVAULT_JWT_SECRET environment variable."
                    .to_string(),
            ));
        }
        if self.files.max_chunk_size_bytes == 0 {
            return Err(VaultError::Config(
                "files.max_chunk_size_bytes must be greater than 0".to_string(),
            ));
        }
        if self.files.max_total_chunks == 0 {
            return Err(VaultError::Config(
                "files.max_total_chunks must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
