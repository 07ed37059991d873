//! Configuration module for environment variable parsing.

use std::env;
use std::str::FromStr;

use tracing::warn;

use crate::kms::{DEFAULT_ENDPOINT, DEFAULT_METADATA_HOST};

/// What the webhook does with a received event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationMode {
    /// Extract the crypto key and set its rotation period
    #[default]
    Update,
    /// Pretty-print the payload and stop
    LogOnly,
}

impl FromStr for RotationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "update" => Ok(RotationMode::Update),
            "log-only" | "log_only" | "log" => Ok(RotationMode::LogOnly),
            other => Err(format!("unknown rotation mode: {other}")),
        }
    }
}

/// Log output style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    /// Read `LOG_FORMAT` without logging.
    ///
    /// Runs before the subscriber exists; an invalid value is reported later
    /// by `Config::from_env`.
    pub fn from_env() -> Self {
        env::var("LOG_FORMAT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Whether events trigger a KMS update or are only logged
    pub rotation_mode: RotationMode,

    /// Log output style
    pub log_format: LogFormat,

    /// Base URL of the Cloud KMS API
    pub kms_endpoint: String,

    /// Static bearer token; the metadata server is used when unset
    pub kms_access_token: Option<String>,

    /// Host of the instance metadata server
    pub metadata_host: String,

    /// Timeout for outbound KMS and metadata requests in milliseconds
    pub kms_request_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            rotation_mode: RotationMode::Update,
            log_format: LogFormat::Json,
            kms_endpoint: DEFAULT_ENDPOINT.to_string(),
            kms_access_token: None,
            metadata_host: DEFAULT_METADATA_HOST.to_string(),
            kms_request_timeout_ms: 30_000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            port: parse_or("PORT", defaults.port),

            rotation_mode: parse_or("ROTATION_MODE", defaults.rotation_mode),

            log_format: parse_or("LOG_FORMAT", defaults.log_format),

            kms_endpoint: non_empty("KMS_ENDPOINT").unwrap_or(defaults.kms_endpoint),

            kms_access_token: non_empty("KMS_ACCESS_TOKEN"),

            metadata_host: non_empty("GCE_METADATA_HOST").unwrap_or(defaults.metadata_host),

            kms_request_timeout_ms: parse_or(
                "KMS_REQUEST_TIMEOUT_MS",
                defaults.kms_request_timeout_ms,
            ),
        }
    }
}

/// Parse an environment variable, falling back to `default` when it is unset
/// or invalid.
fn parse_or<T: FromStr>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => return default,
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

/// Read an environment variable, treating blank values as unset.
fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
