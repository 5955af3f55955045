use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("filmroom.db")
}

/// Blob storage configuration (filesystem-backed store).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory under which blobs are written.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Base URL used when handing out signed URLs.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Secret used to sign URLs.
    #[serde(default = "default_signing_secret")]
    pub signing_secret: String,
    /// Lifetime of a signed URL in seconds.
    #[serde(default = "default_url_ttl")]
    pub url_ttl_secs: u64,
    /// Write buffer size for streamed puts.
    #[serde(default = "default_chunk_size")]
    pub chunk_size_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            public_base_url: default_public_base_url(),
            signing_secret: default_signing_secret(),
            url_ttl_secs: default_url_ttl(),
            chunk_size_bytes: default_chunk_size(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("media")
}

fn default_public_base_url() -> String {
    "http://localhost:8080/media".to_string()
}

fn default_signing_secret() -> String {
    "change-me".to_string()
}

fn default_url_ttl() -> u64 {
    3600
}

fn default_chunk_size() -> usize {
    256 * 1024
}

/// Transcode job service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeConfig {
    /// Base URL of the transcode job service. When unset no jobs are submitted.
    #[serde(default)]
    pub url: Option<String>,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_transcode_timeout")]
    pub timeout_secs: u32,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_transcode_timeout(),
        }
    }
}

fn default_transcode_timeout() -> u32 {
    30
}

/// Upload coordinator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Total transfer attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff before the first retry (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    /// Upper bound for the backoff (milliseconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Per-attempt transfer timeout in seconds.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            attempt_timeout_secs: default_attempt_timeout(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    5000
}

fn default_attempt_timeout() -> u64 {
    3600
}

/// Processing status tracker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
    /// Interval between job status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Wall-clock ceiling for processing before the asset is failed.
    #[serde(default = "default_max_processing")]
    pub max_processing_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_processing_secs: default_max_processing(),
        }
    }
}

fn default_poll_interval() -> u64 {
    10
}

fn default_max_processing() -> u64 {
    30 * 60
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: SanitizedStorageConfig,
    pub transcode: TranscodeConfig,
    pub upload: UploadConfig,
    pub tracker: TrackerConfig,
}

/// Storage config with the signing secret hidden.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    pub root: PathBuf,
    pub public_base_url: String,
    pub signing_secret_configured: bool,
    pub url_ttl_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            storage: SanitizedStorageConfig {
                root: config.storage.root.clone(),
                public_base_url: config.storage.public_base_url.clone(),
                signing_secret_configured: !config.storage.signing_secret.is_empty(),
                url_ttl_secs: config.storage.url_ttl_secs,
            },
            transcode: config.transcode.clone(),
            upload: config.upload.clone(),
            tracker: config.tracker.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.upload.max_attempts, 3);
        assert_eq!(config.tracker.poll_interval_secs, 10);
        assert_eq!(config.tracker.max_processing_secs, 1800);
        assert!(config.transcode.url.is_none());
    }

    #[test]
    fn test_deserialize_sections() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000

[storage]
root = "/srv/film"
signing_secret = "s3cret"

[transcode]
url = "http://transcoder:7000"

[tracker]
poll_interval_secs = 5
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.storage.root, PathBuf::from("/srv/film"));
        assert_eq!(config.storage.url_ttl_secs, 3600);
        assert_eq!(
            config.transcode.url.as_deref(),
            Some("http://transcoder:7000")
        );
        assert_eq!(config.tracker.poll_interval_secs, 5);
        assert_eq!(config.tracker.max_processing_secs, 1800);
    }

    #[test]
    fn test_sanitized_config_hides_secret() {
        let mut config = Config::default();
        config.storage.signing_secret = "super-secret".to_string();

        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.storage.signing_secret_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("super-secret"));
    }
}
