use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub reaper: ReaperConfig,
    /// Maximum assembled size of one upload in bytes
    pub max_file_size: u64,
    /// Maximum request body for a single chunk in bytes
    pub max_chunk_size: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Absolute base URL used in preview and Open-Graph links
    pub site_url: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Object root for assembled files
    pub upload_dir: String,
    /// Directory for in-flight chunks
    pub chunk_dir: String,
    /// JSON snapshot of the metadata store
    pub metadata_file: String,
}

#[derive(Debug, Clone)]
pub struct ReaperConfig {
    pub interval_seconds: u64,
    /// Idle time after which an unfinished upload session is dropped
    pub session_ttl_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            site_url: "http://localhost:8000".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: "./uploads".to_string(),
            chunk_dir: "./chunks".to_string(),
            metadata_file: "./metadata.json".to_string(),
        }
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 3600,
            session_ttl_seconds: 24 * 60 * 60,
        }
    }
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_seconds as i64)
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let server_defaults = ServerConfig::default();
        let storage_defaults = StorageConfig::default();
        let reaper_defaults = ReaperConfig::default();

        let config = Config {
            server: ServerConfig {
                bind_address: env_or("BIND_ADDRESS", server_defaults.bind_address),
                site_url: env_or("SITE_URL", server_defaults.site_url)
                    .trim_end_matches('/')
                    .to_string(),
            },
            storage: StorageConfig {
                upload_dir: env_or("UPLOAD_DIR", storage_defaults.upload_dir),
                chunk_dir: env_or("CHUNK_DIR", storage_defaults.chunk_dir),
                metadata_file: env_or("METADATA_FILE", storage_defaults.metadata_file),
            },
            reaper: ReaperConfig {
                interval_seconds: env_parse(
                    "REAPER_INTERVAL_SECONDS",
                    reaper_defaults.interval_seconds,
                ),
                session_ttl_seconds: env_parse(
                    "SESSION_TTL_SECONDS",
                    reaper_defaults.session_ttl_seconds,
                ),
            },
            max_file_size: env_parse("MAX_FILE_SIZE", 1024 * 1024 * 1024), // 1GB
            max_chunk_size: env_parse("MAX_CHUNK_SIZE", 100 * 1024 * 1024), // 100MB
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.site_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "SITE_URL cannot be empty".to_string(),
            ));
        }

        if self.reaper.interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "REAPER_INTERVAL_SECONDS must be greater than 0".to_string(),
            ));
        }

        if self.max_file_size == 0 || self.max_chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_FILE_SIZE and MAX_CHUNK_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.storage.upload_dir == self.storage.chunk_dir {
            return Err(ConfigError::ValidationError(
                "UPLOAD_DIR and CHUNK_DIR must be different directories".to_string(),
            ));
        }

        for (name, dir) in [
            ("UPLOAD_DIR", &self.storage.upload_dir),
            ("CHUNK_DIR", &self.storage.chunk_dir),
        ] {
            if is_within(&self.storage.metadata_file, dir) {
                return Err(ConfigError::ValidationError(format!(
                    "METADATA_FILE must not be inside {name}; the reaper sweeps that directory"
                )));
            }
        }

        if self.max_chunk_size > self.max_file_size {
            tracing::warn!(
                "MAX_CHUNK_SIZE ({}) exceeds MAX_FILE_SIZE ({}); oversized chunks will be rejected",
                self.max_chunk_size,
                self.max_file_size
            );
        }

        Ok(())
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Lexical check that `path` lies under `dir`, ignoring `.` components.
fn is_within(path: &str, dir: &str) -> bool {
    fn normalize(p: &str) -> PathBuf {
        Path::new(p)
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    }
    normalize(path).starts_with(normalize(dir))
}
