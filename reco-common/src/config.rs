//! Configuration loading and root folder resolution
//!
//! Priority order for every setting:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variable naming the root folder
pub const ENV_ROOT_FOLDER: &str = "RECO_ROOT_FOLDER";
/// Environment variable naming the HTTP port
pub const ENV_PORT: &str = "RECO_PORT";
/// Environment variable naming the bind address
pub const ENV_BIND_ADDRESS: &str = "RECO_BIND_ADDRESS";
/// Environment variable naming an explicit config file
pub const ENV_CONFIG: &str = "RECO_CONFIG";

/// Service configuration as read from `reco-ingest.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub bind_address: String,
    pub port: u16,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    pub blob: BlobConfig,
    pub pipeline: PipelineSettings,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_address: "127.0.0.1".to_string(),
            port: 5740,
            logging: LoggingConfig::default(),
            store: StoreConfig::default(),
            blob: BlobConfig::default(),
            pipeline: PipelineSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Total retry budget for lock contention on SQLite writes
    pub max_lock_wait_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            max_lock_wait_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    Local,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    pub backend: BlobBackend,
    /// Directory holding `<bucket>/<key>` objects; defaults to `<root_folder>/blobs`
    pub local_root: Option<PathBuf>,
    pub http_base_url: Option<String>,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            backend: BlobBackend::Local,
            local_root: None,
            http_base_url: None,
        }
    }
}

/// Tuning knobs for file-mode ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Worker count; 0 means one worker per CPU
    pub workers: usize,
    /// A worker flushes once its pending writes exceed this count
    pub flush_threshold: usize,
    /// A worker flushes when this long has passed since its last flush
    pub flush_interval_secs: u64,
    /// Records buffered between the reader and the workers
    pub record_queue_capacity: usize,
    /// Line errors kept per batch job
    pub max_line_errors: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: 0,
            flush_threshold: 10_000,
            flush_interval_secs: 10,
            record_queue_capacity: 1_024,
            max_line_errors: 50,
        }
    }
}

impl TomlConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, `RECO_CONFIG`, or the per-user default path.
    ///
    /// A missing default file is not an error; compiled defaults are used.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(path) = std::env::var(ENV_CONFIG) {
            return Self::load(Path::new(&path));
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                tracing::info!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Apply `RECO_PORT` / `RECO_BIND_ADDRESS` on top of file values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var(ENV_PORT) {
            self.port = port
                .parse()
                .map_err(|_| Error::Config(format!("{} is not a valid port: {}", ENV_PORT, port)))?;
        }
        if let Ok(address) = std::env::var(ENV_BIND_ADDRESS) {
            self.bind_address = address;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.flush_threshold == 0 {
            return Err(Error::Config("pipeline.flush_threshold must be > 0".to_string()));
        }
        if self.pipeline.flush_interval_secs == 0 {
            return Err(Error::Config("pipeline.flush_interval_secs must be > 0".to_string()));
        }
        if self.pipeline.record_queue_capacity == 0 {
            return Err(Error::Config(
                "pipeline.record_queue_capacity must be > 0".to_string(),
            ));
        }
        if self.blob.backend == BlobBackend::Http && self.blob.http_base_url.is_none() {
            return Err(Error::Config(
                "blob.http_base_url is required when blob.backend = \"http\"".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-user config file location (`~/.config/reco/reco-ingest.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("reco").join("reco-ingest.toml"))
}

/// Root folder resolution: CLI → `RECO_ROOT_FOLDER` → TOML → OS default
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ENV_ROOT_FOLDER) {
        return PathBuf::from(path);
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    get_default_root_folder()
}

/// OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("reco"))
        .unwrap_or_else(|| PathBuf::from("./reco_data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = TomlConfig::parse("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.pipeline.flush_threshold, 10_000);
        assert_eq!(config.pipeline.flush_interval_secs, 10);
        assert_eq!(config.pipeline.max_line_errors, 50);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let config = TomlConfig::parse(
            r#"
            port = 6000

            [pipeline]
            workers = 3

            [store]
            backend = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 6000);
        assert_eq!(config.pipeline.workers, 3);
        assert_eq!(config.pipeline.flush_threshold, 10_000);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.max_lock_wait_ms, 5000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            TomlConfig::parse("[pipeline]\nflush_threshold = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            TomlConfig::parse("[blob]\nbackend = \"http\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(TomlConfig::parse("port = \"x\""), Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_root_folder_priority() {
        let config = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            ..TomlConfig::default()
        };

        std::env::remove_var(ENV_ROOT_FOLDER);
        assert_eq!(
            resolve_root_folder(Some(Path::new("/from/cli")), &config),
            PathBuf::from("/from/cli")
        );
        assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/from/toml"));

        std::env::set_var(ENV_ROOT_FOLDER, "/from/env");
        assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/from/env"));
        std::env::remove_var(ENV_ROOT_FOLDER);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        let mut config = TomlConfig::default();

        std::env::set_var(ENV_PORT, "7001");
        std::env::set_var(ENV_BIND_ADDRESS, "0.0.0.0");
        config.apply_env_overrides().unwrap();
        std::env::remove_var(ENV_PORT);
        std::env::remove_var(ENV_BIND_ADDRESS);

        assert_eq!(config.port, 7001);
        assert_eq!(config.bind_address, "0.0.0.0");
    }
}
