//! Pipeline configuration
//!
//! Read from the shared TOML file (`[pipeline]` and `[weights]` tables),
//! then overridden by environment variables:
//!
//! | Variable           | Field          |
//! |--------------------|----------------|
//! | `QRA_CHUNK_SIZE`   | `chunk_size`   |
//! | `QRA_WORKER_COUNT` | `worker_count` |
//! | `QRA_MAX_RETRIES`  | `max_retries`  |
//!
//! Relative file paths are resolved against the root folder.

use crate::consensus::{RetryPolicy, SourceWeights};
use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const CHUNK_SIZE_ENV: &str = "QRA_CHUNK_SIZE";
pub const WORKER_COUNT_ENV: &str = "QRA_WORKER_COUNT";
pub const MAX_RETRIES_ENV: &str = "QRA_MAX_RETRIES";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub database_file: PathBuf,
    pub result_cache_file: PathBuf,
    pub location_cache_file: PathBuf,
    /// Optional known-word table for the database-backed stemmer
    pub known_roots_file: Option<PathBuf>,

    /// Tokens per root extraction chunk
    pub chunk_size: usize,
    /// Verses per tokenization chunk
    pub tokenize_chunk_size: usize,
    pub worker_count: usize,
    pub chunk_timeout_secs: u64,
    /// Tokens per committed transaction inside a chunk
    pub commit_batch_size: usize,

    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub min_sources_for_verification: usize,
    pub max_references: usize,

    pub enable_online_corpus: bool,
    pub online_corpus_url: String,
    pub enable_dictionaries: bool,
    pub http_timeout_secs: u64,

    pub db_max_lock_wait_ms: u64,

    /// Filled from the top-level `[weights]` table
    #[serde(skip)]
    pub weights: SourceWeights,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_file: PathBuf::from("qra.db"),
            result_cache_file: PathBuf::from("result_cache.json"),
            location_cache_file: PathBuf::from("location_cache.json"),
            known_roots_file: None,
            chunk_size: 50,
            tokenize_chunk_size: 20,
            worker_count: 4,
            chunk_timeout_secs: 600,
            commit_batch_size: 10,
            max_retries: 3,
            retry_backoff_ms: 1000,
            min_sources_for_verification: 2,
            max_references: 100,
            enable_online_corpus: true,
            online_corpus_url: crate::extractors::online_corpus::DEFAULT_BASE_URL.to_string(),
            enable_dictionaries: false,
            http_timeout_secs: 30,
            db_max_lock_wait_ms: qra_common::db::DEFAULT_BUSY_TIMEOUT_MS,
            weights: SourceWeights::default(),
        }
    }
}

/// Layout of the shared config file as seen by this crate
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    pipeline: PipelineConfig,
    #[serde(default)]
    weights: SourceWeights,
}

impl PipelineConfig {
    /// Parse the `[pipeline]` and `[weights]` tables of a TOML document
    pub fn from_toml_str(content: &str) -> PipelineResult<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("Parse TOML failed: {}", e)))?;
        let mut config = file.pipeline;
        config.weights = file.weights;
        Ok(config)
    }

    /// Load from `path` (defaults when `None`), apply env overrides, validate
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    PipelineError::Config(format!("Read {} failed: {}", path.display(), e))
                })?;
                info!("Loaded pipeline config from {}", path.display());
                Self::from_toml_str(&content)?
            }
            None => {
                debug!("No config file, using pipeline defaults");
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> PipelineResult<()> {
        if let Some(value) = env_number::<usize>(CHUNK_SIZE_ENV)? {
            self.chunk_size = value;
        }
        if let Some(value) = env_number::<usize>(WORKER_COUNT_ENV)? {
            self.worker_count = value;
        }
        if let Some(value) = env_number::<u32>(MAX_RETRIES_ENV)? {
            self.max_retries = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.chunk_size == 0 || self.tokenize_chunk_size == 0 {
            return Err(PipelineError::Config("chunk sizes must be at least 1".to_string()));
        }
        if self.commit_batch_size == 0 {
            return Err(PipelineError::Config("commit_batch_size must be at least 1".to_string()));
        }
        if self.worker_count == 0 {
            return Err(PipelineError::Config("worker_count must be at least 1".to_string()));
        }
        if self.max_retries == 0 {
            return Err(PipelineError::Config("max_retries must be at least 1".to_string()));
        }
        if self.max_references == 0 {
            return Err(PipelineError::Config("max_references must be at least 1".to_string()));
        }
        if self.chunk_timeout_secs == 0 {
            return Err(PipelineError::Config("chunk_timeout_secs must be at least 1".to_string()));
        }
        self.weights.validate()
    }

    /// `file` joined to `root` unless already absolute
    pub fn resolve(root: &Path, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            root.join(file)
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> PipelineResult<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| PipelineError::Config(format!("{} is not a valid number: {}", name, value))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        std::env::remove_var(CHUNK_SIZE_ENV);
        std::env::remove_var(WORKER_COUNT_ENV);
        std::env::remove_var(MAX_RETRIES_ENV);
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.tokenize_chunk_size, 20);
        assert_eq!(config.chunk_timeout_secs, 600);
        assert_eq!(config.weights.get("qurancorpus"), 10.0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let content = r#"
root_folder = "/srv/qra"

[logging]
level = "debug"

[pipeline]
chunk_size = 25
enable_dictionaries = true

[weights]
almaany = 6.0
"#;
        let config = PipelineConfig::from_toml_str(content).unwrap();
        assert_eq!(config.chunk_size, 25);
        assert!(config.enable_dictionaries);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.weights.get("almaany"), 6.0);
        assert_eq!(config.weights.get("baheth"), 5.0);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = PipelineConfig::from_toml_str("[pipeline]\nchunk_size = \"many\"");
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_validation_rejects_zeros() {
        let mut config = PipelineConfig::default();
        config.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.worker_count = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.max_retries = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.chunk_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_validation_rejects_unusable_weights() {
        for table in ["pyarabic = inf", "pyarabic = nan", "alkhalil = -3.0", "almaany = -inf"] {
            let config = PipelineConfig::from_toml_str(&format!("[weights]\n{}", table)).unwrap();
            assert!(
                matches!(config.validate(), Err(PipelineError::Config(_))),
                "accepted [weights] {}",
                table
            );
        }

        let config = PipelineConfig::from_toml_str("[weights]\nalkhalil = 0.0").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_rejects_infinite_weight() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[weights]\npyarabic = inf\n").unwrap();

        assert!(matches!(PipelineConfig::load(Some(&path)), Err(PipelineError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var(CHUNK_SIZE_ENV, "7");
        std::env::set_var(WORKER_COUNT_ENV, "2");

        let config = PipelineConfig::load(None).unwrap();
        assert_eq!(config.chunk_size, 7);
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.max_retries, 3);

        std::env::set_var(MAX_RETRIES_ENV, "lots");
        assert!(PipelineConfig::load(None).is_err());

        std::env::set_var(MAX_RETRIES_ENV, "0");
        assert!(PipelineConfig::load(None).is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pipeline]\nworker_count = 8\n").unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.worker_count, 8);

        assert!(PipelineConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_resolve_paths() {
        let root = Path::new("/data/qra");
        assert_eq!(
            PipelineConfig::resolve(root, Path::new("qra.db")),
            PathBuf::from("/data/qra/qra.db")
        );
        assert_eq!(
            PipelineConfig::resolve(root, Path::new("/tmp/x.json")),
            PathBuf::from("/tmp/x.json")
        );
    }
}
