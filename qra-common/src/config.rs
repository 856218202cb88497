//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`QRA_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "QRA_ROOT_FOLDER";

/// Environment variable naming an explicit config file
pub const CONFIG_FILE_ENV: &str = "QRA_CONFIG";

/// Bootstrap configuration loaded from TOML
///
/// Unknown tables are ignored here; the pipeline crate reads its own
/// `[pipeline]` section from the same file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database and cache files
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolve the root folder following the priority order above
pub fn resolve_root_folder(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        debug!("Root folder from command line: {}", path.display());
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            debug!("Root folder from {}: {}", ROOT_FOLDER_ENV, path);
            return PathBuf::from(path);
        }
    }

    if let Some(config_path) = config_file_path() {
        match load_toml_config(&config_path) {
            Ok(config) => {
                if let Some(root) = config.root_folder {
                    debug!("Root folder from {}: {}", config_path.display(), root.display());
                    return root;
                }
            }
            Err(e) => warn!("Ignoring unreadable config file {}: {}", config_path.display(), e),
        }
    }

    default_root_folder()
}

/// Locate the TOML config file, if one exists
///
/// `QRA_CONFIG` wins; otherwise `<config_dir>/qra/config.toml`, then
/// `/etc/qra/config.toml` on Linux.
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_FILE_ENV) {
        let path = PathBuf::from(explicit);
        if path.exists() {
            return Some(path);
        }
        warn!("{} points at a missing file: {}", CONFIG_FILE_ENV, path.display());
    }

    let user_config = dirs::config_dir().map(|d| d.join("qra").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/qra/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("qra"))
        .unwrap_or_else(|| PathBuf::from("./qra_data"))
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_cli_argument_wins() {
        std::env::set_var(ROOT_FOLDER_ENV, "/from/env");
        let resolved = resolve_root_folder(Some(Path::new("/from/cli")));
        std::env::remove_var(ROOT_FOLDER_ENV);

        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }

    #[test]
    #[serial]
    fn test_env_var_beats_default() {
        std::env::set_var(ROOT_FOLDER_ENV, "/from/env");
        let resolved = resolve_root_folder(None);
        std::env::remove_var(ROOT_FOLDER_ENV);

        assert_eq!(resolved, PathBuf::from("/from/env"));
    }

    #[test]
    #[serial]
    fn test_toml_root_folder_used() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "root_folder = \"/from/toml\"\n").unwrap();

        std::env::remove_var(ROOT_FOLDER_ENV);
        std::env::set_var(CONFIG_FILE_ENV, &config_path);
        let resolved = resolve_root_folder(None);
        std::env::remove_var(CONFIG_FILE_ENV);

        assert_eq!(resolved, PathBuf::from("/from/toml"));
    }

    #[test]
    fn test_load_toml_keeps_logging() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "root_folder = \"/data/qra\"\n\n[logging]\nlevel = \"debug\"\n").unwrap();

        let loaded = load_toml_config(&path).unwrap();

        assert_eq!(loaded.root_folder, Some(PathBuf::from("/data/qra")));
        assert_eq!(loaded.logging.level, "debug");
        assert!(loaded.logging.file.is_none());

        assert!(load_toml_config(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_missing_logging_section_defaults_to_info() {
        let config: TomlConfig = toml::from_str("root_folder = \"/x\"").unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
    }
}
