//! Configuration management for surfacemap
//!
//! Loads the TOML configuration file, applies `SURFACEMAP_*` environment
//! overrides and validates the result before anything touches the database.

use crate::error::{Result, SurfaceError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub consolidation: ConsolidationConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub pool_size: u32,
    /// SQLite busy timeout, e.g. "5s"
    pub busy_timeout: String,
}

/// Consolidation engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Upper bound for the CIDR containment stage, e.g. "30s"
    pub containment_timeout: String,
    /// ROI score given to crawl-discovered web servers
    pub default_roi_score: i64,
    /// Status value upstream IP/port scans record on success
    pub successful_scan_status: String,
    /// How long a run keeps retrying while other writers hold the database, e.g. "5m"
    #[serde(default = "default_write_lock_wait")]
    pub write_lock_wait: String,
}

fn default_write_lock_wait() -> String {
    "5m".to_string()
}

impl ConsolidationConfig {
    pub fn containment_timeout(&self) -> Result<Duration> {
        parse_duration(&self.containment_timeout).ok_or_else(|| {
            SurfaceError::InvalidConfigValue {
                path: "consolidation.containment_timeout".to_string(),
                message: format!("Invalid duration format: {}", self.containment_timeout),
            }
        })
    }

    pub fn write_lock_wait(&self) -> Result<Duration> {
        parse_duration(&self.write_lock_wait).ok_or_else(|| SurfaceError::InvalidConfigValue {
            path: "consolidation.write_lock_wait".to_string(),
            message: format!("Invalid duration format: {}", self.write_lock_wait),
        })
    }
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            containment_timeout: "30s".to_string(),
            default_roi_score: 50,
            successful_scan_status: "success".to_string(),
            write_lock_wait: default_write_lock_wait(),
        }
    }
}

impl StorageConfig {
    pub fn busy_timeout(&self) -> Result<Duration> {
        parse_duration(&self.busy_timeout).ok_or_else(|| SurfaceError::InvalidConfigValue {
            path: "storage.busy_timeout".to_string(),
            message: format!("Invalid duration format: {}", self.busy_timeout),
        })
    }
}

/// Parse duration strings like "500ms", "5s", "10m", "1h" or a bare number of seconds
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: u64 = digits.parse().ok()?;

    match unit {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        "h" => Some(Duration::from_secs(value * 3600)),
        _ => None,
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SurfaceError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| SurfaceError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| SurfaceError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: SURFACEMAP_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("SURFACEMAP_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATABASE_PATH" => {
                self.storage.database_path = PathBuf::from(value);
            }
            "STORAGE__POOL_SIZE" => {
                self.storage.pool_size =
                    value.parse().map_err(|_| SurfaceError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as integer", value),
                    })?;
            }
            "STORAGE__BUSY_TIMEOUT" => {
                self.storage.busy_timeout = value.to_string();
            }
            "CONSOLIDATION__CONTAINMENT_TIMEOUT" => {
                self.consolidation.containment_timeout = value.to_string();
            }
            "CONSOLIDATION__SUCCESSFUL_SCAN_STATUS" => {
                self.consolidation.successful_scan_status = value.to_string();
            }
            "CONSOLIDATION__WRITE_LOCK_WAIT" => {
                self.consolidation.write_lock_wait = value.to_string();
            }
            "CONSOLIDATION__DEFAULT_ROI_SCORE" => {
                self.consolidation.default_roi_score =
                    value.parse().map_err(|_| SurfaceError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as integer", value),
                    })?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SurfaceError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("surfacemap").join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                database_path: PathBuf::from("~/.surfacemap/surface.sqlite"),
                pool_size: 8,
                busy_timeout: "5s".to_string(),
            },
            consolidation: ConsolidationConfig::default(),
        }
    }
}
