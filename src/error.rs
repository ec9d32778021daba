use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for surfacemap
#[derive(Error, Debug)]
pub enum SurfaceError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A natural key that the asset store refuses to accept
    #[error("Invalid {asset_type} identifier '{value}': {reason}")]
    InvalidIdentifier {
        asset_type: String,
        value: String,
        reason: String,
    },

    /// A consolidation stage failed and the run was aborted
    #[error("Consolidation stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<SurfaceError>,
    },

    /// A stage exceeded its operation timeout
    #[error("Stage '{stage}' timed out after {elapsed:?}")]
    Timeout { stage: String, elapsed: Duration },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SurfaceError {
    /// Wrap an error with the name of the consolidation stage it aborted
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        SurfaceError::Stage {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Build an identifier rejection for the given asset type
    pub fn invalid_identifier(
        asset_type: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        SurfaceError::InvalidIdentifier {
            asset_type: asset_type.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// True when another connection held SQLite's write lock past the busy timeout
    pub fn is_busy(&self) -> bool {
        match self {
            SurfaceError::Database(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::DatabaseBusy
            }
            _ => false,
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for surfacemap operations
pub type Result<T> = std::result::Result<T, SurfaceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_wrapping_keeps_source() {
        let err = SurfaceError::invalid_identifier("ip_address", "10.0.0.300", "bad octet")
            .in_stage("resolve_ip_addresses");

        let message = err.to_string();
        assert!(message.contains("resolve_ip_addresses"));
        assert!(message.contains("10.0.0.300"));

        match err {
            SurfaceError::Stage { source, .. } => {
                assert!(matches!(*source, SurfaceError::InvalidIdentifier { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
