use crate::config::{parse_duration, Config};
use crate::error::{Result, SurfaceError, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_consolidation(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SurfaceError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.database_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.database_path",
                "Database path cannot be empty",
            ));
        }

        if config.storage.pool_size == 0 {
            errors.push(ValidationError::new(
                "storage.pool_size",
                "Pool size must be greater than 0",
            ));
        }

        if parse_duration(&config.storage.busy_timeout).is_none() {
            errors.push(ValidationError::new(
                "storage.busy_timeout",
                format!("Invalid duration format: {}", config.storage.busy_timeout),
            ));
        }
    }

    fn validate_consolidation(config: &Config, errors: &mut Vec<ValidationError>) {
        let consolidation = &config.consolidation;

        match parse_duration(&consolidation.containment_timeout) {
            Some(timeout) if timeout.is_zero() => errors.push(ValidationError::new(
                "consolidation.containment_timeout",
                "Containment timeout must be greater than 0",
            )),
            Some(_) => {}
            None => errors.push(ValidationError::new(
                "consolidation.containment_timeout",
                format!(
                    "Invalid duration format: {}",
                    consolidation.containment_timeout
                ),
            )),
        }

        // ROI scores are percentages in the upstream tables
        if !(0..=100).contains(&consolidation.default_roi_score) {
            errors.push(ValidationError::new(
                "consolidation.default_roi_score",
                format!(
                    "ROI score must be between 0 and 100, got {}",
                    consolidation.default_roi_score
                ),
            ));
        }

        if parse_duration(&consolidation.write_lock_wait).is_none() {
            errors.push(ValidationError::new(
                "consolidation.write_lock_wait",
                format!(
                    "Invalid duration format: {}",
                    consolidation.write_lock_wait
                ),
            ));
        }

        if consolidation.successful_scan_status.trim().is_empty() {
            errors.push(ValidationError::new(
                "consolidation.successful_scan_status",
                "Successful scan status cannot be empty",
            ));
        }
    }
}
